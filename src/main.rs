//! `rusty-executor`: benchmark built-in kernels over a sweep of data sizes.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process;

use rusty_executor::workloads::{host_backend, Workload};
use rusty_executor::{
    run_benchmark, Backend, BenchmarkReport, BenchmarkRequest, Session, SessionConfig, Timeout,
};

#[derive(Debug, Parser)]
#[command(
    name = "rusty-executor",
    version,
    about = "Timed kernel benchmarks over data-size sweeps"
)]
struct Cli {
    /// Platform index (overrides RUSTY_EXECUTOR_PLATFORM)
    #[arg(long, global = true)]
    platform: Option<usize>,

    /// Device index (overrides RUSTY_EXECUTOR_DEVICE)
    #[arg(long, global = true)]
    device: Option<usize>,

    /// Execution backend
    #[arg(long, value_enum, default_value_t = BackendKind::Host, global = true)]
    backend: BackendKind,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendKind {
    Host,
    Metal,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Benchmark a kernel and print the averaged report
    Run {
        /// Kernel to benchmark (vecadd, saxpy, reduce_sum)
        #[arg(short, long, default_value = "vecadd")]
        kernel: Workload,

        /// Data sizes in bytes, comma separated
        #[arg(
            short,
            long,
            value_delimiter = ',',
            default_values_t = [1024u64, 4096, 1 << 20]
        )]
        sizes: Vec<u64>,

        /// Launches per data size
        #[arg(short, long, default_value_t = 10)]
        iterations: u32,

        /// Seconds; a slower first launch stops the size after one sample (0 disables)
        #[arg(short, long, default_value_t = 0.0)]
        timeout: f64,

        /// Options passed to the kernel compiler
        #[arg(long, default_value = "")]
        build_options: String,

        /// Also write the full report as JSON
        #[arg(short, long, value_name = "PATH")]
        json: Option<PathBuf>,
    },
    /// Print properties of the selected device
    Info,
}

fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn session_config(cli: &Cli) -> SessionConfig {
    let env = SessionConfig::from_env();
    SessionConfig::new(
        cli.platform.unwrap_or(env.platform),
        cli.device.unwrap_or(env.device),
    )
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    if let Err(err) = dispatch(&cli) {
        eprintln!("error: {err:#}");
        process::exit(1);
    }
}

fn dispatch(cli: &Cli) -> Result<()> {
    let config = session_config(cli);
    match cli.backend {
        BackendKind::Host => execute(host_backend(), config, &cli.command),
        BackendKind::Metal => metal(config, &cli.command),
    }
}

#[cfg(all(feature = "metal", target_os = "macos"))]
fn metal(config: SessionConfig, command: &Command) -> Result<()> {
    execute(rusty_executor::backend::MetalBackend::new(), config, command)
}

#[cfg(not(all(feature = "metal", target_os = "macos")))]
fn metal(_config: SessionConfig, _command: &Command) -> Result<()> {
    anyhow::bail!("metal backend not compiled in (build on macOS with `--features metal`)")
}

fn execute<B: Backend>(backend: B, config: SessionConfig, command: &Command) -> Result<()> {
    let name = backend.name();
    let mut session = Session::open(backend, config)
        .with_context(|| format!("failed to start {name} session"))?;

    match command {
        Command::Info => {
            let info = session.call(|backend| backend.device_info())?;
            println!("{info}");
        }
        Command::Run {
            kernel,
            sizes,
            iterations,
            timeout,
            build_options,
            json,
        } => {
            let request = BenchmarkRequest::new(kernel.source(), kernel.name())
                .build_options(build_options.as_str())
                .iterations(*iterations)
                .timeout(Timeout::from_secs_f64(*timeout)?)
                .data_sizes(sizes.iter().copied());
            let report = run_benchmark(&mut session, &request, kernel.factory())
                .with_context(|| format!("benchmark of '{kernel}' failed"))?;
            print!("{report}");
            if let Some(path) = json {
                write_json(&report, path)?;
                println!("\nResults written to {}", path.display());
            }
        }
    }

    session.shutdown();
    Ok(())
}

fn write_json(report: &BenchmarkReport, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    std::fs::write(path, report.to_json()?)
        .with_context(|| format!("failed to write {}", path.display()))
}
