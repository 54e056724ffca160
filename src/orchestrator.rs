//! The benchmark control loop: one compile, then one timed run per data size.

use std::time::Instant;

use crate::args::{ArgumentFactory, ArgumentSet, KernelArg};
use crate::backend::Backend;
use crate::config::SessionConfig;
use crate::error::{BackendError, ExecutorError, Result, SizeFailure, ValidationError};
use crate::geometry::Geometry;
use crate::report::{BenchmarkReport, BenchmarkRun};
use crate::session::Session;
use crate::timing::{KernelTime, Timeout};

/// What to benchmark and over which data sizes.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkRequest {
    source: String,
    kernel_name: String,
    build_options: String,
    iterations: u32,
    timeout: Timeout,
    data_sizes: Vec<u64>,
}

impl BenchmarkRequest {
    /// One iteration, no timeout, no build options, no sizes yet.
    pub fn new(source: impl Into<String>, kernel_name: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            kernel_name: kernel_name.into(),
            build_options: String::new(),
            iterations: 1,
            timeout: Timeout::DISABLED,
            data_sizes: Vec::new(),
        }
    }

    pub fn build_options(mut self, options: impl Into<String>) -> Self {
        self.build_options = options.into();
        self
    }

    pub fn iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = timeout;
        self
    }

    /// Data sizes in bytes, benchmarked in the given order.
    pub fn data_sizes(mut self, sizes: impl IntoIterator<Item = u64>) -> Self {
        self.data_sizes = sizes.into_iter().collect();
        self
    }

    pub fn kernel_name(&self) -> &str {
        &self.kernel_name
    }

    pub fn sizes(&self) -> &[u64] {
        &self.data_sizes
    }

    pub fn requested_iterations(&self) -> u32 {
        self.iterations
    }

    /// Check the request without touching the backend.
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.data_sizes.is_empty() {
            return Err(ValidationError::NoDataSizes);
        }
        if self.iterations == 0 {
            return Err(ValidationError::NonPositiveIterations(self.iterations));
        }
        if let Some(index) = self.data_sizes.iter().position(|&size| size == 0) {
            return Err(ValidationError::NonPositiveDataSize { index, value: 0 });
        }
        Ok(())
    }
}

/// Benchmark the kernel of `request` once per data size.
///
/// The kernel is compiled once. For each size the factory supplies the data
/// length, geometry and arguments; the arguments are released before the next
/// size starts, whether or not the run succeeded. An execution failure stops the
/// sweep with [`ExecutorError::SizeFailed`], which carries the runs completed so
/// far and the sizes still to do. The session is already restarted by then.
pub fn run_benchmark<B: Backend>(
    session: &mut Session<B>,
    request: &BenchmarkRequest,
    factory: &dyn ArgumentFactory,
) -> Result<BenchmarkReport> {
    request.validate()?;

    let started = Instant::now();
    let kernel = session.call(|backend| {
        backend.compile(&request.source, &request.kernel_name, &request.build_options)
    })?;
    tracing::debug!(kernel = %request.kernel_name, "kernel compiled");

    let mut runs = Vec::with_capacity(request.data_sizes.len());
    for (index, &data_size) in request.data_sizes.iter().enumerate() {
        match run_size(session, &kernel, request, factory, data_size) {
            Ok(run) => {
                tracing::info!(
                    kernel = %request.kernel_name,
                    bytes = data_size,
                    samples = run.samples().len(),
                    avg_total_ms = run.average().total(),
                    "data size done"
                );
                runs.push(run);
            }
            Err(ExecutorError::Execution { reason }) => {
                return Err(ExecutorError::SizeFailed(Box::new(SizeFailure {
                    kernel_name: request.kernel_name.clone(),
                    data_size_bytes: data_size,
                    reason,
                    completed: runs,
                    remaining: request.data_sizes[index..].to_vec(),
                })));
            }
            Err(err) => return Err(err),
        }
    }

    let wall = started.elapsed().as_millis() as u64;
    Ok(BenchmarkReport::new(request.kernel_name.clone(), request.iterations, runs, wall))
}

fn run_size<B: Backend>(
    session: &mut Session<B>,
    kernel: &B::Kernel,
    request: &BenchmarkRequest,
    factory: &dyn ArgumentFactory,
    data_size: u64,
) -> Result<BenchmarkRun> {
    let data_length = factory.data_length(data_size);
    let geometry = factory.geometry(data_length);
    tracing::debug!(bytes = data_size, data_length, %geometry, "preparing data size");

    let mut args = create_argument_set(session, &factory.create_arguments(data_length))?;

    let samples = session.call(|backend| {
        let samples = backend.execute_many(
            kernel,
            &geometry,
            args.as_mut_slice(),
            request.iterations,
            request.timeout,
        )?;
        if samples.is_empty() {
            return Err(BackendError::Execution("backend returned no samples".into()));
        }
        Ok(samples)
    });
    args.dispose();

    let samples = samples?;
    if samples.len() < request.iterations as usize {
        tracing::warn!(
            bytes = data_size,
            requested = request.iterations,
            performed = samples.len(),
            timeout_s = request.timeout.as_secs_f64(),
            "first iteration exceeded timeout, skipping remaining iterations"
        );
    }
    let run = BenchmarkRun::new(data_size, data_length, geometry, samples);
    run.ok_or_else(|| ExecutorError::Execution {
        reason: "no samples recorded".into(),
    })
}

/// Turn host descriptions into device handles. On failure the handles created so
/// far are released when the partial set drops.
fn create_argument_set<B: Backend>(
    session: &mut Session<B>,
    descriptions: &[KernelArg],
) -> Result<ArgumentSet<B::Arg>> {
    let mut set = ArgumentSet::new(Vec::with_capacity(descriptions.len()));
    for description in descriptions {
        let arg = session.call(|backend| backend.create_arg(description))?;
        set.push(arg);
    }
    Ok(set)
}

/// Start a session, compile, launch once, shut down.
pub fn init_and_execute<B: Backend>(
    backend: B,
    config: SessionConfig,
    source: &str,
    kernel_name: &str,
    build_options: &str,
    geometry: &Geometry,
    args: &[KernelArg],
) -> Result<KernelTime> {
    let mut session = Session::open(backend, config)?;
    let kernel = session.call(|backend| backend.compile(source, kernel_name, build_options))?;
    let mut set = create_argument_set(&mut session, args)?;
    let time = session.call(|backend| backend.execute_once(&kernel, geometry, set.as_mut_slice()));
    set.dispose();
    session.shutdown();
    time
}
