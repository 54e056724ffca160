//! Benchmark orchestration for compute kernels.
//!
//! A [`BenchmarkRequest`] names a kernel and a list of data sizes. [`run_benchmark`]
//! compiles the kernel once on a [`Session`], asks an [`ArgumentFactory`] for the
//! geometry and arguments of each size, launches the kernel repeatedly through the
//! session's [`Backend`], and returns a [`BenchmarkReport`] with raw samples and
//! per-size averages. The session restarts its backend after execution failures.
//!
//! ```no_run
//! use rusty_executor::workloads::{host_backend, Workload};
//! use rusty_executor::{run_benchmark, BenchmarkRequest, Session, SessionConfig};
//!
//! let mut session = Session::open(host_backend(), SessionConfig::from_env())?;
//! let request = BenchmarkRequest::new(Workload::VecAdd.source(), "vecadd")
//!     .iterations(3)
//!     .data_sizes([1024, 4096]);
//! let report = run_benchmark(&mut session, &request, Workload::VecAdd.factory())?;
//! println!("{report}");
//! # Ok::<(), rusty_executor::ExecutorError>(())
//! ```

pub mod args;
pub mod backend;
pub mod config;
pub mod error;
pub mod format;
pub mod geometry;
pub mod orchestrator;
pub mod report;
pub mod session;
pub mod timing;
pub mod workloads;

pub use args::{ArgData, ArgumentFactory, ArgumentSet, DeviceArg, KernelArg};
pub use backend::{run_iterations, Backend, DeviceInfo, HostBackend};
pub use config::SessionConfig;
pub use error::{BackendError, ExecutorError, Result, SizeFailure, ValidationError};
pub use geometry::Geometry;
pub use orchestrator::{init_and_execute, run_benchmark, BenchmarkRequest};
pub use report::{average, BenchmarkReport, BenchmarkRun};
pub use session::{Session, SessionState};
pub use timing::{KernelTime, Timeout};
