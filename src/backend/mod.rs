//! Device execution backends.
//!
//! A [`Backend`] compiles kernels, turns [`KernelArg`] descriptions into device
//! handles, and launches kernels returning a [`KernelTime`] per launch. Session
//! lifecycle and failure recovery live in [`crate::session`]; backends only
//! report what went wrong.

pub mod host;
#[cfg(all(feature = "metal", target_os = "macos"))]
pub mod metal;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::args::{DeviceArg, KernelArg};
use crate::error::BackendError;
use crate::format::format_bytes;
use crate::geometry::Geometry;
use crate::timing::{KernelTime, Timeout};

pub use host::{HostArg, HostBackend, HostKernel, HostKernelFn};
#[cfg(all(feature = "metal", target_os = "macos"))]
pub use self::metal::MetalBackend;

/// Read-only properties of the selected device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub platform_name: String,
    pub device_name: String,
    pub device_type: String,
    pub local_mem_bytes: u64,
    pub global_mem_bytes: u64,
    pub max_mem_alloc_bytes: u64,
    pub max_work_group_size: usize,
    pub supports_double: bool,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Platform:        {}", self.platform_name)?;
        writeln!(
            f,
            "Device:          {} ({})",
            self.device_name, self.device_type
        )?;
        writeln!(f, "Global memory:   {}", format_bytes(self.global_mem_bytes))?;
        writeln!(f, "Local memory:    {}", format_bytes(self.local_mem_bytes))?;
        writeln!(
            f,
            "Max allocation:  {}",
            format_bytes(self.max_mem_alloc_bytes)
        )?;
        writeln!(f, "Max work group:  {}", self.max_work_group_size)?;
        let double = if self.supports_double { "yes" } else { "no" };
        write!(f, "Double support:  {double}")
    }
}

/// The device-facing primitives the orchestrator is built on.
///
/// Calls are synchronous: each returns once the device work it issued has
/// completed. One caller at a time.
pub trait Backend {
    /// A compiled kernel, ready to launch.
    type Kernel;
    /// A device-side argument handle.
    type Arg: DeviceArg;

    /// Short identifier used in logs and reports.
    fn name(&self) -> &'static str;

    fn init_session(&mut self, platform: usize, device: usize) -> Result<(), BackendError>;

    fn shutdown_session(&mut self) -> Result<(), BackendError>;

    fn compile(
        &mut self,
        source: &str,
        entry_point: &str,
        options: &str,
    ) -> Result<Self::Kernel, BackendError>;

    fn create_arg(&mut self, arg: &KernelArg) -> Result<Self::Arg, BackendError>;

    /// Upload every argument, launch once, download outputs.
    fn execute_once(
        &mut self,
        kernel: &Self::Kernel,
        geometry: &Geometry,
        args: &mut [Self::Arg],
    ) -> Result<KernelTime, BackendError>;

    /// Launch `iterations` times, returning samples in execution order.
    ///
    /// With an enabled `timeout`, a first iteration whose total exceeds it ends the
    /// run after that one sample.
    fn execute_many(
        &mut self,
        kernel: &Self::Kernel,
        geometry: &Geometry,
        args: &mut [Self::Arg],
        iterations: u32,
        timeout: Timeout,
    ) -> Result<Vec<KernelTime>, BackendError> {
        run_iterations(iterations, timeout, args, |args| {
            self.execute_once(kernel, geometry, args)
        })
    }

    fn device_info(&self) -> Result<DeviceInfo, BackendError>;
}

/// The bounded-iteration loop behind [`Backend::execute_many`].
///
/// Arguments are cleared before every iteration. Only the first sample is checked
/// against `timeout`.
pub fn run_iterations<A, F>(
    iterations: u32,
    timeout: Timeout,
    args: &mut [A],
    mut launch: F,
) -> Result<Vec<KernelTime>, BackendError>
where
    A: DeviceArg,
    F: FnMut(&mut [A]) -> Result<KernelTime, BackendError>,
{
    let mut samples = Vec::with_capacity(iterations as usize);
    for i in 0..iterations {
        args.iter_mut().for_each(DeviceArg::clear);
        let sample = launch(args)?;
        samples.push(sample);

        if i == 0 && timeout.curtails(&sample) {
            tracing::debug!(
                total_ms = sample.total(),
                timeout_s = timeout.as_secs_f64(),
                skipped = iterations - 1,
                "first iteration exceeded timeout"
            );
            break;
        }
    }
    Ok(samples)
}
