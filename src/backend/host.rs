//! CPU reference backend: kernels are plain Rust functions over host buffers.
//!
//! Each argument has a host copy and a separate "device" copy, so upload and
//! download are real copies and the timing breakdown has the same shape as on a
//! GPU. Always available; used by the CLI when no GPU backend is compiled in.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use super::{Backend, DeviceInfo};
use crate::args::{ArgData, DeviceArg, KernelArg};
use crate::error::BackendError;
use crate::geometry::Geometry;
use crate::timing::KernelTime;

/// Signature of a host kernel. Arguments arrive in declaration order.
pub type HostKernelFn = fn(&Geometry, &mut [HostArg]) -> Result<(), BackendError>;

const MAX_WORK_GROUP_SIZE: usize = 1024;
const DEFAULT_MAX_ALLOC: u64 = 1 << 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArgKind {
    Input,
    Output,
    Local,
    Value,
}

/// A host "device" allocation.
#[derive(Debug)]
pub struct HostArg {
    kind: ArgKind,
    host: ArgData,
    device: ArgData,
    bytes: usize,
    released: bool,
    live: Arc<AtomicUsize>,
}

impl HostArg {
    /// Device-side contents as `f32`, if that is the element type.
    pub fn device_f32(&self) -> Option<&[f32]> {
        match &self.device {
            ArgData::F32(v) => Some(v),
            _ => None,
        }
    }

    pub fn device_f32_mut(&mut self) -> Option<&mut [f32]> {
        match &mut self.device {
            ArgData::F32(v) => Some(v),
            _ => None,
        }
    }

    pub fn device_i32(&self) -> Option<&[i32]> {
        match &self.device {
            ArgData::I32(v) => Some(v),
            _ => None,
        }
    }

    /// Host-side contents; outputs hold the result of the last download.
    pub fn host(&self) -> &ArgData {
        &self.host
    }

    /// First element of a by-value `f32` argument.
    pub fn scalar_f32(&self) -> Option<f32> {
        self.device_f32().and_then(|v| v.first().copied())
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    fn upload(&mut self) {
        if matches!(self.kind, ArgKind::Input | ArgKind::Value) {
            self.device.clone_from(&self.host);
        }
    }

    fn download(&mut self) {
        if self.kind == ArgKind::Output {
            self.host.clone_from(&self.device);
        }
    }
}

fn zeroed_f32(bytes: usize) -> ArgData {
    ArgData::F32(vec![0.0; bytes.div_ceil(std::mem::size_of::<f32>())])
}

impl DeviceArg for HostArg {
    fn byte_len(&self) -> usize {
        self.bytes
    }

    fn clear(&mut self) {
        if matches!(self.kind, ArgKind::Output | ArgKind::Local) {
            self.host = zeroed_f32(self.bytes);
            self.device = zeroed_f32(self.bytes);
        }
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.host = ArgData::F32(Vec::new());
        self.device = ArgData::F32(Vec::new());
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Drop for HostArg {
    fn drop(&mut self) {
        self.release();
    }
}

/// A host kernel resolved from the registry.
#[derive(Clone)]
pub struct HostKernel {
    name: String,
    options: String,
    func: HostKernelFn,
}

impl fmt::Debug for HostKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostKernel")
            .field("name", &self.name)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl HostKernel {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &str {
        &self.options
    }
}

/// CPU backend with a registry of named kernels.
pub struct HostBackend {
    kernels: HashMap<String, HostKernelFn>,
    running: bool,
    max_alloc_bytes: u64,
    live: Arc<AtomicUsize>,
}

impl HostBackend {
    pub fn new() -> Self {
        Self {
            kernels: HashMap::new(),
            running: false,
            max_alloc_bytes: DEFAULT_MAX_ALLOC,
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Make `entry_point` compilable.
    pub fn register(&mut self, entry_point: &str, func: HostKernelFn) -> &mut Self {
        self.kernels.insert(entry_point.to_string(), func);
        self
    }

    pub fn with_max_alloc(mut self, bytes: u64) -> Self {
        self.max_alloc_bytes = bytes;
        self
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Argument handles created and not yet released.
    pub fn live_allocations(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    fn ensure_running(&self) -> Result<(), BackendError> {
        if self.running {
            Ok(())
        } else {
            Err(BackendError::Execution("host session not initialized".into()))
        }
    }
}

impl Default for HostBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn millis(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}

impl Backend for HostBackend {
    type Kernel = HostKernel;
    type Arg = HostArg;

    fn name(&self) -> &'static str {
        "host"
    }

    fn init_session(&mut self, platform: usize, device: usize) -> Result<(), BackendError> {
        if platform != 0 || device != 0 {
            return Err(BackendError::Init {
                platform,
                device,
                reason: "the host platform exposes a single device (0/0)".into(),
            });
        }
        self.running = true;
        tracing::debug!("host session started");
        Ok(())
    }

    fn shutdown_session(&mut self) -> Result<(), BackendError> {
        self.running = false;
        Ok(())
    }

    fn compile(
        &mut self,
        source: &str,
        entry_point: &str,
        options: &str,
    ) -> Result<HostKernel, BackendError> {
        self.ensure_running()?;
        let func = self
            .kernels
            .get(entry_point)
            .copied()
            .ok_or_else(|| BackendError::Compile {
                kernel: entry_point.to_string(),
                log: "no host kernel registered under this entry point".into(),
            })?;
        if !source.contains(entry_point) {
            return Err(BackendError::Compile {
                kernel: entry_point.to_string(),
                log: "entry point not found in source".into(),
            });
        }
        Ok(HostKernel {
            name: entry_point.to_string(),
            options: options.to_string(),
            func,
        })
    }

    fn create_arg(&mut self, arg: &KernelArg) -> Result<HostArg, BackendError> {
        self.ensure_running()?;
        let bytes = arg.byte_len();
        if bytes as u64 > self.max_alloc_bytes {
            return Err(BackendError::Allocation {
                bytes,
                reason: format!("exceeds max allocation of {} bytes", self.max_alloc_bytes),
            });
        }
        let (kind, host) = match arg {
            KernelArg::Input(data) => (ArgKind::Input, data.clone()),
            KernelArg::Value(data) => (ArgKind::Value, data.clone()),
            KernelArg::Output { bytes } => (ArgKind::Output, zeroed_f32(*bytes)),
            KernelArg::Local { bytes } => (ArgKind::Local, zeroed_f32(*bytes)),
        };
        let device = match kind {
            ArgKind::Input | ArgKind::Value => ArgData::F32(Vec::new()),
            ArgKind::Output | ArgKind::Local => host.clone(),
        };
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(HostArg {
            kind,
            host,
            device,
            bytes,
            released: false,
            live: Arc::clone(&self.live),
        })
    }

    fn execute_once(
        &mut self,
        kernel: &HostKernel,
        geometry: &Geometry,
        args: &mut [HostArg],
    ) -> Result<KernelTime, BackendError> {
        self.ensure_running()?;
        if !geometry.is_uniform() {
            return Err(BackendError::Execution(format!(
                "invalid work-group size: {geometry}"
            )));
        }
        if geometry.work_group_size() > MAX_WORK_GROUP_SIZE {
            return Err(BackendError::Execution(format!(
                "work-group size {} exceeds device maximum {MAX_WORK_GROUP_SIZE}",
                geometry.work_group_size()
            )));
        }
        if let Some(released) = args.iter().position(HostArg::is_released) {
            return Err(BackendError::Execution(format!(
                "argument {released} was already released"
            )));
        }

        let total_start = Instant::now();

        let start = Instant::now();
        args.iter_mut().for_each(HostArg::upload);
        let upload = millis(start);

        let start = Instant::now();
        (kernel.func)(geometry, args)?;
        let launch = millis(start);

        let start = Instant::now();
        args.iter_mut().for_each(HostArg::download);
        let download = millis(start);

        Ok(KernelTime::new(upload, download, launch, millis(total_start)))
    }

    fn device_info(&self) -> Result<DeviceInfo, BackendError> {
        Ok(DeviceInfo {
            platform_name: "Host".into(),
            device_name: "Rust scalar reference".into(),
            device_type: "CPU".into(),
            local_mem_bytes: 64 * 1024,
            global_mem_bytes: self.max_alloc_bytes,
            max_mem_alloc_bytes: self.max_alloc_bytes,
            max_work_group_size: MAX_WORK_GROUP_SIZE,
            supports_double: true,
        })
    }
}
