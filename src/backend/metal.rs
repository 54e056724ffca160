//! Metal backend: device selection, MSL compilation, shared buffers, timed dispatch.

use std::ffi::c_void;
use std::time::Instant;

use ::metal::{
    Buffer, CommandQueue, CompileOptions, ComputePipelineState, Device, MTLCommandBufferStatus,
    MTLResourceOptions, MTLSize,
};

use super::{Backend, DeviceInfo};
use crate::args::{DeviceArg, KernelArg};
use crate::error::BackendError;
use crate::geometry::Geometry;
use crate::timing::KernelTime;

struct MetalCtx {
    device: Device,
    queue: CommandQueue,
}

/// A compiled compute pipeline.
pub struct MetalKernel {
    name: String,
    pipeline: ComputePipelineState,
}

impl MetalKernel {
    pub fn name(&self) -> &str {
        &self.name
    }
}

enum Storage {
    Global {
        buffer: Option<Buffer>,
        host: Vec<u8>,
        input: bool,
    },
    Local { bytes: usize },
    Value { bytes: Vec<u8> },
}

/// A Metal argument: a shared-storage buffer, threadgroup memory, or inline bytes.
pub struct MetalArg {
    storage: Storage,
    released: bool,
}

impl MetalArg {
    /// Host copy of a global buffer; outputs hold the last download.
    pub fn host_bytes(&self) -> Option<&[u8]> {
        match &self.storage {
            Storage::Global { host, .. } => Some(host),
            _ => None,
        }
    }

    fn upload(&mut self) {
        if let Storage::Global {
            buffer: Some(buffer),
            host,
            input: true,
        } = &self.storage
        {
            // SAFETY: shared-storage buffer of at least host.len() bytes, no GPU work in flight.
            unsafe {
                let dst = buffer.contents() as *mut u8;
                std::ptr::copy_nonoverlapping(host.as_ptr(), dst, host.len());
            }
        }
    }

    fn download(&mut self) {
        if let Storage::Global {
            buffer: Some(buffer),
            host,
            input: false,
        } = &mut self.storage
        {
            // SAFETY: command buffer has completed; buffer holds host.len() bytes.
            unsafe {
                let src = buffer.contents() as *const u8;
                std::ptr::copy_nonoverlapping(src, host.as_mut_ptr(), host.len());
            }
        }
    }
}

impl DeviceArg for MetalArg {
    fn byte_len(&self) -> usize {
        match &self.storage {
            Storage::Global { host, .. } => host.len(),
            Storage::Local { bytes } => *bytes,
            Storage::Value { bytes } => bytes.len(),
        }
    }

    fn clear(&mut self) {
        if let Storage::Global {
            buffer: Some(buffer),
            host,
            input: false,
        } = &mut self.storage
        {
            host.fill(0);
            // SAFETY: see download.
            unsafe {
                std::ptr::write_bytes(buffer.contents() as *mut u8, 0, host.len());
            }
        }
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        if let Storage::Global { buffer, host, .. } = &mut self.storage {
            *buffer = None;
            host.clear();
        }
        self.released = true;
    }
}

/// Backend over the system's Metal devices. Platform 0 is the only platform.
pub struct MetalBackend {
    ctx: Option<MetalCtx>,
}

impl MetalBackend {
    pub fn new() -> Self {
        Self { ctx: None }
    }

    fn ctx(&self) -> Result<&MetalCtx, BackendError> {
        self.ctx
            .as_ref()
            .ok_or_else(|| BackendError::Execution("metal session not initialized".into()))
    }
}

impl Default for MetalBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn millis(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}

fn mtl_size(dims: [usize; 3]) -> MTLSize {
    MTLSize::new(dims[0] as u64, dims[1] as u64, dims[2] as u64)
}

impl Backend for MetalBackend {
    type Kernel = MetalKernel;
    type Arg = MetalArg;

    fn name(&self) -> &'static str {
        "metal"
    }

    fn init_session(&mut self, platform: usize, device: usize) -> Result<(), BackendError> {
        let init_err = |reason: String| BackendError::Init {
            platform,
            device,
            reason,
        };
        if platform != 0 {
            return Err(init_err("Metal exposes a single platform (0)".into()));
        }
        let selected = Device::all()
            .into_iter()
            .nth(device)
            .ok_or_else(|| init_err("no such Metal device".into()))?;
        let queue = selected.new_command_queue();
        tracing::info!(device = selected.name(), "metal session started");
        self.ctx = Some(MetalCtx {
            device: selected,
            queue,
        });
        Ok(())
    }

    fn shutdown_session(&mut self) -> Result<(), BackendError> {
        self.ctx = None;
        Ok(())
    }

    fn compile(
        &mut self,
        source: &str,
        entry_point: &str,
        options: &str,
    ) -> Result<MetalKernel, BackendError> {
        let ctx = self.ctx()?;
        let compile_err = |log: String| BackendError::Compile {
            kernel: entry_point.to_string(),
            log,
        };
        let opts = CompileOptions::new();
        let fast_math = options.contains("fast-math") || options.contains("fast-relaxed-math");
        opts.set_fast_math_enabled(fast_math);
        let lib = ctx
            .device
            .new_library_with_source(source, &opts)
            .map_err(compile_err)?;
        let func = lib.get_function(entry_point, None).map_err(compile_err)?;
        let pipeline = ctx
            .device
            .new_compute_pipeline_state_with_function(&func)
            .map_err(compile_err)?;
        Ok(MetalKernel {
            name: entry_point.to_string(),
            pipeline,
        })
    }

    fn create_arg(&mut self, arg: &KernelArg) -> Result<MetalArg, BackendError> {
        let ctx = self.ctx()?;
        let bytes = arg.byte_len();
        if bytes as u64 > ctx.device.max_buffer_length() {
            return Err(BackendError::Allocation {
                bytes,
                reason: "exceeds the device's max buffer length".into(),
            });
        }
        let shared = |len: usize| {
            Some(ctx.device.new_buffer(len.max(1) as u64, MTLResourceOptions::StorageModeShared))
        };
        let storage = match arg {
            KernelArg::Input(data) => Storage::Global {
                buffer: shared(bytes),
                host: data.to_bytes(),
                input: true,
            },
            KernelArg::Output { bytes } => Storage::Global {
                buffer: shared(*bytes),
                host: vec![0; *bytes],
                input: false,
            },
            KernelArg::Local { bytes } => Storage::Local { bytes: *bytes },
            KernelArg::Value(data) => Storage::Value {
                bytes: data.to_bytes(),
            },
        };
        Ok(MetalArg {
            storage,
            released: false,
        })
    }

    fn execute_once(
        &mut self,
        kernel: &MetalKernel,
        geometry: &Geometry,
        args: &mut [MetalArg],
    ) -> Result<KernelTime, BackendError> {
        let ctx = self.ctx()?;
        let max_threads = kernel.pipeline.max_total_threads_per_threadgroup() as usize;
        if geometry.work_group_size() > max_threads {
            return Err(BackendError::Execution(format!(
                "work-group size {} exceeds pipeline maximum {max_threads}",
                geometry.work_group_size()
            )));
        }

        if let Some(i) = args.iter().position(|arg| arg.released) {
            return Err(BackendError::Execution(format!(
                "argument {i} was already released"
            )));
        }

        let total_start = Instant::now();

        let start = Instant::now();
        args.iter_mut().for_each(MetalArg::upload);
        let upload = millis(start);

        let start = Instant::now();
        let cmd = ctx.queue.new_command_buffer();
        let enc = cmd.new_compute_command_encoder();
        enc.set_compute_pipeline_state(&kernel.pipeline);
        let mut threadgroup_slot = 0u64;
        for (i, arg) in args.iter().enumerate() {
            match &arg.storage {
                Storage::Global { buffer, .. } => enc.set_buffer(i as u64, buffer.as_deref(), 0),
                Storage::Value { bytes } => {
                    enc.set_bytes(i as u64, bytes.len() as u64, bytes.as_ptr() as *const c_void)
                }
                Storage::Local { bytes } => {
                    enc.set_threadgroup_memory_length(threadgroup_slot, *bytes as u64);
                    threadgroup_slot += 1;
                }
            }
        }
        enc.dispatch_threads(mtl_size(geometry.global()), mtl_size(geometry.local()));
        enc.end_encoding();
        cmd.commit();
        cmd.wait_until_completed();
        if cmd.status() == MTLCommandBufferStatus::Error {
            return Err(BackendError::Execution(format!(
                "command buffer for '{}' failed",
                kernel.name
            )));
        }
        let launch = millis(start);

        let start = Instant::now();
        args.iter_mut().for_each(MetalArg::download);
        let download = millis(start);

        Ok(KernelTime::new(upload, download, launch, millis(total_start)))
    }

    fn device_info(&self) -> Result<DeviceInfo, BackendError> {
        let ctx = self.ctx()?;
        let device = &ctx.device;
        let threads = device.max_threads_per_threadgroup();
        let device_type = if device.has_unified_memory() {
            "GPU (unified memory)"
        } else {
            "GPU (discrete)"
        };
        Ok(DeviceInfo {
            platform_name: "Apple Metal".into(),
            device_name: device.name().to_string(),
            device_type: device_type.into(),
            local_mem_bytes: device.max_threadgroup_memory_length(),
            global_mem_bytes: device.recommended_max_working_set_size(),
            max_mem_alloc_bytes: device.max_buffer_length(),
            max_work_group_size: (threads.width * threads.height * threads.depth) as usize,
            supports_double: false,
        })
    }
}
