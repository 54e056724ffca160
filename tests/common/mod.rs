//! Shared fixtures: a scripted backend with programmable timings and faults.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rusty_executor::{
    ArgumentFactory, Backend, BackendError, DeviceArg, DeviceInfo, Geometry, KernelArg, KernelTime,
};

/// Counters shared between the backend and every handle it hands out.
#[derive(Debug, Default)]
pub struct Counters {
    pub created: AtomicUsize,
    pub released: AtomicUsize,
    pub live: AtomicUsize,
    pub max_live: AtomicUsize,
}

impl Counters {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct ScriptedArg {
    bytes: usize,
    released: bool,
    counters: Arc<Counters>,
}

impl DeviceArg for ScriptedArg {
    fn byte_len(&self) -> usize {
        self.bytes
    }

    fn clear(&mut self) {}

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.counters.released.fetch_add(1, Ordering::SeqCst);
        self.counters.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Drop for ScriptedArg {
    fn drop(&mut self) {
        self.release();
    }
}

/// Timing of launch number `launch` (1-based, counted across the backend's life)
/// for a kernel running over `work_items` items.
pub type TimingScript = fn(launch: usize, work_items: usize) -> KernelTime;

pub fn constant(total: f64) -> KernelTime {
    KernelTime::new(total / 4.0, total / 4.0, total / 2.0, total)
}

fn one_ms(_launch: usize, _work_items: usize) -> KernelTime {
    constant(1.0)
}

/// Backend that never touches a device. Launches report scripted timings.
#[derive(Debug)]
pub struct ScriptedBackend {
    pub counters: Arc<Counters>,
    pub timing: TimingScript,
    /// Launches (1-based) that fail with an execution error.
    pub fail_launches: Vec<usize>,
    /// Arg creations (1-based) that fail with an allocation error.
    pub fail_allocations: Vec<usize>,
    /// Every init after the first one fails.
    pub fail_reinit: bool,
    /// Scalar arguments are rejected as unsupported.
    pub refuse_values: bool,
    pub compile_error: Option<String>,
    pub inits: usize,
    pub shutdowns: usize,
    pub compiles: usize,
    pub launches: usize,
    pub allocations: usize,
    pub running: bool,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self {
            counters: Arc::new(Counters::default()),
            timing: one_ms,
            fail_launches: Vec::new(),
            fail_allocations: Vec::new(),
            fail_reinit: false,
            refuse_values: false,
            compile_error: None,
            inits: 0,
            shutdowns: 0,
            compiles: 0,
            launches: 0,
            allocations: 0,
            running: false,
        }
    }
}

impl ScriptedBackend {
    pub fn with_timing(timing: TimingScript) -> Self {
        Self {
            timing,
            ..Self::default()
        }
    }

    pub fn failing_launches(launches: impl IntoIterator<Item = usize>) -> Self {
        Self {
            fail_launches: launches.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Backend calls of any kind, lifecycle included.
    pub fn interactions(&self) -> usize {
        self.inits + self.shutdowns + self.compiles + self.launches + self.allocations
    }
}

impl Backend for ScriptedBackend {
    type Kernel = String;
    type Arg = ScriptedArg;

    fn name(&self) -> &'static str {
        "scripted"
    }

    fn init_session(&mut self, platform: usize, device: usize) -> Result<(), BackendError> {
        self.inits += 1;
        if self.fail_reinit && self.inits > 1 {
            return Err(BackendError::Init {
                platform,
                device,
                reason: "device disappeared".into(),
            });
        }
        self.running = true;
        Ok(())
    }

    fn shutdown_session(&mut self) -> Result<(), BackendError> {
        self.shutdowns += 1;
        self.running = false;
        Ok(())
    }

    fn compile(
        &mut self,
        source: &str,
        entry_point: &str,
        _options: &str,
    ) -> Result<String, BackendError> {
        self.compiles += 1;
        if let Some(log) = &self.compile_error {
            return Err(BackendError::Compile {
                kernel: entry_point.to_string(),
                log: log.clone(),
            });
        }
        assert!(!source.is_empty());
        Ok(entry_point.to_string())
    }

    fn create_arg(&mut self, arg: &KernelArg) -> Result<ScriptedArg, BackendError> {
        self.allocations += 1;
        if self.refuse_values && matches!(arg, KernelArg::Value(_)) {
            return Err(BackendError::Unsupported {
                backend: "scripted",
                what: "value arguments".into(),
            });
        }
        if self.fail_allocations.contains(&self.allocations) {
            return Err(BackendError::Allocation {
                bytes: arg.byte_len(),
                reason: "out of device memory".into(),
            });
        }
        self.counters.created.fetch_add(1, Ordering::SeqCst);
        let live = self.counters.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_live.fetch_max(live, Ordering::SeqCst);
        Ok(ScriptedArg {
            bytes: arg.byte_len(),
            released: false,
            counters: Arc::clone(&self.counters),
        })
    }

    fn execute_once(
        &mut self,
        _kernel: &String,
        geometry: &Geometry,
        args: &mut [ScriptedArg],
    ) -> Result<KernelTime, BackendError> {
        assert!(self.running, "launch on a stopped session");
        assert!(
            args.iter().all(|arg| !arg.released),
            "launch with released args"
        );
        self.launches += 1;
        if self.fail_launches.contains(&self.launches) {
            return Err(BackendError::Execution(format!(
                "launch {} lost the device",
                self.launches
            )));
        }
        Ok((self.timing)(self.launches, geometry.work_items()))
    }

    fn device_info(&self) -> Result<DeviceInfo, BackendError> {
        Ok(DeviceInfo {
            platform_name: "Scripted".into(),
            device_name: "scripted-0".into(),
            device_type: "CPU".into(),
            local_mem_bytes: 0,
            global_mem_bytes: 0,
            max_mem_alloc_bytes: 0,
            max_work_group_size: 1024,
            supports_double: false,
        })
    }
}

/// One input, one output, one scalar; 4 bytes per element.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreeArgs;

impl ArgumentFactory for ThreeArgs {
    fn data_length(&self, data_size_bytes: u64) -> usize {
        (data_size_bytes / 4).max(1) as usize
    }

    fn local_x(&self, _n: usize) -> usize {
        1
    }

    fn global_x(&self, n: usize) -> usize {
        n
    }

    fn create_arguments(&self, n: usize) -> Vec<KernelArg> {
        vec![
            KernelArg::input_f32(vec![1.0; n]),
            KernelArg::output_f32(n),
            KernelArg::value_i32(n as i32),
        ]
    }
}

pub const SOURCE: &str = "kernel void scripted() {}";
