//! Ready-made benchmark workloads: argument factories, host kernels and MSL sources.
//!
//! All workloads are f32 and one-dimensional. The data length is the byte size
//! divided by four; the global size is padded up to a multiple of the work-group
//! size and kernels guard on `n`.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::str::FromStr;

use crate::args::{ArgumentFactory, KernelArg};
use crate::backend::{HostArg, HostBackend};
use crate::error::BackendError;
use crate::geometry::Geometry;

pub const MAX_LOCAL_SIZE: usize = 256;
const SEED: u64 = 0x5eed;
const SAXPY_A: f32 = 2.5;

pub const VECADD_SRC: &str = r#"
#include <metal_stdlib>
using namespace metal;

kernel void vecadd(
    device const float* a [[buffer(0)]],
    device const float* b [[buffer(1)]],
    device float* c [[buffer(2)]],
    constant uint& n [[buffer(3)]],
    uint gid [[thread_position_in_grid]]
) {
    if (gid < n) c[gid] = a[gid] + b[gid];
}
"#;

pub const SAXPY_SRC: &str = r#"
#include <metal_stdlib>
using namespace metal;

kernel void saxpy(
    device const float* x [[buffer(0)]],
    device const float* y [[buffer(1)]],
    device float* out [[buffer(2)]],
    constant float& a [[buffer(3)]],
    constant uint& n [[buffer(4)]],
    uint gid [[thread_position_in_grid]]
) {
    if (gid < n) out[gid] = fma(a, x[gid], y[gid]);
}
"#;

// Tree reduction in threadgroup memory; the local size is a power of two.
pub const REDUCE_SUM_SRC: &str = r#"
#include <metal_stdlib>
using namespace metal;

kernel void reduce_sum(
    device const float* input [[buffer(0)]],
    device float* partial [[buffer(1)]],
    threadgroup float* scratch [[threadgroup(0)]],
    constant uint& n [[buffer(3)]],
    uint gid [[thread_position_in_grid]],
    uint tid [[thread_position_in_threadgroup]],
    uint tg_size [[threads_per_threadgroup]],
    uint group [[threadgroup_position_in_grid]]
) {
    scratch[tid] = (gid < n) ? input[gid] : 0.0f;
    threadgroup_barrier(mem_flags::mem_threadgroup);
    for (uint s = tg_size / 2; s > 0; s >>= 1) {
        if (tid < s) scratch[tid] += scratch[tid + s];
        threadgroup_barrier(mem_flags::mem_threadgroup);
    }
    if (tid == 0) partial[group] = scratch[0];
}
"#;

/// Largest power of two not above `min(n, MAX_LOCAL_SIZE)`.
pub fn local_size_for(n: usize) -> usize {
    let cap = n.clamp(1, MAX_LOCAL_SIZE);
    1 << (usize::BITS - 1 - cap.leading_zeros())
}

/// `n` padded up to a multiple of its local size.
pub fn padded_global(n: usize) -> usize {
    let local = local_size_for(n);
    n.max(1).div_ceil(local) * local
}

fn f32_elements(data_size_bytes: u64) -> usize {
    ((data_size_bytes / 4) as usize).max(1)
}

fn random_f32(n: usize, stream: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(SEED ^ stream);
    (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

fn len_arg(n: usize) -> KernelArg {
    KernelArg::value_i32(i32::try_from(n).unwrap_or(i32::MAX))
}

/// `c = a + b`.
#[derive(Debug, Clone, Copy, Default)]
pub struct VecAdd;

impl ArgumentFactory for VecAdd {
    fn data_length(&self, data_size_bytes: u64) -> usize {
        f32_elements(data_size_bytes)
    }

    fn local_x(&self, n: usize) -> usize {
        local_size_for(n)
    }

    fn global_x(&self, n: usize) -> usize {
        padded_global(n)
    }

    fn create_arguments(&self, n: usize) -> Vec<KernelArg> {
        vec![
            KernelArg::input_f32(random_f32(n, 1)),
            KernelArg::input_f32(random_f32(n, 2)),
            KernelArg::output_f32(n),
            len_arg(n),
        ]
    }
}

/// `out = a * x + y` with a fixed scalar `a`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Saxpy;

impl ArgumentFactory for Saxpy {
    fn data_length(&self, data_size_bytes: u64) -> usize {
        f32_elements(data_size_bytes)
    }

    fn local_x(&self, n: usize) -> usize {
        local_size_for(n)
    }

    fn global_x(&self, n: usize) -> usize {
        padded_global(n)
    }

    fn create_arguments(&self, n: usize) -> Vec<KernelArg> {
        vec![
            KernelArg::input_f32(random_f32(n, 1)),
            KernelArg::input_f32(random_f32(n, 2)),
            KernelArg::output_f32(n),
            KernelArg::value_f32(SAXPY_A),
            len_arg(n),
        ]
    }
}

/// One partial sum per work group.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReduceSum;

impl ArgumentFactory for ReduceSum {
    fn data_length(&self, data_size_bytes: u64) -> usize {
        f32_elements(data_size_bytes)
    }

    fn local_x(&self, n: usize) -> usize {
        local_size_for(n)
    }

    fn global_x(&self, n: usize) -> usize {
        padded_global(n)
    }

    fn create_arguments(&self, n: usize) -> Vec<KernelArg> {
        let local = local_size_for(n);
        let groups = padded_global(n) / local;
        vec![
            KernelArg::input_f32(random_f32(n, 1)),
            KernelArg::output_f32(groups),
            KernelArg::local_f32(local),
            len_arg(n),
        ]
    }
}

fn bad_arg(kernel: &str, index: usize) -> BackendError {
    BackendError::Execution(format!("{kernel}: argument {index} has the wrong type"))
}

fn len_of(kernel: &str, args: &[HostArg], index: usize) -> Result<usize, BackendError> {
    args.get(index)
        .and_then(HostArg::device_i32)
        .and_then(|v| v.first().copied())
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| bad_arg(kernel, index))
}

fn host_vecadd(_geometry: &Geometry, args: &mut [HostArg]) -> Result<(), BackendError> {
    let n = len_of("vecadd", args, 3)?;
    let (inputs, outputs) = args.split_at_mut(2);
    let a = inputs[0].device_f32().ok_or_else(|| bad_arg("vecadd", 0))?;
    let b = inputs[1].device_f32().ok_or_else(|| bad_arg("vecadd", 1))?;
    let c = outputs[0]
        .device_f32_mut()
        .ok_or_else(|| bad_arg("vecadd", 2))?;
    for i in 0..n.min(c.len()) {
        c[i] = a[i] + b[i];
    }
    Ok(())
}

fn host_saxpy(_geometry: &Geometry, args: &mut [HostArg]) -> Result<(), BackendError> {
    let n = len_of("saxpy", args, 4)?;
    let a = args
        .get(3)
        .and_then(HostArg::scalar_f32)
        .ok_or_else(|| bad_arg("saxpy", 3))?;
    let (inputs, outputs) = args.split_at_mut(2);
    let x = inputs[0].device_f32().ok_or_else(|| bad_arg("saxpy", 0))?;
    let y = inputs[1].device_f32().ok_or_else(|| bad_arg("saxpy", 1))?;
    let out = outputs[0]
        .device_f32_mut()
        .ok_or_else(|| bad_arg("saxpy", 2))?;
    for i in 0..n.min(out.len()) {
        out[i] = a.mul_add(x[i], y[i]);
    }
    Ok(())
}

fn host_reduce_sum(geometry: &Geometry, args: &mut [HostArg]) -> Result<(), BackendError> {
    let n = len_of("reduce_sum", args, 3)?;
    let local = geometry.local_size(0);
    let (inputs, outputs) = args.split_at_mut(1);
    let input = inputs[0]
        .device_f32()
        .ok_or_else(|| bad_arg("reduce_sum", 0))?;
    let partial = outputs[0]
        .device_f32_mut()
        .ok_or_else(|| bad_arg("reduce_sum", 1))?;
    for (group, chunk) in input[..n.min(input.len())].chunks(local).enumerate() {
        if let Some(slot) = partial.get_mut(group) {
            *slot = chunk.iter().sum();
        }
    }
    Ok(())
}

/// The built-in workloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workload {
    VecAdd,
    Saxpy,
    ReduceSum,
}

impl Workload {
    pub const ALL: [Workload; 3] = [Workload::VecAdd, Workload::Saxpy, Workload::ReduceSum];

    /// Kernel entry point.
    pub fn name(&self) -> &'static str {
        match self {
            Self::VecAdd => "vecadd",
            Self::Saxpy => "saxpy",
            Self::ReduceSum => "reduce_sum",
        }
    }

    pub fn source(&self) -> &'static str {
        match self {
            Self::VecAdd => VECADD_SRC,
            Self::Saxpy => SAXPY_SRC,
            Self::ReduceSum => REDUCE_SUM_SRC,
        }
    }

    pub fn factory(&self) -> &'static dyn ArgumentFactory {
        match self {
            Self::VecAdd => &VecAdd,
            Self::Saxpy => &Saxpy,
            Self::ReduceSum => &ReduceSum,
        }
    }

    fn host_kernel(&self) -> crate::backend::HostKernelFn {
        match self {
            Self::VecAdd => host_vecadd,
            Self::Saxpy => host_saxpy,
            Self::ReduceSum => host_reduce_sum,
        }
    }
}

impl fmt::Display for Workload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Workload {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|w| w.name() == s)
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(Workload::name).collect();
                format!("unknown kernel '{s}' (available: {})", names.join(", "))
            })
    }
}

/// A host backend with every built-in workload registered.
pub fn host_backend() -> HostBackend {
    let mut backend = HostBackend::new();
    for workload in Workload::ALL {
        backend.register(workload.name(), workload.host_kernel());
    }
    backend
}
