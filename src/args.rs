//! Kernel arguments: host-side descriptions, device handles and the per-size factory.
//!
//! A benchmark describes its arguments with [`KernelArg`] values; the backend turns
//! each into a device handle ([`DeviceArg`]) and the orchestrator holds those in an
//! [`ArgumentSet`] for exactly one data size. Dropping or disposing the set releases
//! every handle once.

use serde::{Deserialize, Serialize};

use crate::geometry::Geometry;

/// Typed host buffer contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArgData {
    F32(Vec<f32>),
    I32(Vec<i32>),
    F64(Vec<f64>),
    Bool(Vec<bool>),
}

impl ArgData {
    pub fn len(&self) -> usize {
        match self {
            Self::F32(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::F64(v) => v.len(),
            Self::Bool(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn byte_len(&self) -> usize {
        match self {
            Self::F32(v) => std::mem::size_of_val(v.as_slice()),
            Self::I32(v) => std::mem::size_of_val(v.as_slice()),
            Self::F64(v) => std::mem::size_of_val(v.as_slice()),
            Self::Bool(v) => std::mem::size_of_val(v.as_slice()),
        }
    }

    /// Raw little-endian bytes, as uploaded to a device buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::F32(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Self::I32(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Self::F64(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Self::Bool(v) => v.iter().map(|&b| u8::from(b)).collect(),
        }
    }
}

/// Host-side description of one kernel argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KernelArg {
    /// Global buffer initialised from host data.
    Input(ArgData),
    /// Zero-initialised global buffer, read back after each launch.
    Output { bytes: usize },
    /// Work-group local scratch memory.
    Local { bytes: usize },
    /// Scalar passed by value.
    Value(ArgData),
}

impl KernelArg {
    pub fn input_f32(data: Vec<f32>) -> Self {
        Self::Input(ArgData::F32(data))
    }

    pub fn input_i32(data: Vec<i32>) -> Self {
        Self::Input(ArgData::I32(data))
    }

    pub fn input_f64(data: Vec<f64>) -> Self {
        Self::Input(ArgData::F64(data))
    }

    pub fn input_bool(data: Vec<bool>) -> Self {
        Self::Input(ArgData::Bool(data))
    }

    pub fn output_f32(len: usize) -> Self {
        Self::Output {
            bytes: len * std::mem::size_of::<f32>(),
        }
    }

    pub fn local_f32(len: usize) -> Self {
        Self::Local {
            bytes: len * std::mem::size_of::<f32>(),
        }
    }

    pub fn value_f32(value: f32) -> Self {
        Self::Value(ArgData::F32(vec![value]))
    }

    pub fn value_i32(value: i32) -> Self {
        Self::Value(ArgData::I32(vec![value]))
    }

    pub fn byte_len(&self) -> usize {
        match self {
            Self::Input(data) | Self::Value(data) => data.byte_len(),
            Self::Output { bytes } | Self::Local { bytes } => *bytes,
        }
    }
}

/// A backend-owned argument handle.
pub trait DeviceArg {
    /// Size of the device allocation backing this argument.
    fn byte_len(&self) -> usize;

    /// Reset output contents before an iteration. Inputs keep their data.
    fn clear(&mut self);

    /// Free the device resources. Must tolerate being called more than once.
    fn release(&mut self);
}

/// Argument handles for one (kernel, data length) pair.
///
/// Released exactly once, either through [`ArgumentSet::dispose`] or on drop.
#[derive(Debug)]
pub struct ArgumentSet<A: DeviceArg> {
    args: Vec<A>,
    disposed: bool,
}

impl<A: DeviceArg> ArgumentSet<A> {
    pub fn new(args: Vec<A>) -> Self {
        Self {
            args,
            disposed: false,
        }
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn byte_len(&self) -> usize {
        self.args.iter().map(DeviceArg::byte_len).sum()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn as_mut_slice(&mut self) -> &mut [A] {
        &mut self.args
    }

    pub fn iter(&self) -> impl Iterator<Item = &A> {
        self.args.iter()
    }

    pub(crate) fn push(&mut self, arg: A) {
        self.args.push(arg);
    }

    /// Release every handle. Later calls are no-ops.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        for arg in &mut self.args {
            arg.release();
        }
        self.disposed = true;
    }
}

impl<A: DeviceArg> Drop for ArgumentSet<A> {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Per-benchmark description of how a byte size maps to data, geometry and arguments.
///
/// Only dimension 0 is required; dimensions 1 and 2 default to a size of 1.
pub trait ArgumentFactory {
    /// Number of elements for a data size given in bytes.
    fn data_length(&self, data_size_bytes: u64) -> usize;

    fn local_x(&self, data_length: usize) -> usize;

    fn local_y(&self, _data_length: usize) -> usize {
        1
    }

    fn local_z(&self, _data_length: usize) -> usize {
        1
    }

    fn global_x(&self, data_length: usize) -> usize;

    fn global_y(&self, _data_length: usize) -> usize {
        1
    }

    fn global_z(&self, _data_length: usize) -> usize {
        1
    }

    /// Arguments in the order the kernel declares its parameters.
    fn create_arguments(&self, data_length: usize) -> Vec<KernelArg>;

    /// Local size of `dim` (0..=2); dimensions past 2 are 1.
    fn local_size(&self, dim: usize, data_length: usize) -> usize {
        match dim {
            0 => self.local_x(data_length),
            1 => self.local_y(data_length),
            2 => self.local_z(data_length),
            _ => 1,
        }
    }

    /// Global size of `dim` (0..=2); dimensions past 2 are 1.
    fn global_size(&self, dim: usize, data_length: usize) -> usize {
        match dim {
            0 => self.global_x(data_length),
            1 => self.global_y(data_length),
            2 => self.global_z(data_length),
            _ => 1,
        }
    }

    fn geometry(&self, data_length: usize) -> Geometry {
        Geometry::new(
            [
                self.local_size(0, data_length),
                self.local_size(1, data_length),
                self.local_size(2, data_length),
            ],
            [
                self.global_size(0, data_length),
                self.global_size(1, data_length),
                self.global_size(2, data_length),
            ],
        )
    }
}
