//! Benchmark results and their aggregation.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;
use crate::format::render_report;
use crate::geometry::Geometry;
use crate::timing::KernelTime;

/// Component-wise arithmetic mean over the samples present.
///
/// `None` for an empty slice. A single sample is returned unchanged.
pub fn average(samples: &[KernelTime]) -> Option<KernelTime> {
    if samples.is_empty() {
        return None;
    }
    let n = samples.len() as f64;
    let (upload, download, launch, total) = samples.iter().fold(
        (0.0, 0.0, 0.0, 0.0),
        |(u, d, l, t), s| (u + s.upload(), d + s.download(), l + s.launch(), t + s.total()),
    );
    Some(KernelTime::new(upload / n, download / n, launch / n, total / n))
}

fn median(mut values: Vec<f64>) -> f64 {
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Measurements for one data size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkRun {
    data_size_bytes: u64,
    data_length: usize,
    geometry: Geometry,
    samples: Vec<KernelTime>,
    average: KernelTime,
}

impl BenchmarkRun {
    /// `None` when `samples` is empty.
    pub fn new(
        data_size_bytes: u64,
        data_length: usize,
        geometry: Geometry,
        samples: Vec<KernelTime>,
    ) -> Option<Self> {
        let average = average(&samples)?;
        Some(Self {
            data_size_bytes,
            data_length,
            geometry,
            samples,
            average,
        })
    }

    pub fn data_size_bytes(&self) -> u64 {
        self.data_size_bytes
    }

    pub fn data_length(&self) -> usize {
        self.data_length
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Raw samples in execution order.
    pub fn samples(&self) -> &[KernelTime] {
        &self.samples
    }

    pub fn average(&self) -> &KernelTime {
        &self.average
    }

    pub fn median_total(&self) -> f64 {
        median(self.samples.iter().map(KernelTime::total).collect())
    }

    pub fn median_launch(&self) -> f64 {
        median(self.samples.iter().map(KernelTime::launch).collect())
    }

    pub fn min_total(&self) -> f64 {
        self.samples
            .iter()
            .map(KernelTime::total)
            .fold(f64::INFINITY, f64::min)
    }

    pub fn max_total(&self) -> f64 {
        self.samples
            .iter()
            .map(KernelTime::total)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Fewer samples than requested, i.e. the timeout cut the run short.
    pub fn was_curtailed(&self, requested_iterations: u32) -> bool {
        self.samples.len() < requested_iterations as usize
    }
}

/// Result of a sweep over data sizes for one kernel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkReport {
    kernel_name: String,
    requested_iterations: u32,
    runs: Vec<BenchmarkRun>,
    total_wall_millis: u64,
}

impl BenchmarkReport {
    pub fn new(
        kernel_name: impl Into<String>,
        requested_iterations: u32,
        runs: Vec<BenchmarkRun>,
        total_wall_millis: u64,
    ) -> Self {
        Self {
            kernel_name: kernel_name.into(),
            requested_iterations,
            runs,
            total_wall_millis,
        }
    }

    pub fn kernel_name(&self) -> &str {
        &self.kernel_name
    }

    pub fn requested_iterations(&self) -> u32 {
        self.requested_iterations
    }

    /// One run per requested data size, in request order.
    pub fn runs(&self) -> &[BenchmarkRun] {
        &self.runs
    }

    pub fn data_sizes(&self) -> Vec<u64> {
        self.runs
            .iter()
            .map(BenchmarkRun::data_size_bytes)
            .collect()
    }

    /// Raw samples of the run at `index`.
    pub fn samples(&self, index: usize) -> Option<&[KernelTime]> {
        self.runs.get(index).map(BenchmarkRun::samples)
    }

    pub fn averages(&self) -> Vec<KernelTime> {
        self.runs.iter().map(|run| *run.average()).collect()
    }

    /// Wall-clock duration of the whole benchmark, compilation included.
    pub fn total_wall_millis(&self) -> u64 {
        self.total_wall_millis
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for BenchmarkReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render_report(self))
    }
}
