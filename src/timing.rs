//! Per-launch timing breakdown and the iteration timeout policy.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;
use crate::format::format_millis;

/// Durations of one kernel execution, in milliseconds.
///
/// `total` covers upload, launch and download plus the gaps between them, so it is
/// normally not smaller than any single component. That is trusted from the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct KernelTime {
    upload: f64,
    download: f64,
    launch: f64,
    total: f64,
}

impl KernelTime {
    pub const ZERO: KernelTime = KernelTime {
        upload: 0.0,
        download: 0.0,
        launch: 0.0,
        total: 0.0,
    };

    pub fn new(upload: f64, download: f64, launch: f64, total: f64) -> Self {
        Self {
            upload,
            download,
            launch,
            total,
        }
    }

    pub fn upload(&self) -> f64 {
        self.upload
    }

    pub fn download(&self) -> f64 {
        self.download
    }

    pub fn launch(&self) -> f64 {
        self.launch
    }

    pub fn total(&self) -> f64 {
        self.total
    }
}

impl fmt::Display for KernelTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "upload {} | download {} | launch {} | total {}",
            format_millis(self.upload),
            format_millis(self.download),
            format_millis(self.launch),
            format_millis(self.total)
        )
    }
}

/// Early-exit threshold for a bounded-iteration run.
///
/// Only the first iteration is inspected: if its total duration exceeds the
/// threshold, the run stops after that single sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeout {
    seconds: f64,
}

impl Timeout {
    /// Zero seconds: every requested iteration runs.
    pub const DISABLED: Timeout = Timeout { seconds: 0.0 };

    pub fn from_secs_f64(seconds: f64) -> Result<Self, ValidationError> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(ValidationError::InvalidTimeout(seconds));
        }
        Ok(Self { seconds })
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.seconds
    }

    pub fn is_disabled(&self) -> bool {
        self.seconds == 0.0
    }

    /// Whether a run whose first sample is `first` should stop there.
    pub fn curtails(&self, first: &KernelTime) -> bool {
        !self.is_disabled() && first.total() > self.seconds * 1000.0
    }
}
