//! Launch geometry: work-group (local) and total work-item (global) sizes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Local and global sizes for dimensions 0..=2.
///
/// Unused dimensions are 1. Whether each local size divides its global size is
/// checked by the backend at launch, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Geometry {
    local: [usize; 3],
    global: [usize; 3],
}

impl Geometry {
    pub fn new(local: [usize; 3], global: [usize; 3]) -> Self {
        Self { local, global }
    }

    pub fn one_d(local: usize, global: usize) -> Self {
        Self::new([local, 1, 1], [global, 1, 1])
    }

    pub fn two_d(local: (usize, usize), global: (usize, usize)) -> Self {
        Self::new([local.0, local.1, 1], [global.0, global.1, 1])
    }

    pub fn local(&self) -> [usize; 3] {
        self.local
    }

    pub fn global(&self) -> [usize; 3] {
        self.global
    }

    /// Local size in `dim`; 1 beyond the third dimension.
    pub fn local_size(&self, dim: usize) -> usize {
        self.local.get(dim).copied().unwrap_or(1)
    }

    /// Global size in `dim`; 1 beyond the third dimension.
    pub fn global_size(&self, dim: usize) -> usize {
        self.global.get(dim).copied().unwrap_or(1)
    }

    /// Total number of work items.
    pub fn work_items(&self) -> usize {
        self.global.iter().product()
    }

    /// Work items per work group.
    pub fn work_group_size(&self) -> usize {
        self.local.iter().product()
    }

    /// Number of work groups, rounding partial groups up.
    pub fn work_groups(&self) -> usize {
        self.global
            .iter()
            .zip(self.local.iter())
            .map(|(&g, &l)| g.div_ceil(l.max(1)))
            .product()
    }

    /// Every local size is positive and divides its global size.
    pub fn is_uniform(&self) -> bool {
        self.global
            .iter()
            .zip(self.local.iter())
            .all(|(&g, &l)| l > 0 && g > 0 && g % l == 0)
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self::new([1, 1, 1], [1, 1, 1])
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [g0, g1, g2] = self.global;
        let [l0, l1, l2] = self.local;
        write!(f, "global [{g0}, {g1}, {g2}] / local [{l0}, {l1}, {l2}]")
    }
}
