//! Property-based tests for the benchmark loop and aggregation.
//!
//! Key invariants:
//! - One run per requested size, in request order
//! - Without a timeout every run holds exactly `iterations` samples
//! - Every argument handle is released exactly once
//! - A run's average lies between its fastest and slowest sample

mod common;

use common::{constant, ScriptedBackend, ThreeArgs, SOURCE};
use proptest::prelude::*;
use rusty_executor::format::format_bytes;
use rusty_executor::{average, run_benchmark, BenchmarkRequest, KernelTime, Session, SessionConfig};

fn totals(range: std::ops::Range<f64>) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(range, 1..32)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn sweep_shape_follows_request(
        sizes in prop::collection::vec(1u64..=65_536, 1..6),
        iterations in 1u32..8,
    ) {
        let backend = ScriptedBackend::default();
        let counters = backend.counters.clone();
        let mut session = Session::open(backend, SessionConfig::default()).unwrap();
        let request = BenchmarkRequest::new(SOURCE, "scripted")
            .iterations(iterations)
            .data_sizes(sizes.iter().copied());

        let report = run_benchmark(&mut session, &request, &ThreeArgs).unwrap();

        prop_assert_eq!(report.data_sizes(), sizes.clone());
        for run in report.runs() {
            prop_assert_eq!(run.samples().len(), iterations as usize);
        }
        prop_assert_eq!(counters.created(), 3 * sizes.len());
        prop_assert_eq!(counters.released(), counters.created());
        prop_assert_eq!(counters.live(), 0);
    }

    #[test]
    fn average_is_bounded_by_samples(values in totals(0.001..10_000.0)) {
        let samples: Vec<KernelTime> = values.iter().map(|&t| constant(t)).collect();
        let avg = average(&samples).unwrap();

        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let tolerance = 1e-9 * max;
        prop_assert!(avg.total() >= min - tolerance);
        prop_assert!(avg.total() <= max + tolerance);

        let mean = values.iter().sum::<f64>() / values.len() as f64;
        prop_assert!((avg.total() - mean).abs() <= tolerance);
        prop_assert!((avg.launch() - mean / 2.0).abs() <= tolerance);
    }

    #[test]
    fn byte_labels_use_one_unit(bytes in any::<u64>()) {
        let label = format_bytes(bytes);
        let unit = label.rsplit(' ').next().unwrap_or_default();
        prop_assert!(matches!(unit, "B" | "KiB" | "MiB" | "GiB"), "label {}", label);
        if bytes < 1024 {
            prop_assert_eq!(label, format!("{bytes} B"));
        } else {
            prop_assert!(label.contains('.'));
        }
    }
}
