//! Golden output of the text report.

use rusty_executor::format::format_bytes;
use rusty_executor::{BenchmarkReport, BenchmarkRun, Geometry, KernelTime};

fn run(bytes: u64, sample: KernelTime) -> BenchmarkRun {
    let n = (bytes / 4) as usize;
    BenchmarkRun::new(bytes, n, Geometry::one_d(64, n), vec![sample]).unwrap()
}

#[test]
fn report_matches_golden_text() {
    let report = BenchmarkReport::new(
        "vecadd",
        1,
        vec![
            run(1024, KernelTime::new(1.5, 0.5, 3.0, 5.0)),
            run(4096, KernelTime::new(2.0, 1.0, 4.0, 8.0)),
        ],
        1500,
    );

    let expected = "\
Benchmark vecadd-Kernel
  Datasize  Result (Average)
   1.0 KiB: upload 1.5 ms | download 500.0 µs | launch 3.0 ms | total 5.0 ms
   4.0 KiB: upload 2.0 ms | download 1.0 ms | launch 4.0 ms | total 8.0 ms

Benchmark-Duration: 1.5 s
";
    assert_eq!(report.to_string(), expected);
}

#[test]
fn averages_are_what_gets_printed() {
    let samples = vec![
        KernelTime::new(1.0, 1.0, 2.0, 4.0),
        KernelTime::new(3.0, 3.0, 6.0, 12.0),
    ];
    let run = BenchmarkRun::new(2 << 20, 1 << 19, Geometry::one_d(256, 1 << 19), samples).unwrap();
    let report = BenchmarkReport::new("saxpy", 2, vec![run], 90_000);

    let text = report.to_string();
    assert!(text.contains(
        "   2.0 MiB: upload 2.0 ms | download 2.0 ms | launch 4.0 ms | total 8.0 ms\n"
    ));
    assert!(text.ends_with("\nBenchmark-Duration: 1.5 min\n"));
}

#[test]
fn datasize_column_is_right_aligned() {
    let report = BenchmarkReport::new(
        "k",
        1,
        vec![run(999, KernelTime::ZERO), run(3 << 30, KernelTime::ZERO)],
        0,
    );
    let text = report.to_string();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines[2],
        "     999 B: upload 0.0 µs | download 0.0 µs | launch 0.0 µs | total 0.0 µs"
    );
    assert!(lines[3].starts_with("   3.0 GiB: "));
    assert_eq!(lines[5], "Benchmark-Duration: 0.0 µs");
}

#[test]
fn empty_report_still_prints_header_and_duration() {
    let report = BenchmarkReport::new("empty", 3, Vec::new(), 42);
    assert_eq!(
        report.to_string(),
        "Benchmark empty-Kernel\n  Datasize  Result (Average)\n\nBenchmark-Duration: 42.0 ms\n"
    );
}

#[test]
fn byte_unit_boundaries() {
    assert_eq!(format_bytes(1_048_524), "1023.9 KiB");
    assert_eq!(format_bytes(1_048_525), "1.0 MiB");
    assert_eq!(format_bytes(1_073_689_395), "1023.9 MiB");
    assert_eq!(format_bytes(1_073_689_396), "1.0 GiB");
}
