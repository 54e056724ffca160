//! Human-readable rendering of byte sizes, durations and benchmark reports.
//!
//! Everything here is a pure function of its input so rendered reports can be
//! compared byte-for-byte.

use std::fmt::Write;

use crate::report::BenchmarkReport;

/// Width the data-size column is right-aligned to.
pub const DATASIZE_COLUMN: usize = 10;

// Largest byte counts still shown in KiB / MiB: the value at which one more
// unit step would round up to 1024.0 of the current unit.
const KIB_LIMIT: u64 = 0x0fff_cccc_cccc_cccc >> 40;
const MIB_LIMIT: u64 = 0x0fff_cccc_cccc_cccc >> 30;

/// Binary-unit byte size: `999 B`, `1.0 KiB`, `1.5 MiB`, `2.0 GiB`.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes <= KIB_LIMIT {
        format!("{:.1} KiB", bytes as f64 / 1024.0)
    } else if bytes <= MIB_LIMIT {
        format!("{:.1} MiB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GiB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Duration given in milliseconds, scaled to µs / ms / s / min / h with one decimal.
pub fn format_millis(ms: f64) -> String {
    let (value, unit) = if ms < 1.0 {
        (ms * 1000.0, "µs")
    } else if ms < 1000.0 {
        (ms, "ms")
    } else if ms < 60_000.0 {
        (ms / 1000.0, "s")
    } else if ms < 3_600_000.0 {
        (ms / 60_000.0, "min")
    } else {
        (ms / 3_600_000.0, "h")
    };
    format!("{value:.1} {unit}")
}

/// Text form of a report: one line per data size with its average, then the
/// wall-clock duration of the whole benchmark.
pub fn render_report(report: &BenchmarkReport) -> String {
    let mut out = String::with_capacity(64 + report.runs().len() * 96);

    // Writing into a String cannot fail.
    let _ = writeln!(out, "Benchmark {}-Kernel", report.kernel_name());
    let _ = writeln!(out, "  Datasize  Result (Average)");
    for run in report.runs() {
        let _ = writeln!(
            out,
            "{:>width$}: {}",
            format_bytes(run.data_size_bytes()),
            run.average(),
            width = DATASIZE_COLUMN
        );
    }
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Benchmark-Duration: {}",
        format_millis(report.total_wall_millis() as f64)
    );
    out
}
