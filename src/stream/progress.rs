//! Progress reporting for inspection runs
//!
//! The orchestrator reports through [`InspectProgress`]. With the `progress-bar` feature,
//! [`ProgressBarReporter`] renders the same callbacks as a terminal spinner using `indicatif`.

use serde::{Deserialize, Serialize};

use crate::models::CountPrecision;

use super::error::StreamError;

/// A count qualified by its precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimatedCount {
    pub count: u64,
    pub precision: CountPrecision,
}

/// Running statistics of one inspection run
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStats {
    pub stream_set_slug: String,
    /// Name of the stream being read, if any
    pub current_stream: Option<String>,
    pub streams_completed: u64,
    pub expected_streams: Option<u64>,
    pub bytes_processed: u64,
    pub expected_total_raw_bytes: Option<u64>,
    pub records_counted: u64,
    pub records_inspected: u64,
    pub expected_record_count: Option<u64>,
    pub records_per_second: f64,
    pub seconds_elapsed: f64,
    /// False once the inspect ceiling was passed and records are only counted
    pub inspecting: bool,
    pub record_count_precision: CountPrecision,
    pub estimated_total_records: EstimatedCount,
}

impl StreamStats {
    pub fn new(stream_set_slug: impl Into<String>) -> Self {
        Self {
            stream_set_slug: stream_set_slug.into(),
            inspecting: true,
            ..Default::default()
        }
    }

    /// Best available estimate of the total number of records in the stream set
    ///
    /// Exact counts are returned as is. A truncated count is replaced by the source's
    /// expected count, or extrapolated from the share of raw bytes read so far.
    pub fn estimate_total(&self) -> EstimatedCount {
        if self.record_count_precision == CountPrecision::Exact {
            return EstimatedCount {
                count: self.records_counted,
                precision: CountPrecision::Exact,
            };
        }

        if let Some(expected) = self.expected_record_count {
            return EstimatedCount {
                count: expected.max(self.records_counted),
                precision: CountPrecision::Approximate,
            };
        }

        match self.expected_total_raw_bytes {
            Some(total) if self.bytes_processed > 0 && total >= self.bytes_processed => {
                let ratio = total as f64 / self.bytes_processed as f64;
                EstimatedCount {
                    count: (self.records_counted as f64 * ratio).round() as u64,
                    precision: CountPrecision::Approximate,
                }
            }
            _ => EstimatedCount {
                count: self.records_counted,
                precision: CountPrecision::GreaterThan,
            },
        }
    }

    /// Recompute throughput from the elapsed wall time
    pub(crate) fn update_rate(&mut self, seconds_elapsed: f64) {
        self.seconds_elapsed = seconds_elapsed;
        self.records_per_second = if seconds_elapsed > 0.0 {
            self.records_counted as f64 / seconds_elapsed
        } else {
            0.0
        };
    }
}

/// Callbacks invoked during an inspection run
///
/// All methods default to no-ops.
pub trait InspectProgress: Send {
    /// A stream was opened
    fn on_start(&mut self, _stream_name: &str) {}

    /// Periodic report from the progress ticker
    fn on_progress(&mut self, _stats: &StreamStats) {}

    fn on_complete(&mut self, _stats: &StreamStats) {}

    fn on_error(&mut self, _error: &StreamError) {}
}

/// Progress sink that ignores every report
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl InspectProgress for NoProgress {}

#[cfg(feature = "progress-bar")]
pub use bar::ProgressBarReporter;

#[cfg(feature = "progress-bar")]
mod bar {
    use std::time::Duration;

    use indicatif::{ProgressBar, ProgressStyle};

    use super::{InspectProgress, StreamError, StreamStats, format_bytes, format_number};

    /// Terminal spinner for inspection runs
    pub struct ProgressBarReporter {
        bar: ProgressBar,
    }

    impl ProgressBarReporter {
        pub fn new() -> Self {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar.enable_steady_tick(Duration::from_millis(100));
            Self { bar }
        }
    }

    impl Default for ProgressBarReporter {
        fn default() -> Self {
            Self::new()
        }
    }

    impl InspectProgress for ProgressBarReporter {
        fn on_start(&mut self, stream_name: &str) {
            self.bar.set_message(format!("Reading {stream_name}"));
        }

        fn on_progress(&mut self, stats: &StreamStats) {
            let mode = if stats.inspecting { "inspected" } else { "counted" };
            self.bar.set_message(format!(
                "{} records {mode}, {} read ({:.0} records/s)",
                format_number(stats.records_counted),
                format_bytes(stats.bytes_processed),
                stats.records_per_second
            ));
        }

        fn on_complete(&mut self, stats: &StreamStats) {
            self.bar.finish_with_message(format!(
                "✓ {} records in {} streams",
                format_number(stats.records_counted),
                stats.streams_completed
            ));
        }

        fn on_error(&mut self, error: &StreamError) {
            self.bar.abandon_with_message(format!("✗ {error}"));
        }
    }
}

/// Format a number with thousand separators
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if bytes >= TB {
        format!("{:.2} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
