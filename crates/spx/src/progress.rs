//! 📊 progress.rs — "Are we there yet?" The spooler's answer is always "define there".
//!
//! A bucket has no total size we could know up front (objects keep arriving), so there is
//! no percent and no ETA. There is a spinner, a sliding-window rate, and a comfy table with
//! records, bytes, objects, and routed failures. At the end, one last table for the log.
//!
//! 🦆 The duck is counted as zero objects. The duck is a directory marker.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use indicatif::{ProgressBar, ProgressStyle};

use crate::producer::ProduceOutcome;

const MIB: u64 = 1024 * 1024;
const RATE_WINDOW: Duration = Duration::from_secs(5);

fn format_bytes(bytes: u64) -> String {
    if bytes >= MIB {
        format!("{:.2} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= 1024 {
        format!("{:.2} KiB", bytes as f64 / 1024.0)
    } else {
        format!("{} bytes", bytes)
    }
}

/// 🔢 "1000000" → "1,000,000".
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// ⏱️ MM:SS, or HH:MM:SS for the long hauls.
fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

struct Rates {
    records_per_sec: f64,
    mib_per_sec: f64,
}

/// 🧮 Running totals of a spool run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpoolTotals {
    pub cycles: u64,
    pub records: u64,
    pub bytes: u64,
    /// 📁 Objects whose post-processing action completed (success or error routing).
    pub objects: u64,
    pub failures: u64,
}

impl SpoolTotals {
    pub fn absorb(&mut self, outcome: &ProduceOutcome) {
        self.cycles += 1;
        self.records += outcome.records.len() as u64;
        self.bytes += outcome.records.total_bytes();
        self.objects += outcome.post_processed.len() as u64;
        self.failures += outcome.failures.len() as u64;
    }
}

/// 📊 Spinner plus a sliding 5-second rate window. Draws to stderr, never to stdout.
pub struct ProgressMetrics {
    source_name: String,
    totals: SpoolTotals,
    progress_bar: ProgressBar,
    rate_samples: VecDeque<(Instant, u64, u64)>,
    start_time: Instant,
}

impl std::fmt::Debug for ProgressMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- ProgressBar does not derive Debug
        f.debug_struct("ProgressMetrics")
            .field("source_name", &self.source_name)
            .field("totals", &self.totals)
            .finish()
    }
}

impl ProgressMetrics {
    pub fn new(source_name: String) -> Self {
        Self::with_bar(source_name, ProgressBar::new_spinner())
    }

    /// 🙈 Same bookkeeping, nothing drawn. For tests and non-interactive runs.
    pub fn hidden(source_name: String) -> Self {
        Self::with_bar(source_name, ProgressBar::hidden())
    }

    fn with_bar(source_name: String, progress_bar: ProgressBar) -> Self {
        let the_style = ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        progress_bar.set_style(the_style);

        let start_time = Instant::now();
        let mut rate_samples = VecDeque::new();
        rate_samples.push_back((start_time, 0u64, 0u64));

        Self {
            source_name,
            totals: SpoolTotals::default(),
            progress_bar,
            rate_samples,
            start_time,
        }
    }

    pub fn totals(&self) -> SpoolTotals {
        self.totals
    }

    /// 🔄 Fold one produce cycle into the totals and redraw.
    pub fn update(&mut self, outcome: &ProduceOutcome) {
        self.totals.absorb(outcome);
        let rates = self.calculate_rates();
        self.progress_bar.set_message(self.render(Some(rates)));
        self.progress_bar.tick();
    }

    /// ✅ Stop the spinner and return the final summary table.
    pub fn finish(&self) -> String {
        self.progress_bar.finish_and_clear();
        self.render(None)
    }

    fn calculate_rates(&mut self) -> Rates {
        let now = Instant::now();
        while let Some(&(timestamp, _, _)) = self.rate_samples.front() {
            if now.duration_since(timestamp) > RATE_WINDOW {
                self.rate_samples.pop_front();
            } else {
                break;
            }
        }
        self.rate_samples
            .push_back((now, self.totals.bytes, self.totals.records));

        if let Some(&(oldest_time, oldest_bytes, oldest_records)) = self.rate_samples.front() {
            let elapsed = now.duration_since(oldest_time).as_secs_f64();
            if elapsed > 0.0 {
                let bytes_delta = self.totals.bytes.saturating_sub(oldest_bytes);
                let records_delta = self.totals.records.saturating_sub(oldest_records);
                return Rates {
                    records_per_sec: records_delta as f64 / elapsed,
                    mib_per_sec: (bytes_delta as f64 / elapsed) / MIB as f64,
                };
            }
        }
        Rates {
            records_per_sec: 0.0,
            mib_per_sec: 0.0,
        }
    }

    /// 🎨 Two right-aligned columns, no borders. Rates are left out of the final summary.
    fn render(&self, rates: Option<Rates>) -> String {
        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);

        let right = |s: String| Cell::new(s).set_alignment(CellAlignment::Right);

        let (records_rate, bytes_rate) = match rates {
            Some(r) => (
                format!("{} Records/s", format_number(r.records_per_sec as u64)),
                format!("{:.2} MiB/s", r.mib_per_sec),
            ),
            None => (String::new(), String::new()),
        };
        table.add_row(vec![
            right(records_rate),
            right(format!("{} Records", format_number(self.totals.records))),
        ]);
        table.add_row(vec![right(bytes_rate), right(format_bytes(self.totals.bytes))]);
        table.add_row(vec![
            right(format!("{} Objects done", format_number(self.totals.objects))),
            right(format!("{} Failures", format_number(self.totals.failures))),
        ]);
        table.add_row(vec![
            right(format!("{} Cycles", format_number(self.totals.cycles))),
            right(format!("{} elapsed", format_duration(self.start_time.elapsed()))),
        ]);

        format!("source: {}\n{}", self.source_name, table)
    }
}
