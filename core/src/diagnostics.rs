//! Timing and message collection for build, store and query operations.
//!
//! A [`Diagnostics`] value is created by the caller and passed by reference
//! into every operation that wants to report. It is `Send + Sync`, so
//! concurrent queries may share one.

use parking_lot::Mutex;
use serde::Serialize;
use std::fmt::Write as _;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimingEntry {
    pub task: String,
    pub total: Duration,
    pub calls: u32,
}

#[derive(Debug)]
pub struct Diagnostics {
    started: Instant,
    timings: Mutex<Vec<TimingEntry>>,
    notes: Mutex<Vec<String>>,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl Diagnostics {
    pub fn new() -> Self {
        Self { started: Instant::now(), timings: Mutex::new(Vec::new()), notes: Mutex::new(Vec::new()) }
    }

    /// Start timing `task`; the elapsed time is recorded when the guard drops.
    pub fn timer<'a>(&'a self, task: &str) -> Timer<'a> {
        Timer { diagnostics: self, task: task.to_string(), start: Instant::now() }
    }

    pub fn record(&self, task: &str, elapsed: Duration) {
        tracing::debug!(task, elapsed_s = elapsed.as_secs_f64(), "timing");
        let mut timings = self.timings.lock();
        match timings.iter_mut().find(|t| t.task == task) {
            Some(entry) => {
                entry.total += elapsed;
                entry.calls += 1;
            }
            None => timings.push(TimingEntry { task: task.to_string(), total: elapsed, calls: 1 }),
        }
    }

    pub fn note(&self, message: impl Into<String>) {
        self.notes.lock().push(message.into());
    }

    pub fn notes(&self) -> Vec<String> {
        self.notes.lock().clone()
    }

    pub fn timings(&self) -> Vec<TimingEntry> {
        self.timings.lock().clone()
    }

    pub fn timing(&self, task: &str) -> Option<TimingEntry> {
        self.timings.lock().iter().find(|t| t.task == task).cloned()
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Plain-text report: message log, timing breakdown, totals.
    pub fn report(&self) -> String {
        let mut out = String::new();
        out.push_str("=== Message Log ===\n");
        for note in self.notes.lock().iter() {
            let _ = writeln!(out, "{note}");
        }
        out.push_str("\n=== Timing Breakdown ===\n");
        let timings = self.timings.lock();
        let mut tracked = Duration::ZERO;
        for t in timings.iter() {
            tracked += t.total;
            if t.calls > 1 {
                let _ = writeln!(out, "{}: {:.4}s ({} calls)", t.task, t.total.as_secs_f64(), t.calls);
            } else {
                let _ = writeln!(out, "{}: {:.4}s", t.task, t.total.as_secs_f64());
            }
        }
        let _ = writeln!(out, "\nTracked Operations Total: {:.4}s", tracked.as_secs_f64());
        let _ = writeln!(out, "Global Execution Time: {:.4}s", self.elapsed().as_secs_f64());
        out
    }
}

/// RAII guard returned by [`Diagnostics::timer`].
pub struct Timer<'a> {
    diagnostics: &'a Diagnostics,
    task: String,
    start: Instant,
}

impl Timer<'_> {
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer<'_> {
    fn drop(&mut self) {
        self.diagnostics.record(&self.task, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_tasks_accumulate() {
        let d = Diagnostics::new();
        {
            let _t = d.timer("Single Query");
        }
        {
            let _t = d.timer("Single Query");
        }
        d.note("index loaded");
        let entry = d.timing("Single Query").unwrap();
        assert_eq!(entry.calls, 2);
        let report = d.report();
        assert!(report.contains("index loaded"));
        assert!(report.contains("Single Query"));
        assert!(report.contains("(2 calls)"));
    }
}
