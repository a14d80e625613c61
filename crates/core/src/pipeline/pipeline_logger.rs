use std::collections::BTreeMap;
use std::time::Instant;

/// Cross-cutting logger for pipeline orchestration events.
///
/// Keeps the use case independent of where diagnostics go (log crate,
/// terminal, nowhere).
pub trait PipelineLogger: Send {
    /// Faces classified so far out of the located total.
    fn progress(&mut self, current: usize, total: usize);

    /// How long a named stage took for one unit of work.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// A point-in-time metric (e.g. faces located).
    fn metric(&mut self, name: &str, value: f64);

    fn info(&mut self, message: &str);

    /// Emit an end-of-run summary. Default: no-op.
    fn summary(&mut self) {}
}

/// Discards everything. Used by tests and embedders with their own reporting.
pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn progress(&mut self, _current: usize, _total: usize) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn info(&mut self, _message: &str) {}
}

/// Collects per-stage timings and metrics for one run and reports them
/// through the `log` crate.
pub struct LogPipelineLogger {
    timings: BTreeMap<String, Vec<f64>>,
    metrics: BTreeMap<String, Vec<f64>>,
    started: Instant,
    faces: usize,
}

impl LogPipelineLogger {
    pub fn new() -> Self {
        Self {
            timings: BTreeMap::new(),
            metrics: BTreeMap::new(),
            started: Instant::now(),
            faces: 0,
        }
    }

    /// Formatted report, or `None` if nothing was recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() && self.metrics.is_empty() {
            return None;
        }

        let elapsed_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        let mut lines = vec![format!(
            "Run summary ({} faces, {:.2}s wall):",
            self.faces,
            elapsed_ms / 1000.0
        )];

        for (stage, durations) in &self.timings {
            let total_ms: f64 = durations.iter().sum();
            let avg_ms = total_ms / durations.len().max(1) as f64;
            lines.push(format!(
                "  {stage:10}: {n} call(s), avg {avg_ms:6.1}ms, total {total_ms:7.1}ms",
                n = durations.len()
            ));
        }

        for (name, values) in &self.metrics {
            let last = values.last().copied().unwrap_or_default();
            lines.push(format!("  {name}: {last}"));
        }

        Some(lines.join("\n"))
    }
}

impl Default for LogPipelineLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineLogger for LogPipelineLogger {
    fn progress(&mut self, current: usize, total: usize) {
        self.faces = total;
        log::debug!("Classified {current}/{total} faces");
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics.entry(name.to_string()).or_default().push(value);
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    /// Logs the report and starts a fresh one for the next run.
    fn summary(&mut self) {
        if let Some(text) = self.summary_string() {
            log::info!("{text}");
        }
        *self = Self::new();
    }
}
