//! Progress reporting, externalized behind a trait per the spec so the
//! CLI, a future TUI, or tests can each plug in their own sink without the
//! driver knowing which.

use tracing::debug;

pub trait ProgressReporter {
    fn start(&self, total: u64) -> Box<dyn Progress>;
}

pub trait Progress {
    fn inc(&mut self, n: u64);
    fn finish(&mut self);
}

/// Reports nothing. The default for non-interactive and test runs.
pub struct NullProgress;

impl ProgressReporter for NullProgress {
    fn start(&self, _total: u64) -> Box<dyn Progress> {
        Box::new(NullProgressHandle)
    }
}

struct NullProgressHandle;

impl Progress for NullProgressHandle {
    fn inc(&mut self, _n: u64) {}
    fn finish(&mut self) {}
}

/// Reports progress as `debug!` log lines roughly every 5% of `total`,
/// for headless runs that still want something in the log.
pub struct TracingProgress;

impl ProgressReporter for TracingProgress {
    fn start(&self, total: u64) -> Box<dyn Progress> {
        Box::new(TracingProgressHandle {
            total,
            done: 0,
            last_reported_pct: 0,
        })
    }
}

struct TracingProgressHandle {
    total: u64,
    done: u64,
    last_reported_pct: u64,
}

impl Progress for TracingProgressHandle {
    fn inc(&mut self, n: u64) {
        self.done += n;
        if self.total == 0 {
            return;
        }
        let pct = (self.done * 100 / self.total).min(100);
        if pct >= self.last_reported_pct + 5 {
            self.last_reported_pct = pct - (pct % 5);
            debug!(pct, done = self.done, total = self.total, "backup progress");
        }
    }

    fn finish(&mut self) {
        debug!(done = self.done, total = self.total, "backup progress complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_progress_does_nothing_observable() {
        let reporter = NullProgress;
        let mut progress = reporter.start(100);
        progress.inc(50);
        progress.finish();
    }

    #[test]
    fn tracing_progress_handles_zero_total() {
        let reporter = TracingProgress;
        let mut progress = reporter.start(0);
        progress.inc(0);
        progress.finish();
    }
}
