//! Progress reporting for long running stages.
//!
//! Stages report `(fraction, message)` pairs through a [`ProgressSink`]; the
//! fraction restarts at `0.0` at the beginning of each stage and grows
//! monotonically up to `1.0`.

/// Receives progress updates from the pipeline.
///
/// Any `Fn(f64, &str)` closure is a sink:
///
/// ```
/// use kit_data_merger::ProgressSink;
/// use std::sync::Mutex;
///
/// let seen = Mutex::new(Vec::new());
/// let sink = |fraction: f64, _message: &str| seen.lock().unwrap().push(fraction);
/// sink.report(0.5, "Filtering data...");
/// assert_eq!(*seen.lock().unwrap(), vec![0.5]);
/// ```
pub trait ProgressSink: Send + Sync {
    fn report(&self, fraction: f64, message: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(f64, &str) + Send + Sync,
{
    fn report(&self, fraction: f64, message: &str) {
        self(fraction, message)
    }
}

/// A sink that drops every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentProgress;

impl ProgressSink for SilentProgress {
    fn report(&self, _fraction: f64, _message: &str) {}
}

/// Counts finished units of work for one stage and forwards the fraction.
pub(crate) struct StageProgress<'a> {
    sink: &'a dyn ProgressSink,
    message: &'static str,
    done: usize,
    total: usize,
}

impl<'a> StageProgress<'a> {
    /// Starts a stage, reporting `0.0` immediately.
    pub fn start(sink: &'a dyn ProgressSink, message: &'static str, total: usize) -> Self {
        sink.report(0.0, message);
        Self {
            sink,
            message,
            done: 0,
            total,
        }
    }

    pub fn advance(&mut self) {
        self.done = (self.done + 1).min(self.total);
        self.sink.report(self.fraction(), self.message);
    }

    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.done as f64 / self.total as f64
        }
    }
}
