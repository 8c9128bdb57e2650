use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// Orchestrator state, reported through [`ProgressSink::on_phase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Pending,
    Validating,
    RenderingScenes(usize),
    Concatenating,
    Done,
    Failed,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunPhase::Pending => write!(f, "pending"),
            RunPhase::Validating => write!(f, "validating"),
            RunPhase::RenderingScenes(i) => write!(f, "rendering scene {}", i + 1),
            RunPhase::Concatenating => write!(f, "concatenating"),
            RunPhase::Done => write!(f, "done"),
            RunPhase::Failed => write!(f, "failed"),
        }
    }
}

/// Receives progress from a run. Called synchronously from the orchestrator.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, _percent: u8) {}

    fn on_status(&self, _message: &str) {}

    fn on_phase(&self, _phase: RunPhase) {}
}

pub struct NoopSink;

impl ProgressSink for NoopSink {}

type ProgressFn = Box<dyn Fn(u8) + Send + Sync>;
type StatusFn = Box<dyn Fn(&str) + Send + Sync>;

/// Sink assembled from optional closures.
#[derive(Default)]
pub struct CallbackSink {
    progress: Option<ProgressFn>,
    status: Option<StatusFn>,
}

impl CallbackSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progress(mut self, f: impl Fn(u8) + Send + Sync + 'static) -> Self {
        self.progress = Some(Box::new(f));
        self
    }

    pub fn with_status(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.status = Some(Box::new(f));
        self
    }
}

impl ProgressSink for CallbackSink {
    fn on_progress(&self, percent: u8) {
        if let Some(f) = &self.progress {
            f(percent);
        }
    }

    fn on_status(&self, message: &str) {
        if let Some(f) = &self.status {
            f(message);
        }
    }
}

/// Forwards to a sink while keeping reported progress non-decreasing.
pub(crate) struct ProgressTracker<'a> {
    sink: &'a dyn ProgressSink,
    last: u8,
}

impl<'a> ProgressTracker<'a> {
    pub(crate) fn new(sink: &'a dyn ProgressSink) -> Self {
        Self { sink, last: 0 }
    }

    pub(crate) fn progress(&mut self, percent: u8) {
        let percent = percent.min(100).max(self.last);
        self.last = percent;
        self.sink.on_progress(percent);
    }

    pub(crate) fn status(&self, message: impl AsRef<str>) {
        self.sink.on_status(message.as_ref());
    }

    pub(crate) fn phase(&self, phase: RunPhase) {
        tracing::debug!(%phase, "phase change");
        self.sink.on_phase(phase);
    }
}

#[derive(Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Shared abort flag for a run; clones observe the same state.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelState>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`CancelToken::cancel`] has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[test]
    fn tracker_never_goes_backwards() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let sink = CallbackSink::new().with_progress(move |p| sink_seen.lock().unwrap().push(p));
        let mut tracker = ProgressTracker::new(&sink);
        for p in [10, 40, 30, 120, 90] {
            tracker.progress(p);
        }
        assert_eq!(*seen.lock().unwrap(), vec![10, 40, 40, 100, 100]);
    }

    #[tokio::test]
    async fn cancelled_wakes_waiters() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("waiter woke")
            .unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_returns_immediately_when_already_set() {
        let token = CancelToken::new();
        token.cancel();
        tokio::time::timeout(Duration::from_millis(100), token.cancelled())
            .await
            .expect("already cancelled");
    }
}
