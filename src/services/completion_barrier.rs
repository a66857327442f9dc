use tokio_util::task::TaskTracker;
use tokio_util::task::task_tracker::TaskTrackerToken;

/// Count-down latch shared by every long-running task of the process.
///
/// Each task holds a [`BarrierSlot`] for as long as it runs. The slot is
/// released when dropped, so every exit path (return, early break, panic
/// unwinding) gives it back exactly once.
#[derive(Clone, Default)]
pub struct CompletionBarrier {
    tracker: TaskTracker,
}

#[must_use = "the slot is released as soon as it is dropped"]
pub struct BarrierSlot {
    _token: TaskTrackerToken,
}

impl CompletionBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self) -> BarrierSlot {
        BarrierSlot {
            _token: self.tracker.token(),
        }
    }

    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Resolves once every registered slot has been released.
    pub async fn wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}
