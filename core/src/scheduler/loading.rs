//! Background loading
//!
//! One-shot preparation work runs on its own thread. It reports progress
//! through a completed-task counter and signals completion through a flag;
//! the main thread polls both. The loading thread never touches the demo
//! channel: the main thread records the loading-complete point itself.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

#[derive(Debug, Default)]
struct LoadingState {
    started: AtomicBool,
    complete: AtomicBool,
    failed: AtomicBool,
    tasks_done: AtomicU32,
    tasks_total: AtomicU32,
}

/// Shared view of the loading thread
#[derive(Debug, Clone, Default)]
pub struct LoadingTracker {
    state: Arc<LoadingState>,
    handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl LoadingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` on a loading thread
    ///
    /// `total_tasks` is the expected number of [`task_completed`](Self::task_completed)
    /// calls, used for progress reporting.
    pub fn spawn<F>(&self, total_tasks: u32, task: F) -> io::Result<()>
    where
        F: FnOnce(&LoadingTracker) -> anyhow::Result<()> + Send + 'static,
    {
        self.state.tasks_total.store(total_tasks, Ordering::Release);
        self.state.started.store(true, Ordering::Release);

        let tracker = self.clone();
        let handle = std::thread::Builder::new()
            .name("loader".into())
            .spawn(move || {
                if let Err(e) = task(&tracker) {
                    tracing::error!("Loading failed: {:#}", e);
                    tracker.state.failed.store(true, Ordering::Release);
                }
                tracker.state.complete.store(true, Ordering::Release);
            })?;

        if let Ok(mut slot) = self.handle.lock() {
            *slot = Some(handle);
        }
        Ok(())
    }

    /// Called from the loading task as each unit of work finishes
    pub fn task_completed(&self) {
        self.state.tasks_done.fetch_add(1, Ordering::AcqRel);
    }

    pub fn is_started(&self) -> bool {
        self.state.started.load(Ordering::Acquire)
    }

    pub fn is_complete(&self) -> bool {
        self.state.complete.load(Ordering::Acquire)
    }

    /// Nothing to wait for: either no loader was started or it has finished
    pub fn is_done(&self) -> bool {
        !self.is_started() || self.is_complete()
    }

    /// Started and still running
    pub fn in_progress(&self) -> bool {
        self.is_started() && !self.is_complete()
    }

    pub fn has_failed(&self) -> bool {
        self.state.failed.load(Ordering::Acquire)
    }

    /// Fraction of tasks done, 1.0 once complete
    pub fn progress(&self) -> f32 {
        if self.is_complete() {
            return 1.0;
        }
        let total = self.state.tasks_total.load(Ordering::Acquire);
        if total == 0 {
            return 0.0;
        }
        let done = self.state.tasks_done.load(Ordering::Acquire).min(total);
        done as f32 / total as f32
    }

    /// Join the loading thread if one is running
    pub fn wait(&self) {
        let handle = self.handle.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            tracing::error!("Loading thread panicked");
            self.state.failed.store(true, Ordering::Release);
            self.state.complete.store(true, Ordering::Release);
        }
    }
}
