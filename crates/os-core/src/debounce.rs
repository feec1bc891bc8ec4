//! Coalescing timer for deferred work
//!
//! Every [`Debouncer::trigger`] restarts the window. When the window elapses
//! without another trigger the bound task runs exactly once. Tests (and
//! shutdown paths) can run pending work immediately with [`Debouncer::flush`].

use std::sync::{Arc, Weak};
use std::time::Duration;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

/// Work bound to a debouncer
#[async_trait]
pub trait DebouncedTask: Send + Sync {
    async fn run(&self);
}

#[derive(Default)]
struct DebounceState {
    pending: bool,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

/// Resettable single-fire timer
pub struct Debouncer {
    delay: Duration,
    task: Weak<dyn DebouncedTask>,
    state: Arc<Mutex<DebounceState>>,
    runtime: Option<Handle>,
}

impl Debouncer {
    /// Create a debouncer that runs `task` once `delay` has passed since the last trigger
    ///
    /// The runtime current at construction (if any) runs the timer, so
    /// triggers from threads outside the runtime are still scheduled.
    pub fn new(delay: Duration, task: Weak<dyn DebouncedTask>) -> Self {
        Self {
            delay,
            task,
            state: Arc::new(Mutex::new(DebounceState::default())),
            runtime: Handle::try_current().ok(),
        }
    }

    /// The coalescing window
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Mark work pending and restart the window
    ///
    /// Without a runtime captured at construction or current at the call,
    /// nothing is scheduled; the work stays pending until
    /// [`Debouncer::flush`] is awaited.
    pub fn trigger(&self) {
        let mut state = self.state.lock();
        state.pending = true;
        state.generation = state.generation.wrapping_add(1);
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }

        let Some(runtime) = self.runtime.clone().or_else(|| Handle::try_current().ok()) else {
            debug!("No runtime available, debounced work waits for flush");
            return;
        };

        let generation = state.generation;
        let shared = self.state.clone();
        let task = self.task.clone();
        let delay = self.delay;

        state.timer = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut state = shared.lock();
                if state.generation != generation || !state.pending {
                    return;
                }
                state.pending = false;
                state.timer = None;
            }
            if let Some(task) = task.upgrade() {
                task.run().await;
            }
        }));
    }

    /// Whether a trigger is waiting to fire
    pub fn is_pending(&self) -> bool {
        self.state.lock().pending
    }

    /// Drop pending work without running it. Returns whether anything was pending.
    pub fn cancel(&self) -> bool {
        let mut state = self.state.lock();
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        std::mem::take(&mut state.pending)
    }

    /// Run pending work now instead of waiting for the window.
    /// Returns whether anything ran.
    pub async fn flush(&self) -> bool {
        if !self.cancel() {
            return false;
        }
        match self.task.upgrade() {
            Some(task) => {
                task.run().await;
                true
            }
            None => false,
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        if let Some(timer) = self.state.lock().timer.take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        runs: AtomicUsize,
    }

    #[async_trait]
    impl DebouncedTask for Counter {
        async fn run(&self) {
            self.runs.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counter() -> Arc<Counter> {
        Arc::new(Counter { runs: AtomicUsize::new(0) })
    }

    fn debouncer(task: &Arc<Counter>, ms: u64) -> Debouncer {
        let task: Arc<dyn DebouncedTask> = task.clone();
        Debouncer::new(Duration::from_millis(ms), Arc::downgrade(&task))
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_to_one_run() {
        crate::init_test_tracing();
        let task = counter();
        let debouncer = debouncer(&task, 100);

        for _ in 0..5 {
            debouncer.trigger();
            tokio::time::advance(Duration::from_millis(30)).await;
        }
        assert_eq!(task.runs.load(Ordering::SeqCst), 0);
        assert!(debouncer.is_pending());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(task.runs.load(Ordering::SeqCst), 1);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_runs_immediately() {
        let task = counter();
        let debouncer = debouncer(&task, 100);

        debouncer.trigger();
        assert!(debouncer.flush().await);
        assert_eq!(task.runs.load(Ordering::SeqCst), 1);

        // The aborted timer must not fire a second time
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(task.runs.load(Ordering::SeqCst), 1);
        assert!(!debouncer.flush().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel() {
        let task = counter();
        let debouncer = debouncer(&task, 100);

        debouncer.trigger();
        assert!(debouncer.cancel());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(task.runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_trigger_without_runtime_waits_for_flush() {
        crate::init_test_tracing();
        let task = counter();
        let debouncer = debouncer(&task, 100);

        debouncer.trigger();
        assert!(debouncer.is_pending());

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        assert!(runtime.block_on(debouncer.flush()));
        assert_eq!(task.runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_trigger_from_foreign_thread_uses_captured_runtime() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_time()
            .build()
            .unwrap();
        let task = counter();
        let debouncer = Arc::new(runtime.block_on(async { debouncer(&task, 50) }));

        let remote = debouncer.clone();
        std::thread::spawn(move || remote.trigger()).join().unwrap();
        assert!(debouncer.is_pending());

        runtime.block_on(async { tokio::time::sleep(Duration::from_millis(300)).await });
        assert_eq!(task.runs.load(Ordering::SeqCst), 1);
        assert!(!debouncer.is_pending());
    }
}
