//! The scoped background executor (§5): cache store and version-bump work that
//! must never block the client response, but must also never outlive the process
//! in a way tests can't observe deterministically.
//!
//! Grounded on the teacher's use of `tokio::spawn` for fire-and-forget work
//! throughout `enterprise::cache`, generalized into an explicit handle so a
//! `RequestContext` without one (unit tests) falls back to synchronous execution
//! rather than silently dropping the work — per §5: "when absent... writes fall
//! back to synchronous execution before returning."

use std::future::Future;

use tokio::task::JoinHandle;

/// A handle that either spawns work onto the ambient `tokio` runtime, or — when
/// no runtime context is available — runs it synchronously in place.
#[derive(Clone, Default)]
pub struct BackgroundExecutor {
    mode: Mode,
}

#[derive(Clone)]
enum Mode {
    Spawn,
    Inline,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Spawn
    }
}

impl BackgroundExecutor {
    /// The default executor: spawns work onto `tokio::spawn`.
    pub fn spawning() -> Self {
        Self { mode: Mode::Spawn }
    }

    /// An executor that runs work synchronously, in place. Used by tests and any
    /// caller with no ambient runtime handle.
    pub fn inline() -> Self {
        Self { mode: Mode::Inline }
    }

    /// Schedule `future` to run in the background, or run it synchronously in
    /// place if this executor has no spawn capability.
    ///
    /// Callers must `.await` this: for `Mode::Spawn` the await resolves as soon
    /// as the task is handed to the runtime, but for `Mode::Inline` it resolves
    /// only once `future` itself has fully run, so the work is guaranteed
    /// complete before the caller proceeds.
    pub async fn schedule<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self.mode {
            Mode::Spawn => {
                let _: JoinHandle<()> = tokio::spawn(future);
            }
            Mode::Inline => {
                future.await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn spawning_executor_runs_scheduled_work() {
        let executor = BackgroundExecutor::spawning();
        let flag = Arc::new(AtomicBool::new(false));
        let flag_clone = flag.clone();
        executor
            .schedule(async move {
                flag_clone.store(true, Ordering::SeqCst);
            })
            .await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(flag.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn spawning_executor_schedule_returns_before_work_runs() {
        let executor = BackgroundExecutor::spawning();
        let flag = Arc::new(AtomicBool::new(false));
        let flag_clone = flag.clone();
        executor
            .schedule(async move {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                flag_clone.store(true, Ordering::SeqCst);
            })
            .await;
        assert!(!flag.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn inline_executor_completes_work_before_returning() {
        let executor = BackgroundExecutor::inline();
        let flag = Arc::new(AtomicBool::new(false));
        let flag_clone = flag.clone();
        executor
            .schedule(async move {
                flag_clone.store(true, Ordering::SeqCst);
            })
            .await;
        assert!(flag.load(Ordering::SeqCst));
    }
}
