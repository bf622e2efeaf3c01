//! Per-session execution lock.
//!
//! At most one pipeline run holds the lock. Acquisition never waits: a second
//! caller gets [`PipelineError::AlreadyRunning`] immediately. The holder's
//! cancellation token lives in the lock, so barge-in can cancel the run and
//! release the lock in one step without waiting for the run task to notice.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::errors::PipelineError;

#[derive(Debug)]
struct ActiveRun {
    id: u64,
    cancel: CancellationToken,
}

#[derive(Debug, Default)]
struct LockInner {
    active: Mutex<Option<ActiveRun>>,
    next_id: AtomicU64,
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionLock {
    inner: Arc<LockInner>,
}

impl ExecutionLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock for a new run, or fail fast if a run holds it.
    pub fn try_acquire(&self) -> Result<RunGuard, PipelineError> {
        let mut active = self.inner.active.lock();
        if active.is_some() {
            return Err(PipelineError::AlreadyRunning);
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = CancellationToken::new();
        *active = Some(ActiveRun {
            id,
            cancel: cancel.clone(),
        });
        debug!("Execution lock acquired by run {}", id);

        Ok(RunGuard {
            lock: self.clone(),
            run_id: id,
            cancel,
        })
    }

    /// Cancel the holder and release the lock. Returns the cancelled run id.
    pub fn cancel_current(&self) -> Option<u64> {
        let run = self.inner.active.lock().take()?;
        run.cancel.cancel();
        debug!("Execution lock released by cancelling run {}", run.id);
        Some(run.id)
    }

    pub fn is_held(&self) -> bool {
        self.inner.active.lock().is_some()
    }

    pub fn current_run(&self) -> Option<u64> {
        self.inner.active.lock().as_ref().map(|run| run.id)
    }

    fn release(&self, run_id: u64) {
        let mut active = self.inner.active.lock();
        if active.as_ref().is_some_and(|run| run.id == run_id) {
            *active = None;
            debug!("Execution lock released by run {}", run_id);
        }
    }
}

/// Proof of lock ownership. Dropping it releases the lock if this run still
/// holds it.
#[derive(Debug)]
pub struct RunGuard {
    lock: ExecutionLock,
    run_id: u64,
    cancel: CancellationToken,
}

impl RunGuard {
    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.lock.release(self.run_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_fast() {
        let lock = ExecutionLock::new();
        let guard = lock.try_acquire().unwrap();
        assert!(lock.is_held());
        assert!(matches!(
            lock.try_acquire(),
            Err(PipelineError::AlreadyRunning)
        ));
        assert_eq!(lock.current_run(), Some(guard.run_id()));

        drop(guard);
        assert!(!lock.is_held());
        assert!(lock.try_acquire().is_ok());
    }

    #[test]
    fn test_cancel_current_releases_immediately() {
        let lock = ExecutionLock::new();
        let guard = lock.try_acquire().unwrap();
        let token = guard.cancel_token();

        assert_eq!(lock.cancel_current(), Some(guard.run_id()));
        assert!(token.is_cancelled());
        assert!(guard.is_cancelled());
        assert!(!lock.is_held());

        // A new run can start while the cancelled guard is still alive, and
        // dropping the stale guard must not release the new holder.
        let next = lock.try_acquire().unwrap();
        drop(guard);
        assert_eq!(lock.current_run(), Some(next.run_id()));
    }

    #[test]
    fn test_cancel_without_holder() {
        let lock = ExecutionLock::new();
        assert_eq!(lock.cancel_current(), None);
    }

    #[test]
    fn test_run_ids_increase() {
        let lock = ExecutionLock::new();
        let first = lock.try_acquire().unwrap().run_id();
        let second = lock.try_acquire().unwrap().run_id();
        assert!(second > first);
    }
}
