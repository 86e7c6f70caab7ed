//! FIFO async mutex.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

#[derive(Debug, Default)]
struct LockState {
    locked: bool,
    waiters: VecDeque<oneshot::Sender<()>>,
}

/// Mutual exclusion for async callers, granted strictly in arrival order.
///
/// A released lock is handed directly to the oldest live waiter, so the lock
/// never appears free while someone is queued. Waiters whose future is
/// dropped are skipped.
#[derive(Debug, Default)]
pub struct AsyncLock {
    state: Mutex<LockState>,
}

impl AsyncLock {
    /// Create an unlocked lock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the lock.
    ///
    /// Completes immediately when the lock is free; otherwise queues behind
    /// every earlier caller.
    pub async fn acquire(&self) -> AsyncLockGuard<'_> {
        loop {
            let receiver = {
                let mut state = self.state();
                if !state.locked {
                    state.locked = true;
                    return AsyncLockGuard { lock: self };
                }
                let (sender, receiver) = oneshot::channel();
                state.waiters.push_back(sender);
                receiver
            };

            let mut waiter = Waiter {
                lock: self,
                receiver,
                granted: false,
            };
            if (&mut waiter.receiver).await.is_ok() {
                waiter.granted = true;
                return AsyncLockGuard { lock: self };
            }
        }
    }

    /// Whether the lock is currently held.
    pub fn is_locked(&self) -> bool {
        self.state().locked
    }

    /// Number of queued waiters, including ones that already gave up but
    /// have not been skipped yet.
    pub fn queue_len(&self) -> usize {
        self.state().waiters.len()
    }

    /// Give up ownership.
    ///
    /// # Panics
    ///
    /// Panics if the lock is not held.
    pub(crate) fn release(&self) {
        let mut state = self.state();
        assert!(state.locked, "released an AsyncLock that was not locked");
        while let Some(next) = state.waiters.pop_front() {
            if next.send(()).is_ok() {
                return;
            }
        }
        state.locked = false;
    }

    fn state(&self) -> MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive ownership of an [`AsyncLock`]. Released on drop.
#[derive(Debug)]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct AsyncLockGuard<'a> {
    lock: &'a AsyncLock,
}

impl AsyncLockGuard<'_> {
    /// Release the lock now.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for AsyncLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

/// Queue slot of a pending `acquire`.
struct Waiter<'a> {
    lock: &'a AsyncLock,
    receiver: oneshot::Receiver<()>,
    granted: bool,
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        if self.granted {
            return;
        }
        // The lock may have been handed over after we stopped listening.
        self.receiver.close();
        if self.receiver.try_recv().is_ok() {
            self.lock.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{pin_mut, poll};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_uncontended_acquire_and_release() {
        let lock = AsyncLock::new();
        assert!(!lock.is_locked());

        let guard = lock.acquire().await;
        assert!(lock.is_locked());
        guard.release();
        assert!(!lock.is_locked());

        let _again = lock.acquire().await;
        assert!(lock.is_locked());
    }

    #[tokio::test]
    async fn test_waiters_are_served_in_arrival_order() {
        let lock = Arc::new(AsyncLock::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let guard = lock.acquire().await;
        let mut handles = Vec::new();
        for id in 1..=4 {
            let task_lock = lock.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                let _guard = task_lock.acquire().await;
                order.lock().unwrap().push(id);
                tokio::time::sleep(Duration::from_millis(1)).await;
            }));
            while lock.queue_len() < id {
                tokio::task::yield_now().await;
            }
        }

        drop(guard);
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3, 4]);
        assert!(!lock.is_locked());
    }

    #[tokio::test]
    async fn test_dropped_waiter_is_skipped() {
        let lock = AsyncLock::new();
        let guard = lock.acquire().await;

        let first = lock.acquire();
        let second = lock.acquire();
        pin_mut!(second);
        {
            pin_mut!(first);
            assert!(poll!(first.as_mut()).is_pending());
            assert!(poll!(second.as_mut()).is_pending());
        }
        assert_eq!(lock.queue_len(), 2);

        drop(guard);
        assert!(lock.is_locked());
        let next = second.await;
        assert_eq!(lock.queue_len(), 0);
        drop(next);
        assert!(!lock.is_locked());
    }

    #[tokio::test]
    async fn test_handoff_to_departed_waiter_passes_on() {
        let lock = AsyncLock::new();
        let guard = lock.acquire().await;

        let first = Box::pin(lock.acquire());
        let mut first = Some(first);
        let second = lock.acquire();
        pin_mut!(second);
        assert!(poll!(first.as_mut().unwrap().as_mut()).is_pending());
        assert!(poll!(second.as_mut()).is_pending());

        // Hand the lock to `first`, which leaves before noticing.
        drop(guard);
        first.take();
        assert!(lock.is_locked());
        assert!(poll!(second.as_mut()).is_ready());
    }

    #[test]
    #[should_panic(expected = "not locked")]
    fn test_releasing_unlocked_lock_panics() {
        AsyncLock::new().release();
    }
}
