use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;

/// Error from gate acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AcquireError {
    /// The gate was deactivated, or the waiter was cancelled.
    #[error("acquire cancelled")]
    Cancelled,
}

/// Observable gate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SemaphoreStatus {
    pub in_use: u32,
    pub max: u32,
    pub waiting: usize,
}

/// Counting gate with a strict-FIFO waiter queue and runtime-resizable
/// capacity. Clones share the same gate.
///
/// Releasing transfers the permit directly to the head waiter, so a stream of
/// releases cannot starve the queue. Shrinking below the number of granted
/// permits never revokes them; new acquires wait until the gate drains.
#[derive(Clone)]
pub struct Semaphore {
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    permits_in_use: u32,
    max_permits: u32,
    active: bool,
    next_waiter: u64,
    waiters: VecDeque<Waiter>,
}

struct Waiter {
    id: u64,
    tx: oneshot::Sender<()>,
}

impl Semaphore {
    pub fn new(max_permits: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                permits_in_use: 0,
                max_permits: max_permits.max(1),
                active: true,
                next_waiter: 0,
                waiters: VecDeque::new(),
            })),
        }
    }

    /// Acquire a permit, waiting in FIFO order when the gate is full.
    ///
    /// Fails with [`AcquireError::Cancelled`] when the gate is deactivated.
    /// Dropping the returned future deregisters the waiter; a permit granted
    /// in the race is released back to the queue.
    pub async fn acquire(&self) -> Result<Permit, AcquireError> {
        let wait = {
            let mut g = lock(&self.inner);
            if !g.active {
                return Err(AcquireError::Cancelled);
            }
            if g.permits_in_use < g.max_permits {
                g.permits_in_use += 1;
                return Ok(Permit::new(Arc::clone(&self.inner)));
            }
            let (tx, rx) = oneshot::channel();
            let id = g.next_waiter;
            g.next_waiter += 1;
            g.waiters.push_back(Waiter { id, tx });
            WaitHandle {
                inner: Arc::clone(&self.inner),
                id,
                rx,
                complete: false,
            }
        };
        wait.wait().await
    }

    /// Adjust capacity. Growth wakes queued waiters up to the new headroom;
    /// shrink lets granted permits drain naturally.
    pub fn resize(&self, new_max: u32) {
        let new_max = new_max.max(1);
        let mut g = lock(&self.inner);
        let old = g.max_permits;
        g.max_permits = new_max;
        if new_max > old {
            while g.permits_in_use < g.max_permits {
                let Some(w) = g.waiters.pop_front() else {
                    break;
                };
                if w.tx.send(()).is_ok() {
                    g.permits_in_use += 1;
                }
            }
        }
        if new_max != old {
            tracing::debug!(old, new = new_max, in_use = g.permits_in_use, "gate resized");
        }
    }

    pub fn status(&self) -> SemaphoreStatus {
        let g = lock(&self.inner);
        SemaphoreStatus {
            in_use: g.permits_in_use,
            max: g.max_permits,
            waiting: g.waiters.len(),
        }
    }

    /// Cancel every waiter and fail all future acquires. Granted permits stay
    /// valid until dropped.
    pub fn deactivate(&self) {
        let mut g = lock(&self.inner);
        g.active = false;
        // Dropping the senders resumes every waiter with Cancelled.
        g.waiters.clear();
        tracing::debug!(in_use = g.permits_in_use, "gate deactivated");
    }
}

fn lock(inner: &Arc<Mutex<Inner>>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(|e| e.into_inner())
}

fn release(inner: &Arc<Mutex<Inner>>) {
    let mut g = lock(inner);
    // Hand the permit to the first waiter still listening.
    while let Some(w) = g.waiters.pop_front() {
        if w.tx.send(()).is_ok() {
            return;
        }
    }
    g.permits_in_use = g.permits_in_use.saturating_sub(1);
}

/// A granted permit. Released on drop, including on error paths.
pub struct Permit {
    inner: Arc<Mutex<Inner>>,
}

impl Permit {
    fn new(inner: Arc<Mutex<Inner>>) -> Self {
        Self { inner }
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        release(&self.inner);
    }
}

/// Pending position in the waiter queue. Cleans up after itself when the
/// acquire future is dropped mid-wait.
struct WaitHandle {
    inner: Arc<Mutex<Inner>>,
    id: u64,
    rx: oneshot::Receiver<()>,
    complete: bool,
}

impl WaitHandle {
    async fn wait(mut self) -> Result<Permit, AcquireError> {
        let result = match (&mut self.rx).await {
            Ok(()) => Ok(Permit::new(Arc::clone(&self.inner))),
            // Sender dropped: the gate was deactivated.
            Err(_) => Err(AcquireError::Cancelled),
        };
        self.complete = true;
        result
    }
}

impl Drop for WaitHandle {
    fn drop(&mut self) {
        if self.complete {
            return;
        }
        {
            let mut g = lock(&self.inner);
            if let Some(pos) = self.id_position(&g) {
                g.waiters.remove(pos);
                return;
            }
        }
        // Not queued anymore: a grant may have raced with this cancellation.
        if self.rx.try_recv().is_ok() {
            release(&self.inner);
        }
    }
}

impl WaitHandle {
    fn id_position(&self, g: &Inner) -> Option<usize> {
        g.waiters.iter().position(|w| w.id == self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    /// Poll a pinned future exactly once; Err means still pending.
    macro_rules! poll_once {
        ($fut:expr) => {
            timeout(Duration::ZERO, $fut).await
        };
    }

    #[tokio::test]
    async fn grants_up_to_capacity() {
        let sem = Semaphore::new(2);
        let a = sem.acquire().await.unwrap();
        let _b = sem.acquire().await.unwrap();
        assert_eq!(
            sem.status(),
            SemaphoreStatus {
                in_use: 2,
                max: 2,
                waiting: 0
            }
        );

        drop(a);
        assert_eq!(sem.status().in_use, 1);
        let _c = sem.acquire().await.unwrap();
        assert_eq!(sem.status().in_use, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn waiters_resume_in_fifo_order() {
        let sem = Semaphore::new(2);
        let a = sem.acquire().await.unwrap();
        let b = sem.acquire().await.unwrap();

        let fut_c = sem.acquire();
        let fut_d = sem.acquire();
        tokio::pin!(fut_c, fut_d);
        // Register C before D.
        assert!(poll_once!(&mut fut_c).is_err());
        assert!(poll_once!(&mut fut_d).is_err());
        assert_eq!(sem.status().waiting, 2);

        drop(a);
        let _c = poll_once!(&mut fut_c).unwrap().unwrap();
        assert_eq!(sem.status().in_use, 2);
        // D is still queued: the freed permit went to C, not D.
        assert!(poll_once!(&mut fut_d).is_err());
        assert_eq!(sem.status().waiting, 1);

        drop(b);
        let _d = poll_once!(&mut fut_d).unwrap().unwrap();
        assert_eq!(
            sem.status(),
            SemaphoreStatus {
                in_use: 2,
                max: 2,
                waiting: 0
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn in_use_never_exceeds_max() {
        let sem = Semaphore::new(3);
        let mut permits = Vec::new();
        for _ in 0..3 {
            permits.push(sem.acquire().await.unwrap());
        }
        let fut = sem.acquire();
        tokio::pin!(fut);
        assert!(poll_once!(&mut fut).is_err());
        assert_eq!(sem.status().in_use, 3);

        permits.pop();
        let _p = poll_once!(&mut fut).unwrap().unwrap();
        assert_eq!(sem.status().in_use, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn grow_wakes_waiters_up_to_new_headroom() {
        let sem = Semaphore::new(1);
        let _a = sem.acquire().await.unwrap();

        let fut_b = sem.acquire();
        let fut_c = sem.acquire();
        let fut_d = sem.acquire();
        tokio::pin!(fut_b, fut_c, fut_d);
        assert!(poll_once!(&mut fut_b).is_err());
        assert!(poll_once!(&mut fut_c).is_err());
        assert!(poll_once!(&mut fut_d).is_err());

        sem.resize(3);
        // Two new permits: B and C resume, D keeps waiting.
        let _b = poll_once!(&mut fut_b).unwrap().unwrap();
        let _c = poll_once!(&mut fut_c).unwrap().unwrap();
        assert!(poll_once!(&mut fut_d).is_err());
        assert_eq!(
            sem.status(),
            SemaphoreStatus {
                in_use: 3,
                max: 3,
                waiting: 1
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn shrink_never_revokes_granted_permits() {
        let sem = Semaphore::new(4);
        let a = sem.acquire().await.unwrap();
        let b = sem.acquire().await.unwrap();
        let _c = sem.acquire().await.unwrap();

        sem.resize(1);
        assert_eq!(sem.status().in_use, 3);
        assert_eq!(sem.status().max, 1);

        // New acquires block until the gate drains below the new max.
        let fut = sem.acquire();
        tokio::pin!(fut);
        assert!(poll_once!(&mut fut).is_err());

        drop(a);
        assert_eq!(sem.status().in_use, 2);
        assert!(poll_once!(&mut fut).is_err());
        drop(b);
        // in_use 1 == max 1: still full, the waiter keeps waiting.
        assert!(poll_once!(&mut fut).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn deactivate_cancels_waiters_and_future_acquires() {
        let sem = Semaphore::new(1);
        let _a = sem.acquire().await.unwrap();

        let fut = sem.acquire();
        tokio::pin!(fut);
        assert!(poll_once!(&mut fut).is_err());

        sem.deactivate();
        assert!(matches!(
            poll_once!(&mut fut).unwrap(),
            Err(AcquireError::Cancelled)
        ));
        assert!(matches!(
            sem.acquire().await,
            Err(AcquireError::Cancelled)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_waiter_leaves_the_queue() {
        let sem = Semaphore::new(1);
        let a = sem.acquire().await.unwrap();

        {
            let fut = sem.acquire();
            tokio::pin!(fut);
            assert!(poll_once!(&mut fut).is_err());
            assert_eq!(sem.status().waiting, 1);
        }
        // The abandoned waiter deregistered itself.
        assert_eq!(sem.status().waiting, 0);

        // Releasing now frees the permit instead of waking a ghost.
        drop(a);
        assert_eq!(sem.status().in_use, 0);
        let _b = sem.acquire().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn transfer_to_second_waiter_when_head_abandons() {
        let sem = Semaphore::new(1);
        let a = sem.acquire().await.unwrap();

        let fut_b = sem.acquire();
        tokio::pin!(fut_b);
        assert!(poll_once!(&mut fut_b).is_err());

        let fut_c = sem.acquire();
        tokio::pin!(fut_c);
        assert!(poll_once!(&mut fut_c).is_err());

        // B abandons while queued; C becomes the head.
        {
            let mut g = lock(&sem.inner);
            assert_eq!(g.waiters.len(), 2);
            g.waiters.pop_front();
        }
        drop(a);
        let _c = poll_once!(&mut fut_c).unwrap().unwrap();
        assert_eq!(sem.status().in_use, 1);
    }

    #[tokio::test]
    async fn acquire_from_many_tasks_completes() {
        let sem = Semaphore::new(2);
        let mut handles = Vec::new();
        for _ in 0..16 {
            let sem = sem.clone();
            handles.push(tokio::spawn(async move {
                let permit = sem.acquire().await.unwrap();
                tokio::task::yield_now().await;
                drop(permit);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(sem.status().in_use, 0);
        assert_eq!(sem.status().waiting, 0);
    }
}
