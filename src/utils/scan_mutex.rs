//! Global scan serialization
//!
//! One scan at a time, FIFO. The deadline starts once the permit is held, so
//! time spent queued never counts against a scan. Work runs on its own task:
//! when the deadline fires the caller gets `SCAN_TIMEOUT` and the permit is
//! released. The task keeps its in-flight RPC calls, but its cancel flag is
//! raised so no new call starts (see [`scan_cancelled`]).

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::models::errors::{AppError, AppResult};

tokio::task_local! {
    static CANCELLED: Arc<AtomicBool>;
}

/// True when the current task belongs to a scan that missed its deadline
pub fn scan_cancelled() -> bool {
    CANCELLED
        .try_with(|flag| flag.load(Ordering::Acquire))
        .unwrap_or(false)
}

pub struct ScanMutex {
    gate: Mutex<()>,
    deadline: Duration,
    queued: AtomicUsize,
}

/// Decrements the queue gauge even if the waiter is dropped
struct QueueSlot<'a>(&'a AtomicUsize);

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

impl ScanMutex {
    pub fn new(deadline: Duration) -> Self {
        Self {
            gate: Mutex::new(()),
            deadline,
            queued: AtomicUsize::new(0),
        }
    }

    /// Run `work` once every earlier caller is done
    pub async fn run<F, T>(&self, label: &str, work: F) -> AppResult<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = {
            self.queued.fetch_add(1, Ordering::Relaxed);
            let _slot = QueueSlot(&self.queued);
            self.gate.lock().await
        };
        debug!("🔒 Scan permit acquired: {}", label);

        let cancelled = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(CANCELLED.scope(cancelled.clone(), work));
        let outcome = tokio::time::timeout(self.deadline, handle).await;

        match outcome {
            Ok(joined) => joined.map_err(AppError::from),
            Err(_) => {
                cancelled.store(true, Ordering::Release);
                drop(permit);
                warn!(
                    "⏰ Scan {} exceeded {}s, releasing permit",
                    label,
                    self.deadline.as_secs()
                );
                Err(AppError::scan_timeout(self.deadline.as_secs()))
            }
        }
    }

    /// Callers waiting for the permit
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::Relaxed)
    }

    pub fn is_busy(&self) -> bool {
        self.gate.try_lock().is_err()
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::errors::ErrorCode;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_runs_in_fifo_order() {
        let mutex = Arc::new(ScanMutex::new(Duration::from_secs(60)));
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..4u32 {
            let mutex = mutex.clone();
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                mutex
                    .run("fifo", async move {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        log.lock().unwrap().push(i);
                    })
                    .await
            }));
            // Let each task enqueue before spawning the next
            tokio::task::yield_now().await;
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_releases_permit() {
        let mutex = Arc::new(ScanMutex::new(Duration::from_secs(60)));

        let stuck = mutex
            .run("stuck", async {
                tokio::time::sleep(Duration::from_secs(600)).await;
            })
            .await;
        let err = stuck.unwrap_err();
        assert_eq!(err.code, ErrorCode::ScanTimeout);
        assert!(!mutex.is_busy());

        let next = mutex.run("next", async { 5u8 }).await;
        assert_eq!(next.unwrap(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_raises_cancel_flag() {
        let mutex = ScanMutex::new(Duration::from_secs(5));
        let before = Arc::new(AtomicBool::new(true));
        let after = Arc::new(AtomicBool::new(false));

        let (b, a) = (before.clone(), after.clone());
        let result = mutex
            .run("slow", async move {
                b.store(scan_cancelled(), Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(10)).await;
                a.store(scan_cancelled(), Ordering::SeqCst);
            })
            .await;
        assert!(result.is_err());
        assert!(!scan_cancelled());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!before.load(Ordering::SeqCst));
        assert!(after.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_time_does_not_count_against_deadline() {
        let mutex = Arc::new(ScanMutex::new(Duration::from_secs(60)));

        let first = {
            let mutex = mutex.clone();
            tokio::spawn(async move {
                mutex
                    .run("first", async {
                        tokio::time::sleep(Duration::from_secs(50)).await;
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;

        // Queued for ~50s, then runs 50s of its own: still inside its deadline
        let second = mutex
            .run("second", async {
                tokio::time::sleep(Duration::from_secs(50)).await;
                "done"
            })
            .await;

        assert!(first.await.unwrap().is_ok());
        assert_eq!(second.unwrap(), "done");
        assert_eq!(mutex.queued(), 0);
    }
}
