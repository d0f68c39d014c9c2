//! Completion barrier.

use std::sync::atomic::{AtomicUsize, Ordering};

use log;
use tokio::sync::Notify;

/// Counts completion units and releases waiters once the required number has arrived.
///
/// A shuffle between `n` servers requires `2 * (n - 1)` units: one per outbound stream
/// finished by a sender and one per inbound stream observed completed by the collector.
#[derive(Debug)]
pub struct CompletionBarrier {
    required: usize,
    completed: AtomicUsize,
    notify: Notify,
}

impl CompletionBarrier {
    pub fn new(required: usize) -> Self {
        CompletionBarrier {
            required,
            completed: AtomicUsize::new(0),
            notify: Notify::new(),
        }
    }

    /// Barrier for a shuffle between `servers` servers.
    pub fn for_servers(servers: usize) -> Self {
        Self::new(2 * servers.saturating_sub(1))
    }

    pub fn required(&self) -> usize {
        self.required
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    pub fn is_released(&self) -> bool {
        self.completed() >= self.required
    }

    /// Signals one completion unit. Returns the number of units arrived so far.
    pub fn arrive(&self) -> usize {
        let completed = self.completed.fetch_add(1, Ordering::AcqRel) + 1;
        if completed > self.required {
            log::error!("completion barrier overshoot ({} of {})", completed, self.required);
        } else {
            log::debug!("completion barrier at {} of {}", completed, self.required);
        }

        if completed >= self.required {
            self.notify.notify_waiters();
        }

        return completed;
    }

    /// Waits until the required number of units has arrived.
    pub async fn wait(&self) {
        loop {
            // registered before the check so a concurrent arrival cannot be missed
            let notified = self.notify.notified();
            if self.is_released() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;
    use std::time::Duration;

    use rstest::*;

    use super::CompletionBarrier;

    #[rstest]
    #[case(1, 0)]
    #[case(2, 2)]
    #[case(4, 6)]
    fn test_required_units(#[case] servers: usize, #[case] required: usize) {
        assert_eq!(CompletionBarrier::for_servers(servers).required(), required);
    }

    #[tokio::test]
    async fn test_empty_barrier_released() {
        let barrier = CompletionBarrier::new(0);
        assert!(barrier.is_released());
        barrier.wait().await;
    }

    #[tokio::test]
    async fn test_wait_releases_on_last_unit() {
        let barrier = Arc::new(CompletionBarrier::new(6));

        let workers: Vec<_> = (0..6)
            .map(|_| {
                let barrier = barrier.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    barrier.arrive();
                })
            })
            .collect();

        tokio::time::timeout(Duration::from_secs(5), barrier.wait())
            .await
            .unwrap();
        for worker in workers {
            worker.await.unwrap();
        }
        assert_eq!(barrier.completed(), 6);
    }

    #[tokio::test]
    async fn test_wait_blocks_until_released() {
        let barrier = CompletionBarrier::new(2);
        barrier.arrive();

        let result = tokio::time::timeout(Duration::from_millis(50), barrier.wait()).await;
        assert!(result.is_err());

        assert_eq!(barrier.arrive(), 2);
        barrier.wait().await;
    }
}
