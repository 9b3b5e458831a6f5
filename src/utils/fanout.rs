//! Bounded fan-out of independent partitions onto blocking worker threads.
//!
//! Each partition runs on its own blocking task; a semaphore caps how many run
//! at once, timed-out ones included, and every task gets its own timeout. A timed-out or failed
//! partition is reported, never retried. Workers must not share a store
//! handle: each opens its own connection for its partition.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Result for one partition.
#[derive(Debug)]
pub struct PartitionOutcome<T> {
    pub partition: String,
    pub result: Result<T>,
}

#[derive(Debug, Clone)]
pub struct FanOut {
    workers: usize,
    timeout: Duration,
}

impl FanOut {
    pub fn new(workers: usize, timeout: Duration) -> Self {
        Self {
            workers: workers.max(1),
            timeout,
        }
    }

    /// Run `work` over every partition; outcomes come back in input order.
    pub async fn run<P, T, F>(&self, partitions: Vec<(String, P)>, work: F) -> Vec<PartitionOutcome<T>>
    where
        P: Send + 'static,
        T: Send + 'static,
        F: Fn(P) -> Result<T> + Send + Sync + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let work = Arc::new(work);
        let timeout = self.timeout;

        let handles: Vec<_> = partitions
            .into_iter()
            .map(|(name, partition)| {
                let semaphore = semaphore.clone();
                let work = work.clone();
                let task_name = name.clone();
                let handle = tokio::spawn(async move {
                    let permit = semaphore.acquire_owned().await.map_err(|e| Error::Worker {
                        partition: task_name.clone(),
                        message: e.to_string(),
                    })?;
                    debug!(partition = %task_name, "Worker started");

                    // Held until the blocking work returns, even after a timeout.
                    let task = tokio::task::spawn_blocking(move || {
                        let _permit = permit;
                        work(partition)
                    });
                    match tokio::time::timeout(timeout, task).await {
                        Ok(Ok(result)) => result,
                        Ok(Err(join_err)) => Err(Error::Worker {
                            partition: task_name,
                            message: join_err.to_string(),
                        }),
                        Err(_) => Err(Error::WorkerTimeout(task_name)),
                    }
                });
                (name, handle)
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for (partition, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(join_err) => Err(Error::Worker {
                    partition: partition.clone(),
                    message: join_err.to_string(),
                }),
            };
            if let Err(e) = &result {
                warn!(partition = %partition, "Partition failed and will not be retried: {}", e);
            }
            outcomes.push(PartitionOutcome { partition, result });
        }
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_outcomes_in_partition_order() {
        let fanout = FanOut::new(2, Duration::from_secs(5));
        let partitions = (0..6).map(|i| (format!("p{}", i), i)).collect();
        let outcomes = fanout
            .run(partitions, |i: u64| {
                std::thread::sleep(Duration::from_millis(10 * (6 - i)));
                Ok(i * 10)
            })
            .await;

        let values: Vec<u64> = outcomes
            .iter()
            .map(|o| *o.result.as_ref().unwrap())
            .collect();
        assert_eq!(values, [0, 10, 20, 30, 40, 50]);
        assert_eq!(outcomes[3].partition, "p3");
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (r, p) = (running.clone(), peak.clone());

        let fanout = FanOut::new(2, Duration::from_secs(5));
        let partitions = (0..8).map(|i| (i.to_string(), ())).collect();
        fanout
            .run(partitions, move |_| {
                let now = r.fetch_add(1, Ordering::SeqCst) + 1;
                p.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(20));
                r.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(running.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_timed_out_workers_keep_their_slot() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (r, p) = (running.clone(), peak.clone());

        let fanout = FanOut::new(1, Duration::from_millis(20));
        let partitions = vec![("a".to_string(), ()), ("b".to_string(), ())];
        let outcomes = fanout
            .run(partitions, move |_| {
                let now = r.fetch_add(1, Ordering::SeqCst) + 1;
                p.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(100));
                r.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(outcomes
            .iter()
            .all(|o| matches!(o.result, Err(Error::WorkerTimeout(_)))));
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failures_and_timeouts_are_isolated() {
        let fanout = FanOut::new(3, Duration::from_millis(50));
        let partitions = vec![
            ("ok".to_string(), 0u8),
            ("err".to_string(), 1),
            ("slow".to_string(), 2),
        ];
        let outcomes = fanout
            .run(partitions, |kind| match kind {
                0 => Ok("done"),
                1 => Err(Error::Verify("bad partition".to_string())),
                _ => {
                    std::thread::sleep(Duration::from_millis(300));
                    Ok("late")
                }
            })
            .await;

        assert_eq!(*outcomes[0].result.as_ref().unwrap(), "done");
        assert!(matches!(outcomes[1].result, Err(Error::Verify(_))));
        assert!(matches!(outcomes[2].result, Err(Error::WorkerTimeout(_))));
    }
}
