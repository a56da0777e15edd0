//! The worker pool: claims tasks and runs handlers under deadlines.
//!
//! One process runs one `Worker`. Claims pick queues in a weighted-random
//! order, so over time each queue receives worker attention proportional to
//! its configured weight while none starves.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::jobs::handlers::Handlers;
use crate::jobs::queue::TaskQueue;
use crate::jobs::task::Task;

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Max tasks in flight at once
    pub concurrency: usize,
    /// Queue name -> weight for the claim order
    pub weights: HashMap<String, u32>,
    /// Sleep when no task is ready
    pub poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let mut weights = HashMap::new();
        weights.insert("critical".to_string(), 6);
        weights.insert("crawl".to_string(), 4);
        weights.insert("vectorize".to_string(), 3);
        weights.insert("default".to_string(), 2);
        weights.insert("maintenance".to_string(), 1);

        Self {
            concurrency: 10,
            weights,
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Queue consumer with a bounded in-flight pool.
pub struct Worker {
    queue: TaskQueue,
    handlers: Arc<Handlers>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(queue: TaskQueue, handlers: Arc<Handlers>, config: WorkerConfig) -> Self {
        Self {
            queue,
            handlers,
            config,
        }
    }

    /// Run until the shutdown token fires, then drain in-flight tasks.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            concurrency = self.config.concurrency,
            queues = ?self.config.weights,
            "worker started"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            let order = weighted_order(&self.config.weights);
            match self.queue.claim(&order).await {
                Ok(Some(task)) => {
                    debug!(task_id = %task.id, queue = %task.queue, "dispatching task");
                    let queue = self.queue.clone();
                    let handlers = self.handlers.clone();
                    let task_cancel = shutdown.child_token();

                    tokio::spawn(async move {
                        let _permit = permit;
                        process_task(queue, handlers, task, task_cancel).await;
                    });
                }
                Ok(None) => {
                    drop(permit);
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
                Err(e) => {
                    drop(permit);
                    error!(error = %e, "failed to claim task");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }

        // Wait for every in-flight task to finish. Their cancellation tokens
        // have fired, so crawls stop at the next iteration boundary.
        info!("worker draining in-flight tasks");
        let _ = semaphore
            .acquire_many(self.config.concurrency as u32)
            .await;
        info!("worker stopped");
    }
}

/// Run one claimed task under its deadline and record the outcome.
async fn process_task(
    queue: TaskQueue,
    handlers: Arc<Handlers>,
    task: Task,
    cancel: CancellationToken,
) {
    let deadline = task.timeout();
    let outcome = tokio::time::timeout(deadline, handlers.dispatch(&task, &cancel)).await;

    match outcome {
        Ok(Ok(())) => {
            debug!(task_id = %task.id, "task succeeded");
            if let Err(e) = queue.mark_succeeded(task.id).await {
                error!(task_id = %task.id, error = %e, "failed to mark task succeeded");
            }
        }
        Ok(Err(failure)) => {
            warn!(task_id = %task.id, error = %failure.message, retryable = failure.retryable, "task failed");
            if let Err(e) = queue
                .mark_failed(task.id, &failure.message, failure.retryable)
                .await
            {
                error!(task_id = %task.id, error = %e, "failed to mark task failed");
            }
        }
        Err(_elapsed) => {
            warn!(task_id = %task.id, timeout = ?deadline, "task timed out");
            if let Err(e) = queue
                .mark_failed(task.id, &format!("timed out after {deadline:?}"), true)
                .await
            {
                error!(task_id = %task.id, error = %e, "failed to mark task failed");
            }
        }
    }
}

/// Weighted-random queue order: sample without replacement, so higher
/// weights come first more often but every queue always appears.
pub fn weighted_order(weights: &HashMap<String, u32>) -> Vec<String> {
    let mut rng = rand::thread_rng();
    let mut remaining: Vec<(String, u32)> = weights
        .iter()
        .filter(|(_, weight)| **weight > 0)
        .map(|(queue, weight)| (queue.clone(), *weight))
        .collect();

    let mut order = Vec::with_capacity(remaining.len());
    while !remaining.is_empty() {
        let total: u32 = remaining.iter().map(|(_, weight)| *weight).sum();
        let mut pick = rng.gen_range(0..total);
        let index = remaining
            .iter()
            .position(|(_, weight)| {
                if pick < *weight {
                    true
                } else {
                    pick -= *weight;
                    false
                }
            })
            .unwrap_or(0);
        order.push(remaining.swap_remove(index).0);
    }

    order
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights() -> HashMap<String, u32> {
        let mut weights = HashMap::new();
        weights.insert("heavy".to_string(), 9);
        weights.insert("light".to_string(), 1);
        weights
    }

    #[test]
    fn test_weighted_order_contains_all_queues() {
        let order = weighted_order(&weights());
        assert_eq!(order.len(), 2);
        assert!(order.contains(&"heavy".to_string()));
        assert!(order.contains(&"light".to_string()));
    }

    #[test]
    fn test_weighted_order_prefers_heavy_queues() {
        let weights = weights();
        let mut heavy_first = 0;
        for _ in 0..1000 {
            if weighted_order(&weights)[0] == "heavy" {
                heavy_first += 1;
            }
        }
        // Expected ~900 of 1000; far from that means the sampling is broken.
        assert!(heavy_first > 750, "heavy first only {heavy_first}/1000");
    }

    #[test]
    fn test_zero_weight_queue_is_skipped() {
        let mut weights = weights();
        weights.insert("disabled".to_string(), 0);
        let order = weighted_order(&weights);
        assert!(!order.contains(&"disabled".to_string()));
    }

    #[test]
    fn test_default_config_matches_deployment_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.concurrency, 10);
        assert_eq!(config.weights.get("critical"), Some(&6));
        assert_eq!(config.weights.get("crawl"), Some(&4));
        assert_eq!(config.weights.get("vectorize"), Some(&3));
        assert_eq!(config.weights.get("default"), Some(&2));
        assert_eq!(config.weights.get("maintenance"), Some(&1));
    }
}
