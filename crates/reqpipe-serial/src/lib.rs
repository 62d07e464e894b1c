//! Per-key serial queues for the reqpipe runtime.
//!
//! Every request carrying the same serial key runs strictly in submission
//! order, one at a time; different keys proceed in parallel. A queue is
//! created lazily on first submission and keeps the options it was created
//! with — later submissions with different options inherit the original
//! queue's configuration.
//!
//! Clearing a queue drops its *pending* tasks (each is rejected with a
//! CONCURRENT error); the task currently running always finishes.

mod stats;

pub use stats::{SerialQueueStats, SerialStats};

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use reqpipe_core::{RequestError, Response, SerialOptions};
use tokio::sync::oneshot;

type TaskResult = Result<Arc<Response>, RequestError>;
type Job = Box<dyn FnOnce() -> BoxFuture<'static, TaskResult> + Send>;

struct QueuedTask {
    job: Job,
    responder: oneshot::Sender<TaskResult>,
}

struct QueueState {
    tasks: VecDeque<QueuedTask>,
    running: bool,
    options: SerialOptions,
    completed: u64,
    failed: u64,
    processing_micros: u64,
}

impl QueueState {
    fn new(options: SerialOptions) -> Self {
        Self {
            tasks: VecDeque::new(),
            running: false,
            options,
            completed: 0,
            failed: 0,
            processing_micros: 0,
        }
    }

    fn reject_pending(&mut self) -> usize {
        let drained: Vec<QueuedTask> = self.tasks.drain(..).collect();
        let count = drained.len();
        for task in drained {
            let _ = task
                .responder
                .send(Err(RequestError::concurrent("Serial queue cleared")));
        }
        count
    }
}

/// The set of per-key FIFO queues.
pub struct SerialQueues {
    queues: Arc<Mutex<HashMap<String, QueueState>>>,
}

impl SerialQueues {
    pub fn new() -> Self {
        Self {
            queues: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Submits a job under `key` and waits for its turn and its result.
    ///
    /// `options` only takes effect when this submission creates the queue.
    /// When the queue's `max_queue_size` is reached the submission fails
    /// immediately with "Serial queue is full".
    pub async fn submit<F, Fut>(
        &self,
        key: &str,
        options: Option<&SerialOptions>,
        job: F,
    ) -> TaskResult
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = TaskResult> + Send + 'static,
    {
        let (responder, receiver) = oneshot::channel();
        let boxed: Job = Box::new(move || Box::pin(job()));

        let start_dispatcher = {
            let mut queues = self.queues.lock();
            let queue = queues
                .entry(key.to_string())
                .or_insert_with(|| QueueState::new(options.cloned().unwrap_or_default()));

            if let Some(bound) = queue.options.max_queue_size {
                if queue.tasks.len() >= bound {
                    return Err(RequestError::concurrent("Serial queue is full"));
                }
            }

            queue.tasks.push_back(QueuedTask {
                job: boxed,
                responder,
            });
            if queue.running {
                false
            } else {
                queue.running = true;
                true
            }
        };

        if start_dispatcher {
            self.spawn_dispatcher(key.to_string());
        }

        match receiver.await {
            Ok(result) => result,
            Err(_) => Err(RequestError::concurrent("serial queue task was dropped")),
        }
    }

    /// Runs one queue to exhaustion, strictly in FIFO order.
    fn spawn_dispatcher(&self, key: String) {
        let queues = Arc::clone(&self.queues);
        tokio::spawn(async move {
            loop {
                let (task, timeout) = {
                    let mut map = queues.lock();
                    let Some(queue) = map.get_mut(&key) else { break };
                    match queue.tasks.pop_front() {
                        Some(task) => (task, queue.options.timeout),
                        None => {
                            queue.running = false;
                            break;
                        }
                    }
                };

                let started = Instant::now();
                let future = (task.job)();
                let result = match timeout {
                    Some(limit) => match tokio::time::timeout(limit, future).await {
                        Ok(result) => result,
                        Err(_) => Err(RequestError::timeout(format!(
                            "serial task timed out after {}ms",
                            limit.as_millis()
                        ))),
                    },
                    None => future.await,
                };
                let elapsed = started.elapsed();

                {
                    let mut map = queues.lock();
                    if let Some(queue) = map.get_mut(&key) {
                        queue.processing_micros += elapsed.as_micros() as u64;
                        if result.is_ok() {
                            queue.completed += 1;
                        } else {
                            queue.failed += 1;
                        }
                    }
                }

                // The submitter may have gone away; its slot in the order was
                // still honoured.
                let _ = task.responder.send(result);
            }
        });
    }

    /// Drops the pending tasks of one queue, rejecting each. The running task
    /// finishes. Returns whether the queue existed.
    pub fn clear(&self, key: &str) -> bool {
        let mut queues = self.queues.lock();
        match queues.get_mut(key) {
            Some(queue) => {
                let rejected = queue.reject_pending();
                if rejected > 0 {
                    tracing::debug!(key = %key, rejected, "serial queue cleared");
                }
                true
            }
            None => false,
        }
    }

    /// Clears and deletes one queue. Returns whether it existed.
    pub fn remove(&self, key: &str) -> bool {
        let mut queues = self.queues.lock();
        match queues.remove(key) {
            Some(mut queue) => {
                queue.reject_pending();
                true
            }
            None => false,
        }
    }

    /// Clears every queue, keeping their state.
    pub fn clear_all(&self) {
        let mut queues = self.queues.lock();
        for queue in queues.values_mut() {
            queue.reject_pending();
        }
    }

    /// Clears and deletes every queue.
    pub fn remove_all(&self) {
        let mut queues = self.queues.lock();
        for (_, mut queue) in queues.drain() {
            queue.reject_pending();
        }
    }

    /// Per-queue statistics, or `None` for an unknown key.
    pub fn queue_stats(&self, key: &str) -> Option<SerialQueueStats> {
        let queues = self.queues.lock();
        queues.get(key).map(stats::snapshot)
    }

    /// Aggregate statistics over every queue.
    pub fn stats(&self) -> SerialStats {
        let queues = self.queues.lock();
        let mut aggregate = SerialStats::default();
        for (key, queue) in queues.iter() {
            let snapshot = stats::snapshot(queue);
            aggregate.total_queues += 1;
            if queue.running {
                aggregate.active_queues += 1;
            }
            aggregate.total_pending_tasks += snapshot.pending_tasks;
            aggregate.total_completed_tasks += snapshot.completed_tasks;
            aggregate.total_failed_tasks += snapshot.failed_tasks;
            aggregate.queues.insert(key.clone(), snapshot);
        }
        aggregate.total_tasks = aggregate.total_pending_tasks as u64
            + aggregate.total_completed_tasks
            + aggregate.total_failed_tasks;
        aggregate
    }
}

impl Default for SerialQueues {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;
    use std::time::Duration;

    fn ok_after(
        delay: Duration,
        marker: &'static str,
        log: Arc<PlMutex<Vec<&'static str>>>,
    ) -> impl FnOnce() -> BoxFuture<'static, TaskResult> + Send + 'static {
        move || {
            Box::pin(async move {
                tokio::time::sleep(delay).await;
                log.lock().push(marker);
                Ok(Arc::new(Response::json(serde_json::json!(marker))))
            })
        }
    }

    #[tokio::test]
    async fn tasks_run_in_submission_order_despite_delay_inversion() {
        let queues = Arc::new(SerialQueues::new());
        let log = Arc::new(PlMutex::new(Vec::new()));

        let delays = [
            ("a", 100u64),
            ("b", 50),
            ("c", 200),
            ("d", 10),
            ("e", 150),
        ];
        let mut handles = Vec::new();
        for (marker, ms) in delays {
            let queues = Arc::clone(&queues);
            let job = ok_after(Duration::from_millis(ms), marker, Arc::clone(&log));
            handles.push(tokio::spawn(async move {
                queues.submit("k", None, job).await
            }));
            // Establish submission order deterministically.
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(log.lock().as_slice(), &["a", "b", "c", "d", "e"]);
        let stats = queues.stats();
        assert_eq!(stats.total_completed_tasks, 5);
    }

    #[tokio::test]
    async fn different_keys_run_in_parallel() {
        let queues = Arc::new(SerialQueues::new());
        let log = Arc::new(PlMutex::new(Vec::new()));

        let started = Instant::now();
        let mut handles = Vec::new();
        for key in ["one", "two", "three"] {
            let queues = Arc::clone(&queues);
            let job = ok_after(Duration::from_millis(80), "x", Arc::clone(&log));
            handles.push(tokio::spawn(
                async move { queues.submit(key, None, job).await },
            ));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // Serial execution would take ~240ms.
        assert!(started.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn clear_rejects_pending_but_not_running() {
        let queues = Arc::new(SerialQueues::new());
        let log = Arc::new(PlMutex::new(Vec::new()));

        let first = {
            let queues = Arc::clone(&queues);
            let job = ok_after(Duration::from_millis(100), "running", Arc::clone(&log));
            tokio::spawn(async move { queues.submit("k", None, job).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let second = {
            let queues = Arc::clone(&queues);
            let job = ok_after(Duration::ZERO, "pending", Arc::clone(&log));
            tokio::spawn(async move { queues.submit("k", None, job).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(queues.clear("k"));

        let err = second.await.unwrap().unwrap_err();
        assert_eq!(err.message, "Serial queue cleared");
        assert!(first.await.unwrap().is_ok());
        assert_eq!(log.lock().as_slice(), &["running"]);
    }

    #[tokio::test]
    async fn clear_of_unknown_queue_is_false() {
        let queues = SerialQueues::new();
        assert!(!queues.clear("does-not-exist"));
        assert!(!queues.remove("does-not-exist"));
    }

    #[tokio::test]
    async fn full_queue_rejects_submissions() {
        let queues = Arc::new(SerialQueues::new());
        let log = Arc::new(PlMutex::new(Vec::new()));
        let options = SerialOptions {
            max_queue_size: Some(1),
            timeout: None,
        };

        // Occupy the dispatcher.
        let running = {
            let queues = Arc::clone(&queues);
            let job = ok_after(Duration::from_millis(150), "slow", Arc::clone(&log));
            let options = options.clone();
            tokio::spawn(async move { queues.submit("k", Some(&options), job).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // One pending slot fits.
        let pending = {
            let queues = Arc::clone(&queues);
            let job = ok_after(Duration::ZERO, "queued", Arc::clone(&log));
            tokio::spawn(async move { queues.submit("k", None, job).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        // The next one hits the bound.
        let err = queues
            .submit("k", None, ok_after(Duration::ZERO, "rejected", Arc::clone(&log)))
            .await
            .unwrap_err();
        assert_eq!(err.message, "Serial queue is full");

        running.await.unwrap().unwrap();
        pending.await.unwrap().unwrap();
        assert_eq!(log.lock().as_slice(), &["slow", "queued"]);
    }

    #[tokio::test]
    async fn per_task_timeout_fails_the_task() {
        let queues = SerialQueues::new();
        let options = SerialOptions {
            max_queue_size: None,
            timeout: Some(Duration::from_millis(20)),
        };

        let err = queues
            .submit("k", Some(&options), || {
                Box::pin(async {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok(Arc::new(Response::json(serde_json::json!("late"))))
                }) as BoxFuture<'static, TaskResult>
            })
            .await
            .unwrap_err();
        assert!(err.is_timeout());

        let stats = queues.queue_stats("k").unwrap();
        assert_eq!(stats.failed_tasks, 1);
    }

    #[tokio::test]
    async fn queue_config_is_bound_at_creation() {
        let queues = Arc::new(SerialQueues::new());
        let log = Arc::new(PlMutex::new(Vec::new()));
        let strict = SerialOptions {
            max_queue_size: Some(0),
            timeout: None,
        };

        // Creates the queue with no bound.
        queues
            .submit("k", None, ok_after(Duration::ZERO, "first", Arc::clone(&log)))
            .await
            .unwrap();

        // Later options are ignored; the unbounded original config wins.
        queues
            .submit(
                "k",
                Some(&strict),
                ok_after(Duration::ZERO, "second", Arc::clone(&log)),
            )
            .await
            .unwrap();
        assert_eq!(log.lock().len(), 2);
    }

    #[tokio::test]
    async fn stats_aggregate_across_queues() {
        let queues = Arc::new(SerialQueues::new());
        let log = Arc::new(PlMutex::new(Vec::new()));

        for key in ["a", "b"] {
            queues
                .submit(key, None, ok_after(Duration::from_millis(5), "x", Arc::clone(&log)))
                .await
                .unwrap();
        }

        let stats = queues.stats();
        assert_eq!(stats.total_queues, 2);
        assert_eq!(stats.total_completed_tasks, 2);
        assert_eq!(stats.total_failed_tasks, 0);
        assert_eq!(stats.total_pending_tasks, 0);
        assert!(stats.queues.contains_key("a"));
        assert!(stats.queues["a"].avg_processing >= Duration::from_millis(4));

        queues.remove_all();
        assert_eq!(queues.stats().total_queues, 0);
    }
}
