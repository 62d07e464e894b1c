//! Serial queue statistics snapshots.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::QueueState;

/// Point-in-time view of one queue.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SerialQueueStats {
    pub pending_tasks: usize,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    pub avg_processing: Duration,
    pub running: bool,
}

/// Aggregate view over every queue.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SerialStats {
    pub total_queues: usize,
    pub active_queues: usize,
    pub total_tasks: u64,
    pub total_pending_tasks: usize,
    pub total_completed_tasks: u64,
    pub total_failed_tasks: u64,
    pub queues: BTreeMap<String, SerialQueueStats>,
}

pub(crate) fn snapshot(queue: &QueueState) -> SerialQueueStats {
    let processed = queue.completed + queue.failed;
    SerialQueueStats {
        pending_tasks: queue.tasks.len(),
        completed_tasks: queue.completed,
        failed_tasks: queue.failed,
        avg_processing: if processed == 0 {
            Duration::ZERO
        } else {
            Duration::from_micros(queue.processing_micros / processed)
        },
        running: queue.running,
    }
}
