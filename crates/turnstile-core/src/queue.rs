//! Two-lane in-memory job queue.
//!
//! Design:
//! - Lanes hold lightweight [`QueueEntry`] values; the job record in the
//!   store stays the single source of truth for state.
//! - One mutex guards both lanes, so "high before default" is decided under
//!   the same lock that removes the entry. An entry is handed to exactly one
//!   puller.
//! - Wakeups go through a single [`Notify`]; pushes never hold the lock
//!   while notifying.

use std::collections::VecDeque;

use serde_json::Value;
use tokio::sync::{Mutex, Notify};

use crate::domain::{JobId, JobRecord, Lane};
use crate::fingerprint::Fingerprint;

/// What a worker needs to run one job. Everything else is loaded from the
/// store when the entry is picked up.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub job_id: JobId,
    pub task: String,
    pub args: Value,
    pub fingerprint: Fingerprint,
    pub lane: Lane,
}

impl QueueEntry {
    pub fn from_record(record: &JobRecord) -> Self {
        Self {
            job_id: record.id,
            task: record.task.clone(),
            args: record.args.clone(),
            fingerprint: record.fingerprint.clone(),
            lane: record.lane,
        }
    }
}

#[derive(Default)]
struct Lanes {
    default: VecDeque<QueueEntry>,
    high: VecDeque<QueueEntry>,
}

impl Lanes {
    fn lane_mut(&mut self, lane: Lane) -> &mut VecDeque<QueueEntry> {
        match lane {
            Lane::Default => &mut self.default,
            Lane::High => &mut self.high,
        }
    }

    fn pop_next(&mut self) -> Option<QueueEntry> {
        // Strict priority: high is drained completely before default.
        self.high
            .pop_front()
            .or_else(|| self.default.pop_front())
    }

    fn pending_in(&self, lane: Lane) -> usize {
        match lane {
            Lane::Default => self.default.len(),
            Lane::High => self.high.len(),
        }
    }

    fn is_empty(&self) -> bool {
        self.high.is_empty() && self.default.is_empty()
    }
}

/// The "default" + "high" queue pair shared by dispatcher and workers.
#[derive(Default)]
pub struct QueuePair {
    lanes: Mutex<Lanes>,
    notify: Notify,
}

impl QueuePair {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, entry: QueueEntry) {
        {
            let mut lanes = self.lanes.lock().await;
            lanes.lane_mut(entry.lane).push_back(entry);
        }
        // Notify outside the lock.
        self.notify.notify_one();
    }

    /// Take the next entry, waiting if both lanes are empty.
    pub async fn pull(&self) -> QueueEntry {
        loop {
            {
                let mut lanes = self.lanes.lock().await;
                if let Some(entry) = lanes.pop_next() {
                    // notify_one stores at most one permit, so pass the
                    // wakeup along while work remains.
                    if !lanes.is_empty() {
                        self.notify.notify_one();
                    }
                    return entry;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Pending entry counts in `Lane::ALL` order.
    pub async fn pending(&self) -> [(Lane, usize); 2] {
        let lanes = self.lanes.lock().await;
        Lane::ALL.map(|lane| (lane, lanes.pending_in(lane)))
    }

    /// Drop every pending entry in `lane` and hand them back so the caller
    /// can settle the matching records.
    pub async fn purge(&self, lane: Lane) -> Vec<QueueEntry> {
        let mut lanes = self.lanes.lock().await;
        std::mem::take(lanes.lane_mut(lane)).into()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::fingerprint::fingerprint;

    fn entry(label: &str, lane: Lane) -> QueueEntry {
        QueueEntry {
            job_id: JobId::new(),
            task: label.to_string(),
            args: json!({}),
            fingerprint: fingerprint(label, &json!({}), 1),
            lane,
        }
    }

    #[tokio::test]
    async fn fifo_within_a_lane() {
        let queue = QueuePair::new();
        queue.push(entry("a", Lane::Default)).await;
        queue.push(entry("b", Lane::Default)).await;
        queue.push(entry("c", Lane::Default)).await;

        assert_eq!(queue.pull().await.task, "a");
        assert_eq!(queue.pull().await.task, "b");
        assert_eq!(queue.pull().await.task, "c");
    }

    #[tokio::test]
    async fn high_lane_drains_first() {
        let queue = QueuePair::new();
        queue.push(entry("slow", Lane::Default)).await;
        queue.push(entry("urgent1", Lane::High)).await;
        queue.push(entry("urgent2", Lane::High)).await;

        assert_eq!(queue.pull().await.task, "urgent1");
        assert_eq!(queue.pull().await.task, "urgent2");
        assert_eq!(queue.pull().await.task, "slow");
    }

    #[tokio::test]
    async fn pull_waits_until_push_arrives() {
        let queue = Arc::new(QueuePair::new());

        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pull().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.push(entry("late", Lane::Default)).await;

        let got = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.task, "late");
    }

    #[tokio::test]
    async fn entries_are_handed_out_exactly_once() {
        let queue = Arc::new(QueuePair::new());
        let mut expected = HashSet::new();
        for i in 0..4 {
            let e = entry(&format!("t{i}"), Lane::Default);
            expected.insert(e.job_id);
            queue.push(e).await;
        }

        let mut pullers = Vec::new();
        for _ in 0..2 {
            let queue = Arc::clone(&queue);
            pullers.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                for _ in 0..2 {
                    seen.push(queue.pull().await.job_id);
                }
                seen
            }));
        }

        let mut seen = HashSet::new();
        for p in pullers {
            for id in p.await.unwrap() {
                // A duplicate hand-out would trip this.
                assert!(seen.insert(id));
            }
        }
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn pending_counts_by_lane() {
        let queue = QueuePair::new();
        queue.push(entry("a", Lane::Default)).await;
        queue.push(entry("b", Lane::Default)).await;
        queue.push(entry("c", Lane::High)).await;

        assert_eq!(
            queue.pending().await,
            [(Lane::Default, 2), (Lane::High, 1)]
        );
    }

    #[tokio::test]
    async fn purge_drains_only_the_named_lane() {
        let queue = QueuePair::new();
        queue.push(entry("a", Lane::Default)).await;
        queue.push(entry("b", Lane::Default)).await;
        queue.push(entry("c", Lane::High)).await;

        let dropped = queue.purge(Lane::Default).await;
        assert_eq!(dropped.len(), 2);
        assert_eq!(
            queue.pending().await,
            [(Lane::Default, 0), (Lane::High, 1)]
        );
    }
}
