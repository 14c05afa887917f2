//! Low-confidence detections waiting for the user to confirm or dismiss

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::debug;

use crate::ingest::Candidate;
use crate::model::new_id;

/// A queued candidate with its queue id
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingCandidate {
    pub id: String,
    pub candidate: Candidate,
}

/// Bounded FIFO of unconfirmed candidates.
///
/// A newer notification for a tracking number already queued replaces the
/// older entry in place, keeping its id.
pub(crate) struct CandidateQueue {
    entries: Mutex<VecDeque<PendingCandidate>>,
    capacity: usize,
}

impl CandidateQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, VecDeque<PendingCandidate>> {
        // A poisoned queue still holds valid candidates
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue a candidate, returning its id
    pub(crate) fn push(&self, candidate: Candidate) -> String {
        let mut entries = self.entries();

        if let Some(existing) = entries.iter_mut().find(|e| {
            e.candidate.courier_id == candidate.courier_id
                && e.candidate.tracking_number == candidate.tracking_number
        }) {
            existing.candidate = candidate;
            return existing.id.clone();
        }

        if entries.len() >= self.capacity {
            if let Some(dropped) = entries.pop_front() {
                debug!(candidate_id = %dropped.id, "Candidate queue full, dropping oldest");
            }
        }

        let id = new_id();
        entries.push_back(PendingCandidate {
            id: id.clone(),
            candidate,
        });
        id
    }

    pub(crate) fn take(&self, id: &str) -> Option<PendingCandidate> {
        let mut entries = self.entries();
        let index = entries.iter().position(|e| e.id == id)?;
        entries.remove(index)
    }

    pub(crate) fn list(&self) -> Vec<PendingCandidate> {
        self.entries().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{now, PackageStatus};

    fn candidate(tracking: &str, hint: Option<PackageStatus>) -> Candidate {
        Candidate {
            courier_id: "cj".into(),
            tracking_number: tracking.into(),
            item_name: None,
            status_hint: hint,
            confidence: 0.55,
            received_at: now(),
            source_title: "CJ".into(),
        }
    }

    #[test]
    fn test_same_tracking_replaces_in_place() {
        let queue = CandidateQueue::new(10);
        let first = queue.push(candidate("111111111111", None));
        let again = queue.push(candidate("111111111111", Some(PackageStatus::InTransit)));
        assert_eq!(first, again);

        let listed = queue.list();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].candidate.status_hint, Some(PackageStatus::InTransit));
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let queue = CandidateQueue::new(2);
        let a = queue.push(candidate("111111111111", None));
        queue.push(candidate("222222222222", None));
        queue.push(candidate("333333333333", None));

        assert!(queue.take(&a).is_none());
        assert_eq!(queue.list().len(), 2);
    }
}
