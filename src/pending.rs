//! Outstanding host-directed requests awaiting a response.
//!
//! Each entry pairs the requesting client with a timer task that, left
//! uncancelled, submits a [`SupervisorAction::Timeout`] after
//! [`crate::limits::REQUEST_TIMEOUT`]. The timer is spawned independently of
//! the supervisor's own loop so a slow or silent host never stalls routing
//! for anyone else.

use std::collections::HashMap;

use tokio::task::JoinHandle;

use crate::action::{ActionSender, SupervisorAction};
use crate::limits::REQUEST_TIMEOUT;
use crate::protocol::{ClientId, RequestId};

struct Entry {
    requester: ClientId,
    timer: JoinHandle<()>,
}

/// Table of requests currently waiting on a host response.
#[derive(Debug, Default)]
pub struct PendingTable {
    entries: HashMap<RequestId, Entry>,
    next_request_id: RequestId,
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry").field("requester", &self.requester).finish_non_exhaustive()
    }
}

impl PendingTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new request id, start its timeout timer, and record the
    /// requester. Returns the assigned id for the broker to stamp onto the
    /// outgoing host-directed frame.
    pub fn create(&mut self, requester: ClientId, actions: ActionSender) -> RequestId {
        let request_id = self.next_request_id;
        self.next_request_id += 1;

        let timer = tokio::spawn(async move {
            tokio::time::sleep(REQUEST_TIMEOUT).await;
            let _ = actions.send(SupervisorAction::Timeout { request_id });
        });

        self.entries.insert(request_id, Entry { requester, timer });
        request_id
    }

    /// Remove and cancel the entry for `request_id`, returning the original
    /// requester if it was still pending. Used both when the host's
    /// response arrives (the normal path) and when the timer itself fires
    /// (a no-op abort on an already-finished task, kept for symmetry).
    pub fn take(&mut self, request_id: RequestId) -> Option<ClientId> {
        let entry = self.entries.remove(&request_id)?;
        entry.timer.abort();
        Some(entry.requester)
    }

    /// Remove and cancel every request belonging to `requester`. Used when a
    /// client disconnects while one or more of its requests are still
    /// outstanding.
    pub fn take_for_requester(&mut self, requester: ClientId) -> Vec<RequestId> {
        let ids: Vec<RequestId> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.requester == requester)
            .map(|(id, _)| *id)
            .collect();
        for id in &ids {
            self.take(*id);
        }
        ids
    }

    /// Number of outstanding requests.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether any requests are outstanding.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn actions() -> (ActionSender, mpsc::UnboundedReceiver<SupervisorAction>) {
        mpsc::unbounded_channel()
    }

    #[tokio::test]
    async fn create_assigns_increasing_ids() {
        let mut table = PendingTable::new();
        let (tx, _rx) = actions();
        let a = table.create(1, tx.clone());
        let b = table.create(1, tx);
        assert_ne!(a, b);
        table.take(a);
        table.take(b);
    }

    #[tokio::test]
    async fn take_returns_requester_and_removes_entry() {
        let mut table = PendingTable::new();
        let (tx, _rx) = actions();
        let id = table.create(7, tx);
        assert_eq!(table.take(id), Some(7));
        assert_eq!(table.take(id), None);
    }

    #[tokio::test]
    async fn take_for_requester_sweeps_all_matching_entries() {
        let mut table = PendingTable::new();
        let (tx, _rx) = actions();
        let a = table.create(3, tx.clone());
        let b = table.create(3, tx.clone());
        let c = table.create(4, tx);
        let swept = table.take_for_requester(3);
        assert_eq!(swept.len(), 2);
        assert!(swept.contains(&a));
        assert!(swept.contains(&b));
        assert_eq!(table.len(), 1);
        table.take(c);
    }

    #[tokio::test(start_paused = true)]
    async fn uncancelled_timer_fires_timeout_action() {
        let mut table = PendingTable::new();
        let (tx, mut rx) = actions();
        let id = table.create(1, tx);

        tokio::time::advance(REQUEST_TIMEOUT + std::time::Duration::from_millis(1)).await;

        match rx.recv().await {
            Some(SupervisorAction::Timeout { request_id }) => assert_eq!(request_id, id),
            other => panic!("expected Timeout action, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_fires() {
        let mut table = PendingTable::new();
        let (tx, mut rx) = actions();
        let id = table.create(1, tx);
        table.take(id);

        tokio::time::advance(REQUEST_TIMEOUT + std::time::Duration::from_millis(1)).await;
        assert!(rx.try_recv().is_err());
    }
}
