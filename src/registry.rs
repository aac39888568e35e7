//! Connected-client table and host-election bookkeeping.
//!
//! `Registry` is owned exclusively by the supervisor task; every mutation
//! happens inline in that task's action loop, so no lock is needed even
//! though the struct is mutated from what is conceptually a shared-state
//! perspective.

use std::collections::HashMap;

use log::{debug, trace, warn};
use tokio::sync::mpsc;

use crate::protocol::ClientId;

/// State the registry keeps for one connected client.
#[derive(Debug)]
pub struct Client {
    /// Display name set by the client's handshake. Empty until then.
    name: String,
    /// Whether this client currently holds the host role.
    is_host: bool,
    /// Sending half of this client's bounded outbox.
    outbox: mpsc::Sender<Vec<u8>>,
}

impl Client {
    /// The client's display name, or an empty string before handshake.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the handshake has set a name yet.
    pub fn is_named(&self) -> bool {
        !self.name.is_empty()
    }

    /// Whether this client currently holds the host role.
    pub fn is_host(&self) -> bool {
        self.is_host
    }
}

/// Table of connected clients plus the single current host, if any.
#[derive(Debug, Default)]
pub struct Registry {
    clients: HashMap<ClientId, Client>,
    host: Option<ClientId>,
    next_client_id: ClientId,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly accepted connection and return its assigned id.
    ///
    /// The client starts unnamed and is never made host here; the caller
    /// (the supervisor's `Connect` action handler) is responsible for
    /// electing it host via [`Registry::elect_host`] when the registry was
    /// empty, exactly as [`Registry::remove`]'s caller elects a successor.
    pub fn connect(&mut self, outbox: mpsc::Sender<Vec<u8>>) -> ClientId {
        let id = self.next_client_id;
        self.next_client_id += 1;
        self.clients.insert(
            id,
            Client {
                name: String::new(),
                is_host: false,
                outbox,
            },
        );
        trace!("registry: client {id} connected, {} total", self.clients.len());
        id
    }

    /// Remove a client from the table. Returns its record if it was present.
    ///
    /// If the removed client was host, the host slot is cleared; the caller
    /// (the router) is responsible for electing a replacement and
    /// broadcasting the `new_host` frame.
    pub fn remove(&mut self, id: ClientId) -> Option<Client> {
        let client = self.clients.remove(&id)?;
        if self.host == Some(id) {
            self.host = None;
        }
        trace!("registry: client {id} removed, {} remaining", self.clients.len());
        Some(client)
    }

    /// Set a client's display name. No-op if the client is gone.
    pub fn set_name(&mut self, id: ClientId, name: impl Into<String>) {
        if let Some(client) = self.clients.get_mut(&id) {
            client.name = name.into();
        }
    }

    /// Look up a client's record.
    pub fn get(&self, id: ClientId) -> Option<&Client> {
        self.clients.get(&id)
    }

    /// Whether `id` is currently connected.
    pub fn contains(&self, id: ClientId) -> bool {
        self.clients.contains_key(&id)
    }

    /// The current host's id, if any.
    pub fn host_id(&self) -> Option<ClientId> {
        self.host
    }

    /// Whether `id` is the current host.
    pub fn is_host(&self, id: ClientId) -> bool {
        self.host == Some(id)
    }

    /// Whether the registry has no host right now.
    pub fn is_host_vacant(&self) -> bool {
        self.host.is_none()
    }

    /// Assign `id` as host unconditionally, clearing the flag on whoever
    /// held it before. Used for the first connection and for post-teardown
    /// re-election, where there is no competing claim to reject.
    pub fn elect_host(&mut self, id: ClientId) {
        if let Some(previous) = self.host {
            if let Some(client) = self.clients.get_mut(&previous) {
                client.is_host = false;
            }
        }
        if let Some(client) = self.clients.get_mut(&id) {
            client.is_host = true;
            self.host = Some(id);
            debug!("registry: {id} elected host");
        }
    }

    /// Attempt to claim the host role for `id` as part of its handshake.
    ///
    /// Succeeds (returns `true`) if no host is currently assigned. Fails
    /// (returns `false`, registry unchanged) if a host is already assigned,
    /// even if that host is `id` itself — callers should treat a losing
    /// claim as informational, not fatal, to the connection.
    pub fn claim_host(&mut self, id: ClientId) -> bool {
        if self.host.is_some() {
            return false;
        }
        self.elect_host(id);
        true
    }

    /// Pick an arbitrary remaining client to become the new host after the
    /// previous host disconnected. Returns the chosen id, or `None` if no
    /// clients remain. The registry must already have no host assigned.
    pub fn elect_successor(&mut self) -> Option<ClientId> {
        debug_assert!(self.host.is_none());
        let successor = *self.clients.keys().next()?;
        self.elect_host(successor);
        Some(successor)
    }

    /// Ids of every connected client except `exclude`.
    pub fn ids_except(&self, exclude: ClientId) -> impl Iterator<Item = ClientId> + '_ {
        self.clients.keys().copied().filter(move |&id| id != exclude)
    }

    /// Number of connected clients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether no clients are connected.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Enqueue `bytes` on `id`'s outbox without blocking. Drops the frame
    /// if the outbox is full or the client's reader/writer tasks have
    /// already exited; either case is harmless, since a full outbox means
    /// the client is already falling behind and a closed one means
    /// teardown is already in flight.
    pub fn send_to(&self, id: ClientId, bytes: Vec<u8>) {
        let Some(client) = self.clients.get(&id) else {
            return;
        };
        match client.outbox.try_send(bytes) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("registry: outbox full for client {id}, dropping frame");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                trace!("registry: outbox closed for client {id}, dropping frame");
            }
        }
    }

    /// Enqueue `bytes` on every client's outbox except `exclude`.
    pub fn broadcast_except(&self, exclude: ClientId, bytes: &[u8]) {
        for id in self.ids_except(exclude) {
            self.send_to(id, bytes.to_vec());
        }
    }
}
