//! The single task that owns all shared broker state.
//!
//! Connection tasks and timers never touch [`Registry`] or [`PendingTable`]
//! directly; they submit a [`SupervisorAction`] and this loop applies it.
//! Serializing every mutation through one task removes the need for a lock
//! around multi-step updates like host migration, which touches several
//! clients' records atomically from the caller's point of view.

use log::info;
use tokio::sync::mpsc;

use crate::action::{ActionSender, SupervisorAction};
use crate::pending::PendingTable;
use crate::registry::Registry;
use crate::router;

/// Run the supervisor loop until `actions_rx` is closed (every connection
/// task and the accept loop has dropped its sender). `actions` is this same
/// channel's sending half, handed to the router so it can create pending
/// requests with their own timeout timers.
pub async fn run(actions: ActionSender, mut actions_rx: mpsc::UnboundedReceiver<SupervisorAction>) {
    let mut registry = Registry::new();
    let mut pending = PendingTable::new();

    while let Some(action) = actions_rx.recv().await {
        apply(&mut registry, &mut pending, &actions, action);
    }
    info!("supervisor: action channel closed, shutting down");
}

fn apply(registry: &mut Registry, pending: &mut PendingTable, actions: &ActionSender, action: SupervisorAction) {
    match action {
        SupervisorAction::Connect { outbox, reply } => {
            let was_vacant = registry.is_host_vacant();
            let id = registry.connect(outbox);
            if was_vacant {
                // First client to connect: elect it host immediately, before
                // its handshake even arrives, so invariant 1 (host is never
                // vacant while clients is non-empty) holds between every
                // supervisor step, not just after a successful handshake.
                registry.elect_host(id);
                info!("supervisor: client {id} connected and is the sole client, electing host");
            }
            // The accept loop has already moved on if this fails; nothing to
            // clean up, since the connection task will hit a closed outbox
            // and tear itself down.
            let _ = reply.send(id);
        }
        SupervisorAction::Frame { sender, msg } => {
            router::handle_frame(registry, pending, actions, sender, msg);
        }
        SupervisorAction::ParseError { sender, reason } => {
            router::handle_parse_error(registry, sender, &reason);
        }
        SupervisorAction::Disconnect { client } => {
            router::handle_disconnect(registry, pending, client);
        }
        SupervisorAction::Oversize { client } => {
            router::handle_oversize(registry, pending, client);
        }
        SupervisorAction::Timeout { request_id } => {
            router::handle_timeout(registry, pending, request_id);
        }
    }
}
