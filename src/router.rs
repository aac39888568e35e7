//! Frame classification and routing policy.
//!
//! Every function here takes the registry and pending table by mutable
//! reference and applies one inbound event's worth of side effects
//! (enqueuing outbound frames, mutating host/pending state). None of them
//! touch sockets directly; that is the connection tasks' job.

use log::{debug, info, warn};
use serde_json::{json, Value};

use crate::action::ActionSender;
use crate::pending::PendingTable;
use crate::protocol::{
    self, error_frame, new_host_frame, no_host_error, request_id as read_request_id,
    timeout_error, unnamed_sender_error, user_joined_frame, user_left_frame, ClientId,
    BROADCAST_EVENTS, EVENT_HANDSHAKE,
};
use crate::registry::Registry;

fn send_one(registry: &Registry, id: ClientId, msg: &Value) {
    registry.send_to(id, crate::codec::encode_frame(msg));
}

fn broadcast_one(registry: &Registry, exclude: ClientId, msg: &Value) {
    registry.broadcast_except(exclude, &crate::codec::encode_frame(msg));
}

/// Stamp `from_id` and `name` onto a relayed message without disturbing its
/// other fields.
fn stamp_sender(mut msg: Value, sender: ClientId, name: &str) -> Value {
    if let Some(obj) = msg.as_object_mut() {
        obj.insert("from_id".to_string(), json!(sender));
        obj.insert("name".to_string(), json!(name));
    }
    msg
}

/// Handle one complete inbound JSON frame from `sender`.
pub fn handle_frame(
    registry: &mut Registry,
    pending: &mut PendingTable,
    actions: &ActionSender,
    sender: ClientId,
    msg: Value,
) {
    let Some(event) = protocol::event_name(&msg).map(str::to_string) else {
        send_one(registry, sender, &error_frame("message is missing an 'event' field"));
        return;
    };

    if event == EVENT_HANDSHAKE {
        handle_handshake(registry, sender, &msg);
        return;
    }

    let Some(client) = registry.get(sender) else {
        return;
    };
    if !client.is_named() {
        send_one(registry, sender, &unnamed_sender_error());
        return;
    }
    let name = client.name().to_string();
    let has_request_id = read_request_id(&msg).is_some();

    if BROADCAST_EVENTS.contains(&event.as_str()) {
        let stamped = stamp_sender(msg, sender, &name);
        broadcast_one(registry, sender, &stamped);
    } else if registry.is_host(sender) && !has_request_id {
        // The host has no further host to request from; a non-broadcast
        // event it sends without a correlation id is routed as a broadcast
        // instead (see the self-request open question in the design notes).
        let stamped = stamp_sender(msg, sender, &name);
        broadcast_one(registry, sender, &stamped);
    } else if has_request_id {
        handle_host_response(registry, pending, sender, msg);
    } else {
        handle_host_request(registry, pending, actions, sender, &name, msg);
    }
}

fn handle_handshake(registry: &mut Registry, sender: ClientId, msg: &Value) {
    if registry.get(sender).is_some_and(|c| c.is_named()) {
        debug!("router: client {sender} sent a second handshake, ignoring");
        return;
    }
    let name = msg.get("name").and_then(Value::as_str).filter(|n| !n.is_empty());
    let Some(name) = name else {
        send_one(registry, sender, &error_frame("handshake requires a non-empty 'name' field"));
        return;
    };
    registry.set_name(sender, name);
    let requested_host = msg.get("host").and_then(Value::as_bool).unwrap_or(false);

    // Host election already happened at connect time (the first client to
    // connect becomes host before it ever handshakes, per invariant 1 — host
    // is never vacant while any client is connected). A `host: true` claim
    // from a client that wasn't first is rejected, never granted here.
    let is_host = registry.is_host(sender);
    if is_host {
        info!("router: client {sender} ('{name}') handshook as host");
    } else if requested_host {
        send_one(registry, sender, &error_frame("a host is already assigned"));
        warn!("router: client {sender} ('{name}') claimed host but one is already assigned, rejecting");
    } else {
        info!("router: client {sender} ('{name}') handshook");
    }

    broadcast_one(registry, sender, &user_joined_frame(sender, name, is_host));
}

fn handle_host_request(
    registry: &mut Registry,
    pending: &mut PendingTable,
    actions: &ActionSender,
    sender: ClientId,
    name: &str,
    msg: Value,
) {
    let Some(host_id) = registry.host_id() else {
        send_one(registry, sender, &no_host_error());
        return;
    };

    let request_id = pending.create(sender, actions.clone());
    let mut stamped = stamp_sender(msg, sender, name);
    if let Some(obj) = stamped.as_object_mut() {
        obj.insert("request_id".to_string(), json!(request_id));
    }
    send_one(registry, host_id, &stamped);
}

fn handle_host_response(registry: &mut Registry, pending: &mut PendingTable, sender: ClientId, msg: Value) {
    // The broker does not validate that `sender` is actually the host: a
    // `request_id` that doesn't match a pending entry is simply dropped,
    // which is the only way a non-host's "response" could ever be acted on.
    let request_id = read_request_id(&msg).expect("caller only dispatches here when present");
    let Some(requester) = pending.take(request_id) else {
        debug!("router: client {sender} cited unknown or already-settled request_id {request_id}");
        return;
    };
    send_one(registry, requester, &msg);
}

/// Handle a malformed (non-JSON or non-object) frame. Non-fatal: the
/// connection stays open, the frame is simply dropped.
pub fn handle_parse_error(registry: &Registry, sender: ClientId, reason: &str) {
    warn!("router: client {sender} sent an unparsable frame: {reason}");
    send_one(registry, sender, &error_frame("could not parse message"));
}

/// Tear down a disconnected client: cancel its outstanding requests, remove
/// it from the registry, and migrate the host role if it held it.
pub fn handle_disconnect(registry: &mut Registry, pending: &mut PendingTable, client: ClientId) {
    let swept = pending.take_for_requester(client);
    if !swept.is_empty() {
        info!("router: client {client} disconnected with {} pending request(s) outstanding", swept.len());
    }
    let Some(removed) = registry.remove(client) else {
        return;
    };
    if !removed.is_named() {
        info!("router: unnamed client {client} disconnected");
        return;
    }
    info!("router: client {client} ('{}') disconnected", removed.name());
    broadcast_one(registry, client, &user_left_frame(client, removed.name()));

    if registry.is_host_vacant() {
        if let Some(new_host) = registry.elect_successor() {
            let name = registry.get(new_host).map(|c| c.name().to_string()).unwrap_or_default();
            info!("router: client {new_host} ('{name}') elected host after {client} disconnected");
            let frame = new_host_frame(new_host, &name);
            broadcast_one(registry, new_host, &frame);
            send_one(registry, new_host, &frame);
        }
    }
}

/// Handle a frame that exceeded the maximum size: notify the offending
/// connection best-effort, then tear it down exactly like any other
/// disconnect.
pub fn handle_oversize(registry: &mut Registry, pending: &mut PendingTable, client: ClientId) {
    warn!("router: client {client} sent an oversize frame, disconnecting");
    send_one(registry, client, &error_frame("frame exceeds maximum size"));
    handle_disconnect(registry, pending, client);
}

/// Handle a pending host-directed request timing out with no response.
pub fn handle_timeout(registry: &Registry, pending: &mut PendingTable, request_id: crate::protocol::RequestId) {
    if let Some(requester) = pending.take(request_id) {
        warn!("router: request {request_id} from client {requester} timed out with no host response");
        send_one(registry, requester, &timeout_error());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    /// Connect `n` clients the same way the supervisor's `Connect` action
    /// handler does: the first client is elected host immediately, before
    /// any handshake, matching invariant 1.
    fn registry_with(n: usize) -> (Registry, Vec<mpsc::Receiver<Vec<u8>>>, Vec<ClientId>) {
        let mut registry = Registry::new();
        let mut rxs = Vec::new();
        let mut ids = Vec::new();
        for _ in 0..n {
            let was_vacant = registry.is_host_vacant();
            let (tx, rx) = mpsc::channel(crate::limits::OUTBOX_CAPACITY);
            let id = registry.connect(tx);
            if was_vacant {
                registry.elect_host(id);
            }
            ids.push(id);
            rxs.push(rx);
        }
        (registry, rxs, ids)
    }

    fn actions() -> ActionSender {
        mpsc::unbounded_channel().0
    }

    fn recv_json(rx: &mut mpsc::Receiver<Vec<u8>>) -> Value {
        let bytes = rx.try_recv().expect("expected a queued frame");
        serde_json::from_slice(&bytes[..bytes.len() - 1]).unwrap()
    }

    #[test]
    fn first_handshake_becomes_host_without_asking() {
        let (mut registry, mut rxs, ids) = registry_with(1);
        handle_handshake(&mut registry, ids[0], &json!({"event": "handshake", "name": "alice"}));
        assert!(registry.is_host(ids[0]));
        // The sole client is the broadcast recipient list for its own join,
        // i.e. nobody but itself, so nothing should be queued.
        assert!(rxs[0].try_recv().is_err());
    }

    #[test]
    fn second_client_handshake_does_not_steal_host() {
        let (mut registry, mut rxs, ids) = registry_with(2);
        handle_handshake(&mut registry, ids[0], &json!({"event": "handshake", "name": "alice"}));
        handle_handshake(&mut registry, ids[1], &json!({"event": "handshake", "name": "bob", "host": true}));
        assert!(registry.is_host(ids[0]));
        assert!(!registry.is_host(ids[1]));
        let joined = recv_json(&mut rxs[0]);
        assert_eq!(joined["event"], "user_joined");
        // bob's queue has alice's user_joined first, then his own rejection.
        let alice_joined = recv_json(&mut rxs[1]);
        assert_eq!(alice_joined["event"], "user_joined");
        let rejection = recv_json(&mut rxs[1]);
        assert_eq!(rejection["event"], "error");
    }

    #[test]
    fn second_handshake_on_a_named_session_is_ignored() {
        let (mut registry, mut rxs, ids) = registry_with(1);
        handle_handshake(&mut registry, ids[0], &json!({"event": "handshake", "name": "alice"}));
        let _ = rxs[0].try_recv();

        handle_handshake(&mut registry, ids[0], &json!({"event": "handshake", "name": "mallory"}));

        assert_eq!(registry.get(ids[0]).unwrap().name(), "alice");
        assert!(rxs[0].try_recv().is_err());
    }

    #[test]
    fn unnamed_sender_is_rejected_for_non_handshake_events() {
        let (mut registry, mut rxs, ids) = registry_with(2);
        let mut pending = PendingTable::new();
        let acts = actions();
        handle_frame(&mut registry, &mut pending, &acts, ids[0], json!({"event": "cursor_move", "x": 1}));
        let reply = recv_json(&mut rxs[0]);
        assert_eq!(reply["event"], "error");
        assert!(rxs[1].try_recv().is_err());
    }

    #[test]
    fn broadcast_event_reaches_everyone_but_sender() {
        let (mut registry, mut rxs, ids) = registry_with(3);
        let mut pending = PendingTable::new();
        let acts = actions();
        registry.set_name(ids[0], "alice");
        registry.set_name(ids[1], "bob");
        registry.set_name(ids[2], "carol");

        handle_frame(&mut registry, &mut pending, &acts, ids[0], json!({"event": "cursor_move", "x": 5}));

        assert!(rxs[0].try_recv().is_err());
        let to_bob = recv_json(&mut rxs[1]);
        assert_eq!(to_bob["event"], "cursor_move");
        assert_eq!(to_bob["from_id"], ids[0]);
        assert_eq!(to_bob["name"], "alice");
        let to_carol = recv_json(&mut rxs[2]);
        assert_eq!(to_carol["from_id"], ids[0]);
    }

    #[test]
    fn host_request_forwards_to_host_with_request_id() {
        let (mut registry, mut rxs, ids) = registry_with(2);
        let mut pending = PendingTable::new();
        let acts = actions();
        registry.set_name(ids[0], "alice");
        registry.set_name(ids[1], "bob");
        registry.elect_host(ids[1]);

        handle_frame(&mut registry, &mut pending, &acts, ids[0], json!({"event": "request_files"}));

        let forwarded = recv_json(&mut rxs[1]);
        assert_eq!(forwarded["event"], "request_files");
        assert_eq!(forwarded["from_id"], ids[0]);
        assert!(forwarded["request_id"].is_u64());
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn host_request_with_no_host_connected_errors_immediately() {
        // Build the registry with the raw `connect` API rather than
        // `registry_with`, which replicates the supervisor's invariant-
        // preserving election: this test exercises the router's defensive
        // "no host" branch directly, a state the supervisor's `Connect`
        // handler never actually lets a live sender observe.
        let mut registry = Registry::new();
        let (tx, mut rx) = mpsc::channel(crate::limits::OUTBOX_CAPACITY);
        let id = registry.connect(tx);
        let mut pending = PendingTable::new();
        let acts = actions();
        registry.set_name(id, "alice");
        assert!(registry.is_host_vacant());

        handle_frame(&mut registry, &mut pending, &acts, id, json!({"event": "request_files"}));

        let reply = recv_json(&mut rx);
        assert_eq!(reply["event"], "error");
        assert!(pending.is_empty());
    }

    #[test]
    fn host_self_request_is_treated_as_broadcast() {
        let (mut registry, mut rxs, ids) = registry_with(2);
        let mut pending = PendingTable::new();
        let acts = actions();
        registry.set_name(ids[0], "alice");
        registry.set_name(ids[1], "bob");
        registry.elect_host(ids[0]);

        handle_frame(&mut registry, &mut pending, &acts, ids[0], json!({"event": "request_files"}));

        assert!(pending.is_empty());
        let received = recv_json(&mut rxs[1]);
        assert_eq!(received["event"], "request_files");
        assert!(rxs[0].try_recv().is_err());
    }

    #[test]
    fn host_response_is_forwarded_to_original_requester() {
        let (mut registry, mut rxs, ids) = registry_with(2);
        let mut pending = PendingTable::new();
        let acts = actions();
        registry.set_name(ids[0], "alice");
        registry.set_name(ids[1], "bob");
        registry.elect_host(ids[1]);

        handle_frame(&mut registry, &mut pending, &acts, ids[0], json!({"event": "request_files"}));
        let forwarded = recv_json(&mut rxs[1]);
        let rid = forwarded["request_id"].as_u64().unwrap();

        handle_frame(
            &mut registry,
            &mut pending,
            &acts,
            ids[1],
            json!({"event": "response_files", "request_id": rid, "files": ["a.rs"]}),
        );

        let response = recv_json(&mut rxs[0]);
        assert_eq!(response["event"], "response_files");
        assert_eq!(response["files"][0], "a.rs");
        assert!(pending.is_empty());
    }

    #[test]
    fn response_with_unmatched_request_id_is_silently_dropped() {
        let (mut registry, mut rxs, ids) = registry_with(2);
        let mut pending = PendingTable::new();
        let acts = actions();
        registry.set_name(ids[0], "alice");
        registry.set_name(ids[1], "bob");
        registry.elect_host(ids[1]);

        handle_frame(
            &mut registry,
            &mut pending,
            &acts,
            ids[0],
            json!({"event": "response_files", "request_id": 999}),
        );
        assert!(rxs[0].try_recv().is_err());
        assert!(rxs[1].try_recv().is_err());
    }

    #[test]
    fn response_from_a_non_host_sender_is_still_routed_if_it_matches_a_pending_entry() {
        // The broker never validates that the sender of a `request_id`-bearing
        // frame is actually the host (§4.4 rule 4): it only matters whether the
        // id happens to match a pending entry.
        let (mut registry, mut rxs, ids) = registry_with(2);
        let mut pending = PendingTable::new();
        let acts = actions();
        registry.set_name(ids[0], "alice");
        registry.set_name(ids[1], "bob");
        registry.elect_host(ids[1]);

        let rid = pending.create(ids[0], acts.clone());
        let _ = rxs[1].try_recv();

        handle_frame(
            &mut registry,
            &mut pending,
            &acts,
            ids[0],
            json!({"event": "response_files", "request_id": rid, "files": []}),
        );

        let response = recv_json(&mut rxs[0]);
        assert_eq!(response["event"], "response_files");
        assert!(pending.is_empty());
    }

    #[test]
    fn disconnect_migrates_host_to_a_remaining_client() {
        let (mut registry, mut rxs, ids) = registry_with(2);
        let mut pending = PendingTable::new();
        registry.set_name(ids[0], "alice");
        registry.set_name(ids[1], "bob");
        registry.elect_host(ids[0]);

        handle_disconnect(&mut registry, &mut pending, ids[0]);

        assert!(registry.is_host(ids[1]));
        let left = recv_json(&mut rxs[1]);
        assert_eq!(left["event"], "user_left");
        let new_host = recv_json(&mut rxs[1]);
        assert_eq!(new_host["event"], "new_host");
        assert_eq!(new_host["host_id"], ids[1]);
    }

    #[test]
    fn disconnect_cancels_its_own_pending_requests() {
        let (mut registry, mut rxs, ids) = registry_with(2);
        let mut pending = PendingTable::new();
        let acts = actions();
        registry.set_name(ids[0], "alice");
        registry.set_name(ids[1], "bob");
        registry.elect_host(ids[1]);
        handle_frame(&mut registry, &mut pending, &acts, ids[0], json!({"event": "request_files"}));
        let _ = rxs[1].try_recv();

        handle_disconnect(&mut registry, &mut pending, ids[0]);
        assert!(pending.is_empty());
    }

    #[test]
    fn timeout_notifies_the_original_requester() {
        let (mut registry, mut rxs, ids) = registry_with(2);
        let mut pending = PendingTable::new();
        let acts = actions();
        let rid = pending.create(ids[0], acts);

        handle_timeout(&registry, &mut pending, rid);

        let reply = recv_json(&mut rxs[0]);
        assert_eq!(reply["event"], "error");
        assert!(rxs[1].try_recv().is_err());
    }
}
