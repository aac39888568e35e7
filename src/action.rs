//! Actions submitted to the supervisor task.
//!
//! Every mutation of shared broker state — connects, inbound frames,
//! disconnects, and request timeouts — flows through this channel so that
//! the supervisor task can apply them one at a time.

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::protocol::{ClientId, RequestId};

/// One unit of work for the supervisor loop.
#[derive(Debug)]
pub enum SupervisorAction {
    /// A new TCP connection was accepted and its reader/writer tasks are
    /// ready to start. `outbox` is the sending half of that connection's
    /// bounded queue; `reply` carries back the assigned client id.
    Connect {
        /// Sending half of the new connection's outbox.
        outbox: mpsc::Sender<Vec<u8>>,
        /// Channel used to hand the assigned id back to the accept loop.
        reply: oneshot::Sender<ClientId>,
    },
    /// A complete JSON frame arrived from `sender`.
    Frame {
        /// The client that sent the frame.
        sender: ClientId,
        /// The parsed message body.
        msg: Value,
    },
    /// `sender` produced a frame that was not valid JSON. Logged, not fatal.
    ParseError {
        /// The client whose stream contained the bad frame.
        sender: ClientId,
        /// Description of the parse failure.
        reason: String,
    },
    /// `client`'s connection ended (EOF or a read/write error). Idempotent:
    /// a client already removed is a no-op.
    Disconnect {
        /// The client to tear down.
        client: ClientId,
    },
    /// `client` sent a frame exceeding [`crate::limits::MAX_FRAME_SIZE`].
    /// Fatal: an `error` frame is sent best-effort, then the session is torn
    /// down exactly as for [`SupervisorAction::Disconnect`].
    Oversize {
        /// The client whose frame was too large.
        client: ClientId,
    },
    /// The 5-second timer for `request_id` fired without a response.
    Timeout {
        /// The request that timed out.
        request_id: RequestId,
    },
}

/// Handle used by connection tasks and timers to submit actions.
///
/// Unbounded by design: submitting a routing action must never block or
/// drop, unlike per-client outbox enqueue, which is bounded and
/// best-effort.
pub type ActionSender = mpsc::UnboundedSender<SupervisorAction>;
