//! Per-connection lifecycle: the reader and writer tasks described in §4.3.
//!
//! Each accepted `TcpStream` is split into owned halves. The reader decodes
//! frames and submits [`SupervisorAction`]s; the writer drains a bounded
//! outbox into the socket. Neither task touches the registry directly — all
//! routing decisions are made by the supervisor task that owns it.

use log::{debug, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};

use crate::action::{ActionSender, SupervisorAction};
use crate::codec::{CodecError, Frame, FrameDecoder};
use crate::limits::OUTBOX_CAPACITY;
use crate::protocol::ClientId;

/// Accept one connection: register it with the supervisor, then spawn its
/// reader and writer tasks. Returns once both tasks are running; it does not
/// wait for the connection to close.
pub async fn spawn(stream: TcpStream, actions: ActionSender) {
    let (outbox_tx, outbox_rx) = mpsc::channel::<Vec<u8>>(OUTBOX_CAPACITY);
    let (reply_tx, reply_rx) = oneshot::channel();

    if actions.send(SupervisorAction::Connect { outbox: outbox_tx, reply: reply_tx }).is_err() {
        // Supervisor already gone (shutting down); drop the connection.
        return;
    }

    let Ok(id) = reply_rx.await else {
        return;
    };

    let (read_half, write_half) = stream.into_split();
    tokio::spawn(reader_loop(id, read_half, actions.clone()));
    tokio::spawn(writer_loop(id, write_half, outbox_rx));
}

/// Decode frames from the socket and submit them to the supervisor until EOF,
/// a read error, or an oversize frame ends the connection.
async fn reader_loop(id: ClientId, mut reader: tokio::net::tcp::OwnedReadHalf, actions: ActionSender) {
    let mut decoder = FrameDecoder::new();
    let mut buf = [0u8; 64 * 1024];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                debug!("session {id}: EOF");
                break;
            }
            Ok(n) => n,
            Err(e) => {
                debug!("session {id}: read error: {e}");
                break;
            }
        };

        match decoder.feed(&buf[..n]) {
            Ok(frames) => {
                for frame in frames {
                    match frame {
                        Frame::Message(msg) => {
                            if actions.send(SupervisorAction::Frame { sender: id, msg }).is_err() {
                                return;
                            }
                        }
                        Frame::ParseError(reason) => {
                            if actions
                                .send(SupervisorAction::ParseError { sender: id, reason })
                                .is_err()
                            {
                                return;
                            }
                        }
                    }
                }
            }
            Err(CodecError::Oversize) => {
                warn!("session {id}: oversize frame, tearing down connection");
                let _ = actions.send(SupervisorAction::Oversize { client: id });
                return;
            }
        }
    }

    let _ = actions.send(SupervisorAction::Disconnect { client: id });
}

/// Drain the outbox into the socket until it closes or a write fails.
async fn writer_loop(
    id: ClientId,
    mut writer: tokio::net::tcp::OwnedWriteHalf,
    mut outbox: mpsc::Receiver<Vec<u8>>,
) {
    while let Some(bytes) = outbox.recv().await {
        if let Err(e) = writer.write_all(&bytes).await {
            debug!("session {id}: write error: {e}");
            return;
        }
    }
    debug!("session {id}: outbox closed, writer exiting");
}
