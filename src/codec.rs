//! Newline-delimited JSON frame codec.
//!
//! Inbound frames are accumulated until a `\n` terminator is seen; the bytes
//! up to (but excluding) the terminator must parse as a single JSON object.
//! Outbound frames are a serialized JSON object followed by one `\n`.
//!
//! JSON strings cannot contain a raw, unescaped newline byte, so a literal
//! `\n` anywhere in the stream is always a frame boundary — the decoder never
//! needs to understand JSON structure to find frame edges.

use serde_json::Value;

use crate::limits::MAX_FRAME_SIZE;

/// Result of decoding one line from the inbound byte stream.
#[derive(Debug)]
pub enum Frame {
    /// A line that parsed as a JSON object.
    Message(Value),
    /// A line that was not valid JSON. Dropped, connection stays open.
    ParseError(String),
}

/// Error returned when a connection must be torn down.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// A frame (including its terminator) exceeded [`MAX_FRAME_SIZE`].
    #[error("frame exceeds maximum size of {MAX_FRAME_SIZE} bytes")]
    Oversize,
}

/// Incremental line-oriented JSON decoder.
///
/// Feed raw socket bytes via [`FrameDecoder::feed`] and drain complete
/// frames. Partial data at end-of-stream (no trailing `\n`) is discarded:
/// the last, unterminated fragment of a closed connection is never
/// delivered.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes read from the socket and extract all complete frames.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Oversize`] as soon as the buffered, unterminated
    /// line would exceed [`MAX_FRAME_SIZE`]. The caller must tear down the
    /// connection when this happens; the decoder is not usable afterward.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Frame>, CodecError> {
        self.buf.extend_from_slice(bytes);
        if self.buf.len() > MAX_FRAME_SIZE {
            return Err(CodecError::Oversize);
        }

        let mut frames = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = &line[..line.len() - 1]; // drop the terminator
            frames.push(decode_line(line));
        }
        Ok(frames)
    }
}

fn decode_line(line: &[u8]) -> Frame {
    match serde_json::from_slice::<Value>(line) {
        Ok(value) if value.is_object() => Frame::Message(value),
        Ok(_) => Frame::ParseError("frame is not a JSON object".to_string()),
        Err(e) => Frame::ParseError(e.to_string()),
    }
}

/// Encode a JSON object as one outbound frame: the serialized object plus a
/// single `\n` terminator.
pub fn encode_frame(value: &Value) -> Vec<u8> {
    let mut bytes = serde_json::to_vec(value).expect("broker-constructed JSON cannot fail to serialize");
    bytes.push(b'\n');
    bytes
}
