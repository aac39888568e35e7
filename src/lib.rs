//! Session broker: mediates line-delimited JSON messages between collaborative
//! live-editing clients over TCP.
//!
//! See the module list below for the components described in the design:
//! frame codec, client sessions, the session registry, the pending-request
//! table, the event router, and the supervisor task that serializes
//! mutations of shared state.

pub mod action;
pub mod codec;
pub mod config;
pub mod error;
pub mod limits;
pub mod pending;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod session;
pub mod supervisor;
