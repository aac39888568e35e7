//! Fatal startup errors.
//!
//! Routing-time failures never propagate as `Result`s — they are absorbed
//! locally and turned into observable state changes (see `router`). Only the
//! handful of ways the broker can fail to *start* get a typed error, so
//! `main` can print a clear diagnostic and pick an exit path without
//! downcasting an `anyhow::Error`.

use std::net::AddrParseError;

/// Errors that can prevent the broker from starting.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The configured bind address / port did not parse as a socket address.
    #[error("invalid listen address: {0}")]
    InvalidAddress(#[from] AddrParseError),

    /// Binding the TCP listener failed (port in use, permission denied, ...).
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The address the broker tried to bind.
        addr: String,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },
}
