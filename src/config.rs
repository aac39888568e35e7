//! Typed configuration surface, independent of the routing core.
//!
//! Kept separate from the CLI parser (in `main.rs`) so the broker's internals
//! never depend on `clap` directly.

use crate::limits::{DEFAULT_BIND, DEFAULT_PORT};

/// Everything the broker needs to start: where to listen and how loudly to
/// log.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP port to listen on.
    pub port: u16,
    /// Interface to bind.
    pub bind_address: String,
    /// Log filter level, derived from the CLI's repeatable `-v` flag.
    pub verbosity: log::LevelFilter,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind_address: DEFAULT_BIND.to_string(),
            verbosity: log::LevelFilter::Info,
        }
    }
}

impl Config {
    /// Build a `Config` from explicit fields, mapping a `-v` repeat count
    /// onto a log level starting at `info`.
    pub fn new(port: u16, bind_address: impl Into<String>, verbose_count: u8) -> Self {
        let verbosity = match verbose_count {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        };
        Self { port, bind_address: bind_address.into(), verbosity }
    }

    /// The address the listener should bind, as `host:port`.
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}
