//! Broker-wide constants governing backpressure and resource limits.

use std::time::Duration;

/// Maximum size of a single inbound frame, including its `\n` terminator.
pub const MAX_FRAME_SIZE: usize = 5 * 1024 * 1024;

/// Capacity of each client's outbound queue. Enqueue beyond this drops the
/// newest frame rather than blocking the router.
pub const OUTBOX_CAPACITY: usize = 64;

/// How long a host-directed request waits for a response before the
/// requester is told the request timed out.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Default TCP port the broker listens on.
pub const DEFAULT_PORT: u16 = 8080;

/// Default bind address (all interfaces).
pub const DEFAULT_BIND: &str = "0.0.0.0";
