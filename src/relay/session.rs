//! Relay Session

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime};
use tracing::{debug, info};

/// One of the two copy paths of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// client -> target
    Upstream,
    /// target -> client
    Downstream,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upstream => f.write_str("upstream"),
            Direction::Downstream => f.write_str("downstream"),
        }
    }
}

/// Live state shared by the two copy tasks of a spliced client/target pair.
///
/// Each direction owns its own counter, so the tasks never contend on the
/// same value.
#[derive(Debug)]
pub struct RelaySession {
    pub session_id: String,
    pub client_addr: SocketAddr,
    pub target_addr: SocketAddr,
    opened_at: SystemTime,
    clock: Instant,
    upstream: AtomicU64,
    downstream: AtomicU64,
}

/// Snapshot of a finished session
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionStats {
    pub session_id: String,
    pub client_addr: SocketAddr,
    pub target_addr: SocketAddr,
    pub opened_at: SystemTime,
    pub duration_ms: u64,
    pub bytes_up: u64,
    pub bytes_down: u64,
    pub total_bytes: u64,
}

/// How a single client connection ended
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    /// The peer address could not be read
    Rejected { reason: String },
    /// The client IP is not on the allowlist
    Blocked { client_ip: String },
    /// Dialing the target failed or timed out
    DialFailed { error: String },
    /// Both directions finished and both connections were closed
    Completed(ConnectionStats),
}

impl RelaySession {
    pub fn new(session_id: String, client_addr: SocketAddr, target_addr: SocketAddr) -> Self {
        debug!(
            session_id = %session_id,
            "Splicing {} <-> {}",
            client_addr,
            target_addr
        );

        Self {
            session_id,
            client_addr,
            target_addr,
            opened_at: SystemTime::now(),
            clock: Instant::now(),
            upstream: AtomicU64::new(0),
            downstream: AtomicU64::new(0),
        }
    }

    fn counter(&self, direction: Direction) -> &AtomicU64 {
        match direction {
            Direction::Upstream => &self.upstream,
            Direction::Downstream => &self.downstream,
        }
    }

    /// Count `n` bytes written to the far side in `direction`
    pub fn record(&self, direction: Direction, n: usize) {
        self.counter(direction).fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Bytes delivered so far in `direction`
    pub fn transferred(&self, direction: Direction) -> u64 {
        self.counter(direction).load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> ConnectionStats {
        let bytes_up = self.transferred(Direction::Upstream);
        let bytes_down = self.transferred(Direction::Downstream);

        ConnectionStats {
            session_id: self.session_id.clone(),
            client_addr: self.client_addr,
            target_addr: self.target_addr,
            opened_at: self.opened_at,
            duration_ms: self.clock.elapsed().as_millis() as u64,
            bytes_up,
            bytes_down,
            total_bytes: bytes_up + bytes_down,
        }
    }

    /// Emit the closing event and return the final snapshot
    pub fn finish(&self) -> ConnectionStats {
        let stats = self.snapshot();
        info!(
            session_id = %stats.session_id,
            client_addr = %stats.client_addr,
            target_addr = %stats.target_addr,
            duration_ms = stats.duration_ms,
            bytes_up = stats.bytes_up,
            bytes_down = stats.bytes_down,
            "Relay session closed"
        );
        stats
    }
}
