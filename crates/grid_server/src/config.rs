//! Server configuration types and defaults.

use crate::connection::framing::DEFAULT_MAX_FRAME_LEN;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Configuration structure for the grid server.
///
/// Contains the network settings, the thread counts for the reactor and the
/// worker pool, and the limits applied to every connection.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// The socket address to bind the server to
    pub bind_address: SocketAddr,

    /// Threads running the readiness loop
    pub reactor_threads: usize,

    /// Threads executing path queries
    pub worker_threads: usize,

    /// Largest accepted request payload, in bytes
    pub max_frame_len: usize,

    /// Events fetched per `epoll_wait`
    pub max_events: usize,

    /// Upper bound on one `epoll_wait`, in milliseconds
    pub poll_timeout_ms: u64,

    /// Listen backlog
    pub backlog: i32,
}

impl ServerConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from((Ipv4Addr::LOCALHOST, 4321)),
            reactor_threads: 2,
            worker_threads: num_cpus::get(),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            max_events: 64,
            poll_timeout_ms: 100,
            backlog: 1024,
        }
    }
}
