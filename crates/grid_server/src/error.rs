//! Error types for the grid server.

use crate::pool::PoolError;
use nix::errno::Errno;
use thiserror::Error;

/// Failures of the readiness multiplexer. All of them are fatal to the
/// reactor loop that observes them.
#[derive(Debug, Error)]
pub enum ReactorError {
    #[error("failed to create epoll instance: {0}")]
    Create(#[source] Errno),
    #[error("failed to register descriptor: {0}")]
    Register(#[source] Errno),
    #[error("failed to re-arm descriptor: {0}")]
    Rearm(#[source] Errno),
    #[error("failed to deregister descriptor: {0}")]
    Deregister(#[source] Errno),
    #[error("epoll_wait failed: {0}")]
    Wait(#[source] Errno),
}

/// Errors surfaced by [`GridServer`](crate::GridServer).
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Reactor error: {0}")]
    Reactor(#[from] ReactorError),
    #[error("Worker pool error: {0}")]
    Pool(#[from] PoolError),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Internal error: {0}")]
    Internal(String),
}
