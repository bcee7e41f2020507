//! Per-connection protocol handling.
//!
//! A [`Session`] reassembles length-prefixed frames from a non-blocking
//! stream, decodes them into requests, and queues the responses for
//! non-blocking writes.

pub mod framing;
pub mod session;

pub use framing::{FrameError, FrameReader, FrameState, FrameWriter, ReadOutcome, WriteOutcome};
pub use session::Session;

use crate::messaging::GridService;
use crate::pool::WorkerPool;
use std::sync::Arc;

/// State shared by every session of a server.
#[derive(Debug)]
pub struct ConnectionContext {
    pub service: Arc<GridService>,
    pub pool: Arc<WorkerPool>,
    pub max_frame_len: usize,
}
