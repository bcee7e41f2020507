//! Wire payloads and their dispatch onto the graph.

pub mod router;
pub mod types;

pub use router::GridService;
pub use types::{
    Location, OneToAll, OneToOne, ProtocolError, Request, RequestEnvelope, Reset, Response,
    Status, Walk,
};
