//! Request and response payloads exchanged with clients.
//!
//! Every payload is a JSON object carried inside a length-prefixed frame
//! (see [`crate::connection::framing`]). A request envelope names exactly
//! one request kind:
//!
//! ```json
//! { "walk": { "locations": [{"x": 0, "y": 0}, {"x": 3000, "y": 0}], "lengths": [42] } }
//! { "one_to_one": { "origin": {"x": 0, "y": 0}, "destination": {"x": 3000, "y": 0} } }
//! { "one_to_all": { "origin": {"x": 0, "y": 0} } }
//! { "reset": {} }
//! ```
//!
//! Responses always carry a status and at most one numeric result:
//!
//! ```json
//! { "status": "OK", "shortest_path_length": 42 }
//! { "status": "ERROR", "error_message": "empty request envelope" }
//! ```

use crate::grid::Point;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A location as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub x: u32,
    pub y: u32,
}

impl From<Location> for Point {
    fn from(location: Location) -> Self {
        Point::new(location.x, location.y)
    }
}

impl From<Point> for Location {
    fn from(point: Point) -> Self {
        Self {
            x: point.x,
            y: point.y,
        }
    }
}

/// A measured walk: consecutive locations and the segment lengths between
/// them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Walk {
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default)]
    pub lengths: Vec<u64>,
}

impl Walk {
    pub fn points(&self) -> Vec<Point> {
        self.locations.iter().copied().map(Point::from).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneToOne {
    pub origin: Location,
    pub destination: Location,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneToAll {
    pub origin: Location,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Reset {}

/// The JSON object a request frame decodes into.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub walk: Option<Walk>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub one_to_one: Option<OneToOne>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub one_to_all: Option<OneToAll>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset: Option<Reset>,
}

/// Reasons a request payload could not be turned into a [`Request`].
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed request: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("empty request envelope")]
    Empty,
    #[error("request envelope names {0} request kinds, expected one")]
    Ambiguous(usize),
}

/// A decoded client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Walk(Walk),
    OneToOne(OneToOne),
    OneToAll(OneToAll),
    Reset,
}

impl Request {
    /// Decodes a request from a frame payload.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Malformed`] for invalid JSON,
    /// [`ProtocolError::Empty`] when no request kind is present and
    /// [`ProtocolError::Ambiguous`] when more than one is.
    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let envelope: RequestEnvelope = serde_json::from_slice(payload)?;
        Self::try_from(envelope)
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&RequestEnvelope::from(self.clone()))
    }

    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Request::Walk(_) => "walk",
            Request::OneToOne(_) => "one_to_one",
            Request::OneToAll(_) => "one_to_all",
            Request::Reset => "reset",
        }
    }

    /// Queries only read the graph and are handed to the worker pool.
    pub fn is_query(&self) -> bool {
        matches!(self, Request::OneToOne(_) | Request::OneToAll(_))
    }

    /// Whether the server closes the connection after answering.
    pub fn closes_session(&self) -> bool {
        matches!(self, Request::OneToAll(_))
    }
}

impl TryFrom<RequestEnvelope> for Request {
    type Error = ProtocolError;

    fn try_from(envelope: RequestEnvelope) -> Result<Self, Self::Error> {
        let RequestEnvelope {
            walk,
            one_to_one,
            one_to_all,
            reset,
        } = envelope;

        let present = usize::from(walk.is_some())
            + usize::from(one_to_one.is_some())
            + usize::from(one_to_all.is_some())
            + usize::from(reset.is_some());

        match present {
            0 => return Err(ProtocolError::Empty),
            1 => {}
            n => return Err(ProtocolError::Ambiguous(n)),
        }

        if let Some(walk) = walk {
            Ok(Request::Walk(walk))
        } else if let Some(query) = one_to_one {
            Ok(Request::OneToOne(query))
        } else if let Some(query) = one_to_all {
            Ok(Request::OneToAll(query))
        } else {
            Ok(Request::Reset)
        }
    }
}

impl From<Request> for RequestEnvelope {
    fn from(request: Request) -> Self {
        match request {
            Request::Walk(walk) => Self {
                walk: Some(walk),
                ..Self::default()
            },
            Request::OneToOne(query) => Self {
                one_to_one: Some(query),
                ..Self::default()
            },
            Request::OneToAll(query) => Self {
                one_to_all: Some(query),
                ..Self::default()
            },
            Request::Reset => Self {
                reset: Some(Reset {}),
                ..Self::default()
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Ok,
    Error,
}

/// The JSON object written back for every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shortest_path_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            status: Status::Ok,
            shortest_path_length: None,
            total_length: None,
            error_message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            error_message: Some(message.into()),
            ..Self::ok()
        }
    }

    pub fn shortest_path(length: u64) -> Self {
        Self {
            shortest_path_length: Some(length),
            ..Self::ok()
        }
    }

    pub fn total(length: u64) -> Self {
        Self {
            total_length: Some(length),
            ..Self::ok()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

impl From<ProtocolError> for Response {
    fn from(error: ProtocolError) -> Self {
        Response::error(error.to_string())
    }
}
