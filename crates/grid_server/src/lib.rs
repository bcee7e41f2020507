//! # Grid Server - Online Walk Graph over TCP
//!
//! A multi-threaded TCP server that ingests measured walks, folds them into
//! an online spatial graph and answers distance queries against it while
//! further walks keep arriving.
//!
//! ## Design Philosophy
//!
//! The server separates I/O from computation:
//!
//! * **Readiness-driven I/O** - One epoll set, shared by a few reactor
//!   threads, multiplexes the listener and every connection
//! * **Fixed worker pool** - Path queries run on dedicated threads so a long
//!   search never stalls reads on other connections
//! * **One shared graph** - A single reader/writer lock; writers are walks
//!   and resets, readers are queries
//!
//! ## Architecture Overview
//!
//! ### Core Components
//!
//! * [`grid`] - Points, cells, averaged edges and the Dijkstra engine
//! * [`messaging`] - JSON request/response payloads and [`GridService`]
//! * [`connection`] - Length-prefixed framing and per-connection sessions
//! * [`reactor`] - The epoll loop and its entries
//! * [`pool`] - The worker pool
//! * [`server`] - [`GridServer`], which ties everything together
//!
//! ### Message Flow
//!
//! 1. A reactor thread is woken for a readable connection
//! 2. The session reads until a whole `[u32 BE length][JSON]` frame is buffered
//! 3. `walk` and `reset` are applied to the graph on the reactor thread
//! 4. `one_to_one` and `one_to_all` are handed to the worker pool
//! 5. Responses are queued per connection and written without blocking; a
//!    connection with unsent output is re-armed for writability only
//! 6. A `one_to_all` answer closes the connection once it has been sent
//!
//! ### Spatial Snapping
//!
//! Points are quantized onto 500-unit cells. A point whose neighboring cell
//! was created by a point at most 500 units away joins that cell instead of
//! its own, so nearby measurements share one graph node.
//!
//! ## Configuration
//!
//! The server is configured through the [`ServerConfig`] struct:
//!
//! * **Network settings** - Bind address and listen backlog
//! * **Threading** - Reactor and worker thread counts
//! * **Limits** - Largest accepted frame, events per wait, wait timeout
//!
//! ## Error Handling
//!
//! The server uses structured error types ([`ServerError`], [`ReactorError`])
//! to categorize failures:
//!
//! * **Client errors** - Malformed payloads get an `ERROR` response; broken
//!   framing closes the connection
//! * **Reactor errors** - epoll failures stop the server and are returned by
//!   [`GridServer::wait`]
//!
//! ## Example
//!
//! ```no_run
//! use grid_server::{GridServer, ServerConfig};
//!
//! let server = GridServer::bind(ServerConfig::default())?;
//! server.start()?;
//! // ... until asked to stop:
//! server.shutdown()?;
//! # Ok::<(), grid_server::ServerError>(())
//! ```

// Re-export core types for easy access
pub use config::ServerConfig;
pub use error::{ReactorError, ServerError};
pub use grid::{CellId, Point, SpatialGraph, StatsSnapshot};
pub use messaging::{GridService, Request, Response};
pub use server::GridServer;

pub mod config;
pub mod connection;
pub mod error;
pub mod grid;
pub mod messaging;
pub mod pool;
pub mod reactor;
pub mod server;
