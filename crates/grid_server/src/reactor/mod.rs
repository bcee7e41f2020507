//! Readiness-driven I/O multiplexing over epoll.
//!
//! The reactor owns the registry of entries (the listening socket and one
//! session per connection) and drives them from one or more threads.

pub mod core;
pub mod entry;
pub mod listener;

pub use self::core::{Reactor, Token};
pub use entry::{Disposition, Entry, EventContext, Interest, Readiness};
pub use listener::Acceptor;
