//! Server orchestration.

pub mod core;

pub use self::core::GridServer;
