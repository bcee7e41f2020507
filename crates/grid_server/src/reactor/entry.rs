//! The contract between the reactor and the objects it multiplexes.

use super::{Reactor, Token};
use crate::error::ReactorError;
use nix::sys::epoll::EpollFlags;
use std::os::fd::AsFd;
use std::sync::Arc;

/// Interest masks used for registrations. Every mask is one-shot: after an
/// event is delivered the descriptor stays disarmed until it is re-armed.
pub struct Interest;

impl Interest {
    /// Listening sockets.
    pub const ACCEPT: EpollFlags = EpollFlags::EPOLLIN.union(EpollFlags::EPOLLONESHOT);

    /// Connected streams; peer half-close is reported as well.
    pub const READABLE: EpollFlags = EpollFlags::EPOLLIN
        .union(EpollFlags::EPOLLRDHUP)
        .union(EpollFlags::EPOLLONESHOT);

    /// Connected streams with queued output. Input waits until it drains.
    pub const WRITABLE: EpollFlags = EpollFlags::EPOLLOUT.union(EpollFlags::EPOLLONESHOT);
}

/// Event flags delivered for one descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness(EpollFlags);

impl Readiness {
    pub fn new(flags: EpollFlags) -> Self {
        Self(flags)
    }

    pub fn flags(&self) -> EpollFlags {
        self.0
    }

    pub fn is_readable(&self) -> bool {
        self.0.contains(EpollFlags::EPOLLIN)
    }

    pub fn is_error(&self) -> bool {
        self.0.contains(EpollFlags::EPOLLERR)
    }

    pub fn is_writable(&self) -> bool {
        self.0.contains(EpollFlags::EPOLLOUT)
    }

    /// Both directions are gone; nothing can be read or written any more.
    pub fn is_hangup(&self) -> bool {
        self.0.contains(EpollFlags::EPOLLHUP)
    }

    /// The peer shut down its sending side. Buffered input and our own
    /// output may still be pending.
    pub fn is_peer_closed(&self) -> bool {
        self.0.contains(EpollFlags::EPOLLRDHUP)
    }
}

/// What the reactor does with an entry after its handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Re-arm for the next event.
    Keep,
    /// Deregister and close.
    Drop,
    /// Work was handed off; whoever finishes it calls
    /// [`Reactor::complete`] with the final disposition.
    Deferred,
}

/// Everything a handler gets to see about the event it is handling.
pub struct EventContext<'a> {
    pub token: Token,
    pub readiness: Readiness,
    pub reactor: &'a Arc<Reactor>,
}

/// A descriptor registered with the reactor.
pub trait Entry: AsFd + Send {
    fn interest(&self) -> EpollFlags {
        Interest::READABLE
    }

    /// Reacts to one readiness notification.
    ///
    /// Returning an error stops the reactor; per-connection failures should
    /// be turned into [`Disposition::Drop`] instead.
    fn handle_event(&mut self, event: EventContext<'_>) -> Result<Disposition, ReactorError>;
}
