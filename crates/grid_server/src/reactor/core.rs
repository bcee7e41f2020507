//! The readiness loop.
//!
//! One epoll instance is shared by every reactor thread. Registrations are
//! one-shot, so a descriptor is handed to exactly one thread per event and
//! its entry is never handled concurrently. Entries live in a registry
//! keyed by a monotonically increasing [`Token`]; the token, not the file
//! descriptor, travels through epoll, so a reused descriptor number can
//! never reach a retired entry.

use super::entry::{Disposition, Entry, EventContext, Readiness};
use crate::error::ReactorError;
use nix::errno::Errno;
use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::os::fd::AsFd;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, trace};

/// Registry key of an entry. Also the user data stored in epoll.
pub type Token = u64;

type SharedEntry = Arc<Mutex<Box<dyn Entry>>>;

pub struct Reactor {
    epoll: Epoll,
    entries: Mutex<HashMap<Token, SharedEntry>>,
    next_token: AtomicU64,
    shutdown: AtomicBool,
    fault: Mutex<Option<ReactorError>>,
    max_events: usize,
    poll_timeout_ms: isize,
}

impl std::fmt::Debug for Reactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reactor")
            .field("entries", &self.len())
            .field("shutdown", &self.is_shutdown())
            .field("max_events", &self.max_events)
            .field("poll_timeout_ms", &self.poll_timeout_ms)
            .finish()
    }
}

impl Reactor {
    /// Creates the epoll instance.
    ///
    /// `poll_timeout` bounds each wait so a shutdown request is noticed
    /// even when no descriptor becomes ready.
    pub fn new(max_events: usize, poll_timeout: Duration) -> Result<Self, ReactorError> {
        let epoll = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC).map_err(ReactorError::Create)?;

        Ok(Self {
            epoll,
            entries: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(1),
            shutdown: AtomicBool::new(false),
            fault: Mutex::new(None),
            max_events: max_events.max(1),
            poll_timeout_ms: isize::try_from(poll_timeout.as_millis()).unwrap_or(isize::MAX),
        })
    }

    /// Adds an entry to the registry and arms it with its interest mask.
    pub fn register(&self, entry: Box<dyn Entry>) -> Result<Token, ReactorError> {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let interest = entry.interest();
        let entry: SharedEntry = Arc::new(Mutex::new(entry));

        // Insert first: the event may fire on another thread before `add` returns.
        self.entries.lock().insert(token, entry.clone());

        let added = self
            .epoll
            .add(entry.lock().as_fd(), EpollEvent::new(interest, token));

        if let Err(errno) = added {
            self.entries.lock().remove(&token);
            return Err(ReactorError::Register(errno));
        }

        trace!(token, "entry registered");
        Ok(token)
    }

    /// Finishes an event whose handler returned [`Disposition::Deferred`].
    ///
    /// Called from whichever thread completed the work. Failures cannot be
    /// returned to that thread, so they are parked and reported by the next
    /// iteration of [`run`](Self::run).
    pub fn complete(&self, token: Token, disposition: Disposition) {
        let result = match disposition {
            Disposition::Deferred => Ok(()),
            Disposition::Drop => self.deregister(token),
            Disposition::Keep => match self.lookup(token) {
                Some(entry) => {
                    let guard = entry.lock();
                    self.rearm(token, &**guard)
                }
                None => Ok(()),
            },
        };

        if let Err(fault) = result {
            error!(token, error = %fault, "failed to complete deferred event");
            self.fault.lock().get_or_insert(fault);
            self.shutdown();
        }
    }

    /// Removes an entry from epoll and the registry. The entry is dropped,
    /// closing its descriptor, once the last handle to it goes away.
    pub fn deregister(&self, token: Token) -> Result<(), ReactorError> {
        let Some(entry) = self.entries.lock().remove(&token) else {
            return Ok(());
        };

        let guard = entry.lock();
        self.epoll
            .delete(guard.as_fd())
            .map_err(ReactorError::Deregister)?;

        trace!(token, "entry deregistered");
        Ok(())
    }

    /// Runs the readiness loop on the calling thread until [`shutdown`]
    /// is requested or a fault occurs.
    ///
    /// Several threads may run the loop over the same reactor.
    ///
    /// [`shutdown`]: Self::shutdown
    pub fn run(self: &Arc<Self>) -> Result<(), ReactorError> {
        let mut events = vec![EpollEvent::empty(); self.max_events];

        while !self.is_shutdown() {
            if let Some(fault) = self.fault.lock().take() {
                self.shutdown();
                return Err(fault);
            }

            let ready = match self.epoll.wait(&mut events, self.poll_timeout_ms) {
                Ok(ready) => ready,
                Err(Errno::EINTR) => continue,
                Err(errno) => {
                    self.shutdown();
                    return Err(ReactorError::Wait(errno));
                }
            };

            for event in &events[..ready] {
                if let Err(fault) = self.dispatch(event.data(), Readiness::new(event.events())) {
                    error!(error = %fault, "reactor fault");
                    self.shutdown();
                    return Err(fault);
                }
            }
        }

        // Another thread may have parked a fault right before shutdown.
        match self.fault.lock().take() {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }

    fn dispatch(self: &Arc<Self>, token: Token, readiness: Readiness) -> Result<(), ReactorError> {
        let Some(entry) = self.lookup(token) else {
            trace!(token, "event for retired entry");
            return Ok(());
        };

        let mut guard = entry.lock();
        let disposition = if readiness.is_error() {
            debug!(token, "error condition on descriptor");
            Disposition::Drop
        } else {
            let disposition = guard.handle_event(EventContext {
                token,
                readiness,
                reactor: self,
            })?;
            match disposition {
                Disposition::Keep if readiness.is_hangup() => Disposition::Drop,
                other => other,
            }
        };

        match disposition {
            Disposition::Keep => self.rearm(token, &**guard),
            Disposition::Deferred => Ok(()),
            Disposition::Drop => {
                drop(guard);
                self.deregister(token)
            }
        }
    }

    fn rearm(&self, token: Token, entry: &dyn Entry) -> Result<(), ReactorError> {
        let mut event = EpollEvent::new(entry.interest(), token);
        self.epoll
            .modify(entry.as_fd(), &mut event)
            .map_err(ReactorError::Rearm)
    }

    fn lookup(&self, token: Token) -> Option<SharedEntry> {
        self.entries.lock().get(&token).cloned()
    }

    /// Asks every thread running [`run`](Self::run) to return.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Number of registered entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
