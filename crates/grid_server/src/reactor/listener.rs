//! The listening socket as a reactor entry.
//!
//! When the process runs out of descriptors a pending connection cannot be
//! accepted, and the level-triggered listener would be reported ready again
//! at once. The acceptor keeps one spare descriptor open for that case: it
//! releases it, accepts and closes the oldest pending connection, and
//! reopens the spare, so the backlog keeps moving instead of spinning.

use super::entry::{Disposition, Entry, EventContext, Interest};
use crate::connection::{ConnectionContext, Session};
use crate::error::ReactorError;
use nix::errno::Errno;
use nix::sys::epoll::EpollFlags;
use std::fs::File;
use std::io;
use std::net::TcpListener;
use std::os::fd::{AsFd, BorrowedFd};
use std::sync::Arc;
use tracing::{debug, warn};

/// Connections shed between two warnings.
const SHED_LOG_EVERY: u64 = 100;

/// Accepts connections and registers a [`Session`] for each.
pub struct Acceptor {
    listener: TcpListener,
    context: Arc<ConnectionContext>,
    reserve: Option<File>,
    shed: u64,
}

impl Acceptor {
    /// `listener` must already be in non-blocking mode.
    pub fn new(listener: TcpListener, context: Arc<ConnectionContext>) -> Self {
        Self {
            listener,
            context,
            reserve: open_reserve(),
            shed: 0,
        }
    }

    /// Connections closed unserved because descriptors ran out.
    pub fn shed_count(&self) -> u64 {
        self.shed
    }

    /// Frees the spare descriptor, accepts and closes one pending connection,
    /// and takes the spare back.
    ///
    /// Returns false when there was no spare or nothing to accept.
    fn shed_pending(&mut self) -> bool {
        let Some(reserve) = self.reserve.take() else {
            return false;
        };
        drop(reserve);

        let shed = match self.listener.accept() {
            Ok((stream, peer)) => {
                drop(stream);
                self.shed += 1;
                if self.shed == 1 || self.shed % SHED_LOG_EVERY == 0 {
                    warn!(
                        %peer,
                        total = self.shed,
                        "⚠️ out of file descriptors, closing new connections"
                    );
                }
                true
            }
            Err(_) => false,
        };

        self.reserve = open_reserve();
        shed
    }
}

fn open_reserve() -> Option<File> {
    File::open("/dev/null").ok()
}

fn is_descriptor_exhaustion(e: &io::Error) -> bool {
    matches!(
        e.raw_os_error(),
        Some(code) if code == Errno::EMFILE as i32 || code == Errno::ENFILE as i32
    )
}

impl AsFd for Acceptor {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.listener.as_fd()
    }
}

impl Entry for Acceptor {
    fn interest(&self) -> EpollFlags {
        Interest::ACCEPT
    }

    fn handle_event(&mut self, event: EventContext<'_>) -> Result<Disposition, ReactorError> {
        loop {
            let (stream, peer) = match self.listener.accept() {
                Ok(accepted) => accepted,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if is_descriptor_exhaustion(&e) => {
                    if self.shed_pending() {
                        continue;
                    }
                    if self.reserve.is_none() {
                        self.reserve = open_reserve();
                    }
                    break;
                }
                Err(e) => {
                    // ECONNABORTED and friends concern one connection only.
                    warn!("⚠️ accept failed: {}", e);
                    break;
                }
            };

            if let Err(e) = stream.set_nonblocking(true) {
                warn!(%peer, "failed to make connection non-blocking: {}", e);
                continue;
            }
            let _ = stream.set_nodelay(true);

            let token = event
                .reactor
                .register(Box::new(Session::new(stream, peer, self.context.clone())))?;
            debug!(%peer, token, "🔗 connection accepted");
        }

        Ok(Disposition::Keep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::framing::DEFAULT_MAX_FRAME_LEN;
    use crate::messaging::GridService;
    use crate::pool::WorkerPool;
    use std::io::Read;
    use std::net::TcpStream;
    use std::time::Duration;

    fn acceptor() -> Acceptor {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let context = Arc::new(ConnectionContext {
            service: Arc::new(GridService::new()),
            pool: Arc::new(WorkerPool::new(1).unwrap()),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        });
        Acceptor::new(listener, context)
    }

    #[test]
    fn test_descriptor_exhaustion_is_recognized() {
        assert!(is_descriptor_exhaustion(&io::Error::from_raw_os_error(
            Errno::EMFILE as i32
        )));
        assert!(is_descriptor_exhaustion(&io::Error::from_raw_os_error(
            Errno::ENFILE as i32
        )));
        assert!(!is_descriptor_exhaustion(&io::Error::from_raw_os_error(
            Errno::ECONNABORTED as i32
        )));
        assert!(!is_descriptor_exhaustion(&io::ErrorKind::WouldBlock.into()));
    }

    #[test]
    fn test_pending_connection_is_shed_and_spare_restored() {
        let mut acceptor = acceptor();
        assert!(acceptor.reserve.is_some());

        let mut client = TcpStream::connect(acceptor.listener.local_addr().unwrap()).unwrap();
        client
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();

        // The connection may take a moment to reach the accept queue.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !acceptor.shed_pending() {
            assert!(std::time::Instant::now() < deadline, "nothing to shed");
            std::thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(acceptor.shed_count(), 1);
        assert!(acceptor.reserve.is_some());

        let mut buf = [0u8; 1];
        match client.read(&mut buf) {
            Ok(0) => {}
            Err(e) if e.kind() == io::ErrorKind::ConnectionReset => {}
            other => panic!("expected the shed connection to be closed, got {other:?}"),
        }

        // Nothing left: shedding reports false and keeps the spare.
        assert!(!acceptor.shed_pending());
        assert!(acceptor.reserve.is_some());
    }
}
