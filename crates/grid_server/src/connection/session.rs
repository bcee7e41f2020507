//! One client connection as a reactor entry.
//!
//! Frames are read on the reactor thread. Walks and resets are applied
//! there directly; queries are handed to the worker pool and the entry
//! stays disarmed until the worker has queued the response and called
//! [`Reactor::complete`]. Because of that, requests on one connection are
//! answered strictly in order.
//!
//! Responses are never written in blocking mode. Whatever the socket does
//! not take at once stays queued, the entry is re-armed for writability
//! only, and input is not read again until the queue has drained. A peer
//! that stops reading therefore stalls its own connection and nothing else.

use super::framing::{FrameError, FrameReader, FrameWriter, ReadOutcome, WriteOutcome};
use super::ConnectionContext;
use crate::error::ReactorError;
use crate::messaging::{Request, Response};
use crate::reactor::{Disposition, Entry, EventContext, Interest, Reactor, Token};
use nix::sys::epoll::EpollFlags;
use parking_lot::Mutex;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::os::fd::{AsFd, BorrowedFd};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Response bytes waiting for the socket, shared with the worker that
/// answers a deferred query.
#[derive(Debug, Default)]
struct Outbound {
    frames: FrameWriter,
    /// Close the connection once `frames` has drained.
    closing: bool,
}

impl Outbound {
    fn queue(&mut self, peer: SocketAddr, response: &Response) -> Result<(), FrameError> {
        let payload = response.encode().map_err(|e| {
            warn!(%peer, "failed to encode response: {}", e);
            FrameError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        self.frames.push(&payload)
    }
}

/// What happened to the outbound queue on a write attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flush {
    Drained,
    Pending,
    Failed,
}

pub struct Session {
    stream: Arc<TcpStream>,
    peer: SocketAddr,
    reader: FrameReader,
    outbound: Arc<Mutex<Outbound>>,
    context: Arc<ConnectionContext>,
    requests: u64,
    read_closed: bool,
}

impl Session {
    pub fn new(stream: TcpStream, peer: SocketAddr, context: Arc<ConnectionContext>) -> Self {
        Self {
            stream: Arc::new(stream),
            peer,
            reader: FrameReader::new(context.max_frame_len),
            outbound: Arc::new(Mutex::new(Outbound::default())),
            context,
            requests: 0,
            read_closed: false,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Response bytes not yet accepted by the socket.
    pub fn pending_output(&self) -> usize {
        self.outbound.lock().frames.pending()
    }

    /// Handles one decoded frame.
    ///
    /// Inline responses are only queued here; the caller flushes them.
    fn dispatch(&mut self, payload: &[u8], token: Token, reactor: &Arc<Reactor>) -> Disposition {
        self.requests += 1;

        let request = match Request::decode(payload) {
            Ok(request) => request,
            Err(e) => {
                warn!(peer = %self.peer, "rejecting request: {}", e);
                return self.queue(&Response::from(e));
            }
        };

        trace!(peer = %self.peer, kind = request.kind(), "request decoded");

        if !request.is_query() {
            let response = self.context.service.handle(&request);
            return self.queue(&response);
        }

        let outbound = self.outbound.clone();
        let context = self.context.clone();
        let reactor = reactor.clone();
        let peer = self.peer;

        let submitted = self.context.pool.execute(move || {
            let response = context.service.handle(&request);
            let disposition = {
                let mut outbound = outbound.lock();
                match outbound.queue(peer, &response) {
                    Ok(()) => {
                        outbound.closing |= request.closes_session();
                        Disposition::Keep
                    }
                    Err(_) => Disposition::Drop,
                }
            };
            // Re-arming with queued output makes the socket writable-interest only.
            reactor.complete(token, disposition);
        });

        match submitted {
            Ok(()) => Disposition::Deferred,
            Err(e) => {
                warn!(peer = %self.peer, "dropping connection: {}", e);
                Disposition::Drop
            }
        }
    }

    fn queue(&self, response: &Response) -> Disposition {
        match self.outbound.lock().queue(self.peer, response) {
            Ok(()) => Disposition::Keep,
            Err(_) => Disposition::Drop,
        }
    }

    /// Writes as much queued output as the socket takes without blocking.
    fn flush(&self) -> Flush {
        let mut outbound = self.outbound.lock();
        if outbound.frames.is_empty() {
            return Flush::Drained;
        }

        match outbound.frames.write_to(&mut &*self.stream) {
            Ok(WriteOutcome::Drained) => Flush::Drained,
            Ok(WriteOutcome::Pending) => {
                trace!(
                    peer = %self.peer,
                    pending = outbound.frames.pending(),
                    "socket full, waiting for writability"
                );
                Flush::Pending
            }
            Err(e) => {
                debug!(peer = %self.peer, "failed to send response: {}", e);
                Flush::Failed
            }
        }
    }

    /// Disposition once the queue is drained: close if asked to, else keep
    /// serving input.
    fn after_drain(&self) -> Option<Disposition> {
        if self.outbound.lock().closing {
            let _ = self.stream.shutdown(Shutdown::Both);
            return Some(Disposition::Drop);
        }
        if self.read_closed {
            return Some(Disposition::Drop);
        }
        None
    }
}

impl AsFd for Session {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.stream.as_fd()
    }
}

impl Entry for Session {
    fn interest(&self) -> EpollFlags {
        if self.outbound.lock().frames.is_empty() {
            Interest::READABLE
        } else {
            Interest::WRITABLE
        }
    }

    fn handle_event(&mut self, event: EventContext<'_>) -> Result<Disposition, ReactorError> {
        // Output queued earlier goes first; input waits behind it.
        match self.flush() {
            Flush::Drained => {}
            Flush::Pending => return Ok(Disposition::Keep),
            Flush::Failed => return Ok(Disposition::Drop),
        }
        if let Some(disposition) = self.after_drain() {
            return Ok(disposition);
        }

        loop {
            let outcome = match self.reader.read_from(&mut &*self.stream) {
                Ok(outcome) => outcome,
                Err(FrameError::TooLarge { len, max }) => {
                    warn!(peer = %self.peer, len, max, "frame too large, closing");
                    return Ok(Disposition::Drop);
                }
                Err(FrameError::Io(e)) => {
                    debug!(peer = %self.peer, "read failed: {}", e);
                    return Ok(Disposition::Drop);
                }
            };

            match outcome {
                ReadOutcome::Pending => return Ok(Disposition::Keep),
                ReadOutcome::Closed => {
                    self.read_closed = true;
                    if self.reader.has_partial_prefix() {
                        warn!(peer = %self.peer, "peer closed inside a length prefix");
                        if self.queue(&Response::error("incomplete length prefix"))
                            == Disposition::Drop
                        {
                            return Ok(Disposition::Drop);
                        }
                    }
                    // Answers already queued are still delivered to a half-closed peer.
                    return Ok(match self.flush() {
                        Flush::Pending => Disposition::Keep,
                        Flush::Drained | Flush::Failed => Disposition::Drop,
                    });
                }
                ReadOutcome::Frame(payload) => {
                    match self.dispatch(&payload, event.token, event.reactor) {
                        Disposition::Keep => match self.flush() {
                            Flush::Drained => continue,
                            Flush::Pending => return Ok(Disposition::Keep),
                            Flush::Failed => return Ok(Disposition::Drop),
                        },
                        other => return Ok(other),
                    }
                }
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        debug!(peer = %self.peer, requests = self.requests, "🔌 connection closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::framing::{encode_frame, read_frame, DEFAULT_MAX_FRAME_LEN};
    use crate::messaging::GridService;
    use crate::pool::WorkerPool;
    use std::io::Write;
    use socket2::{Domain, SockRef, Socket, Type};
    use std::net::TcpListener;
    use std::time::Duration;

    /// A connected pair with small socket buffers, so unread responses back
    /// up after a few kilobytes.
    fn pair() -> (TcpStream, Session) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let socket = Socket::new(Domain::IPV4, Type::STREAM, None).unwrap();
        socket.set_recv_buffer_size(4096).unwrap();
        socket
            .connect(&listener.local_addr().unwrap().into())
            .unwrap();
        let client: TcpStream = socket.into();

        let (server, peer) = listener.accept().unwrap();
        SockRef::from(&server).set_send_buffer_size(4096).unwrap();
        server.set_nonblocking(true).unwrap();

        let context = Arc::new(ConnectionContext {
            service: Arc::new(GridService::new()),
            pool: Arc::new(WorkerPool::new(1).unwrap()),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        });
        (client, Session::new(server, peer, context))
    }

    fn reactor() -> Arc<Reactor> {
        Arc::new(Reactor::new(8, Duration::from_millis(10)).unwrap())
    }

    fn handle(session: &mut Session, reactor: &Arc<Reactor>) -> Disposition {
        session
            .handle_event(EventContext {
                token: 1,
                readiness: crate::reactor::Readiness::new(EpollFlags::EPOLLIN),
                reactor,
            })
            .unwrap()
    }

    #[test]
    fn test_unread_responses_switch_interest_to_writable() {
        let (mut client, mut session) = pair();
        let reactor = reactor();
        let reset = encode_frame(&Request::Reset.encode().unwrap()).unwrap();
        let batch = reset.repeat(32);

        // Keep pipelining resets without reading a single response until the
        // server's send path is full.
        client
            .set_write_timeout(Some(Duration::from_millis(50)))
            .unwrap();
        let mut saturated = false;
        for _ in 0..100_000 {
            if client.write_all(&batch).is_err() {
                break;
            }
            assert_eq!(handle(&mut session, &reactor), Disposition::Keep);
            if session.pending_output() > 0 {
                saturated = true;
                break;
            }
        }
        assert!(saturated, "the server never had to queue output");
        assert_eq!(session.interest(), Interest::WRITABLE);

        // The handler returned instead of blocking; the client now drains its
        // responses and the queue empties on the next event.
        let drainer = std::thread::spawn(move || {
            client
                .set_read_timeout(Some(Duration::from_secs(5)))
                .unwrap();
            while read_frame(&mut client, DEFAULT_MAX_FRAME_LEN)
                .map(|frame| frame.is_some())
                .unwrap_or(false)
            {}
        });

        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        while session.pending_output() > 0 && std::time::Instant::now() < deadline {
            handle(&mut session, &reactor);
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(session.pending_output(), 0);

        drop(session);
        drainer.join().unwrap();
    }
}
