//! Length-prefixed framing with partial-read resumption.
//!
//! A frame is a 4-byte big-endian payload length followed by the payload.
//! [`FrameReader`] is fed from a non-blocking socket one readiness
//! notification at a time: it reads no more bytes than the current frame
//! still needs, so anything beyond a frame boundary stays in the kernel
//! buffer and triggers the next notification.

use std::io::{self, Read, Write};
use thiserror::Error;

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Default upper bound on a single payload (10 MiB).
pub const DEFAULT_MAX_FRAME_LEN: usize = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    TooLarge { len: usize, max: usize },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Where the reader is within the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    AwaitingLength { received: usize },
    AwaitingBody { expected: usize, received: usize },
    Complete,
}

/// Result of one [`FrameReader::read_from`] call.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A full payload was reassembled.
    Frame(Vec<u8>),
    /// The source has no more bytes right now.
    Pending,
    /// The peer closed its side.
    Closed,
}

/// Per-connection frame reassembly state.
#[derive(Debug)]
pub struct FrameReader {
    state: FrameState,
    prefix: [u8; LENGTH_PREFIX_LEN],
    body: Vec<u8>,
    max_frame_len: usize,
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LEN)
    }
}

impl FrameReader {
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            state: FrameState::AwaitingLength { received: 0 },
            prefix: [0; LENGTH_PREFIX_LEN],
            body: Vec::new(),
            max_frame_len,
        }
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    /// True when the peer has sent part of a length prefix and nothing more.
    pub fn has_partial_prefix(&self) -> bool {
        matches!(self.state, FrameState::AwaitingLength { received } if received > 0)
    }

    /// True between frames.
    pub fn is_idle(&self) -> bool {
        self.state == FrameState::AwaitingLength { received: 0 }
    }

    /// Bytes still needed to finish the current frame's prefix or body.
    pub fn remaining(&self) -> usize {
        match self.state {
            FrameState::AwaitingLength { received } => LENGTH_PREFIX_LEN - received,
            FrameState::AwaitingBody { expected, received } => expected - received,
            FrameState::Complete => 0,
        }
    }

    /// The slice the next read should fill. Empty once a frame is complete.
    pub fn read_buf(&mut self) -> &mut [u8] {
        match self.state {
            FrameState::AwaitingLength { received } => &mut self.prefix[received..],
            FrameState::AwaitingBody { expected, received } => &mut self.body[received..expected],
            FrameState::Complete => &mut [],
        }
    }

    /// Accounts for `n` bytes written into [`read_buf`](Self::read_buf).
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::TooLarge`] when a completed prefix advertises
    /// more than the configured limit.
    pub fn advance(&mut self, n: usize) -> Result<(), FrameError> {
        debug_assert!(n <= self.remaining());

        self.state = match self.state {
            FrameState::AwaitingLength { received } => {
                let received = received + n;
                if received < LENGTH_PREFIX_LEN {
                    FrameState::AwaitingLength { received }
                } else {
                    let expected = u32::from_be_bytes(self.prefix) as usize;
                    if expected > self.max_frame_len {
                        return Err(FrameError::TooLarge {
                            len: expected,
                            max: self.max_frame_len,
                        });
                    }
                    self.body = vec![0; expected];
                    if expected == 0 {
                        FrameState::Complete
                    } else {
                        FrameState::AwaitingBody {
                            expected,
                            received: 0,
                        }
                    }
                }
            }
            FrameState::AwaitingBody { expected, received } => {
                let received = received + n;
                if received < expected {
                    FrameState::AwaitingBody { expected, received }
                } else {
                    FrameState::Complete
                }
            }
            FrameState::Complete => FrameState::Complete,
        };
        Ok(())
    }

    /// Takes the finished payload and rewinds to `AwaitingLength`.
    pub fn take_frame(&mut self) -> Option<Vec<u8>> {
        if self.state != FrameState::Complete {
            return None;
        }
        self.state = FrameState::AwaitingLength { received: 0 };
        self.prefix = [0; LENGTH_PREFIX_LEN];
        Some(std::mem::take(&mut self.body))
    }

    /// Reads from `reader` until a frame completes, the reader would block,
    /// or the peer closes.
    ///
    /// Interrupted reads are retried. State survives `Pending`, so the next
    /// call resumes exactly where this one stopped.
    pub fn read_from<R: Read>(&mut self, reader: &mut R) -> Result<ReadOutcome, FrameError> {
        loop {
            if let Some(frame) = self.take_frame() {
                return Ok(ReadOutcome::Frame(frame));
            }

            match reader.read(self.read_buf()) {
                Ok(0) => return Ok(ReadOutcome::Closed),
                Ok(n) => self.advance(n)?,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(ReadOutcome::Pending)
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Pushes `bytes` through the reader and collects every frame they
    /// complete. Leftover bytes stay buffered for the next call.
    pub fn feed(&mut self, mut bytes: &[u8]) -> Result<Vec<Vec<u8>>, FrameError> {
        let mut frames = Vec::new();
        while let ReadOutcome::Frame(frame) = self.read_from(&mut bytes)? {
            frames.push(frame);
        }
        Ok(frames)
    }
}

/// Result of one [`FrameWriter::write_to`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Every queued byte was written.
    Drained,
    /// The sink would block with bytes still queued.
    Pending,
}

/// Outbound bytes of one connection, written without ever blocking.
///
/// Frames are queued whole; `write_to` sends as much as the sink accepts
/// and keeps the rest for the next writable notification.
#[derive(Debug, Default)]
pub struct FrameWriter {
    buf: Vec<u8>,
    written: usize,
}

impl FrameWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `payload` behind its length prefix.
    pub fn push(&mut self, payload: &[u8]) -> Result<(), FrameError> {
        let frame = encode_frame(payload)?;
        if self.written > 0 && self.written == self.buf.len() {
            self.buf.clear();
            self.written = 0;
        }
        self.buf.extend_from_slice(&frame);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.pending() == 0
    }

    /// Bytes queued but not yet written.
    pub fn pending(&self) -> usize {
        self.buf.len() - self.written
    }

    /// Writes queued bytes until the sink would block or the queue is empty.
    pub fn write_to<W: Write>(&mut self, writer: &mut W) -> Result<WriteOutcome, FrameError> {
        while self.written < self.buf.len() {
            match writer.write(&self.buf[self.written..]) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
                Ok(n) => self.written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.compact();
                    return Ok(WriteOutcome::Pending);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        self.buf.clear();
        self.written = 0;
        Ok(WriteOutcome::Drained)
    }

    fn compact(&mut self) {
        if self.written > self.buf.len() / 2 {
            self.buf.drain(..self.written);
            self.written = 0;
        }
    }
}

/// Prefixes `payload` with its big-endian length.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    let len = u32::try_from(payload.len()).map_err(|_| FrameError::TooLarge {
        len: payload.len(),
        max: u32::MAX as usize,
    })?;

    let mut frame = Vec::with_capacity(LENGTH_PREFIX_LEN + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Writes one complete frame in a single `write_all`.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<(), FrameError> {
    writer.write_all(&encode_frame(payload)?)?;
    writer.flush()?;
    Ok(())
}

/// Blocking read of one frame, for clients and tests.
///
/// Returns `Ok(None)` on a clean close between frames.
pub fn read_frame<R: Read>(reader: &mut R, max_frame_len: usize) -> Result<Option<Vec<u8>>, FrameError> {
    let mut prefix = [0u8; LENGTH_PREFIX_LEN];
    match reader.read_exact(&mut prefix) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(prefix) as usize;
    if len > max_frame_len {
        return Err(FrameError::TooLarge {
            len,
            max: max_frame_len,
        });
    }

    let mut payload = vec![0; len];
    reader.read_exact(&mut payload)?;
    Ok(Some(payload))
}
