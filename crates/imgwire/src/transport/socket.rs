//! Framed pair socket.
//!
//! One peer on each end, messages delimited by [`FrameHeader`]s, and a MORE
//! flag per frame. Reads go into a `BytesMut` that survives across poll
//! ticks, so a frame that arrives in pieces is never lost to a timeout.

use std::borrow::Cow;
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;
use zerocopy::{AsBytes, FromBytes};

use imgwire_core::wire::{FrameHeader, WireError, FRAME_HEADER_LEN};

use crate::error::{Result, TransferError};

/// Initial receive buffer capacity.
const READ_CAPACITY: usize = 64 * 1024;

/// One received transport message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub payload: Bytes,
    /// Another part of the same message follows.
    pub more: bool,
}

impl Frame {
    /// Payload as text, lossily.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

pub struct PairSocket<S = TcpStream> {
    stream: S,
    buffer: BytesMut,
    last_more: bool,
    peer_closed: bool,
    max_message_bytes: usize,
}

impl<S> PairSocket<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, max_message_bytes: usize) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(READ_CAPACITY),
            last_more: false,
            peer_closed: false,
            max_message_bytes,
        }
    }

    /// Write one frame.
    pub async fn send(&mut self, payload: &[u8], more: bool) -> Result<()> {
        let too_large = || WireError::MessageTooLarge {
            len: payload.len(),
            max: self.max_message_bytes,
        };
        if payload.len() > self.max_message_bytes {
            return Err(too_large().into());
        }
        let length = u32::try_from(payload.len()).map_err(|_| too_large())?;

        let header = FrameHeader::new(length, more);
        self.stream.write_all(header.as_bytes()).await?;
        self.stream.write_all(payload).await?;
        self.stream.flush().await?;

        tracing::trace!(len = payload.len(), more, "frame sent");
        Ok(())
    }

    /// Send a text message.
    pub async fn send_text(&mut self, text: &str, more: bool) -> Result<()> {
        self.send(text.as_bytes(), more).await
    }

    /// Pop the next complete frame, if one is buffered.
    pub fn try_recv(&mut self) -> Result<Option<Frame>> {
        let Some(header) = self.peek_header()? else {
            return Ok(None);
        };
        let len = header.payload_len();
        if self.buffer.len() < FRAME_HEADER_LEN + len {
            return Ok(None);
        }

        self.buffer.advance(FRAME_HEADER_LEN);
        let payload = self.buffer.split_to(len).freeze();
        self.last_more = header.more();

        tracing::trace!(len, more = self.last_more, "frame received");
        Ok(Some(Frame {
            payload,
            more: self.last_more,
        }))
    }

    /// True when a complete frame is buffered.
    pub fn frame_ready(&self) -> Result<bool> {
        Ok(match self.peek_header()? {
            Some(header) => self.buffer.len() >= FRAME_HEADER_LEN + header.payload_len(),
            None => false,
        })
    }

    /// Whether the most recently received frame carried MORE.
    pub fn last_more(&self) -> bool {
        self.last_more
    }

    /// The peer shut its side of the connection.
    pub fn peer_closed(&self) -> bool {
        self.peer_closed
    }

    /// Read for at most `budget`, until a complete frame is buffered.
    ///
    /// Returns whether a frame is ready. Fails once the peer has gone and
    /// nothing complete is left in the buffer.
    pub async fn poll(&mut self, budget: Duration) -> Result<bool> {
        let deadline = Instant::now() + budget;
        loop {
            if self.frame_ready()? {
                return Ok(true);
            }
            if self.peer_closed {
                return Err(TransferError::peer_gone());
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(false);
            }

            self.buffer.reserve(READ_CAPACITY);
            match tokio::time::timeout(remaining, self.stream.read_buf(&mut self.buffer)).await {
                Err(_elapsed) => return self.frame_ready(),
                Ok(Ok(0)) => self.peer_closed = true,
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return Err(e.into()),
            }
        }
    }

    /// Nothing left in the receive buffer, not even part of a frame.
    pub fn is_drained(&self) -> bool {
        self.buffer.is_empty()
    }

    fn peek_header(&self) -> Result<Option<FrameHeader>> {
        if self.buffer.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }
        let Some(header) = FrameHeader::read_from(&self.buffer[..FRAME_HEADER_LEN]) else {
            return Ok(None);
        };
        header.validate()?;
        if header.payload_len() > self.max_message_bytes {
            return Err(WireError::MessageTooLarge {
                len: header.payload_len(),
                max: self.max_message_bytes,
            }
            .into());
        }
        Ok(Some(header))
    }
}

impl PairSocket<TcpStream> {
    pub fn peer_addr(&self) -> Option<std::net::SocketAddr> {
        self.stream.peer_addr().ok()
    }
}
