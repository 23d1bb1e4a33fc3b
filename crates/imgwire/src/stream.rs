//! Image streams: images written back to back onto a byte stream, with no
//! handshake and no session lines.
//!
//! ```text
//! envelope (MORE) · metadata (MORE) · chunks ... · envelope (MORE) · ...
//! ```
//!
//! The framing and chunking are those of a pair socket, so a stream can be
//! a file, a pipe or any other `AsyncRead + AsyncWrite` with nobody
//! answering on the other end. A clean end of stream between two images
//! ends the sequence; an end anywhere else is a transport fault.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

use imgwire_core::wire::WireError;
use imgwire_core::{Envelope, ImageArray, Metadata, TransferConfig};

use crate::chunk::{receive_storage, send_storage};
use crate::error::{Result, TransferError};
use crate::progress::{self, SharedProgress};
use crate::transfer::ReceivedImage;
use crate::transport::{ConnectionWaiter, PairSocket};

pub struct ImageWriter<S> {
    socket: PairSocket<S>,
    max_message: usize,
    progress: SharedProgress,
}

impl<S> ImageWriter<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, config: &TransferConfig, progress: SharedProgress) -> Self {
        Self {
            socket: PairSocket::new(stream, config.max_message_bytes),
            max_message: config.max_message_bytes,
            progress,
        }
    }

    /// Append one image. Nothing is written if the image is refused.
    pub async fn write_image(&mut self, image: &ImageArray, metadata: &Metadata) -> Result<()> {
        image.validate()?;
        let envelope = image.envelope();
        envelope.check_transferable(self.max_message)?;
        let metadata_line = metadata.encode()?;

        let header = envelope.encode();
        progress::info(&self.progress, &format!("sending header: {header}"));
        self.socket.send_text(&header, true).await?;
        self.socket.send_text(&metadata_line, true).await?;
        let chunks = send_storage(&mut self.socket, &image.storage, false).await?;

        tracing::debug!(name = %metadata.name, dims = ?envelope.dims, chunks, "image written");
        progress::info(&self.progress, "sending finished");
        Ok(())
    }
}

pub struct ImageReader<S> {
    socket: PairSocket<S>,
    waiter: ConnectionWaiter,
    /// Wait for the next envelope.
    first_wait: Duration,
    /// Wait for each later part of an image.
    continuation: Duration,
    max_message: usize,
    progress: SharedProgress,
}

impl<S> ImageReader<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, config: &TransferConfig, progress: SharedProgress) -> Self {
        Self {
            socket: PairSocket::new(stream, config.max_message_bytes),
            waiter: ConnectionWaiter::new("reader", config, progress.clone()),
            first_wait: config.handshake_timeout(),
            continuation: config.continuation_timeout(),
            max_message: config.max_message_bytes,
            progress,
        }
    }

    /// Next image, or `None` once the stream has ended cleanly.
    pub async fn read_image(&mut self) -> Result<Option<ReceivedImage>> {
        let frame = match self.waiter.wait_for_message(&mut self.socket, self.first_wait).await {
            Ok(Some(frame)) => frame,
            Ok(None) => return Err(TransferError::timeout(self.waiter.label(), self.first_wait)),
            Err(_) if self.socket.peer_closed() && self.socket.is_drained() => {
                tracing::debug!("end of image stream");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        if !frame.more {
            return Err(WireError::UnexpectedEndOfMessage.into());
        }

        let header = frame.text();
        progress::info(&self.progress, &format!("received header: {}", header.trim_end()));
        let envelope = Envelope::decode(&header)?;
        envelope.check_transferable(self.max_message)?;
        let mut image = ImageArray::for_envelope(&envelope)?;

        let frame = self.waiter.wait_for_more(&mut self.socket, self.continuation).await?;
        let metadata = Metadata::decode(&frame.text())?;
        let chunks = receive_storage(
            &mut self.socket,
            &self.waiter,
            &mut image.storage,
            self.continuation,
        )
        .await?;

        image.name = metadata.name.clone();
        tracing::debug!(name = %metadata.name, dims = ?envelope.dims, chunks, "image read");
        progress::info(&self.progress, "receiving finished");
        Ok(Some(ReceivedImage {
            envelope,
            metadata,
            image,
        }))
    }
}
