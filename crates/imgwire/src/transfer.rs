//! Image codec — one image across an open pair socket.
//!
//! ```text
//! sender                               receiver
//!   envelope  ───────────────────────▶
//!             ◀───────────────────────  ready
//!   metadata (MORE) ─────────────────▶
//!   chunks ... ──────────────────────▶
//!             ◀───────────────────────  done
//! ```
//!
//! Both ends check the envelope before `ready`: the sender refuses an image
//! whose chunks exceed the frame limit, the receiver refuses one it cannot
//! allocate. Either way no payload moves.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

use imgwire_core::control::matches_token;
use imgwire_core::wire::{DONE, READY};
use imgwire_core::{Envelope, ImageArray, Metadata, TransferConfig};

use crate::chunk::{receive_storage, send_storage};
use crate::error::{Result, TransferError};
use crate::progress::{self, SharedProgress};
use crate::transport::{ConnectionWaiter, Frame, PairSocket};

/// A fully received image with what the peer said about it.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedImage {
    pub envelope: Envelope,
    pub metadata: Metadata,
    pub image: ImageArray,
}

pub struct ImageCodec {
    waiter: ConnectionWaiter,
    continuation: Duration,
    max_message: usize,
    progress: SharedProgress,
}

impl ImageCodec {
    pub fn new(label: &'static str, config: &TransferConfig, progress: SharedProgress) -> Self {
        Self {
            waiter: ConnectionWaiter::new(label, config, progress.clone()),
            continuation: config.continuation_timeout(),
            max_message: config.max_message_bytes,
            progress,
        }
    }

    pub fn waiter(&self) -> &ConnectionWaiter {
        &self.waiter
    }

    /// Everything [`send_image`](Self::send_image) would refuse about
    /// `image` before writing a byte.
    pub fn check_outgoing(&self, image: &ImageArray) -> Result<Envelope> {
        image.validate()?;
        let envelope = image.envelope();
        envelope.check_transferable(self.max_message)?;
        Ok(envelope)
    }

    /// Push one image. `timeout` bounds the wait for `ready`; later waits
    /// use the continuation timeout.
    pub async fn send_image<S>(
        &self,
        socket: &mut PairSocket<S>,
        image: &ImageArray,
        metadata: &Metadata,
        timeout: Duration,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let envelope = self.check_outgoing(image)?;
        let metadata_line = metadata.encode()?;

        let header = envelope.encode();
        progress::info(&self.progress, &format!("sending header: {header}"));
        socket.send_text(&header, false).await?;

        let reply = self.waiter.expect_message(socket, timeout).await?;
        expect_token(&reply, READY)?;

        socket.send_text(&metadata_line, true).await?;
        let chunks = send_storage(socket, &image.storage, false).await?;

        let reply = self.waiter.expect_message(socket, self.continuation).await?;
        expect_token(&reply, DONE)?;

        tracing::info!(
            name = %metadata.name,
            dims = ?envelope.dims,
            voxel_type = %envelope.voxel_type,
            backend = %envelope.backend,
            chunks,
            "image sent"
        );
        Ok(())
    }

    /// Pull the image announced by `header`, which the caller has already
    /// read off the socket.
    pub async fn receive_image<S>(
        &self,
        socket: &mut PairSocket<S>,
        header: &str,
    ) -> Result<ReceivedImage>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        progress::info(&self.progress, &format!("received header: {}", header.trim_end()));
        let envelope = Envelope::decode(header)?;
        envelope.check_transferable(self.max_message)?;
        let mut image = ImageArray::for_envelope(&envelope)?;

        socket.send_text(READY, false).await?;

        let frame = self.waiter.expect_message(socket, self.continuation).await?;
        let metadata = Metadata::decode(&frame.text())?;

        let chunks =
            receive_storage(socket, &self.waiter, &mut image.storage, self.continuation).await?;
        socket.send_text(DONE, false).await?;

        image.name = metadata.name.clone();
        tracing::info!(
            name = %metadata.name,
            dims = ?envelope.dims,
            voxel_type = %envelope.voxel_type,
            backend = %envelope.backend,
            chunks,
            "image received"
        );
        Ok(ReceivedImage {
            envelope,
            metadata,
            image,
        })
    }
}

fn expect_token(frame: &Frame, token: &'static str) -> Result<()> {
    if matches_token(&frame.payload, token) {
        return Ok(());
    }
    Err(TransferError::UnexpectedReply {
        expected: token,
        got: frame.text().into_owned(),
    })
}
