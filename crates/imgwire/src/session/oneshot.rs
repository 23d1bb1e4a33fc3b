//! Single-image transfers without session lines.
//!
//! Each helper opens its own socket, moves one image and releases the
//! socket before returning, whatever the outcome.

use std::net::Ipv4Addr;

use tokio::net::{TcpListener, TcpStream};

use imgwire_core::control::matches_token;
use imgwire_core::wire::CAN_GET;
use imgwire_core::{ImageArray, TransferConfig};

use crate::error::{Result, TransferError};
use crate::progress::{self, SharedProgress};
use crate::transfer::{ImageCodec, ReceivedImage};
use crate::transport::PairSocket;

/// Push `image` to a receiver at `addr`.
pub async fn send_one(
    image: &ImageArray,
    addr: &str,
    config: &TransferConfig,
    progress: SharedProgress,
) -> Result<()> {
    let codec = ImageCodec::new("sender", config, progress.clone());
    progress::info(&progress, "sender started");

    let result: Result<()> = async {
        codec.check_outgoing(image)?;
        let mut socket = connect(&codec, addr, config).await?;
        codec
            .send_image(&mut socket, image, &image.metadata(), config.handshake_timeout())
            .await
    }
    .await;

    progress::info(&progress, "sender cleaning");
    result
}

/// Wait on `port` for one pushed image.
pub async fn receive_one(
    port: u16,
    config: &TransferConfig,
    progress: SharedProgress,
) -> Result<ReceivedImage> {
    let codec = ImageCodec::new("receiver", config, progress.clone());
    progress::info(&progress, "receiver started");

    let result: Result<ReceivedImage> = async {
        let mut socket = accept(&codec, port, config).await?;
        progress::info(&progress, "receiver waiting");
        let header = codec
            .waiter()
            .expect_message(&mut socket, config.handshake_timeout())
            .await?;
        codec.receive_image(&mut socket, &header.text()).await
    }
    .await;

    progress::info(&progress, "receiver cleaning");
    result
}

/// Offer `image` on `port` and push it once asked.
pub async fn serve_one(
    image: &ImageArray,
    port: u16,
    config: &TransferConfig,
    progress: SharedProgress,
) -> Result<()> {
    let codec = ImageCodec::new("server", config, progress.clone());
    progress::info(&progress, "server started");

    let result: Result<()> = async {
        codec.check_outgoing(image)?;
        let mut socket = accept(&codec, port, config).await?;
        progress::info(&progress, "server waiting for initial request");
        let request = codec
            .waiter()
            .expect_message(&mut socket, config.handshake_timeout())
            .await?;
        if !matches_token(&request.payload, CAN_GET) {
            return Err(TransferError::UnexpectedReply {
                expected: CAN_GET,
                got: request.text().into_owned(),
            });
        }
        codec
            .send_image(&mut socket, image, &image.metadata(), config.handshake_timeout())
            .await
    }
    .await;

    progress::info(&progress, "server cleaning");
    result
}

/// Ask the server at `addr` for one image.
pub async fn request_one(
    addr: &str,
    config: &TransferConfig,
    progress: SharedProgress,
) -> Result<ReceivedImage> {
    let codec = ImageCodec::new("receiver", config, progress.clone());
    progress::info(&progress, "receiver started");

    let result: Result<ReceivedImage> = async {
        let mut socket = connect(&codec, addr, config).await?;
        socket.send_text(CAN_GET, false).await?;
        progress::info(&progress, "receiver initial request sent");

        let header = codec
            .waiter()
            .expect_message(&mut socket, config.handshake_timeout())
            .await?;
        codec.receive_image(&mut socket, &header.text()).await
    }
    .await;

    progress::info(&progress, "receiver cleaning");
    result
}

async fn connect(
    codec: &ImageCodec,
    addr: &str,
    config: &TransferConfig,
) -> Result<PairSocket<TcpStream>> {
    let addr = addr.strip_prefix("tcp://").unwrap_or(addr);
    let stream = codec
        .waiter()
        .connect_with_retry(addr, config.handshake_timeout())
        .await?;
    Ok(PairSocket::new(stream, config.max_message_bytes))
}

async fn accept(
    codec: &ImageCodec,
    port: u16,
    config: &TransferConfig,
) -> Result<PairSocket<TcpStream>> {
    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await?;
    tracing::debug!(port, "waiting for a single peer");
    let stream = codec
        .waiter()
        .accept_within(&listener, config.handshake_timeout())
        .await?;
    Ok(PairSocket::new(stream, config.max_message_bytes))
}
