//! Pulling commands: `receive` and `request`.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use imgwire::{ReceivedImage, TracingProgress, TransferSession};
use imgwire_core::TransferConfig;

use super::raw::write_image;

pub async fn cmd_receive(port: u16, out: &Path, config: TransferConfig) -> Result<()> {
    let mut session = TransferSession::receive(port, config)
        .await
        .with_context(|| format!("failed to listen on port {port}"))?
        .with_progress(Arc::new(TracingProgress));
    println!("waiting on port {}", session.local_port().unwrap_or(port));

    let mut index = 0;
    while session.has_next() {
        let Some(received) = session.receive_image().await.context("failed to receive")? else {
            break;
        };
        save(out, &received, index)?;
        index += 1;
    }
    println!("{index} image(s) received");
    Ok(())
}

pub async fn cmd_request(addr: &str, out: &Path, config: TransferConfig) -> Result<()> {
    let mut session =
        TransferSession::request(addr, config).with_progress(Arc::new(TracingProgress));

    let mut index = 0;
    while session.has_next() {
        let Some(received) = session
            .request_image()
            .await
            .with_context(|| format!("failed to request from {addr}"))?
        else {
            break;
        };
        save(out, &received, index)?;
        index += 1;
    }
    println!("{index} image(s) received");
    Ok(())
}

pub(super) fn save(out: &Path, received: &ReceivedImage, index: u32) -> Result<()> {
    let path = write_image(out, &received.image, index)?;
    let envelope = &received.envelope;
    println!(
        "{} {:?} {} {} -> {}",
        received.metadata.name,
        envelope.dims,
        envelope.voxel_type,
        envelope.backend,
        path.display()
    );
    for (key, value) in &received.metadata.extra {
        println!("  {key} = {value}");
    }
    Ok(())
}
