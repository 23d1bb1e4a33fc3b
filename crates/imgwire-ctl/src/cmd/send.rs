//! Pushing commands: `send` and `serve`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use imgwire::{TracingProgress, TransferSession};
use imgwire_core::TransferConfig;

use super::raw::{read_image, RawSpec};

pub async fn cmd_send(
    addr: &str,
    files: &[PathBuf],
    spec: &RawSpec,
    name: Option<&str>,
    config: TransferConfig,
) -> Result<()> {
    let images = load_all(files, spec, name)?;
    let mut session = TransferSession::send(addr, images.len() as u32, config)
        .with_progress(Arc::new(TracingProgress));

    for image in &images {
        session
            .send_image(image)
            .await
            .with_context(|| format!("failed to send '{}' to {addr}", image.name))?;
        println!("sent {} {:?} {}", image.name, image.dims, image.voxel_type);
    }
    session
        .hang_up_and_close()
        .await
        .context("failed to hang up")?;
    Ok(())
}

pub async fn cmd_serve(
    port: u16,
    files: &[PathBuf],
    spec: &RawSpec,
    name: Option<&str>,
    config: TransferConfig,
) -> Result<()> {
    let images = load_all(files, spec, name)?;
    let mut session = TransferSession::serve(port, images.len() as u32, config)
        .await
        .with_context(|| format!("failed to listen on port {port}"))?
        .with_progress(Arc::new(TracingProgress));
    println!("serving {} image(s) on port {}", images.len(), session.local_port().unwrap_or(port));

    for image in &images {
        session
            .serve_image(image)
            .await
            .with_context(|| format!("failed to serve '{}'", image.name))?;
        println!("served {} {:?} {}", image.name, image.dims, image.voxel_type);
    }
    session
        .hang_up_and_close()
        .await
        .context("failed to hang up")?;
    Ok(())
}

pub(super) fn load_all(
    files: &[PathBuf],
    spec: &RawSpec,
    name: Option<&str>,
) -> Result<Vec<imgwire_core::ImageArray>> {
    anyhow::ensure!(!files.is_empty(), "no input files given");
    // An explicit name only makes sense for a single file.
    let name = if files.len() == 1 { name } else { None };
    files.iter().map(|f| read_image(f, spec, name)).collect()
}
