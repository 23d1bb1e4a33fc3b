//! Stream file commands: `pack` and `unpack`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::fs::File;

use imgwire::{ImageReader, ImageWriter, TracingProgress};
use imgwire_core::TransferConfig;

use super::raw::RawSpec;
use super::receive::save;
use super::send::load_all;

pub async fn cmd_pack(
    target: &Path,
    files: &[PathBuf],
    spec: &RawSpec,
    name: Option<&str>,
    config: &TransferConfig,
) -> Result<()> {
    let images = load_all(files, spec, name)?;
    let file = File::create(target)
        .await
        .with_context(|| format!("failed to create {}", target.display()))?;
    let mut writer = ImageWriter::new(file, config, Some(Arc::new(TracingProgress)));

    for image in &images {
        writer
            .write_image(image, &image.metadata())
            .await
            .with_context(|| format!("failed to write '{}' to {}", image.name, target.display()))?;
        println!("packed {} {:?} {}", image.name, image.dims, image.voxel_type);
    }
    Ok(())
}

pub async fn cmd_unpack(source: &Path, out: &Path, config: &TransferConfig) -> Result<()> {
    let file = File::open(source)
        .await
        .with_context(|| format!("failed to open {}", source.display()))?;
    let mut reader = ImageReader::new(file, config, Some(Arc::new(TracingProgress)));

    let mut index = 0;
    while let Some(received) = reader
        .read_image()
        .await
        .with_context(|| format!("failed to read image {index} of {}", source.display()))?
    {
        save(out, &received, index)?;
        index += 1;
    }
    println!("{index} image(s) unpacked");
    Ok(())
}
