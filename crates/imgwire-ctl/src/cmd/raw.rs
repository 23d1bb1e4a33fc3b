//! Raw voxel files: the bare big-endian payload, no header.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use bytes::BytesMut;

use imgwire_core::{Backend, ImageArray, VoxelBuffer, VoxelType};

/// Shape and type of the raw files given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSpec {
    pub dims: Vec<usize>,
    pub voxel_type: VoxelType,
    pub backend: Backend,
}

/// Parse `64x64x10`.
pub fn parse_dims(text: &str) -> Result<Vec<usize>> {
    let dims = text
        .split('x')
        .map(|d| {
            d.trim()
                .parse::<usize>()
                .with_context(|| format!("bad extent '{d}' in --dims {text}"))
        })
        .collect::<Result<Vec<_>>>()?;
    if dims.is_empty() || dims.contains(&0) {
        bail!("--dims {text} describes an empty image");
    }
    Ok(dims)
}

pub fn read_image(path: &Path, spec: &RawSpec, name: Option<&str>) -> Result<ImageArray> {
    let width = spec.voxel_type.width();
    let Some(count) = spec.dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d)) else {
        bail!("--dims {:?} overflows the address space", spec.dims);
    };
    let Some(needed) = count.checked_mul(width) else {
        bail!("{:?} of {} overflows the address space", spec.dims, spec.voxel_type);
    };

    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    if bytes.len() != needed {
        bail!(
            "{} holds {} bytes, {:?} of {} needs {}",
            path.display(),
            bytes.len(),
            spec.dims,
            spec.voxel_type,
            needed
        );
    }

    let mut buffer = VoxelBuffer::zeroed(spec.voxel_type, count)?;
    buffer.decode_into(0, &bytes)?;

    let name = name
        .map(str::to_string)
        .or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_default();
    let image = ImageArray::from_buffer(name, &spec.dims, buffer)?;
    match spec.backend {
        Backend::Planar => Ok(image.to_planar()?),
        _ => Ok(image),
    }
}

/// Write `image` under `dir` as `<name>.raw`, or `image-<index>.raw` when
/// the image has no usable name.
pub fn write_image(dir: &Path, image: &ImageArray, index: u32) -> Result<PathBuf> {
    let stem = sanitize(&image.name).unwrap_or_else(|| format!("image-{index}"));
    let path = dir.join(format!("{stem}.raw"));

    let flat = image.to_contiguous()?;
    let mut out = BytesMut::new();
    for buffer in flat.storage.buffers() {
        buffer.encode_range(0..buffer.len(), &mut out);
    }

    std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    std::fs::write(&path, &out).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

/// File-system safe version of an image name.
fn sanitize(name: &str) -> Option<String> {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() || "-_.".contains(c) { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_matches('.').to_string();
    (!cleaned.is_empty()).then_some(cleaned)
}
