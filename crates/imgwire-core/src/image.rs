//! In-memory image model: typed voxel buffers and their layout.
//!
//! Voxels are serialised big-endian, the default byte order of the JVM
//! peer's `ByteBuffer`.

use bytes::{Buf, BufMut};

use crate::envelope::{checked_element_count, is_empty_shape, Envelope};
use crate::metadata::Metadata;
use crate::wire::{Backend, VoxelType, WireError};

// ── Voxel buffers ─────────────────────────────────────────────────────────────

/// A flat buffer of one voxel type.
#[derive(Debug, Clone, PartialEq)]
pub enum VoxelBuffer {
    Int8(Vec<i8>),
    UInt8(Vec<u8>),
    Int16(Vec<i16>),
    UInt16(Vec<u16>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

impl VoxelBuffer {
    /// Zero-filled buffer of `len` elements. Fails instead of aborting
    /// when the allocator refuses.
    pub fn zeroed(voxel_type: VoxelType, len: usize) -> Result<Self, WireError> {
        Ok(match voxel_type {
            VoxelType::Int8 => VoxelBuffer::Int8(zeroed_vec(len)?),
            VoxelType::UInt8 => VoxelBuffer::UInt8(zeroed_vec(len)?),
            VoxelType::Int16 => VoxelBuffer::Int16(zeroed_vec(len)?),
            VoxelType::UInt16 => VoxelBuffer::UInt16(zeroed_vec(len)?),
            VoxelType::Float32 => VoxelBuffer::Float32(zeroed_vec(len)?),
            VoxelType::Float64 => VoxelBuffer::Float64(zeroed_vec(len)?),
        })
    }

    pub fn voxel_type(&self) -> VoxelType {
        match self {
            VoxelBuffer::Int8(_) => VoxelType::Int8,
            VoxelBuffer::UInt8(_) => VoxelType::UInt8,
            VoxelBuffer::Int16(_) => VoxelType::Int16,
            VoxelBuffer::UInt16(_) => VoxelType::UInt16,
            VoxelBuffer::Float32(_) => VoxelType::Float32,
            VoxelBuffer::Float64(_) => VoxelType::Float64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            VoxelBuffer::Int8(v) => v.len(),
            VoxelBuffer::UInt8(v) => v.len(),
            VoxelBuffer::Int16(v) => v.len(),
            VoxelBuffer::UInt16(v) => v.len(),
            VoxelBuffer::Float32(v) => v.len(),
            VoxelBuffer::Float64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append elements `range` to `out`, big-endian.
    pub fn encode_range<B: BufMut>(&self, range: std::ops::Range<usize>, out: &mut B) {
        match self {
            VoxelBuffer::Int8(v) => v[range].iter().for_each(|&x| out.put_i8(x)),
            VoxelBuffer::UInt8(v) => out.put_slice(&v[range]),
            VoxelBuffer::Int16(v) => v[range].iter().for_each(|&x| out.put_i16(x)),
            VoxelBuffer::UInt16(v) => v[range].iter().for_each(|&x| out.put_u16(x)),
            VoxelBuffer::Float32(v) => v[range].iter().for_each(|&x| out.put_f32(x)),
            VoxelBuffer::Float64(v) => v[range].iter().for_each(|&x| out.put_f64(x)),
        }
    }

    /// Overwrite elements starting at `offset` from big-endian `bytes`.
    ///
    /// `bytes` must hold a whole number of elements that fit in the buffer.
    pub fn decode_into(&mut self, offset: usize, mut bytes: &[u8]) -> Result<(), WireError> {
        let width = self.voxel_type().width();
        let count = bytes.len() / width;
        if bytes.len() % width != 0 || offset + count > self.len() {
            return Err(WireError::ChunkLengthMismatch {
                expected: (self.len().saturating_sub(offset)) * width,
                actual: bytes.len(),
            });
        }

        let range = offset..offset + count;
        match self {
            VoxelBuffer::Int8(v) => v[range].iter_mut().for_each(|x| *x = bytes.get_i8()),
            VoxelBuffer::UInt8(v) => v[range].copy_from_slice(bytes),
            VoxelBuffer::Int16(v) => v[range].iter_mut().for_each(|x| *x = bytes.get_i16()),
            VoxelBuffer::UInt16(v) => v[range].iter_mut().for_each(|x| *x = bytes.get_u16()),
            VoxelBuffer::Float32(v) => v[range].iter_mut().for_each(|x| *x = bytes.get_f32()),
            VoxelBuffer::Float64(v) => v[range].iter_mut().for_each(|x| *x = bytes.get_f64()),
        }
        Ok(())
    }

    /// Append another buffer of the same type.
    fn extend_from(&mut self, other: &VoxelBuffer) -> Result<(), WireError> {
        match (self, other) {
            (VoxelBuffer::Int8(a), VoxelBuffer::Int8(b)) => a.extend_from_slice(b),
            (VoxelBuffer::UInt8(a), VoxelBuffer::UInt8(b)) => a.extend_from_slice(b),
            (VoxelBuffer::Int16(a), VoxelBuffer::Int16(b)) => a.extend_from_slice(b),
            (VoxelBuffer::UInt16(a), VoxelBuffer::UInt16(b)) => a.extend_from_slice(b),
            (VoxelBuffer::Float32(a), VoxelBuffer::Float32(b)) => a.extend_from_slice(b),
            (VoxelBuffer::Float64(a), VoxelBuffer::Float64(b)) => a.extend_from_slice(b),
            (a, b) => {
                return Err(WireError::ShapeMismatch(format!(
                    "cannot join {} with {}",
                    a.voxel_type(),
                    b.voxel_type()
                )))
            }
        }
        Ok(())
    }

    /// Copy of elements `range`.
    fn slice(&self, range: std::ops::Range<usize>) -> VoxelBuffer {
        match self {
            VoxelBuffer::Int8(v) => VoxelBuffer::Int8(v[range].to_vec()),
            VoxelBuffer::UInt8(v) => VoxelBuffer::UInt8(v[range].to_vec()),
            VoxelBuffer::Int16(v) => VoxelBuffer::Int16(v[range].to_vec()),
            VoxelBuffer::UInt16(v) => VoxelBuffer::UInt16(v[range].to_vec()),
            VoxelBuffer::Float32(v) => VoxelBuffer::Float32(v[range].to_vec()),
            VoxelBuffer::Float64(v) => VoxelBuffer::Float64(v[range].to_vec()),
        }
    }
}

fn zeroed_vec<T: Clone + Default>(len: usize) -> Result<Vec<T>, WireError> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|e| WireError::ImageTooLarge(format!("{len} elements: {e}")))?;
    v.resize(len, T::default());
    Ok(v)
}

// ── Layout ────────────────────────────────────────────────────────────────────

/// Voxel storage of an image.
#[derive(Debug, Clone, PartialEq)]
pub enum Storage {
    /// One buffer holding every element.
    Contiguous(VoxelBuffer),
    /// One buffer per plane, in order.
    Planar(Vec<VoxelBuffer>),
}

impl Storage {
    pub fn backend(&self) -> Backend {
        match self {
            Storage::Contiguous(_) => Backend::Contiguous,
            Storage::Planar(_) => Backend::Planar,
        }
    }

    pub fn element_count(&self) -> usize {
        match self {
            Storage::Contiguous(buf) => buf.len(),
            Storage::Planar(planes) => planes.iter().map(VoxelBuffer::len).sum(),
        }
    }

    /// The buffers in transmission order.
    pub fn buffers(&self) -> &[VoxelBuffer] {
        match self {
            Storage::Contiguous(buf) => std::slice::from_ref(buf),
            Storage::Planar(planes) => planes,
        }
    }

    pub fn buffers_mut(&mut self) -> &mut [VoxelBuffer] {
        match self {
            Storage::Contiguous(buf) => std::slice::from_mut(buf),
            Storage::Planar(planes) => planes,
        }
    }
}

/// Elements per plane of a planar image: the first two extents.
pub fn plane_len(dims: &[usize]) -> usize {
    dims.iter().take(2).product()
}

/// Number of planes of a planar image: the product of the extents beyond
/// the first two (1 for rank 1 and 2).
pub fn plane_count(dims: &[usize]) -> usize {
    dims.iter().skip(2).product()
}

// ── Image ─────────────────────────────────────────────────────────────────────

/// An n-dimensional image with its voxel data.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageArray {
    pub name: String,
    pub dims: Vec<usize>,
    pub voxel_type: VoxelType,
    pub storage: Storage,
}

impl ImageArray {
    /// Zero-filled image of the given shape and layout.
    pub fn allocate(
        dims: &[usize],
        voxel_type: VoxelType,
        backend: Backend,
    ) -> Result<Self, WireError> {
        let envelope = Envelope::new(dims.to_vec(), voxel_type, backend);
        backend.ensure_supported()?;
        if envelope.is_empty() {
            return Err(WireError::EmptyImage);
        }
        let total = envelope.byte_len()? / voxel_type.width();

        let storage = match backend {
            Backend::Contiguous => Storage::Contiguous(VoxelBuffer::zeroed(voxel_type, total)?),
            Backend::Planar => {
                let count = plane_count(dims);
                let mut planes = Vec::new();
                planes
                    .try_reserve_exact(count)
                    .map_err(|e| WireError::ImageTooLarge(format!("{count} planes: {e}")))?;
                for _ in 0..count {
                    planes.push(VoxelBuffer::zeroed(voxel_type, plane_len(dims))?);
                }
                Storage::Planar(planes)
            }
            Backend::Tiled => return Err(WireError::NotImplemented(backend)),
        };

        Ok(Self {
            name: String::new(),
            dims: dims.to_vec(),
            voxel_type,
            storage,
        })
    }

    /// Allocate for a received envelope.
    pub fn for_envelope(envelope: &Envelope) -> Result<Self, WireError> {
        Self::allocate(&envelope.dims, envelope.voxel_type, envelope.backend)
    }

    /// Wrap an existing flat buffer.
    pub fn from_buffer(
        name: impl Into<String>,
        dims: &[usize],
        buffer: VoxelBuffer,
    ) -> Result<Self, WireError> {
        let image = Self {
            name: name.into(),
            dims: dims.to_vec(),
            voxel_type: buffer.voxel_type(),
            storage: Storage::Contiguous(buffer),
        };
        image.validate()?;
        Ok(image)
    }

    pub fn backend(&self) -> Backend {
        self.storage.backend()
    }

    pub fn envelope(&self) -> Envelope {
        Envelope::new(self.dims.clone(), self.voxel_type, self.backend())
    }

    pub fn metadata(&self) -> Metadata {
        Metadata::named(self.name.clone())
    }

    /// Check the storage against the declared shape and type.
    ///
    /// An empty shape, or a non-empty shape over empty storage, is
    /// [`WireError::EmptyImage`]; any other disagreement is a shape
    /// mismatch.
    pub fn validate(&self) -> Result<(), WireError> {
        if is_empty_shape(&self.dims) || self.storage.element_count() == 0 {
            return Err(WireError::EmptyImage);
        }
        let declared = checked_element_count(&self.dims)
            .ok_or_else(|| WireError::ShapeMismatch("shape overflows".into()))?;

        if let Some(bad) = self
            .storage
            .buffers()
            .iter()
            .find(|b| b.voxel_type() != self.voxel_type)
        {
            return Err(WireError::ShapeMismatch(format!(
                "declared {} but storage holds {}",
                self.voxel_type,
                bad.voxel_type()
            )));
        }

        match &self.storage {
            Storage::Contiguous(buf) if buf.len() != declared => {
                Err(WireError::ShapeMismatch(format!(
                    "{} elements declared, buffer holds {}",
                    declared,
                    buf.len()
                )))
            }
            Storage::Planar(planes) => {
                let expected_planes = plane_count(&self.dims);
                let expected_len = plane_len(&self.dims);
                if planes.len() != expected_planes {
                    return Err(WireError::ShapeMismatch(format!(
                        "{expected_planes} planes declared, storage holds {}",
                        planes.len()
                    )));
                }
                match planes.iter().position(|p| p.len() != expected_len) {
                    Some(i) => Err(WireError::ShapeMismatch(format!(
                        "plane {i} holds {} elements, expected {expected_len}",
                        planes[i].len()
                    ))),
                    None => Ok(()),
                }
            }
            Storage::Contiguous(_) => Ok(()),
        }
    }

    /// Same image with all voxels in one buffer.
    pub fn to_contiguous(&self) -> Result<Self, WireError> {
        let joined = match &self.storage {
            Storage::Contiguous(buf) => buf.clone(),
            Storage::Planar(planes) => {
                let mut joined = VoxelBuffer::zeroed(self.voxel_type, 0)?;
                for plane in planes {
                    joined.extend_from(plane)?;
                }
                joined
            }
        };
        Ok(Self {
            name: self.name.clone(),
            dims: self.dims.clone(),
            voxel_type: self.voxel_type,
            storage: Storage::Contiguous(joined),
        })
    }

    /// Same image split into planes.
    pub fn to_planar(&self) -> Result<Self, WireError> {
        self.validate()?;
        let planes = match &self.storage {
            Storage::Planar(planes) => planes.clone(),
            Storage::Contiguous(buf) => {
                let len = plane_len(&self.dims);
                (0..plane_count(&self.dims))
                    .map(|i| buf.slice(i * len..(i + 1) * len))
                    .collect()
            }
        };
        Ok(Self {
            name: self.name.clone(),
            dims: self.dims.clone(),
            voxel_type: self.voxel_type,
            storage: Storage::Planar(planes),
        })
    }
}
