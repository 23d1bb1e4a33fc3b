//! Envelope — the textual header that precedes every image.
//!
//! ```text
//! v1 dimNumber <rank> <dim_0> ... <dim_{rank-1}> <voxelTypeName> <backendName>
//! ```
//!
//! Parsing is isolated here so the handshake and chunking layers never look
//! at the raw text.

use crate::chunk::largest_chunk;
use crate::image::plane_len;
use crate::wire::{Backend, VoxelType, WireError, DIM_NUMBER, PROTOCOL_VERSION};

/// Shape, element type and layout of one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub dims: Vec<usize>,
    pub voxel_type: VoxelType,
    pub backend: Backend,
}

impl Envelope {
    pub fn new(dims: Vec<usize>, voxel_type: VoxelType, backend: Backend) -> Self {
        Self {
            dims,
            voxel_type,
            backend,
        }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Total number of elements, `None` on overflow.
    pub fn element_count(&self) -> Option<usize> {
        checked_element_count(&self.dims)
    }

    /// True for a rank-0 shape or any zero extent.
    pub fn is_empty(&self) -> bool {
        is_empty_shape(&self.dims)
    }

    /// Payload size in bytes. Fails for shapes no buffer can hold.
    pub fn byte_len(&self) -> Result<usize, WireError> {
        self.element_count()
            .and_then(|n| n.checked_mul(self.voxel_type.width()))
            .filter(|&bytes| bytes <= isize::MAX as usize)
            .ok_or_else(|| {
                WireError::ImageTooLarge(format!("{:?} of {}", self.dims, self.voxel_type))
            })
    }

    /// Byte length of the largest chunk the payload travels in.
    pub fn largest_chunk_bytes(&self) -> Result<usize, WireError> {
        let width = self.voxel_type.width();
        let total = self.byte_len()? / width;
        let buffer_len = match self.backend {
            Backend::Planar => plane_len(&self.dims),
            Backend::Contiguous | Backend::Tiled => total,
        };
        Ok(largest_chunk(buffer_len, width) * width)
    }

    /// Refuse, before any payload moves, an image that cannot cross the
    /// wire: unsupported backend, empty shape, more bytes than a buffer can
    /// hold, or a chunk larger than `max_message_bytes`.
    pub fn check_transferable(&self, max_message_bytes: usize) -> Result<(), WireError> {
        self.backend.ensure_supported()?;
        if self.is_empty() {
            return Err(WireError::EmptyImage);
        }
        let largest = self.largest_chunk_bytes()?;
        if largest > max_message_bytes {
            return Err(WireError::MessageTooLarge {
                len: largest,
                max: max_message_bytes,
            });
        }
        Ok(())
    }

    /// Single-line, whitespace-delimited form.
    pub fn encode(&self) -> String {
        let mut msg = format!("{PROTOCOL_VERSION} {DIM_NUMBER} {}", self.rank());
        for d in &self.dims {
            msg.push(' ');
            msg.push_str(&d.to_string());
        }
        msg.push(' ');
        msg.push_str(self.voxel_type.wire_name());
        msg.push(' ');
        msg.push_str(self.backend.wire_name());
        msg
    }

    /// Parse an envelope line.
    ///
    /// The version and `dimNumber` checks gate everything else. Backend
    /// support is not checked here: a `CellImg` envelope decodes fine and
    /// is refused when the receiver tries to allocate for it.
    pub fn decode(line: &str) -> Result<Self, WireError> {
        let mut tokens = line.split_whitespace();

        let version = tokens.next().unwrap_or_default();
        if version != PROTOCOL_VERSION {
            return Err(WireError::UnknownVersion(version.to_string()));
        }
        if tokens.next() != Some(DIM_NUMBER) {
            return Err(WireError::MissingDimNumber);
        }

        let rank: usize = parse_number(tokens.next(), "rank")?;
        if rank == 0 {
            return Err(WireError::MalformedEnvelope("rank must be at least 1".into()));
        }

        let mut dims = Vec::with_capacity(rank);
        for i in 0..rank {
            dims.push(parse_number(tokens.next(), &format!("extent of dimension {i}"))?);
        }

        let voxel = tokens
            .next()
            .ok_or_else(|| WireError::MalformedEnvelope("missing voxel type".into()))?;
        let backend = tokens
            .next()
            .ok_or_else(|| WireError::MalformedEnvelope("missing backend".into()))?;

        let envelope = Envelope {
            dims,
            voxel_type: VoxelType::from_wire(voxel)?,
            backend: Backend::from_wire(backend)?,
        };
        if envelope.element_count().is_none() {
            return Err(WireError::MalformedEnvelope("shape overflows".into()));
        }
        Ok(envelope)
    }
}

pub(crate) fn checked_element_count(dims: &[usize]) -> Option<usize> {
    dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

pub(crate) fn is_empty_shape(dims: &[usize]) -> bool {
    dims.is_empty() || dims.contains(&0)
}

fn parse_number(token: Option<&str>, what: &str) -> Result<usize, WireError> {
    let token = token.ok_or_else(|| WireError::MalformedEnvelope(format!("missing {what}")))?;
    token
        .parse()
        .map_err(|_| WireError::MalformedEnvelope(format!("bad {what}: '{token}'")))
}
