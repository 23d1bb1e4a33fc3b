//! imgwire wire format — the on-wire vocabulary shared by both peers.
//!
//! Everything in here is part of the protocol spoken with the JVM and C++
//! peers. Type names, backend names and handshake tokens are compared
//! textually by the other side; changing any of them breaks interop.
//!
//! The frame header is the only binary structure. It is `#[repr(C)]` over
//! unaligned big-endian fields and uses zerocopy derives, so there is no
//! unsafe code in this module.

use static_assertions::assert_eq_size;
use zerocopy::byteorder::{NetworkEndian, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

// ── Frame Header ──────────────────────────────────────────────────────────────

/// Precedes every transport message on a pair socket.
///
/// A logical message may be split into several frames; every frame except
/// the last one of a message carries `FLAG_MORE`.
///
/// Wire size: 5 bytes.
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct FrameHeader {
    /// Payload length in bytes, not including this header.
    pub length: U32<NetworkEndian>,

    /// Bit flags:
    ///   bit    0: more parts of this message follow
    ///   bits 1-7: reserved, must be zero
    pub flags: u8,
}

assert_eq_size!(FrameHeader, [u8; 5]);

/// Encoded size of [`FrameHeader`].
pub const FRAME_HEADER_LEN: usize = 5;

/// "More parts follow" framing flag.
pub const FLAG_MORE: u8 = 0x01;

impl FrameHeader {
    pub fn new(length: u32, more: bool) -> Self {
        Self {
            length: U32::new(length),
            flags: if more { FLAG_MORE } else { 0 },
        }
    }

    pub fn payload_len(&self) -> usize {
        self.length.get() as usize
    }

    pub fn more(&self) -> bool {
        self.flags & FLAG_MORE != 0
    }

    /// Reject headers with reserved bits set.
    pub fn validate(&self) -> Result<(), WireError> {
        if self.flags & !FLAG_MORE != 0 {
            return Err(WireError::ReservedFlagsSet(self.flags));
        }
        Ok(())
    }
}

// ── Voxel Types ───────────────────────────────────────────────────────────────

/// Scalar voxel types that can cross the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoxelType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Float32,
    Float64,
}

impl VoxelType {
    /// Matching order for prefix decoding. Longer names come first so that
    /// no wire name can be shadowed by a shorter one.
    pub const ALL: [VoxelType; 6] = [
        VoxelType::UInt8,
        VoxelType::Int8,
        VoxelType::UInt16,
        VoxelType::Int16,
        VoxelType::Float32,
        VoxelType::Float64,
    ];

    /// Bytes per element.
    pub fn width(self) -> usize {
        match self {
            VoxelType::Int8 | VoxelType::UInt8 => 1,
            VoxelType::Int16 | VoxelType::UInt16 => 2,
            VoxelType::Float32 => 4,
            VoxelType::Float64 => 8,
        }
    }

    /// The ImgLib2 class name used on the wire.
    pub fn wire_name(self) -> &'static str {
        match self {
            VoxelType::Int8 => "ByteType",
            VoxelType::UInt8 => "UnsignedByteType",
            VoxelType::Int16 => "ShortType",
            VoxelType::UInt16 => "UnsignedShortType",
            VoxelType::Float32 => "FloatType",
            VoxelType::Float64 => "DoubleType",
        }
    }

    /// Short lowercase name, as used on the command line.
    pub fn short_name(self) -> &'static str {
        match self {
            VoxelType::Int8 => "int8",
            VoxelType::UInt8 => "uint8",
            VoxelType::Int16 => "int16",
            VoxelType::UInt16 => "uint16",
            VoxelType::Float32 => "float32",
            VoxelType::Float64 => "float64",
        }
    }

    /// Decode a wire token. Matches by prefix, like the peers do.
    pub fn from_wire(token: &str) -> Result<Self, WireError> {
        Self::ALL
            .into_iter()
            .find(|t| token.starts_with(t.wire_name()))
            .ok_or_else(|| WireError::UnsupportedVoxelType(token.to_string()))
    }

    /// Accepts either the short name or the wire name.
    pub fn from_name(name: &str) -> Result<Self, WireError> {
        Self::ALL
            .into_iter()
            .find(|t| t.short_name() == name)
            .map(Ok)
            .unwrap_or_else(|| Self::from_wire(name))
    }
}

impl std::fmt::Display for VoxelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

// ── Storage Backends ──────────────────────────────────────────────────────────

/// Storage layout family of an image.
///
/// `Tiled` is recognized on the wire so a peer offering it gets a clean
/// refusal, but no transfer path exists for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// One flat buffer.
    Contiguous,
    /// One buffer per plane.
    Planar,
    /// Cell/tile storage. Not implemented.
    Tiled,
}

impl Backend {
    pub const ALL: [Backend; 3] = [Backend::Contiguous, Backend::Planar, Backend::Tiled];

    pub fn wire_name(self) -> &'static str {
        match self {
            Backend::Contiguous => "ArrayImg",
            Backend::Planar => "PlanarImg",
            Backend::Tiled => "CellImg",
        }
    }

    pub fn from_wire(token: &str) -> Result<Self, WireError> {
        Self::ALL
            .into_iter()
            .find(|b| token.starts_with(b.wire_name()))
            .ok_or_else(|| WireError::UnsupportedBackend(token.to_string()))
    }

    /// Fails for backends that cannot be transferred.
    pub fn ensure_supported(self) -> Result<Self, WireError> {
        match self {
            Backend::Contiguous | Backend::Planar => Ok(self),
            Backend::Tiled => Err(WireError::NotImplemented(self)),
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

// ── Constants ─────────────────────────────────────────────────────────────────

/// Per-image envelope protocol version.
pub const PROTOCOL_VERSION: &str = "v1";

/// Marker token following the version in every envelope.
pub const DIM_NUMBER: &str = "dimNumber";

/// Multi-image session control protocol version.
pub const SESSION_VERSION: &str = "v0";

/// Receiver is prepared for metadata and payload.
pub const READY: &str = "ready";

/// Receiver has the complete payload.
pub const DONE: &str = "done";

/// Opening request of a pulling receiver.
pub const CAN_GET: &str = "can get";

/// Private separator inside the metadata message.
pub const METADATA_SEP: &str = "__QWE__";

/// Buffers shorter than this are never split.
pub const CHUNKING_THRESHOLD: usize = 1024;

/// Largest single transport message. Matches the contiguous-array ceiling
/// of the JVM peer.
pub const MAX_MESSAGE_BYTES: usize = i32::MAX as usize;

/// Default handshake timeout in seconds.
pub const HANDSHAKE_TIMEOUT_SECS: u64 = 60;

/// Default wait for a continuation once a transfer has begun.
pub const CONTINUATION_TIMEOUT_SECS: u64 = 60;

/// Polling granularity.
pub const POLL_INTERVAL_MS: u64 = 1000;

/// Heartbeat period while waiting.
pub const HEARTBEAT_SECS: u64 = 10;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting wire-format data or when an
/// image cannot be represented on the wire.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("unknown protocol '{0}', expecting protocol {}", PROTOCOL_VERSION)]
    UnknownVersion(String),

    #[error("incorrect protocol, expecting {}", DIM_NUMBER)]
    MissingDimNumber,

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("unsupported voxel type '{0}'")]
    UnsupportedVoxelType(String),

    #[error("unsupported image backend type '{0}'")]
    UnsupportedBackend(String),

    #[error("{0} backend is not implemented")]
    NotImplemented(Backend),

    #[error("refusing to transfer an empty image")]
    EmptyImage,

    #[error("image too large for this host: {0}")]
    ImageTooLarge(String),

    #[error("image storage does not match its shape: {0}")]
    ShapeMismatch(String),

    #[error("corrupted metadata: {0}")]
    CorruptedMetadata(String),

    #[error("malformed session line '{0}'")]
    MalformedSessionLine(String),

    #[error("reserved flags are non-zero: 0x{0:02x}")]
    ReservedFlagsSet(u8),

    #[error("message length {len} exceeds maximum {max}")]
    MessageTooLarge { len: usize, max: usize },

    #[error("chunk carries {actual} bytes, expected {expected}")]
    ChunkLengthMismatch { expected: usize, actual: usize },

    #[error("message ended before the payload was complete")]
    UnexpectedEndOfMessage,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
