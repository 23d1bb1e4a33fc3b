//! imgwire-core — wire format, envelope codecs and the image model.
//! All other imgwire crates depend on this one.

pub mod chunk;
pub mod config;
pub mod control;
pub mod envelope;
pub mod image;
pub mod metadata;
pub mod wire;

pub use config::{ConfigError, TransferConfig};
pub use envelope::Envelope;
pub use image::{ImageArray, Storage, VoxelBuffer};
pub use metadata::Metadata;
pub use wire::{Backend, VoxelType, WireError};
