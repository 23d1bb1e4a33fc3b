//! Chunked array channel — moves voxel buffers as transport-sized chunks.
//!
//! Both ends derive the chunk sequence from the element count and type
//! alone (see [`imgwire_core::chunk::partition`]), so nothing about the
//! split itself travels on the wire.

pub mod receive;
pub mod send;

pub use receive::{receive_buffer, receive_storage};
pub use send::{send_buffer, send_storage};
