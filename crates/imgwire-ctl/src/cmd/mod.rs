//! CLI command modules.

pub mod raw;
pub mod receive;
pub mod send;
pub mod stream;
