//! imgwire — moves n-dimensional images between processes.
//!
//! A [`TransferSession`] pairs with one peer in one of four roles and
//! streams images over a framed TCP pair socket. [`ImageWriter`] and
//! [`ImageReader`] put the same framing on a file or any other byte stream.
//! The wire vocabulary and the image model live in `imgwire-core`.

pub mod chunk;
pub mod error;
pub mod progress;
pub mod session;
pub mod stream;
pub mod transfer;
pub mod transport;

pub use error::{ErrorKind, Result, TransferError};
pub use progress::{ProgressSink, SharedProgress, TracingProgress};
pub use session::{
    receive_one, request_one, send_one, serve_one, Role, SessionState, TransferSession,
};
pub use stream::{ImageReader, ImageWriter};
pub use transfer::{ImageCodec, ReceivedImage};
