//! Transport: the framed pair socket and the waits built on it.

pub mod socket;
pub mod waiter;

pub use socket::{Frame, PairSocket};
pub use waiter::ConnectionWaiter;
