//! imgwire integration test harness.
//!
//! Both peers of every test run in the same runtime and talk over
//! loopback TCP. Binding peers take port 0 and hand the chosen port to
//! the connecting side, so tests do not interfere with each other.
//!
//!   cargo test --test integration
//!
//! Timeouts are cut to a second or two; a hung test fails fast instead of
//! waiting out the production defaults.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};

use imgwire::transport::{ConnectionWaiter, PairSocket};
use imgwire::ProgressSink;
use imgwire_core::{Backend, ImageArray, TransferConfig, VoxelBuffer, VoxelType};

mod failures;
mod roundtrip;
mod sessions;

// ── Harness ───────────────────────────────────────────────────────────────────

/// Short timeouts and a fast poll.
pub fn quick_config() -> TransferConfig {
    TransferConfig {
        poll_interval_ms: 10,
        ..TransferConfig::default()
    }
    .with_timeouts(2, 2)
}

/// Even shorter, for tests that are expected to time out.
pub fn impatient_config() -> TransferConfig {
    quick_config().with_timeouts(1, 1)
}

pub fn loopback(port: u16) -> String {
    format!("127.0.0.1:{port}")
}

/// A port nothing is listening on right now.
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .and_then(|l| l.local_addr())
        .map(|a| a.port())
        .expect("no free loopback port")
}

/// Recognizable values that survive the big-endian round trip exactly.
pub fn pattern(voxel_type: VoxelType, len: usize) -> VoxelBuffer {
    match voxel_type {
        VoxelType::Int8 => VoxelBuffer::Int8((0..len).map(|i| (i % 256) as u8 as i8).collect()),
        VoxelType::UInt8 => VoxelBuffer::UInt8((0..len).map(|i| (i * 7 % 256) as u8).collect()),
        VoxelType::Int16 => {
            VoxelBuffer::Int16((0..len).map(|i| (i * 31 % 65536) as u16 as i16).collect())
        }
        VoxelType::UInt16 => VoxelBuffer::UInt16((0..len).map(|i| (i % 65536) as u16).collect()),
        VoxelType::Float32 => {
            VoxelBuffer::Float32((0..len).map(|i| i as f32 * 0.25 - 100.0).collect())
        }
        VoxelType::Float64 => {
            VoxelBuffer::Float64((0..len).map(|i| i as f64 * -1.5 + 1e-3).collect())
        }
    }
}

/// A filled image in the requested layout.
pub fn sample_image(name: &str, dims: &[usize], voxel_type: VoxelType, backend: Backend) -> ImageArray {
    let count = dims.iter().product();
    let image = ImageArray::from_buffer(name, dims, pattern(voxel_type, count))
        .expect("pattern matches shape");
    match backend {
        Backend::Planar => image.to_planar().expect("planar conversion"),
        _ => image,
    }
}

/// A bare pair socket to a session under test, for speaking the
/// protocol by hand.
pub async fn raw_connect(port: u16) -> PairSocket<TcpStream> {
    let stream = TcpStream::connect(loopback(port))
        .await
        .expect("session under test is not listening");
    PairSocket::new(stream, quick_config().max_message_bytes)
}

/// Accept one connection on `listener` as a bare pair socket.
pub async fn raw_accept(listener: &TcpListener) -> PairSocket<TcpStream> {
    let (stream, _) = listener.accept().await.expect("accept failed");
    PairSocket::new(stream, quick_config().max_message_bytes)
}

/// Next message from a hand-driven peer, as text.
pub async fn raw_next(socket: &mut PairSocket<TcpStream>) -> String {
    ConnectionWaiter::new("test peer", &quick_config(), None)
        .expect_message(socket, Duration::from_secs(2))
        .await
        .expect("peer under test went quiet")
        .text()
        .into_owned()
}

/// Progress sink that keeps everything it hears.
#[derive(Default)]
pub struct Recorder {
    pub messages: Mutex<Vec<String>>,
    pub fractions: Mutex<Vec<f64>>,
}

impl Recorder {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn saw(&self, message: &str) -> bool {
        self.messages.lock().unwrap().iter().any(|m| m == message)
    }

    pub fn fractions(&self) -> Vec<f64> {
        self.fractions.lock().unwrap().clone()
    }
}

impl ProgressSink for Recorder {
    fn info(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }

    fn set_progress(&self, fraction: f64) {
        self.fractions.lock().unwrap().push(fraction);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[test]
fn test_pattern_fills_every_type() {
    for voxel_type in VoxelType::ALL {
        let buffer = pattern(voxel_type, 300);
        assert_eq!(buffer.voxel_type(), voxel_type);
        assert_eq!(buffer.len(), 300);
    }
}

#[test]
fn test_sample_image_layouts() {
    let flat = sample_image("a", &[8, 4, 3], VoxelType::UInt16, Backend::Contiguous);
    assert_eq!(flat.backend(), Backend::Contiguous);
    let planar = sample_image("a", &[8, 4, 3], VoxelType::UInt16, Backend::Planar);
    assert_eq!(planar.backend(), Backend::Planar);
    assert_eq!(planar.storage.buffers().len(), 3);
    assert_eq!(planar.to_contiguous().unwrap(), flat);
}
