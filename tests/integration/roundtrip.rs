use imgwire::{receive_one, request_one, send_one, serve_one, SessionState, TransferSession};
use imgwire_core::{Backend, ImageArray, VoxelType};

use crate::*;

// ══════════════════════════════════════════════════════════════════════════════
//  Image fidelity across every voxel type and layout
// ══════════════════════════════════════════════════════════════════════════════

/// Below and above the chunking threshold.
const SHAPES: [&[usize]; 3] = [&[5, 4], &[40, 30, 3], &[2000]];

async fn push_through_session(image: &ImageArray) -> ImageArray {
    let mut receiver = TransferSession::receive(0, quick_config()).await.unwrap();
    let port = receiver.local_port().unwrap();
    let mut sender = TransferSession::send(&loopback(port), 1, quick_config());

    let (received, sent) = tokio::join!(receiver.receive_image(), async {
        let sent = sender.send_image(image).await;
        let hung = sender.hang_up_and_close().await;
        sent.and(hung)
    });

    sent.unwrap();
    let received = received.unwrap().expect("an image was sent");
    assert_eq!(received.envelope, image.envelope());
    assert_eq!(received.metadata.name, image.name);
    assert!(!receiver.has_next());
    assert_eq!(receiver.state(), SessionState::Closed);
    received.image
}

#[tokio::test]
async fn test_every_type_and_backend_survives_a_session() {
    for voxel_type in VoxelType::ALL {
        for backend in [Backend::Contiguous, Backend::Planar] {
            for dims in SHAPES {
                let name = format!("{voxel_type}-{backend}-{}", dims.len());
                let image = sample_image(&name, dims, voxel_type, backend);
                let back = push_through_session(&image).await;
                assert_eq!(back, image, "{name} changed in transit");
            }
        }
    }
}

#[tokio::test]
async fn test_one_shot_push() {
    let image = sample_image("single", &[64, 64], VoxelType::Float32, Backend::Contiguous);
    let port = free_port();
    let config = quick_config();

    let addr = loopback(port);
    let (received, sent) = tokio::join!(
        receive_one(port, &config, None),
        send_one(&image, &addr, &config, None),
    );

    sent.unwrap();
    let received = received.unwrap();
    assert_eq!(received.image, image);
    assert_eq!(received.metadata.name, "single");
}

#[tokio::test]
async fn test_one_shot_pull() {
    let image = sample_image("offered", &[16, 16, 6], VoxelType::Int16, Backend::Planar);
    let port = free_port();
    let config = quick_config();

    let addr = loopback(port);
    let (served, requested) = tokio::join!(
        serve_one(&image, port, &config, None),
        request_one(&addr, &config, None),
    );

    served.unwrap();
    let requested = requested.unwrap();
    assert_eq!(requested.envelope.backend, Backend::Planar);
    assert_eq!(requested.image, image);
}

#[tokio::test]
async fn test_tcp_scheme_prefix_is_accepted() {
    let image = sample_image("prefixed", &[3, 3], VoxelType::UInt8, Backend::Contiguous);
    let mut receiver = TransferSession::receive(0, quick_config()).await.unwrap();
    let addr = format!("tcp://{}", loopback(receiver.local_port().unwrap()));
    let mut sender = TransferSession::send(&addr, 1, quick_config());

    let (received, sent) = tokio::join!(receiver.receive_image(), async {
        let sent = sender.send_image(&image).await;
        sent.and(sender.hang_up_and_close().await)
    });

    sent.unwrap();
    assert_eq!(received.unwrap().unwrap().image, image);
}

#[tokio::test]
async fn test_single_element_image() {
    let image = sample_image("dot", &[1], VoxelType::Float64, Backend::Contiguous);
    assert_eq!(push_through_session(&image).await, image);
}
