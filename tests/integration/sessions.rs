use imgwire::{Result, Role, SessionState, TransferError, TransferSession};
use imgwire_core::{Backend, ImageArray, VoxelType};

use crate::*;

// ══════════════════════════════════════════════════════════════════════════════
//  Multi-image streams
// ══════════════════════════════════════════════════════════════════════════════

fn stack(count: usize) -> Vec<ImageArray> {
    (0..count)
        .map(|i| {
            let backend = if i % 2 == 0 { Backend::Contiguous } else { Backend::Planar };
            sample_image(&format!("frame-{i}"), &[32, 24, i + 1], VoxelType::UInt16, backend)
        })
        .collect()
}

/// Pull from `session` until it reports the end of the stream. Also
/// returns how often `has_next` said yes.
async fn drain(session: &mut TransferSession) -> (Vec<ImageArray>, usize) {
    let mut images = Vec::new();
    let mut polls = 0;
    while session.has_next() {
        polls += 1;
        let next = match session.role() {
            Role::Receive => session.receive_image().await,
            _ => session.request_image().await,
        };
        if let Some(received) = next.unwrap() {
            images.push(received.image);
        }
    }
    (images, polls)
}

/// Push every image, then hang up.
async fn push_all(session: &mut TransferSession, images: &[ImageArray]) -> Result<()> {
    for image in images {
        match session.role() {
            Role::Serve => session.serve_image(image).await?,
            _ => session.send_image(image).await?,
        }
    }
    session.hang_up_and_close().await
}

#[tokio::test]
async fn test_three_images_then_hangup() {
    let images = stack(3);
    let mut receiver = TransferSession::receive(0, quick_config()).await.unwrap();
    let port = receiver.local_port().unwrap();
    let mut sender = TransferSession::send(&loopback(port), 3, quick_config());

    let ((received, polls), sent) = tokio::join!(
        drain(&mut receiver),
        push_all(&mut sender, &images),
    );

    sent.unwrap();
    assert_eq!(polls, 3);
    assert_eq!(received, images);
    assert_eq!(receiver.expected_image_count(), 3);
    assert_eq!(receiver.images_transferred(), 3);
    assert!(!receiver.has_next());
    assert_eq!(receiver.state(), SessionState::Closed);
    assert_eq!(sender.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_serve_and_request() {
    let images = stack(2);
    let mut server = TransferSession::serve(0, 2, quick_config()).await.unwrap();
    let port = server.local_port().unwrap();
    let mut requester = TransferSession::request(&loopback(port), quick_config());

    let ((received, _), served) = tokio::join!(
        drain(&mut requester),
        push_all(&mut server, &images),
    );

    served.unwrap();
    assert_eq!(received, images);
    assert_eq!(requester.expected_image_count(), 2);
    assert_eq!(requester.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_hangup_before_any_image() {
    let mut receiver = TransferSession::receive(0, quick_config()).await.unwrap();
    let port = receiver.local_port().unwrap();
    let mut sender = TransferSession::send(&loopback(port), 0, quick_config());

    let (received, hung) = tokio::join!(receiver.receive_image(), sender.hang_up_and_close());

    hung.unwrap();
    assert!(received.unwrap().is_none());
    assert!(!receiver.has_next());
    assert_eq!(receiver.images_transferred(), 0);
}

#[tokio::test]
async fn test_unknown_count_is_zero() {
    let images = stack(2);
    let mut receiver = TransferSession::receive(0, quick_config()).await.unwrap();
    let port = receiver.local_port().unwrap();
    let mut sender = TransferSession::send(&loopback(port), 0, quick_config());

    let ((received, _), sent) = tokio::join!(
        drain(&mut receiver),
        push_all(&mut sender, &images),
    );

    sent.unwrap();
    assert_eq!(received.len(), 2);
    assert_eq!(receiver.expected_image_count(), 0);
}

#[tokio::test]
async fn test_hint_is_not_a_promise() {
    // Announce five, deliver two.
    let images = stack(2);
    let mut receiver = TransferSession::receive(0, quick_config()).await.unwrap();
    let port = receiver.local_port().unwrap();
    let mut sender = TransferSession::send(&loopback(port), 5, quick_config());

    let ((received, _), sent) = tokio::join!(
        drain(&mut receiver),
        push_all(&mut sender, &images),
    );

    sent.unwrap();
    assert_eq!(received, images);
    assert_eq!(receiver.expected_image_count(), 5);
}

#[tokio::test]
async fn test_sessions_refuse_reuse_after_the_stream_ends() {
    let image = sample_image("once", &[4, 4], VoxelType::Int8, Backend::Contiguous);
    let mut receiver = TransferSession::receive(0, quick_config()).await.unwrap();
    let port = receiver.local_port().unwrap();
    let mut sender = TransferSession::send(&loopback(port), 1, quick_config());

    let (received, sent) = tokio::join!(
        receiver.receive_image(),
        push_all(&mut sender, std::slice::from_ref(&image)),
    );
    sent.unwrap();
    received.unwrap().unwrap();

    assert!(matches!(
        sender.send_image(&image).await,
        Err(TransferError::SessionClosed)
    ));
    assert!(matches!(
        receiver.receive_image().await,
        Err(TransferError::SessionClosed)
    ));
}

// ══════════════════════════════════════════════════════════════════════════════
//  Progress reporting
// ══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_progress_reaches_both_hosts() {
    let images = stack(2);
    let rx_log = Recorder::shared();
    let tx_log = Recorder::shared();

    let mut receiver = TransferSession::receive(0, quick_config())
        .await
        .unwrap()
        .with_progress(rx_log.clone());
    let port = receiver.local_port().unwrap();
    let mut sender =
        TransferSession::send(&loopback(port), 2, quick_config()).with_progress(tx_log.clone());

    let ((received, _), sent) = tokio::join!(
        drain(&mut receiver),
        push_all(&mut sender, &images),
    );
    sent.unwrap();
    assert_eq!(received.len(), 2);

    assert!(tx_log.saw("sender started"));
    assert!(tx_log.saw("sending header: v0 expect 2 images"));
    assert!(tx_log.saw("sender hanging up"));
    assert!(tx_log.saw("sender cleaning"));
    assert_eq!(tx_log.fractions(), vec![0.5, 1.0, 1.0]);

    assert!(rx_log.saw("receiver waiting for first v0 header"));
    assert!(rx_log.saw("received header: v0 expect 2 images"));
    assert!(rx_log.saw("received header: v0 hangup"));
    assert!(rx_log.saw("receiver cleaning"));
    assert_eq!(rx_log.fractions(), vec![0.5, 1.0]);
}
