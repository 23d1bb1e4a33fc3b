use std::time::{Duration, Instant};

use tokio::net::TcpListener;

use imgwire::{
    serve_one, ErrorKind, ImageCodec, SessionState, TransferError, TransferSession,
};
use imgwire_core::{
    Backend, ImageArray, Storage, TransferConfig, VoxelBuffer, VoxelType, WireError,
};

use crate::*;

// ══════════════════════════════════════════════════════════════════════════════
//  Timeouts
// ══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_sender_times_out_without_a_listener() {
    let image = sample_image("lonely", &[8, 8], VoxelType::UInt8, Backend::Contiguous);
    let mut sender = TransferSession::send(&loopback(free_port()), 1, impatient_config());

    let started = Instant::now();
    let err = sender.send_image(&image).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConnectionTimeout, "{err}");
    assert!(started.elapsed() >= Duration::from_secs(1));
    assert_eq!(sender.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_silent_receiver_times_out_the_sender() {
    let image = sample_image("unheard", &[8, 8], VoxelType::UInt8, Backend::Contiguous);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let mut sender = TransferSession::send(&loopback(port), 1, impatient_config());

    // Accepts, reads, never answers.
    let mute = async {
        let mut socket = raw_accept(&listener).await;
        let header = raw_next(&mut socket).await;
        let envelope = raw_next(&mut socket).await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        (header, envelope)
    };

    let (result, (header, envelope)) = tokio::join!(sender.send_image(&image), mute);
    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConnectionTimeout, "{err}");
    assert_eq!(header, "v0 expect 1 images");
    assert_eq!(envelope, "v1 dimNumber 2 8 8 UnsignedByteType ArrayImg");
    assert!(!sender.has_next());
}

#[tokio::test]
async fn test_requester_times_out_without_a_server() {
    let mut requester = TransferSession::request(&loopback(free_port()), impatient_config());
    let err = requester.request_image().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConnectionTimeout);
    assert!(!requester.has_next());
}

#[tokio::test]
async fn test_server_times_out_without_a_request() {
    let image = sample_image("unasked", &[4, 4], VoxelType::Int16, Backend::Contiguous);
    let mut server = TransferSession::serve(0, 1, impatient_config()).await.unwrap();
    let port = server.local_port().unwrap();

    // Connects but never says "can get".
    let (result, _socket) = tokio::join!(server.serve_image(&image), raw_connect(port));
    assert_eq!(result.unwrap_err().kind(), ErrorKind::ConnectionTimeout);
}

// ══════════════════════════════════════════════════════════════════════════════
//  Protocol violations from the peer
// ══════════════════════════════════════════════════════════════════════════════

/// Feed `lines` to a fresh receive session and return what it makes of them.
async fn receive_from_script(lines: &[&str]) -> (TransferError, TransferSession) {
    let mut receiver = TransferSession::receive(0, quick_config()).await.unwrap();
    let port = receiver.local_port().unwrap();

    let script = async {
        let mut socket = raw_connect(port).await;
        for line in lines {
            socket.send_text(line, false).await.unwrap();
        }
        socket
    };

    let (result, _socket) = tokio::join!(receiver.receive_image(), script);
    let err = match result {
        Ok(_) => panic!("script {lines:?} was accepted"),
        Err(e) => e,
    };
    (err, receiver)
}

#[tokio::test]
async fn test_cell_backend_is_refused() {
    let (err, receiver) = receive_from_script(&[
        "v0 expect 1 images",
        "v1 dimNumber 2 64 64 UnsignedByteType CellImg",
    ])
    .await;
    assert_eq!(err.kind(), ErrorKind::ProtocolViolation);
    assert!(matches!(err, TransferError::Protocol(WireError::NotImplemented(Backend::Tiled))));
    assert_eq!(receiver.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_unknown_backend_is_refused() {
    let (err, _) = receive_from_script(&[
        "v0 expect 1 images",
        "v1 dimNumber 2 64 64 FloatType SparseImg",
    ])
    .await;
    assert!(matches!(err, TransferError::Protocol(WireError::UnsupportedBackend(_))));
}

#[tokio::test]
async fn test_unknown_voxel_type_is_refused() {
    let (err, _) = receive_from_script(&[
        "v0 expect 1 images",
        "v1 dimNumber 1 16 LongType ArrayImg",
    ])
    .await;
    assert!(matches!(err, TransferError::Protocol(WireError::UnsupportedVoxelType(_))));
}

#[tokio::test]
async fn test_wrong_envelope_version_is_refused() {
    let (err, _) = receive_from_script(&[
        "v0 expect 1 images",
        "v2 dimNumber 1 16 FloatType ArrayImg",
    ])
    .await;
    assert!(matches!(err, TransferError::Protocol(WireError::UnknownVersion(_))));
}

#[tokio::test]
async fn test_zero_extent_envelope_is_refused() {
    let (err, _) = receive_from_script(&[
        "v0 expect 1 images",
        "v1 dimNumber 2 16 0 FloatType ArrayImg",
    ])
    .await;
    assert!(matches!(err, TransferError::Protocol(WireError::EmptyImage)));
}

#[tokio::test]
async fn test_unallocatable_envelope_is_refused() {
    let (err, receiver) = receive_from_script(&[
        "v0 expect 1 images",
        "v1 dimNumber 1 4611686018427387904 ShortType ArrayImg",
    ])
    .await;
    assert!(matches!(err, TransferError::Protocol(WireError::ImageTooLarge(_))));
    assert_eq!(err.kind(), ErrorKind::ProtocolViolation);
    assert_eq!(receiver.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_malformed_session_line_is_refused() {
    let (err, _) = receive_from_script(&["v0 gimme images"]).await;
    assert!(matches!(err, TransferError::Protocol(WireError::MalformedSessionLine(_))));
    assert_eq!(err.kind(), ErrorKind::ProtocolViolation);
}

#[tokio::test]
async fn test_receiver_answering_nonsense() {
    let image = sample_image("misheard", &[8, 8], VoxelType::Float32, Backend::Contiguous);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let mut sender = TransferSession::send(&loopback(port), 1, quick_config());

    let confused = async {
        let mut socket = raw_accept(&listener).await;
        raw_next(&mut socket).await;
        raw_next(&mut socket).await;
        socket.send_text("steady", false).await.unwrap();
        socket
    };

    let (result, _socket) = tokio::join!(sender.send_image(&image), confused);
    match result.unwrap_err() {
        TransferError::UnexpectedReply { expected, got } => {
            assert_eq!(expected, "ready");
            assert_eq!(got, "steady");
        }
        other => panic!("unexpected error {other}"),
    }
}

#[tokio::test]
async fn test_server_refuses_a_bad_request() {
    let image = sample_image("guarded", &[8, 8], VoxelType::UInt8, Backend::Contiguous);
    let mut server = TransferSession::serve(0, 1, quick_config()).await.unwrap();
    let port = server.local_port().unwrap();

    let rude = async {
        let mut socket = raw_connect(port).await;
        socket.send_text("gimme", false).await.unwrap();
        socket
    };

    let (result, _socket) = tokio::join!(server.serve_image(&image), rude);
    let err = result.unwrap_err();
    assert!(matches!(err, TransferError::UnexpectedReply { expected: "can get", .. }));
    assert_eq!(server.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_sender_leaving_without_hangup_ends_the_stream() {
    let image = sample_image("parting", &[40, 40], VoxelType::UInt16, Backend::Contiguous);
    let mut receiver = TransferSession::receive(0, quick_config()).await.unwrap();
    let port = receiver.local_port().unwrap();

    // One image announced as the first of two, then the socket drops.
    let abrupt = async {
        let mut socket = raw_connect(port).await;
        socket.send_text("v0 expect 2 images", false).await.unwrap();
        ImageCodec::new("sender", &quick_config(), None)
            .send_image(&mut socket, &image, &image.metadata(), Duration::from_secs(2))
            .await
            .unwrap();
    };

    let (received, ()) = tokio::join!(receiver.receive_image(), abrupt);
    assert_eq!(received.unwrap().unwrap().image, image);
    assert!(!receiver.has_next());
    assert_eq!(receiver.state(), SessionState::Closed);
}

// ══════════════════════════════════════════════════════════════════════════════
//  Local refusals
// ══════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_empty_image_is_refused_before_serving() {
    let empty = ImageArray {
        name: "void".into(),
        dims: vec![4, 0, 2],
        voxel_type: VoxelType::Int8,
        storage: Storage::Contiguous(VoxelBuffer::Int8(Vec::new())),
    };

    let started = Instant::now();
    let err = serve_one(&empty, free_port(), &quick_config(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::Protocol(WireError::EmptyImage)));
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[tokio::test]
async fn test_planar_shape_mismatch_is_refused_before_connecting() {
    let mut image = sample_image("torn", &[8, 8, 3], VoxelType::Float64, Backend::Planar);
    if let Storage::Planar(planes) = &mut image.storage {
        planes.pop();
    }
    let mut sender = TransferSession::send(&loopback(free_port()), 1, quick_config());

    let started = Instant::now();
    let err = sender.send_image(&image).await.unwrap_err();
    assert!(matches!(err, TransferError::Protocol(WireError::ShapeMismatch(_))));
    assert_eq!(err.kind(), ErrorKind::ProtocolViolation);
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[tokio::test]
async fn test_oversized_chunks_are_refused_before_connecting() {
    let image = sample_image("wide", &[200, 200], VoxelType::UInt8, Backend::Contiguous);
    let config = TransferConfig {
        max_message_bytes: 4096,
        ..quick_config()
    };
    let mut sender = TransferSession::send(&loopback(free_port()), 1, config);

    let started = Instant::now();
    let err = sender.send_image(&image).await.unwrap_err();
    assert!(matches!(
        err,
        TransferError::Protocol(WireError::MessageTooLarge { len: 40_000, max: 4096 })
    ));
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[tokio::test]
async fn test_wrong_role_does_not_close_the_session() {
    let image = sample_image("misplaced", &[2, 2], VoxelType::UInt8, Backend::Contiguous);
    let mut requester = TransferSession::request(&loopback(free_port()), quick_config());

    let err = requester.serve_image(&image).await.unwrap_err();
    assert!(matches!(err, TransferError::WrongRole { op: "serve_image", .. }));
    assert!(matches!(
        requester.hang_up_and_close().await,
        Err(TransferError::WrongRole { .. })
    ));
    assert_eq!(requester.state(), SessionState::Idle);
    assert!(requester.has_next());
}
