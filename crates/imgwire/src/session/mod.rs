//! Transfer session — the public state machine.
//!
//! A session owns exactly one pair socket for one role. It pairs with the
//! peer lazily on the first call, layers the `v0` session lines over the
//! per-image protocol, and releases the socket on hang-up, on any failure,
//! and on drop. A session that has failed stays closed.

mod oneshot;
mod state;

pub use oneshot::{receive_one, request_one, send_one, serve_one};
pub use state::{Role, SessionState};

use std::net::Ipv4Addr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;

use imgwire_core::control::{matches_token, SessionLine};
use imgwire_core::wire::CAN_GET;
use imgwire_core::{ImageArray, TransferConfig};

use crate::error::{ErrorKind, Result, TransferError};
use crate::progress::{self, ProgressSink, SharedProgress};
use crate::transfer::{ImageCodec, ReceivedImage};
use crate::transport::PairSocket;

enum Endpoint {
    Connect(String),
    Bind {
        /// Dropped once the peer is accepted.
        listener: Option<TcpListener>,
        port: u16,
    },
}

pub struct TransferSession {
    role: Role,
    endpoint: Endpoint,
    config: TransferConfig,
    /// Hint sent before every image, or the last one parsed.
    expected_images: u32,
    images_done: u32,
    all_transferred: bool,
    state: SessionState,
    socket: Option<PairSocket<TcpStream>>,
    progress: SharedProgress,
}

impl TransferSession {
    /// Push images to `addr`. `expected_images` is the hint, 0 if unknown.
    pub fn send(addr: &str, expected_images: u32, config: TransferConfig) -> Self {
        Self::connecting(Role::Send, addr, expected_images, config)
    }

    /// Wait on `port` for a sender to push images. Port 0 picks one.
    pub async fn receive(port: u16, config: TransferConfig) -> Result<Self> {
        Self::binding(Role::Receive, port, 0, config).await
    }

    /// Offer images on `port` to whoever asks for them.
    pub async fn serve(port: u16, expected_images: u32, config: TransferConfig) -> Result<Self> {
        Self::binding(Role::Serve, port, expected_images, config).await
    }

    /// Ask the server at `addr` for its images.
    pub fn request(addr: &str, config: TransferConfig) -> Self {
        Self::connecting(Role::Request, addr, 0, config)
    }

    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }

    fn connecting(role: Role, addr: &str, expected_images: u32, config: TransferConfig) -> Self {
        let addr = addr.strip_prefix("tcp://").unwrap_or(addr).to_string();
        tracing::debug!(%role, addr, "session created");
        Self::new(role, Endpoint::Connect(addr), expected_images, config)
    }

    async fn binding(
        role: Role,
        port: u16,
        expected_images: u32,
        config: TransferConfig,
    ) -> Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await?;
        let port = listener.local_addr()?.port();
        tracing::info!(%role, port, "listening");
        let endpoint = Endpoint::Bind {
            listener: Some(listener),
            port,
        };
        Ok(Self::new(role, endpoint, expected_images, config))
    }

    fn new(role: Role, endpoint: Endpoint, expected_images: u32, config: TransferConfig) -> Self {
        Self {
            role,
            endpoint,
            config,
            expected_images,
            images_done: 0,
            all_transferred: false,
            state: SessionState::Idle,
            socket: None,
            progress: None,
        }
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Most recent image-count hint. Not a countdown.
    pub fn expected_image_count(&self) -> u32 {
        self.expected_images
    }

    pub fn images_transferred(&self) -> u32 {
        self.images_done
    }

    /// Bound port of a receive or serve session.
    pub fn local_port(&self) -> Option<u16> {
        match self.endpoint {
            Endpoint::Bind { port, .. } => Some(port),
            Endpoint::Connect(_) => None,
        }
    }

    /// False once the end of the stream was seen or the session closed.
    pub fn has_next(&self) -> bool {
        !self.all_transferred && self.state != SessionState::Closed
    }

    // ── Operations ───────────────────────────────────────────────────────────

    pub async fn send_image(&mut self, image: &ImageArray) -> Result<()> {
        self.check("send_image", Role::Send)?;
        let result = self.push_image(image).await;
        self.guard(result)
    }

    pub async fn serve_image(&mut self, image: &ImageArray) -> Result<()> {
        self.check("serve_image", Role::Serve)?;
        let result = self.push_image(image).await;
        self.guard(result)
    }

    /// Next pushed image. `None` when the sender hung up without one.
    pub async fn receive_image(&mut self) -> Result<Option<ReceivedImage>> {
        self.check("receive_image", Role::Receive)?;
        let result = self.pull_image().await;
        self.guard(result)
    }

    /// Next served image. `None` when the server hung up without one.
    pub async fn request_image(&mut self) -> Result<Option<ReceivedImage>> {
        self.check("request_image", Role::Request)?;
        let result = self.pull_image().await;
        self.guard(result)
    }

    /// Tell the peer no more images follow, then close.
    pub async fn hang_up_and_close(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Err(TransferError::SessionClosed);
        }
        if !self.role.is_sending() {
            return Err(TransferError::WrongRole {
                op: "hang_up_and_close",
                role: self.role,
            });
        }
        let result = self.hang_up().await;
        if let Err(e) = &result {
            tracing::warn!(role = %self.role, error = %e, "hang-up failed");
        }
        self.close();
        result
    }

    /// Release the socket. Idempotent.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        progress::info(&self.progress, &format!("{} cleaning", self.role.actor()));
        self.socket = None;
        if let Endpoint::Bind { listener, .. } = &mut self.endpoint {
            *listener = None;
        }
        self.state = SessionState::Closed;
        tracing::debug!(role = %self.role, images = self.images_done, "session closed");
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn check(&self, op: &'static str, role: Role) -> Result<()> {
        if self.state == SessionState::Closed {
            return Err(TransferError::SessionClosed);
        }
        if self.role != role {
            return Err(TransferError::WrongRole {
                op,
                role: self.role,
            });
        }
        Ok(())
    }

    /// Any failure closes the session.
    fn guard<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            tracing::warn!(role = %self.role, error = %e, kind = ?e.kind(), "transfer failed, closing session");
            self.close();
        }
        result
    }

    fn codec(&self) -> ImageCodec {
        ImageCodec::new(self.role.actor(), &self.config, self.progress.clone())
    }

    fn report_progress(&self) {
        if self.expected_images > 0 {
            let fraction = f64::from(self.images_done) / f64::from(self.expected_images);
            progress::set_progress(&self.progress, fraction);
        }
    }

    /// Pair with the peer on first use. Returns true if this call did it.
    async fn open(&mut self) -> Result<bool> {
        if self.socket.is_some() {
            return Ok(false);
        }
        let started = Instant::now();
        let budget = self.config.handshake_timeout();
        let codec = self.codec();
        let waiter = codec.waiter();

        let stream = match &mut self.endpoint {
            Endpoint::Connect(addr) => waiter.connect_with_retry(addr, budget).await?,
            Endpoint::Bind { listener, .. } => {
                let listener = listener.take().ok_or(TransferError::SessionClosed)?;
                waiter.accept_within(&listener, budget).await?
            }
        };
        let mut socket = PairSocket::new(stream, self.config.max_message_bytes);
        self.state = SessionState::Open;

        let remaining = budget
            .saturating_sub(started.elapsed())
            .max(self.config.poll_interval());
        match self.role {
            Role::Request => {
                socket.send_text(CAN_GET, false).await?;
                progress::info(&self.progress, "receiver initial request sent");
            }
            Role::Serve => {
                progress::info(&self.progress, "server waiting for initial request");
                let frame = waiter
                    .wait_for_message(&mut socket, remaining)
                    .await?
                    .ok_or_else(|| TransferError::timeout(waiter.label(), budget))?;
                if !matches_token(&frame.payload, CAN_GET) {
                    return Err(TransferError::UnexpectedReply {
                        expected: CAN_GET,
                        got: frame.text().into_owned(),
                    });
                }
            }
            Role::Send | Role::Receive => {}
        }

        tracing::info!(role = %self.role, peer = ?socket.peer_addr(), "session open");
        self.socket = Some(socket);
        Ok(true)
    }

    async fn push_image(&mut self, image: &ImageArray) -> Result<()> {
        let codec = self.codec();
        codec.check_outgoing(image)?;
        let actor = self.role.actor();
        progress::info(&self.progress, &format!("{actor} started"));
        self.open().await?;

        let timeout = self.config.handshake_timeout();
        let line = SessionLine::Expect(self.expected_images).encode();
        progress::info(&self.progress, &format!("sending header: {line}"));

        let socket = self.socket.as_mut().ok_or(TransferError::SessionClosed)?;
        socket.send_text(&line, false).await?;
        codec
            .send_image(socket, image, &image.metadata(), timeout)
            .await?;

        self.images_done += 1;
        self.report_progress();
        progress::info(&self.progress, &format!("{actor} finished"));
        Ok(())
    }

    async fn pull_image(&mut self) -> Result<Option<ReceivedImage>> {
        let actor = self.role.actor();
        progress::info(&self.progress, &format!("{actor} started"));
        let started = Instant::now();
        let first = self.open().await?;

        let codec = self.codec();
        let waiter = codec.waiter();
        let handshake = self.config.handshake_timeout();
        let continuation = self.config.continuation_timeout();
        let progress = self.progress.clone();
        let socket = self.socket.as_mut().ok_or(TransferError::SessionClosed)?;

        if first {
            progress::info(&progress, "receiver waiting for first v0 header");
            let remaining = handshake
                .saturating_sub(started.elapsed())
                .max(self.config.poll_interval());
            let frame = waiter
                .wait_for_message(socket, remaining)
                .await?
                .ok_or_else(|| TransferError::timeout(actor, handshake))?;
            let text = frame.text();
            progress::info(&progress, &format!("received header: {text}"));
            match SessionLine::decode(&text)? {
                SessionLine::Expect(k) => self.expected_images = k,
                SessionLine::Hangup => {
                    self.end_of_stream();
                    return Ok(None);
                }
            }
        }

        let header = waiter
            .expect_message(socket, handshake)
            .await?;
        let received = codec.receive_image(socket, &header.text()).await?;
        self.images_done += 1;

        progress::info(&progress, "receiver waiting for next v0 header");
        let more = match waiter.wait_for_message(socket, continuation).await {
            Ok(Some(frame)) => {
                let text = frame.text();
                progress::info(&progress, &format!("received header: {text}"));
                match SessionLine::decode(&text)? {
                    SessionLine::Expect(k) => {
                        self.expected_images = k;
                        true
                    }
                    SessionLine::Hangup => false,
                }
            }
            Ok(None) => false,
            Err(e) if e.kind() == ErrorKind::TransportFault && socket.peer_closed() => {
                tracing::warn!(role = %self.role, "peer left without hanging up");
                false
            }
            Err(e) => return Err(e),
        };

        self.report_progress();
        if !more {
            self.end_of_stream();
        }
        progress::info(&progress, &format!("{actor} finished"));
        Ok(Some(received))
    }

    fn end_of_stream(&mut self) {
        self.all_transferred = true;
        progress::info(&self.progress, "receiver hanging up");
        self.close();
    }

    async fn hang_up(&mut self) -> Result<()> {
        self.open().await?;
        progress::info(&self.progress, &format!("{} hanging up", self.role.actor()));

        let socket = self.socket.as_mut().ok_or(TransferError::SessionClosed)?;
        socket.send_text(&SessionLine::Hangup.encode(), false).await?;

        progress::set_progress(&self.progress, 1.0);
        tracing::info!(role = %self.role, images = self.images_done, "hung up");
        Ok(())
    }
}

impl Drop for TransferSession {
    fn drop(&mut self) {
        self.close();
    }
}
