//! Bounded waits on a pair socket.
//!
//! Every blocking point of the protocol goes through a [`ConnectionWaiter`]:
//! it polls once per tick, gives up after its budget and emits a heartbeat
//! while it waits.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;

use imgwire_core::wire::WireError;
use imgwire_core::TransferConfig;

use super::socket::{Frame, PairSocket};
use crate::error::{Result, TransferError};
use crate::progress::{self, SharedProgress};

#[derive(Clone)]
pub struct ConnectionWaiter {
    /// Who is waiting; shows up in heartbeats and timeout errors.
    label: &'static str,
    tick: Duration,
    heartbeat: Option<Duration>,
    progress: SharedProgress,
}

impl ConnectionWaiter {
    pub fn new(label: &'static str, config: &TransferConfig, progress: SharedProgress) -> Self {
        Self {
            label,
            tick: config.poll_interval(),
            heartbeat: config.heartbeat(),
            progress,
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Wait until a message is available.
    ///
    /// `Ok(false)` means nothing arrived within `timeout`. Transport faults
    /// and malformed frames are still errors.
    pub async fn wait_for_connection<S>(
        &self,
        socket: &mut PairSocket<S>,
        timeout: Duration,
    ) -> Result<bool>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut beat = Heartbeat::new(self);
        loop {
            if socket.poll(self.tick.min(timeout)).await? {
                return Ok(true);
            }
            if beat.elapsed() >= timeout {
                tracing::debug!(waiter = self.label, waited_secs = timeout.as_secs(), "wait timed out");
                return Ok(false);
            }
            beat.tick();
        }
    }

    /// Wait for the next part of a message that is already under way.
    ///
    /// The previous frame must have carried MORE; a stall past `timeout` is
    /// fatal.
    pub async fn wait_for_more<S>(
        &self,
        socket: &mut PairSocket<S>,
        timeout: Duration,
    ) -> Result<Frame>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if !socket.last_more() {
            return Err(WireError::UnexpectedEndOfMessage.into());
        }
        if !self.wait_for_connection(socket, timeout).await? {
            return Err(TransferError::timeout(self.label, timeout));
        }
        socket
            .try_recv()?
            .ok_or_else(|| WireError::UnexpectedEndOfMessage.into())
    }

    /// Wait for a message and take it. `None` on timeout.
    pub async fn wait_for_message<S>(
        &self,
        socket: &mut PairSocket<S>,
        timeout: Duration,
    ) -> Result<Option<Frame>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if !self.wait_for_connection(socket, timeout).await? {
            return Ok(None);
        }
        socket.try_recv()
    }

    /// Like [`wait_for_message`](Self::wait_for_message), but a timeout is
    /// an error.
    pub async fn expect_message<S>(
        &self,
        socket: &mut PairSocket<S>,
        timeout: Duration,
    ) -> Result<Frame>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.wait_for_message(socket, timeout)
            .await?
            .ok_or_else(|| TransferError::timeout(self.label, timeout))
    }

    /// Connect to `addr`, retrying every tick until `timeout`.
    pub async fn connect_with_retry(&self, addr: &str, timeout: Duration) -> Result<TcpStream> {
        let mut beat = Heartbeat::new(self);
        loop {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    tracing::debug!(waiter = self.label, addr, "connected");
                    return Ok(stream);
                }
                Err(e) => {
                    tracing::trace!(waiter = self.label, addr, error = %e, "connect failed, retrying");
                }
            }
            if beat.elapsed() >= timeout {
                return Err(TransferError::timeout(self.label, timeout));
            }
            tokio::time::sleep(self.tick).await;
            beat.tick();
        }
    }

    /// Accept one peer on `listener` within `timeout`.
    pub async fn accept_within(&self, listener: &TcpListener, timeout: Duration) -> Result<TcpStream> {
        let mut beat = Heartbeat::new(self);
        loop {
            let budget = self.tick.min(timeout.saturating_sub(beat.elapsed()));
            if let Ok(accepted) = tokio::time::timeout(budget, listener.accept()).await {
                let (stream, peer) = accepted?;
                stream.set_nodelay(true)?;
                tracing::debug!(waiter = self.label, %peer, "peer connected");
                return Ok(stream);
            }
            if beat.elapsed() >= timeout {
                return Err(TransferError::timeout(self.label, timeout));
            }
            beat.tick();
        }
    }
}

// ── Heartbeat ─────────────────────────────────────────────────────────────────

/// Elapsed-time tracker that reports every heartbeat period.
struct Heartbeat<'a> {
    waiter: &'a ConnectionWaiter,
    started: Instant,
    next: Option<Duration>,
}

impl<'a> Heartbeat<'a> {
    fn new(waiter: &'a ConnectionWaiter) -> Self {
        Self {
            waiter,
            started: Instant::now(),
            next: waiter.heartbeat,
        }
    }

    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn tick(&mut self) {
        let (Some(next), Some(period)) = (self.next, self.waiter.heartbeat) else {
            return;
        };
        let elapsed = self.elapsed();
        if elapsed < next {
            return;
        }
        let message = format!("{} waiting already {} seconds", self.waiter.label, elapsed.as_secs());
        tracing::debug!(waiter = self.waiter.label, waited_secs = elapsed.as_secs(), "still waiting");
        progress::info(&self.waiter.progress, &message);
        self.next = Some(next + period);
    }
}
