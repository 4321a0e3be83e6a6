//! Transports that deliver instruction batches to the DSX server.
//!
//! Delivery is fire-and-forget: a send either completes promptly or fails,
//! and callers drop the batch on failure rather than queueing it.

use crate::error::TransportError;
use crate::instruction::InstructionBatch;
use crate::response::ServerResponse;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, trace};

/// Upper bound on a single datagram send.
pub const SEND_TIMEOUT: Duration = Duration::from_millis(50);

/// Delivery seam between the feedback pipeline and the controller server.
#[async_trait]
pub trait ControllerTransport: Send + Sync {
    /// Send one batch as one packet.
    ///
    /// # Errors
    ///
    /// Encoding, socket and timeout failures. None of them are retried.
    async fn send(&self, batch: &InstructionBatch) -> Result<(), TransportError>;

    /// Wait up to `timeout` for the server's status reply.
    ///
    /// Transports without a return channel report no reply.
    ///
    /// # Errors
    ///
    /// Receive failures on the underlying channel.
    async fn receive_status(
        &self,
        _timeout: Duration,
    ) -> Result<Option<ServerResponse>, TransportError> {
        Ok(None)
    }

    /// Human-readable destination for logs.
    fn describe(&self) -> String;
}

/// UDP transport with a single socket bound once at construction.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    target: SocketAddr,
}

impl UdpTransport {
    /// Bind an ephemeral local port in the target's address family.
    ///
    /// # Errors
    ///
    /// [`TransportError::Bind`], which is fatal.
    pub async fn bind(target: SocketAddr) -> Result<Self, TransportError> {
        let local: SocketAddr = if target.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|source| TransportError::Bind {
                address: local.to_string(),
                source,
            })?;
        debug!(%target, local = ?socket.local_addr().ok(), "DSX transport bound");
        Ok(Self { socket, target })
    }

    #[must_use]
    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// # Errors
    ///
    /// Propagates the socket error.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.socket.local_addr().map_err(TransportError::Receive)
    }

    /// Wait up to `timeout` for a status reply from the server.
    ///
    /// Returns `Ok(None)` when nothing arrives in time or the reply is not a
    /// status object.
    ///
    /// # Errors
    ///
    /// Socket receive failures.
    pub async fn recv_response(
        &self,
        timeout: Duration,
    ) -> Result<Option<ServerResponse>, TransportError> {
        let mut buf = vec![0u8; 2048];
        match tokio::time::timeout(timeout, self.socket.recv_from(&mut buf)).await {
            Ok(Ok((len, peer))) => {
                let payload = buf.get(..len).unwrap_or_default();
                match ServerResponse::decode(payload) {
                    Ok(reply) => Ok(Some(reply)),
                    Err(err) => {
                        trace!(%peer, error = %err, "ignoring non-status datagram");
                        Ok(None)
                    }
                }
            }
            Ok(Err(err)) => Err(TransportError::Receive(err)),
            Err(_) => Ok(None),
        }
    }
}

#[async_trait]
impl ControllerTransport for UdpTransport {
    async fn send(&self, batch: &InstructionBatch) -> Result<(), TransportError> {
        let bytes = batch.encode()?;
        let sent = tokio::time::timeout(SEND_TIMEOUT, self.socket.send_to(&bytes, self.target))
            .await
            .map_err(|_| TransportError::Timeout {
                timeout_ms: u64::try_from(SEND_TIMEOUT.as_millis()).unwrap_or(u64::MAX),
            })?
            .map_err(TransportError::Send)?;
        if sent != bytes.len() {
            return Err(TransportError::Truncated {
                sent,
                expected: bytes.len(),
            });
        }
        trace!(bytes = sent, instructions = batch.len(), "sent DSX packet");
        Ok(())
    }

    async fn receive_status(
        &self,
        timeout: Duration,
    ) -> Result<Option<ServerResponse>, TransportError> {
        self.recv_response(timeout).await
    }

    fn describe(&self) -> String {
        format!("udp://{}", self.target)
    }
}

/// In-memory transport that keeps every batch it is given.
///
/// Batches are pushed through the codec so only wire-valid batches are
/// recorded. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    sent: Arc<Mutex<Vec<InstructionBatch>>>,
    fail_sends: Arc<Mutex<usize>>,
    replies: Arc<Mutex<VecDeque<ServerResponse>>>,
}

impl RecordingTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` sends fail with [`TransportError::Unavailable`].
    pub fn fail_next(&self, count: usize) {
        *self.fail_sends.lock() = count;
    }

    /// Queue a status reply for the next [`ControllerTransport::receive_status`].
    pub fn push_reply(&self, reply: ServerResponse) {
        self.replies.lock().push_back(reply);
    }

    #[must_use]
    pub fn batches(&self) -> Vec<InstructionBatch> {
        self.sent.lock().clone()
    }

    #[must_use]
    pub fn last(&self) -> Option<InstructionBatch> {
        self.sent.lock().last().cloned()
    }

    /// Drain the log.
    pub fn take(&self) -> Vec<InstructionBatch> {
        std::mem::take(&mut *self.sent.lock())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sent.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sent.lock().is_empty()
    }
}

#[async_trait]
impl ControllerTransport for RecordingTransport {
    async fn send(&self, batch: &InstructionBatch) -> Result<(), TransportError> {
        {
            let mut remaining = self.fail_sends.lock();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(TransportError::Unavailable("injected failure".to_string()));
            }
        }
        let decoded = InstructionBatch::decode(&batch.encode()?)?;
        self.sent.lock().push(decoded);
        Ok(())
    }

    async fn receive_status(
        &self,
        _timeout: Duration,
    ) -> Result<Option<ServerResponse>, TransportError> {
        Ok(self.replies.lock().pop_front())
    }

    fn describe(&self) -> String {
        "recording".to_string()
    }
}

#[async_trait]
impl<T: ControllerTransport + ?Sized> ControllerTransport for Arc<T> {
    async fn send(&self, batch: &InstructionBatch) -> Result<(), TransportError> {
        (**self).send(batch).await
    }

    async fn receive_status(
        &self,
        timeout: Duration,
    ) -> Result<Option<ServerResponse>, TransportError> {
        (**self).receive_status(timeout).await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::ControllerInstruction;
    use crate::types::{Trigger, TriggerMode};

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn sample_batch() -> InstructionBatch {
        InstructionBatch::new()
            .with(ControllerInstruction::trigger(0, Trigger::Left, TriggerMode::Normal, 1))
            .with(ControllerInstruction::rgb(0, 0, 255, 0))
    }

    #[tokio::test]
    async fn test_udp_send_reaches_listener() -> TestResult {
        let listener = UdpSocket::bind("127.0.0.1:0").await?;
        let transport = UdpTransport::bind(listener.local_addr()?).await?;

        transport.send(&sample_batch()).await?;

        let mut buf = vec![0u8; 2048];
        let (len, _) =
            tokio::time::timeout(Duration::from_secs(2), listener.recv_from(&mut buf)).await??;
        let received = InstructionBatch::decode(buf.get(..len).ok_or("short read")?)?;
        assert_eq!(received, sample_batch());
        Ok(())
    }

    #[tokio::test]
    async fn test_recv_response_times_out_quietly() -> TestResult {
        let listener = UdpSocket::bind("127.0.0.1:0").await?;
        let transport = UdpTransport::bind(listener.local_addr()?).await?;
        let reply = transport.recv_response(Duration::from_millis(20)).await?;
        assert!(reply.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_recv_response_parses_status() -> TestResult {
        let server = UdpSocket::bind("127.0.0.1:0").await?;
        let transport = UdpTransport::bind(server.local_addr()?).await?;
        transport.send(&sample_batch()).await?;

        let mut buf = vec![0u8; 2048];
        let (_, client) = server.recv_from(&mut buf).await?;
        server
            .send_to(br#"{"Status":"ok","isControllerConnected":true}"#, client)
            .await?;

        let reply = transport.recv_response(Duration::from_secs(2)).await?;
        assert!(reply.is_some_and(|r| r.is_controller_connected));
        Ok(())
    }

    #[tokio::test]
    async fn test_recording_transport_records_and_fails_on_demand() -> TestResult {
        let transport = RecordingTransport::new();
        transport.fail_next(1);

        let first = transport.send(&sample_batch()).await;
        assert!(matches!(first, Err(TransportError::Unavailable(_))));
        assert!(transport.is_empty());

        transport.send(&sample_batch()).await?;
        let shared = transport.clone();
        assert_eq!(shared.len(), 1);
        assert_eq!(shared.last(), Some(sample_batch()));
        assert_eq!(transport.take().len(), 1);
        assert!(shared.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_recording_transport_hands_out_queued_replies() -> TestResult {
        let transport = RecordingTransport::new();
        assert!(transport.receive_status(Duration::ZERO).await?.is_none());

        transport.push_reply(ServerResponse::decode(
            br#"{"Status":"ok","isControllerConnected":true,"BatteryLevel":55}"#,
        )?);
        let shared: Arc<dyn ControllerTransport> = Arc::new(transport.clone());
        let reply = shared.receive_status(Duration::ZERO).await?.ok_or("expected a reply")?;
        assert!(reply.is_controller_connected);
        assert!(transport.receive_status(Duration::ZERO).await?.is_none());
        Ok(())
    }
}
