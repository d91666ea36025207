//! ZeroMQ transport: how workers listen on `tcp://` addresses.
//!
//! The client holds a REQ socket. Each envelope travels as one multipart
//! message with the session frame wrapped as a routing address, i.e. an
//! empty delimiter frame follows it on the wire. Replies carry the same
//! wrapping and have the delimiter removed before they reach the envelope
//! parser. Messages larger than the configured maximum are protocol faults
//! in either direction; the socket stays usable.

use async_trait::async_trait;
use bytes::Bytes;
use zeromq::{ReqSocket, Socket, SocketRecv, SocketSend, ZmqMessage};

use super::transport::{Transport, parse_address};
use crate::config::ClientConfig;
use crate::error::{BridgeError, Result};

pub struct ZmqTransport {
    socket: Option<ReqSocket>,
    endpoint: String,
    max_message_length: usize,
}

impl ZmqTransport {
    /// Connect a REQ socket, bounded by the configured connect timeout.
    pub async fn connect(address: &str, config: &ClientConfig) -> Result<Self> {
        let endpoint = parse_address(address)?;
        tracing::debug!(%endpoint, timeout = ?config.connect_timeout, "Connecting to worker");

        let mut socket = ReqSocket::new();
        tokio::time::timeout(config.connect_timeout, socket.connect(&endpoint))
            .await
            .map_err(|_| BridgeError::Timeout(config.connect_timeout))??;

        Ok(Self {
            socket: Some(socket),
            endpoint,
            max_message_length: config.max_frame_length,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn socket(&mut self) -> Result<&mut ReqSocket> {
        self.socket.as_mut().ok_or(BridgeError::ConnectionClosed)
    }

    fn check_size(&self, frames: &[Bytes], direction: &str) -> Result<()> {
        let size: usize = frames.iter().map(Bytes::len).sum();
        if size > self.max_message_length {
            return Err(BridgeError::protocol(format!(
                "{direction} message of {size} bytes exceeds limit of {}",
                self.max_message_length
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for ZmqTransport {
    async fn send(&mut self, frames: Vec<Bytes>) -> Result<()> {
        self.check_size(&frames, "outgoing")?;
        let message = ZmqMessage::try_from(wrap(frames))
            .map_err(|e| BridgeError::protocol(format!("cannot send message: {e}")))?;
        self.socket()?.send(message).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Vec<Bytes>> {
        let message = self.socket()?.recv().await?;
        let frames = unwrap(message.into_vec());
        self.check_size(&frames, "incoming")?;
        Ok(frames)
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(socket) = self.socket.take() {
            let errors = socket.close().await;
            if !errors.is_empty() {
                tracing::debug!(endpoint = %self.endpoint, ?errors, "Errors while closing socket");
            }
        }
        Ok(())
    }
}

/// Insert the routing delimiter after the session frame.
fn wrap(mut frames: Vec<Bytes>) -> Vec<Bytes> {
    if !frames.is_empty() {
        frames.insert(1, Bytes::new());
    }
    frames
}

/// Drop the routing delimiter after the session frame, if present.
fn unwrap(mut frames: Vec<Bytes>) -> Vec<Bytes> {
    if frames.get(1).is_some_and(Bytes::is_empty) {
        frames.remove(1);
    }
    frames
}
