//! Request/reply transport to a worker.
//!
//! The client owns exactly one [`Transport`] value. Workers are reached
//! through [`ZmqTransport`](super::socket::ZmqTransport);
//! [`FramedTransport`] carries the same multi-frame messages over any byte
//! stream using [`MultipartCodec`], which is how in-process workers and
//! tests plug in.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

use super::codec::MultipartCodec;
use crate::error::{BridgeError, Result};

/// Message-oriented duplex channel to a worker.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, frames: Vec<Bytes>) -> Result<()>;

    /// Next message. A peer that went away is [`BridgeError::ConnectionClosed`].
    async fn recv(&mut self) -> Result<Vec<Bytes>>;

    async fn close(&mut self) -> Result<()>;
}

pub struct FramedTransport<S> {
    framed: Framed<S, MultipartCodec>,
}

impl<S> FramedTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self {
            framed: Framed::new(stream, MultipartCodec::new()),
        }
    }

    pub fn with_max_frame_length(stream: S, max: usize) -> Self {
        Self {
            framed: Framed::new(stream, MultipartCodec::with_max_frame_length(max)),
        }
    }

    pub fn into_inner(self) -> S {
        self.framed.into_inner()
    }
}

#[async_trait]
impl<S> Transport for FramedTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, frames: Vec<Bytes>) -> Result<()> {
        self.framed.send(frames).await
    }

    async fn recv(&mut self) -> Result<Vec<Bytes>> {
        match self.framed.next().await {
            // May carry a malformed-body fault; the stream is still usable.
            Some(Ok(message)) => message,
            // The stream is done after this.
            Some(Err(err)) => Err(err),
            None => Err(BridgeError::ConnectionClosed),
        }
    }

    async fn close(&mut self) -> Result<()> {
        SinkExt::<Vec<Bytes>>::close(&mut self.framed).await
    }
}

/// Normalize a worker address to a `tcp://host:port` endpoint.
///
/// Accepts `tcp://host:port` or bare `host:port`.
pub fn parse_address(address: &str) -> Result<String> {
    let invalid = || BridgeError::InvalidAddress(address.to_string());
    let authority = match address.split_once("://") {
        Some(("tcp", rest)) => rest,
        Some(_) => return Err(invalid()),
        None => address,
    };
    let (host, port) = authority.rsplit_once(':').ok_or_else(invalid)?;
    if host.is_empty() || port.parse::<u16>().is_err() {
        return Err(invalid());
    }
    Ok(format!("tcp://{authority}"))
}
