//! Multi-frame message envelope.
//!
//! Layout on the wire: `[session-id][msg-name][payload frames...]`.

use std::collections::VecDeque;

use bytes::Bytes;

use super::protocol::{Exchange, PIPELINE_EXCEPTION, SessionId, WORKER_EXCEPTION};
use crate::error::{BridgeError, Result};

#[derive(Debug, Clone)]
pub struct Envelope {
    session: Bytes,
    name: String,
    payload: VecDeque<Bytes>,
}

impl Envelope {
    pub fn new(session: &SessionId, name: impl Into<String>) -> Self {
        Self {
            session: session.to_frame(),
            name: name.into(),
            payload: VecDeque::new(),
        }
    }

    /// Empty request envelope for an exchange.
    pub fn request(session: &SessionId, exchange: Exchange) -> Self {
        Self::new(session, exchange.request_name())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn session_frame(&self) -> &[u8] {
        &self.session
    }

    /// Payload frames not yet consumed.
    pub fn remaining(&self) -> usize {
        self.payload.len()
    }

    pub fn push_text(&mut self, text: impl Into<String>) -> &mut Self {
        self.payload.push_back(Bytes::from(text.into()));
        self
    }

    pub fn push_binary(&mut self, data: impl Into<Bytes>) -> &mut Self {
        self.payload.push_back(data.into());
        self
    }

    pub fn into_frames(self) -> Vec<Bytes> {
        let mut frames = Vec::with_capacity(self.payload.len() + 2);
        frames.push(self.session);
        frames.push(Bytes::from(self.name));
        frames.extend(self.payload);
        frames
    }

    pub fn from_frames(frames: Vec<Bytes>) -> Result<Self> {
        let mut frames = VecDeque::from(frames);
        let session = frames
            .pop_front()
            .ok_or_else(|| BridgeError::protocol("message has no session frame"))?;
        let name = frames
            .pop_front()
            .ok_or_else(|| BridgeError::protocol("message has no name frame"))?;
        let name = String::from_utf8(name.to_vec())
            .map_err(|_| BridgeError::protocol("message name is not UTF-8"))?;
        Ok(Self {
            session,
            name,
            payload: frames,
        })
    }

    /// Pop the next payload frame as UTF-8 text. `what` names the frame in
    /// the error if it is missing.
    pub fn next_text(&mut self, what: &str) -> Result<String> {
        let frame = self.next_binary(what)?;
        String::from_utf8(frame.to_vec())
            .map_err(|_| BridgeError::protocol(format!("{what} frame is not UTF-8")))
    }

    pub fn next_binary(&mut self, what: &str) -> Result<Bytes> {
        self.payload
            .pop_front()
            .ok_or_else(|| BridgeError::protocol(format!("Missing {what} frame in {}", self.name)))
    }

    /// Total payload bytes, for logging.
    pub fn payload_size(&self) -> usize {
        self.payload.iter().map(Bytes::len).sum()
    }
}

/// Decide the outcome of a reply from its name before any payload is parsed.
///
/// Reflected exceptions the exchange accepts become [`BridgeError::Pipeline`]
/// or [`BridgeError::Worker`]; anything else unexpected is a protocol fault.
pub fn check_reply(
    mut reply: Envelope,
    exchange: Exchange,
    session: &SessionId,
) -> Result<Envelope> {
    let expected_session = session.to_frame();
    if reply.session != expected_session {
        return Err(BridgeError::protocol(format!(
            "reply for session '{}' on session {session}",
            String::from_utf8_lossy(&reply.session)
        )));
    }

    if reply.name == exchange.reply_name() {
        return Ok(reply);
    }
    let name = reply.name.clone();
    match name.as_str() {
        PIPELINE_EXCEPTION if exchange.accepts_pipeline_exception() => {
            Err(BridgeError::Pipeline(exception_message(&mut reply)))
        }
        WORKER_EXCEPTION if exchange.accepts_worker_exception() => {
            Err(BridgeError::Worker(exception_message(&mut reply)))
        }
        PIPELINE_EXCEPTION | WORKER_EXCEPTION => {
            let message = exception_message(&mut reply);
            Err(BridgeError::protocol(format!(
                "unexpected {name} in reply to {}: {message}",
                exchange.request_name()
            )))
        }
        other => Err(BridgeError::protocol(format!(
            "expected {} in reply to {}, got {other}",
            exchange.reply_name(),
            exchange.request_name()
        ))),
    }
}

fn exception_message(reply: &mut Envelope) -> String {
    reply
        .payload
        .pop_front()
        .map(|frame| String::from_utf8_lossy(&frame).into_owned())
        .unwrap_or_default()
}
