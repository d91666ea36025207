//! Stream codec for multi-frame messages.
//!
//! Each message is one LengthDelimitedCodec record whose body is a frame
//! count followed by length-prefixed frames (all lengths u32 big-endian).
//! Works over any AsyncRead/AsyncWrite.
//!
//! A record whose body is malformed is yielded as an item-level error: the
//! stream is still aligned on the next record, and `Framed` stops polling
//! after any decoder error. Only a broken outer record (oversize length
//! prefix, I/O failure) is a decoder error.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use crate::error::{BridgeError, Result};

const LEN_PREFIX: usize = 4;

/// Codec carrying `Vec<Bytes>` messages over a byte stream.
pub struct MultipartCodec {
    inner: LengthDelimitedCodec,
}

impl Default for MultipartCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartCodec {
    pub fn new() -> Self {
        Self {
            inner: LengthDelimitedCodec::builder()
                .length_field_length(LEN_PREFIX)
                .new_codec(),
        }
    }

    /// Reject records (in either direction) larger than `max` bytes.
    pub fn with_max_frame_length(max: usize) -> Self {
        Self {
            inner: LengthDelimitedCodec::builder()
                .length_field_length(LEN_PREFIX)
                .max_frame_length(max)
                .new_codec(),
        }
    }
}

impl Decoder for MultipartCodec {
    type Item = Result<Vec<Bytes>>;
    type Error = BridgeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        Ok(self
            .inner
            .decode(src)?
            .map(|record| split_frames(record.freeze())))
    }
}

impl Encoder<Vec<Bytes>> for MultipartCodec {
    type Error = BridgeError;

    fn encode(&mut self, frames: Vec<Bytes>, dst: &mut BytesMut) -> Result<()> {
        let body_len = LEN_PREFIX + frames.iter().map(|f| LEN_PREFIX + f.len()).sum::<usize>();
        let mut body = BytesMut::with_capacity(body_len);
        body.put_u32(to_u32(frames.len(), "frame count")?);
        for frame in &frames {
            body.put_u32(to_u32(frame.len(), "frame length")?);
            body.put_slice(frame);
        }
        tracing::trace!(frames = frames.len(), body_size_bytes = body_len, "Encoding message");
        self.inner.encode(body.freeze(), dst)?;
        Ok(())
    }
}

fn to_u32(n: usize, what: &str) -> Result<u32> {
    u32::try_from(n).map_err(|_| BridgeError::protocol(format!("{what} {n} exceeds u32")))
}

fn split_frames(mut body: Bytes) -> Result<Vec<Bytes>> {
    if body.len() < LEN_PREFIX {
        return Err(BridgeError::protocol("message record has no frame count"));
    }
    let count = body.get_u32() as usize;
    // Every frame needs at least its length prefix.
    if count > body.len() / LEN_PREFIX {
        return Err(BridgeError::protocol(format!(
            "message declares {count} frames but carries {} bytes",
            body.len()
        )));
    }
    let mut frames = Vec::with_capacity(count);
    for index in 0..count {
        if body.len() < LEN_PREFIX {
            return Err(BridgeError::protocol(format!("frame {index} length is truncated")));
        }
        let len = body.get_u32() as usize;
        if body.len() < len {
            return Err(BridgeError::protocol(format!(
                "frame {index} declares {len} bytes, {} remain",
                body.len()
            )));
        }
        frames.push(body.split_to(len));
    }
    if !body.is_empty() {
        return Err(BridgeError::protocol(format!(
            "{} stray bytes after last frame",
            body.len()
        )));
    }
    tracing::trace!(frames = frames.len(), "Decoded message");
    Ok(frames)
}
