//! Wire layer for talking to a bridge worker.
//!
//! # Architecture
//!
//! - **protocol**: message names, session ids, the [`Exchange`] table
//! - **envelope**: `[session][name][payload...]` messages and reply dispatch
//! - **codec**: multi-frame messages over a byte stream
//! - **transport**: the [`Transport`] trait and its byte-stream implementation
//! - **socket**: the ZeroMQ REQ transport workers listen with

pub mod codec;
pub mod envelope;
pub mod protocol;
pub mod socket;
pub mod transport;

pub use envelope::{Envelope, check_reply};
pub use protocol::{Exchange, SessionId};
pub use socket::ZmqTransport;
pub use transport::{FramedTransport, Transport};
