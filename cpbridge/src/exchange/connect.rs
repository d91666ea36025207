//! Connect handshake: `connect-request-1` with no payload, answered by an
//! empty `connect-reply-1`.

use crate::bridge::{Envelope, Exchange, SessionId};

pub fn request(session: &SessionId) -> Envelope {
    Envelope::request(session, Exchange::Connect)
}
