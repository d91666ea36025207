//! Run and run-group exchanges.
//!
//! Request: `[run-request-1|run-group-request-1][pipeline][image layout][f64 data per channel]`.
//! Reply: `[run-reply-1][typed layout][data]`.

use indexmap::IndexMap;

use crate::array::encode_f64;
use crate::bridge::{Envelope, Exchange, SessionId};
use crate::error::Result;
use crate::image::ImageTensor;
use crate::layout::{ImageLayout, TypedLayout};
use crate::measurements::MeasurementBundle;

/// Channel name → tensor, in the order the channels go on the wire.
pub type ImageSet = IndexMap<String, ImageTensor>;

/// Build a run request. `exchange` selects `run-request-1` or
/// `run-group-request-1`; the payload is identical.
pub fn request(
    session: &SessionId,
    exchange: Exchange,
    pipeline: &str,
    images: &ImageSet,
) -> Result<Envelope> {
    debug_assert!(matches!(exchange, Exchange::Run | Exchange::RunGroup));

    let layout = ImageLayout(
        images
            .iter()
            .map(|(channel, tensor)| tensor.layout(channel))
            .collect(),
    );

    let mut env = Envelope::request(session, exchange);
    env.push_text(pipeline).push_text(layout.to_json()?);
    for tensor in images.values() {
        let mut data = Vec::new();
        encode_f64(&tensor.normalized_samples(), &mut data);
        env.push_binary(data);
    }
    Ok(env)
}

pub fn parse_reply(mut reply: Envelope) -> Result<MeasurementBundle> {
    let layout = reply.next_text("metadata")?;
    let data = reply.next_binary("data")?;
    let layout = TypedLayout::from_json(&layout)?;
    MeasurementBundle::decode(&layout, &data)
}
