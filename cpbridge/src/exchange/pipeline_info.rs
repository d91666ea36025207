//! Pipeline info exchange.
//!
//! Request: `[pipeline-info-req-1][pipeline text]`.
//! Reply: `[pipeline-info-reply-1][json]` where the body is
//! `[channels, type_names, {group: [[feature, type_index], ...]}]`.

use indexmap::IndexMap;
use serde::Serialize;

use crate::bridge::{Envelope, Exchange, SessionId};
use crate::error::Result;
use crate::features::{FeatureDescriptor, IMAGE, TypeTable};

type InfoBody = (Vec<String>, Vec<String>, IndexMap<String, Vec<(String, usize)>>);

/// What a loaded pipeline needs and produces.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineInfo {
    channels: Vec<String>,
    groups: Vec<String>,
    features: IndexMap<String, Vec<FeatureDescriptor>>,
}

impl PipelineInfo {
    /// Image channels a run must be given, in server order.
    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    /// Segmentation groups in server order, then `Image`.
    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    /// Features of one group; `None` is the whole-image group.
    pub fn features(&self, group: Option<&str>) -> &[FeatureDescriptor] {
        self.features
            .get(group.unwrap_or(IMAGE))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Every feature, ordered by group then name with the row-index feature
    /// first in each group.
    pub fn sorted_features(&self) -> Vec<FeatureDescriptor> {
        let mut all: Vec<FeatureDescriptor> = self.features.values().flatten().cloned().collect();
        all.sort();
        all
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let (channels, type_names, raw_groups): InfoBody = serde_json::from_str(json)?;
        let types = TypeTable::new(type_names);

        let mut groups: Vec<String> = raw_groups
            .keys()
            .filter(|g| g.as_str() != IMAGE)
            .cloned()
            .collect();
        groups.push(IMAGE.to_string());

        let mut features = IndexMap::with_capacity(raw_groups.len());
        for (group, fields) in raw_groups {
            let descriptors = fields
                .into_iter()
                .map(|(name, index)| {
                    Ok(FeatureDescriptor::new(group.clone(), name, types.resolve(index)?))
                })
                .collect::<Result<Vec<_>>>()?;
            features.insert(group, descriptors);
        }

        Ok(Self {
            channels,
            groups,
            features,
        })
    }
}

pub fn request(session: &SessionId, pipeline: &str) -> Envelope {
    let mut env = Envelope::request(session, Exchange::PipelineInfo);
    env.push_text(pipeline);
    env
}

pub fn parse_reply(mut reply: Envelope) -> Result<PipelineInfo> {
    let body = reply.next_text("pipeline info")?;
    PipelineInfo::from_json(&body)
}
