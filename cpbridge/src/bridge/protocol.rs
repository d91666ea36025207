//! Message names and session identity for the bridge protocol.

use serde::{Deserialize, Serialize};

pub const CONNECT_REQUEST: &str = "connect-request-1";
pub const CONNECT_REPLY: &str = "connect-reply-1";
pub const PIPELINE_INFO_REQUEST: &str = "pipeline-info-req-1";
pub const PIPELINE_INFO_REPLY: &str = "pipeline-info-reply-1";
pub const RUN_REQUEST: &str = "run-request-1";
pub const RUN_GROUP_REQUEST: &str = "run-group-request-1";
pub const RUN_REPLY: &str = "run-reply-1";
pub const CLEAN_PIPELINE_REQUEST: &str = "clean-pipeline-request-1";
pub const CLEAN_PIPELINE_REPLY: &str = "clean-pipeline-reply-1";

/// Reflected when the worker cannot parse or prepare the pipeline.
pub const PIPELINE_EXCEPTION: &str = "pipeline-exception-1";
/// Reflected when a module raises while the worker executes a run.
pub const WORKER_EXCEPTION: &str = "cellprofiler-exception-1";

/// Correlation token sent as the first frame of every message.
///
/// Generated once per connection and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(uuid::Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }

    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(uuid::Uuid::parse_str(s)?))
    }

    /// Wire form: the hyphenated UUID as ASCII.
    pub fn to_frame(&self) -> bytes::Bytes {
        bytes::Bytes::from(self.0.to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One request/reply pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exchange {
    Connect,
    PipelineInfo,
    Run,
    RunGroup,
    CleanPipeline,
}

impl Exchange {
    pub fn request_name(&self) -> &'static str {
        match self {
            Self::Connect => CONNECT_REQUEST,
            Self::PipelineInfo => PIPELINE_INFO_REQUEST,
            Self::Run => RUN_REQUEST,
            Self::RunGroup => RUN_GROUP_REQUEST,
            Self::CleanPipeline => CLEAN_PIPELINE_REQUEST,
        }
    }

    pub fn reply_name(&self) -> &'static str {
        match self {
            Self::Connect => CONNECT_REPLY,
            Self::PipelineInfo => PIPELINE_INFO_REPLY,
            Self::Run | Self::RunGroup => RUN_REPLY,
            Self::CleanPipeline => CLEAN_PIPELINE_REPLY,
        }
    }

    pub fn accepts_pipeline_exception(&self) -> bool {
        !matches!(self, Self::Connect)
    }

    pub fn accepts_worker_exception(&self) -> bool {
        matches!(self, Self::Run | Self::RunGroup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
    }

    #[test]
    fn session_id_frame_parses_back() {
        let id = SessionId::new();
        let frame = id.to_frame();
        let text = std::str::from_utf8(&frame).unwrap();
        assert_eq!(SessionId::parse(text).unwrap(), id);
        assert_eq!(text, id.to_string());
        assert_eq!(id.as_uuid().get_version_num(), 4);
    }

    #[test]
    fn run_group_shares_run_reply() {
        assert_eq!(Exchange::RunGroup.request_name(), "run-group-request-1");
        assert_eq!(Exchange::RunGroup.reply_name(), Exchange::Run.reply_name());
    }

    #[test]
    fn exception_acceptance() {
        let table: Vec<_> = [
            Exchange::Connect,
            Exchange::PipelineInfo,
            Exchange::Run,
            Exchange::RunGroup,
            Exchange::CleanPipeline,
        ]
        .iter()
        .map(|e| {
            (
                e.request_name(),
                e.accepts_pipeline_exception(),
                e.accepts_worker_exception(),
            )
        })
        .collect();
        assert_eq!(
            table,
            [
                ("connect-request-1", false, false),
                ("pipeline-info-req-1", true, false),
                ("run-request-1", true, true),
                ("run-group-request-1", true, true),
                ("clean-pipeline-request-1", true, false),
            ]
        );
    }
}
