//! Request builders and reply parsers, one module per exchange.
//!
//! Each module builds its request [`Envelope`](crate::bridge::Envelope) and
//! parses the payload of a reply that has already passed
//! [`check_reply`](crate::bridge::check_reply). Sending and state caching
//! live in [`BridgeClient`](crate::BridgeClient).

pub mod clean;
pub mod connect;
pub mod pipeline_info;
pub mod run;

pub use clean::CleanFlags;
pub use pipeline_info::PipelineInfo;
pub use run::ImageSet;
