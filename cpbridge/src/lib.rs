//! cpbridge: client for driving a remote CellProfiler worker over the bridge protocol.

pub mod array;
pub mod bridge;
mod client;
pub mod config;
pub mod error;
pub mod exchange;
pub mod features;
pub mod image;
pub mod layout;
pub mod measurements;

pub use bridge::{SessionId, Transport};
pub use client::BridgeClient;
pub use config::ClientConfig;
pub use error::{BridgeError, FaultKind, Result};
pub use exchange::{CleanFlags, ImageSet, PipelineInfo};
pub use features::{FeatureDescriptor, ScalarType};
pub use image::{Axis, ImageTensor, Sample, SampleKind};
pub use measurements::{MeasurementBundle, MeasurementValues};

/// cpbridge version from Cargo.toml
pub const CPBRIDGE_VERSION: &str = env!("CARGO_PKG_VERSION");
