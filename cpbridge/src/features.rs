//! Feature descriptors and reserved measurement names.

use std::cmp::Ordering;
use std::fmt;

use serde::Serialize;

use crate::error::{BridgeError, Result};

/// Group holding per-image (whole image) measurements.
pub const IMAGE: &str = "Image";
/// Index feature present in every image group.
pub const IMAGE_NUMBER: &str = "ImageNumber";
/// Object-level index feature; its length is the number of objects in the segmentation.
pub const OBJECT_NUMBER: &str = "ObjectNumber";
/// Row-index feature that tabulating consumers list first within a group.
pub const NUMBER_OBJECT_NUMBER: &str = "Number_Object_Number";

/// Scalar element type of a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    Int32,
    Float32,
    Float64,
    String,
}

impl ScalarType {
    /// Resolve a worker type name. Workers send JVM class names.
    pub fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "java.lang.Integer" | "int32" | "int" => Some(Self::Int32),
            "java.lang.Float" | "float32" | "float" => Some(Self::Float32),
            "java.lang.Double" | "float64" | "double" => Some(Self::Float64),
            "java.lang.String" | "string" | "str" => Some(Self::String),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Int32 => "int32",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::String => "string",
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lookup table of type names as sent in a pipeline-info reply.
///
/// Names are resolved lazily so a worker advertising a type no feature uses
/// does not fail the whole exchange.
#[derive(Debug, Clone)]
pub struct TypeTable {
    names: Vec<String>,
}

impl TypeTable {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn resolve(&self, index: usize) -> Result<ScalarType> {
        let name = self.names.get(index).ok_or_else(|| {
            BridgeError::protocol(format!("Got out of bounds type index: {index}"))
        })?;
        ScalarType::from_type_name(name)
            .ok_or_else(|| BridgeError::protocol(format!("Unsupported feature type: {name}")))
    }
}

/// A named, typed measurement produced for one group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FeatureDescriptor {
    pub group: String,
    pub name: String,
    pub scalar_type: ScalarType,
}

impl FeatureDescriptor {
    pub fn new(group: impl Into<String>, name: impl Into<String>, scalar_type: ScalarType) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
            scalar_type,
        }
    }

    pub fn is_image_feature(&self) -> bool {
        self.group == IMAGE
    }
}

impl Ord for FeatureDescriptor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.group
            .cmp(&other.group)
            .then_with(|| compare_feature_names(&self.name, &other.name))
            .then_with(|| self.scalar_type.as_str().cmp(other.scalar_type.as_str()))
    }
}

impl PartialOrd for FeatureDescriptor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn compare_feature_names(a: &str, b: &str) -> Ordering {
    match (a == NUMBER_OBJECT_NUMBER, b == NUMBER_OBJECT_NUMBER) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.cmp(b),
    }
}
