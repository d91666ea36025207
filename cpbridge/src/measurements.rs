//! Measurement bundle decoded from a run reply.

use indexmap::IndexMap;

use crate::array::{decode_f32, decode_f64, decode_i32, decode_string};
use crate::error::Result;
use crate::features::{FeatureDescriptor, IMAGE, IMAGE_NUMBER, OBJECT_NUMBER, ScalarType};
use crate::layout::{SectionLayout, TypedLayout};

/// Group name → feature name → value.
pub type FeatureMap<V> = IndexMap<String, IndexMap<String, V>>;

/// Borrowed view of one feature's values, tagged by scalar type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MeasurementValues<'a> {
    Float64(&'a [f64]),
    Float32(&'a [f32]),
    Int32(&'a [i32]),
    String(&'a str),
}

impl MeasurementValues<'_> {
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            Self::Float64(_) => ScalarType::Float64,
            Self::Float32(_) => ScalarType::Float32,
            Self::Int32(_) => ScalarType::Int32,
            Self::String(_) => ScalarType::String,
        }
    }

    /// Number of rows; a string feature is a single value.
    pub fn len(&self) -> usize {
        match self {
            Self::Float64(v) => v.len(),
            Self::Float32(v) => v.len(),
            Self::Int32(v) => v.len(),
            Self::String(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// All measurements produced by one run (or one grouped run).
///
/// Group arguments of `None` address the whole-image group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeasurementBundle {
    doubles: FeatureMap<Vec<f64>>,
    floats: FeatureMap<Vec<f32>>,
    ints: FeatureMap<Vec<i32>>,
    strings: FeatureMap<String>,
}

impl MeasurementBundle {
    /// Decode the data frame of a run reply using its typed layout.
    ///
    /// Sections are consumed in fixed order (double, float, int32, string)
    /// with one running offset across all of them.
    pub fn decode(layout: &TypedLayout, data: &[u8]) -> Result<Self> {
        let mut bundle = Self::default();
        let mut offset = 0;
        offset = decode_section(&layout.doubles, data, offset, &mut bundle.doubles, decode_f64)?;
        offset = decode_section(&layout.floats, data, offset, &mut bundle.floats, decode_f32)?;
        offset = decode_section(&layout.ints, data, offset, &mut bundle.ints, decode_i32)?;
        offset = decode_section(&layout.strings, data, offset, &mut bundle.strings, decode_string)?;

        if offset < data.len() {
            tracing::warn!(
                consumed = offset,
                total = data.len(),
                "Run reply data frame has trailing bytes"
            );
        }
        Ok(bundle)
    }

    pub fn doubles(&self, group: Option<&str>, feature: &str) -> Option<&[f64]> {
        lookup(&self.doubles, group, feature).map(Vec::as_slice)
    }

    pub fn floats(&self, group: Option<&str>, feature: &str) -> Option<&[f32]> {
        lookup(&self.floats, group, feature).map(Vec::as_slice)
    }

    pub fn ints(&self, group: Option<&str>, feature: &str) -> Option<&[i32]> {
        lookup(&self.ints, group, feature).map(Vec::as_slice)
    }

    pub fn string(&self, group: Option<&str>, feature: &str) -> Option<&str> {
        lookup(&self.strings, group, feature).map(String::as_str)
    }

    /// Look up a feature by descriptor, honouring its declared type.
    pub fn get(&self, feature: &FeatureDescriptor) -> Option<MeasurementValues<'_>> {
        let group = Some(feature.group.as_str());
        let name = feature.name.as_str();
        match feature.scalar_type {
            ScalarType::Float64 => self.doubles(group, name).map(MeasurementValues::Float64),
            ScalarType::Float32 => self.floats(group, name).map(MeasurementValues::Float32),
            ScalarType::Int32 => self.ints(group, name).map(MeasurementValues::Int32),
            ScalarType::String => self.string(group, name).map(MeasurementValues::String),
        }
    }

    /// Rows to expect for a group's features.
    ///
    /// The image group is sized by its `ImageNumber` feature; segmentations by
    /// their `ObjectNumber` feature. For grouped runs this is the total across
    /// all cycles.
    pub fn row_count(&self, group: Option<&str>) -> Option<usize> {
        let group = group.unwrap_or(IMAGE);
        let index = if group == IMAGE { IMAGE_NUMBER } else { OBJECT_NUMBER };
        self.ints(Some(group), index).map(<[i32]>::len)
    }

    /// Every group with at least one measurement, in first-seen order.
    pub fn groups(&self) -> Vec<&str> {
        let mut groups: Vec<&str> = Vec::new();
        let keys = self
            .doubles
            .keys()
            .chain(self.floats.keys())
            .chain(self.ints.keys())
            .chain(self.strings.keys());
        for key in keys {
            if !groups.contains(&key.as_str()) {
                groups.push(key);
            }
        }
        groups
    }

    pub fn is_empty(&self) -> bool {
        self.doubles.is_empty()
            && self.floats.is_empty()
            && self.ints.is_empty()
            && self.strings.is_empty()
    }
}

fn lookup<'a, V>(map: &'a FeatureMap<V>, group: Option<&str>, feature: &str) -> Option<&'a V> {
    map.get(group.unwrap_or(IMAGE))?.get(feature)
}

fn decode_section<V>(
    section: &SectionLayout,
    data: &[u8],
    mut offset: usize,
    dest: &mut FeatureMap<V>,
    decode: impl Fn(&[u8], usize, usize) -> Result<(V, usize)>,
) -> Result<usize> {
    for group in section {
        let features = dest.entry(group.0.clone()).or_default();
        for field in &group.1 {
            let (values, next) = decode(data, offset, field.1)?;
            features.insert(field.0.clone(), values);
            offset = next;
        }
    }
    Ok(offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::{encode_f32, encode_f64, encode_i32};
    use crate::error::FaultKind;
    use crate::features::NUMBER_OBJECT_NUMBER;
    use crate::layout::{FieldLayout, GroupLayout};

    fn group(name: &str, fields: &[(&str, usize)]) -> GroupLayout {
        GroupLayout(
            name.to_string(),
            fields
                .iter()
                .map(|(f, n)| FieldLayout(f.to_string(), *n))
                .collect(),
        )
    }

    fn sample_reply() -> (TypedLayout, Vec<u8>) {
        let layout = TypedLayout {
            doubles: vec![
                group("Nuclei", &[("Area", 3), ("X", 3)]),
                group("Cytoplasm", &[("Area", 2), ("X", 2)]),
            ],
            floats: vec![group("Nuclei", &[("Y", 3)]), group("Cytoplasm", &[("Y", 2)])],
            ints: vec![
                group("Nuclei", &[(OBJECT_NUMBER, 3)]),
                group("Cytoplasm", &[(OBJECT_NUMBER, 2)]),
                group(IMAGE, &[(IMAGE_NUMBER, 1)]),
            ],
            strings: vec![group(IMAGE, &[("Comment", 5)])],
        };
        let mut data = Vec::new();
        encode_f64(&[1.0, 2.0, 3.0, 0.1, 0.2, 0.3, 10.0, 20.0, 0.5, 0.6], &mut data);
        encode_f32(&[7.0, 8.0, 9.0, 1.5, 2.5], &mut data);
        encode_i32(&[1, 2, 3, 1, 2, 42], &mut data);
        data.extend_from_slice(b"hello");
        (layout, data)
    }

    #[test]
    fn decodes_all_sections_in_order() {
        let (layout, data) = sample_reply();
        let bundle = MeasurementBundle::decode(&layout, &data).unwrap();

        assert_eq!(bundle.doubles(Some("Nuclei"), "Area"), Some(&[1.0, 2.0, 3.0][..]));
        assert_eq!(bundle.doubles(Some("Nuclei"), "X"), Some(&[0.1, 0.2, 0.3][..]));
        assert_eq!(bundle.doubles(Some("Cytoplasm"), "X"), Some(&[0.5, 0.6][..]));
        assert_eq!(bundle.floats(Some("Cytoplasm"), "Y"), Some(&[1.5f32, 2.5][..]));
        assert_eq!(bundle.ints(Some("Nuclei"), OBJECT_NUMBER), Some(&[1, 2, 3][..]));
        assert_eq!(bundle.ints(None, IMAGE_NUMBER), Some(&[42][..]));
        assert_eq!(bundle.string(None, "Comment"), Some("hello"));
        assert_eq!(bundle.groups(), ["Nuclei", "Cytoplasm", IMAGE]);
    }

    #[test]
    fn typed_lookups_do_not_cross_sections() {
        let (layout, data) = sample_reply();
        let bundle = MeasurementBundle::decode(&layout, &data).unwrap();

        assert_eq!(bundle.floats(Some("Nuclei"), "Area"), None);
        assert_eq!(bundle.doubles(Some("Nuclei"), "Y"), None);
        assert_eq!(bundle.doubles(Some("Golgi"), "Area"), None);
    }

    #[test]
    fn descriptor_lookup_is_typed() {
        let (layout, data) = sample_reply();
        let bundle = MeasurementBundle::decode(&layout, &data).unwrap();

        let area = FeatureDescriptor::new("Nuclei", "Area", ScalarType::Float64);
        assert_eq!(
            bundle.get(&area),
            Some(MeasurementValues::Float64(&[1.0, 2.0, 3.0]))
        );

        let comment = FeatureDescriptor::new(IMAGE, "Comment", ScalarType::String);
        let value = bundle.get(&comment).unwrap();
        assert_eq!(value, MeasurementValues::String("hello"));
        assert_eq!(value.len(), 1);
        assert_eq!(value.scalar_type(), ScalarType::String);

        let wrong_type = FeatureDescriptor::new("Nuclei", "Area", ScalarType::Int32);
        assert_eq!(bundle.get(&wrong_type), None);
    }

    #[test]
    fn row_counts_come_from_index_features() {
        let (layout, data) = sample_reply();
        let bundle = MeasurementBundle::decode(&layout, &data).unwrap();

        assert_eq!(bundle.row_count(None), Some(1));
        assert_eq!(bundle.row_count(Some(IMAGE)), Some(1));
        assert_eq!(bundle.row_count(Some("Nuclei")), Some(3));
        assert_eq!(bundle.row_count(Some("Cytoplasm")), Some(2));
        assert_eq!(bundle.row_count(Some("Golgi")), None);
        assert_eq!(bundle.ints(Some("Nuclei"), NUMBER_OBJECT_NUMBER), None);
    }

    #[test]
    fn short_data_frame_is_overrun() {
        let (layout, mut data) = sample_reply();
        data.truncate(data.len() - 1);
        let err = MeasurementBundle::decode(&layout, &data).unwrap_err();
        assert_eq!(err.kind(), FaultKind::Protocol);
        assert!(err.to_string().contains("Buffer overrun when deserializing strings"));
    }

    #[test]
    fn trailing_bytes_are_tolerated() {
        let (layout, mut data) = sample_reply();
        data.extend_from_slice(&[0, 0, 0]);
        let bundle = MeasurementBundle::decode(&layout, &data).unwrap();
        assert_eq!(bundle.string(None, "Comment"), Some("hello"));
    }

    #[test]
    fn empty_layout_gives_empty_bundle() {
        let bundle = MeasurementBundle::decode(&TypedLayout::default(), &[]).unwrap();
        assert!(bundle.is_empty());
        assert!(bundle.groups().is_empty());
        assert_eq!(bundle.row_count(None), None);
    }
}
