//! JSON layout descriptors.
//!
//! Two shapes travel on the wire:
//!
//! - **Image layout** (run requests): `[[channel, [[axis, dim, stride], ...]], ...]`
//! - **Typed layout** (run replies): four sections in fixed order (double,
//!   float, int32, string), each `[[group, [[feature, count], ...]], ...]`.
//!   The counts index into one shared data frame with a running offset.
//!
//! All layout tuples are tuple structs so serde reads and writes them as
//! JSON arrays.

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// One axis of a channel's image: label, dimension and row-major stride.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisLayout(pub String, pub usize, pub usize);

impl AxisLayout {
    pub fn label(&self) -> &str {
        &self.0
    }

    pub fn dim(&self) -> usize {
        self.1
    }

    pub fn stride(&self) -> usize {
        self.2
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelLayout(pub String, pub Vec<AxisLayout>);

impl ChannelLayout {
    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn axes(&self) -> &[AxisLayout] {
        &self.1
    }

    pub fn dims(&self) -> Vec<usize> {
        self.1.iter().map(AxisLayout::dim).collect()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.1.iter().map(AxisLayout::label).collect()
    }

    /// Number of samples the channel's data frame must carry.
    pub fn sample_count(&self) -> usize {
        self.1.iter().map(AxisLayout::dim).product()
    }
}

/// Image layout for a run request, channels in caller order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageLayout(pub Vec<ChannelLayout>);

impl ImageLayout {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn channels(&self) -> &[ChannelLayout] {
        &self.0
    }
}

/// A field in a typed section: feature name and element count.
///
/// For the string section the count is the UTF-8 byte length of the value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldLayout(pub String, pub usize);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupLayout(pub String, pub Vec<FieldLayout>);

pub type SectionLayout = Vec<GroupLayout>;

/// The four typed sections of a run reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypedLayout {
    pub doubles: SectionLayout,
    pub floats: SectionLayout,
    pub ints: SectionLayout,
    pub strings: SectionLayout,
}

impl TypedLayout {
    pub const SECTIONS: usize = 4;

    pub fn from_json(json: &str) -> Result<Self> {
        let sections: Vec<serde_json::Value> = serde_json::from_str(json).map_err(|e| {
            BridgeError::protocol(format!("Missing or invalid metadata wrapper: {e}"))
        })?;
        let [doubles, floats, ints, strings]: [serde_json::Value; Self::SECTIONS] =
            sections.try_into().map_err(|sections: Vec<_>| {
                BridgeError::protocol(format!(
                    "Wrong # of metadata sections: expected {}, got {}",
                    Self::SECTIONS,
                    sections.len()
                ))
            })?;

        Ok(Self {
            doubles: parse_section(doubles)?,
            floats: parse_section(floats)?,
            ints: parse_section(ints)?,
            strings: parse_section(strings)?,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&[
            &self.doubles,
            &self.floats,
            &self.ints,
            &self.strings,
        ])?)
    }
}

fn parse_section(value: serde_json::Value) -> Result<SectionLayout> {
    serde_json::from_value(value)
        .map_err(|e| BridgeError::protocol(format!("Malformed metadata section: {e}")))
}

/// Row-major strides: the last axis varies fastest.
pub fn row_major_strides(dims: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; dims.len()];
    for i in (0..dims.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * dims[i + 1];
    }
    strides
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FaultKind;

    fn channel(name: &str, axes: &[(&str, usize)]) -> ChannelLayout {
        let dims: Vec<usize> = axes.iter().map(|(_, d)| *d).collect();
        let strides = row_major_strides(&dims);
        ChannelLayout(
            name.to_string(),
            axes.iter()
                .zip(strides)
                .map(|((label, dim), stride)| AxisLayout(label.to_string(), *dim, stride))
                .collect(),
        )
    }

    #[test]
    fn strides_are_row_major() {
        assert_eq!(row_major_strides(&[20, 37]), [37, 1]);
        assert_eq!(row_major_strides(&[4, 20, 37]), [740, 37, 1]);
        assert_eq!(row_major_strides(&[5]), [1]);
        assert!(row_major_strides(&[]).is_empty());
    }

    #[test]
    fn image_layout_wire_shape() {
        let layout = ImageLayout(vec![
            channel("Foo", &[("X", 20), ("Y", 37)]),
            channel("Bar", &[("X", 31), ("Y", 18)]),
        ]);
        insta::assert_snapshot!(
            layout.to_json().unwrap(),
            @r#"[["Foo",[["X",20,37],["Y",37,1]]],["Bar",[["X",31,18],["Y",18,1]]]]"#
        );
    }

    #[test]
    fn image_layout_roundtrip_keeps_dims_and_labels() {
        let shapes: [&[(&str, usize)]; 4] = [
            &[("X", 7)],
            &[("X", 3), ("Y", 5)],
            &[("Z", 2), ("X", 3), ("Y", 5)],
            &[("Time", 4), ("Z", 2), ("X", 3), ("Y", 5)],
        ];
        for axes in shapes {
            let layout = ImageLayout(vec![channel("DNA", axes)]);
            let parsed = ImageLayout::from_json(&layout.to_json().unwrap()).unwrap();
            let ch = &parsed.channels()[0];

            let labels: Vec<&str> = axes.iter().map(|(l, _)| *l).collect();
            let dims: Vec<usize> = axes.iter().map(|(_, d)| *d).collect();
            assert_eq!(ch.name(), "DNA");
            assert_eq!(ch.labels(), labels);
            assert_eq!(ch.dims(), dims);
            assert_eq!(ch.sample_count(), dims.iter().product::<usize>());
        }
    }

    #[test]
    fn typed_layout_parses_four_sections() {
        let json = r#"[
            [["Nuclei", [["Area", 3], ["X", 3]]]],
            [["Nuclei", [["Y", 3]]]],
            [["Image", [["ImageNumber", 1]]]],
            [["Image", [["Comment", 12]]]]
        ]"#;
        let layout = TypedLayout::from_json(json).unwrap();
        assert_eq!(
            layout.doubles,
            vec![GroupLayout(
                "Nuclei".into(),
                vec![FieldLayout("Area".into(), 3), FieldLayout("X".into(), 3)]
            )]
        );
        assert_eq!(layout.floats.len(), 1);
        assert_eq!(layout.ints[0].0, "Image");
        assert_eq!(layout.strings[0].1[0], FieldLayout("Comment".into(), 12));

        let reparsed = TypedLayout::from_json(&layout.to_json().unwrap()).unwrap();
        assert_eq!(reparsed, layout);
    }

    #[test]
    fn typed_layout_wrong_section_count() {
        let err = TypedLayout::from_json("[[], [], []]").unwrap_err();
        assert_eq!(err.kind(), FaultKind::Protocol);
        assert_eq!(
            err.to_string(),
            "protocol error: Wrong # of metadata sections: expected 4, got 3"
        );
    }

    #[test]
    fn typed_layout_rejects_bad_shapes() {
        for json in [
            "{}",
            "not json",
            r#"[[["Nuclei"]], [], [], []]"#,
            r#"[[["Nuclei", [["Area"]]]], [], [], []]"#,
            r#"[[["Nuclei", [["Area", -1]]]], [], [], []]"#,
            r#"[[["Nuclei", [["Area", 1, 2]]]], [], [], []]"#,
        ] {
            let err = TypedLayout::from_json(json).unwrap_err();
            assert_eq!(err.kind(), FaultKind::Protocol, "accepted {json}");
        }
    }
}
