//! N-dimensional image tensors handed to a run.
//!
//! Samples are stored row-major in axis order (last axis fastest), which is
//! exactly the order they go on the wire.

use std::fmt;

use crate::error::{BridgeError, Result};
use crate::layout::{AxisLayout, ChannelLayout, row_major_strides};

/// A named axis and its length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Axis {
    pub label: String,
    pub len: usize,
}

impl Axis {
    pub fn new(label: impl Into<String>, len: usize) -> Self {
        Self {
            label: label.into(),
            len,
        }
    }

    pub fn x(len: usize) -> Self {
        Self::new("X", len)
    }

    pub fn y(len: usize) -> Self {
        Self::new("Y", len)
    }

    pub fn z(len: usize) -> Self {
        Self::new("Z", len)
    }

    pub fn time(len: usize) -> Self {
        Self::new("Time", len)
    }

    pub fn channel(len: usize) -> Self {
        Self::new("Channel", len)
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.label, self.len)
    }
}

/// Native element kind of the source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    Real,
    /// Fixed-point intensities. With a valid-bit depth `b` the worker expects
    /// samples divided by `2^b`.
    Integer { valid_bits: Option<u32> },
}

/// Element types an [`ImageTensor`] can be built from.
pub trait Sample: Copy {
    const KIND: SampleKind;
    fn to_f64(self) -> f64;
}

macro_rules! integer_sample {
    ($($t:ty),*) => {$(
        impl Sample for $t {
            const KIND: SampleKind = SampleKind::Integer { valid_bits: None };
            fn to_f64(self) -> f64 {
                self as f64
            }
        }
    )*};
}

integer_sample!(u8, u16, u32, i8, i16, i32);

impl Sample for f32 {
    const KIND: SampleKind = SampleKind::Real;
    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl Sample for f64 {
    const KIND: SampleKind = SampleKind::Real;
    fn to_f64(self) -> f64 {
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    axes: Vec<Axis>,
    samples: Vec<f64>,
    kind: SampleKind,
}

impl ImageTensor {
    /// Build a tensor from row-major samples.
    ///
    /// Fails if there are no axes, an axis is empty, or the sample count does
    /// not match the product of the axis lengths.
    pub fn new<T: Sample>(axes: Vec<Axis>, samples: &[T]) -> Result<Self> {
        validate_shape(&axes, samples.len())?;
        Ok(Self {
            axes,
            samples: samples.iter().map(|s| s.to_f64()).collect(),
            kind: T::KIND,
        })
    }

    /// Build a real-valued tensor, taking ownership of the samples.
    pub fn from_f64(axes: Vec<Axis>, samples: Vec<f64>) -> Result<Self> {
        validate_shape(&axes, samples.len())?;
        Ok(Self {
            axes,
            samples,
            kind: SampleKind::Real,
        })
    }

    /// Zero-filled real tensor.
    pub fn zeros(axes: Vec<Axis>) -> Result<Self> {
        let count = shape_sample_count(&axes)?;
        let mut samples = Vec::new();
        samples.try_reserve_exact(count).map_err(|_| {
            BridgeError::InvalidImage(format!("cannot allocate {count} samples"))
        })?;
        samples.resize(count, 0.0);
        Self::from_f64(axes, samples)
    }

    /// Record the valid-bit depth of an integer image (e.g. 12 for a 12-bit
    /// camera stored in `u16`). Has no effect on real-valued images.
    pub fn with_valid_bits(mut self, bits: u32) -> Self {
        if let SampleKind::Integer { valid_bits } = &mut self.kind {
            *valid_bits = (bits != 0).then_some(bits);
        }
        self
    }

    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    pub fn dims(&self) -> Vec<usize> {
        self.axes.iter().map(|a| a.len).collect()
    }

    pub fn strides(&self) -> Vec<usize> {
        row_major_strides(&self.dims())
    }

    pub fn kind(&self) -> SampleKind {
        self.kind
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// Multiplier applied to every sample before transmission.
    pub fn scale(&self) -> f64 {
        match self.kind {
            SampleKind::Integer {
                valid_bits: Some(bits),
            } => 2f64.powi(-(bits as i32)),
            _ => 1.0,
        }
    }

    /// Samples as sent to the worker: row-major float64, normalized.
    pub fn normalized_samples(&self) -> Vec<f64> {
        let scale = self.scale();
        if scale == 1.0 {
            return self.samples.clone();
        }
        self.samples.iter().map(|s| s * scale).collect()
    }

    /// Wire layout entry for this tensor under the given channel name.
    pub fn layout(&self, channel: &str) -> ChannelLayout {
        let axes = self
            .axes
            .iter()
            .zip(self.strides())
            .map(|(axis, stride)| AxisLayout(axis.label.clone(), axis.len, stride))
            .collect();
        ChannelLayout(channel.to_string(), axes)
    }
}

/// Number of samples `axes` describe; rejects empty shapes and overflow.
fn shape_sample_count(axes: &[Axis]) -> Result<usize> {
    if axes.is_empty() {
        return Err(BridgeError::InvalidImage("image has no axes".to_string()));
    }
    if let Some(axis) = axes.iter().find(|a| a.len == 0) {
        return Err(BridgeError::InvalidImage(format!("axis {} is empty", axis.label)));
    }
    axes.iter()
        .try_fold(1usize, |acc, a| acc.checked_mul(a.len))
        .ok_or_else(|| BridgeError::InvalidImage("image dimensions overflow".to_string()))
}

fn validate_shape(axes: &[Axis], sample_count: usize) -> Result<()> {
    let expected = shape_sample_count(axes)?;
    if expected != sample_count {
        let shape: Vec<String> = axes.iter().map(Axis::to_string).collect();
        return Err(BridgeError::InvalidImage(format!(
            "shape [{}] needs {expected} samples, got {sample_count}",
            shape.join(", ")
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FaultKind;

    #[test]
    fn real_images_are_sent_unscaled() {
        let img = ImageTensor::new(vec![Axis::x(2), Axis::y(2)], &[0.5f32, 1.0, 2.0, 4.0]).unwrap();
        assert_eq!(img.kind(), SampleKind::Real);
        assert_eq!(img.scale(), 1.0);
        assert_eq!(img.normalized_samples(), [0.5, 1.0, 2.0, 4.0]);
    }

    #[test]
    fn integer_images_scale_by_valid_bits() {
        let img = ImageTensor::new(vec![Axis::x(1), Axis::y(3)], &[0u16, 2048, 4095])
            .unwrap()
            .with_valid_bits(12);
        assert_eq!(
            img.kind(),
            SampleKind::Integer {
                valid_bits: Some(12)
            }
        );
        assert_eq!(img.normalized_samples(), [0.0, 0.5, 4095.0 / 4096.0]);
    }

    #[test]
    fn integer_images_without_depth_are_unscaled() {
        let img = ImageTensor::new(vec![Axis::x(2)], &[3u8, 255]).unwrap();
        assert_eq!(img.normalized_samples(), [3.0, 255.0]);

        let img = img.with_valid_bits(0);
        assert_eq!(img.kind(), SampleKind::Integer { valid_bits: None });
        assert_eq!(img.scale(), 1.0);
    }

    #[test]
    fn valid_bits_ignored_for_real_images() {
        let img = ImageTensor::from_f64(vec![Axis::x(1)], vec![3.0])
            .unwrap()
            .with_valid_bits(8);
        assert_eq!(img.kind(), SampleKind::Real);
        assert_eq!(img.normalized_samples(), [3.0]);
    }

    #[test]
    fn layout_has_row_major_strides() {
        let img = ImageTensor::zeros(vec![Axis::x(20), Axis::y(37)]).unwrap();
        let layout = img.layout("Foo");
        assert_eq!(layout.name(), "Foo");
        assert_eq!(
            layout.axes(),
            [
                AxisLayout("X".into(), 20, 37),
                AxisLayout("Y".into(), 37, 1)
            ]
        );
        assert_eq!(layout.sample_count(), img.samples().len());
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let err = ImageTensor::new(vec![Axis::x(2), Axis::y(2)], &[1.0f64, 2.0, 3.0]).unwrap_err();
        assert_eq!(err.kind(), FaultKind::Usage);
        assert_eq!(
            err.to_string(),
            "invalid image: shape [X=2, Y=2] needs 4 samples, got 3"
        );

        assert!(ImageTensor::from_f64(vec![], vec![]).is_err());
        assert!(ImageTensor::zeros(vec![Axis::x(0)]).is_err());
    }

    #[test]
    fn oversized_zeros_is_rejected_before_allocating() {
        let err = ImageTensor::zeros(vec![Axis::x(usize::MAX), Axis::y(2)]).unwrap_err();
        assert_eq!(err.kind(), FaultKind::Usage);
        assert_eq!(err.to_string(), "invalid image: image dimensions overflow");

        let err = ImageTensor::zeros(vec![Axis::x(usize::MAX / 4), Axis::y(1)]).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidImage(_)));
    }
}
