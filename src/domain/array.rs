// ============================================================
// Layer 3 — Host Arrays
// ============================================================
// A dense row-major f32 buffer plus its dimensions. This is the
// currency between the data layer, the inference API and any
// downstream consumer: images go in as HostArrays and latent
// statistics come back out as HostArrays.

use crate::domain::error::{VaeError, VaeResult};

#[derive(Debug, Clone, PartialEq)]
pub struct HostArray {
    data: Vec<f32>,
    dims: Vec<usize>,
}

impl HostArray {
    /// Wrap `data` as an array of shape `dims`.
    /// Fails if the element count does not match the shape.
    pub fn new(data: Vec<f32>, dims: impl Into<Vec<usize>>) -> VaeResult<Self> {
        let dims = dims.into();
        let expected: usize = dims.iter().product();
        if expected != data.len() {
            return Err(VaeError::ShapeMismatch {
                expected: dims,
                actual:   vec![data.len()],
            });
        }
        Ok(Self { data, dims })
    }

    pub fn zeros(dims: impl Into<Vec<usize>>) -> Self {
        let dims = dims.into();
        let len = dims.iter().product();
        Self { data: vec![0.0; len], dims }
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Size of the leading axis (0 for a scalar-shaped array)
    pub fn len(&self) -> usize {
        self.dims.first().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Values of one entry along the leading axis
    pub fn row(&self, index: usize) -> &[f32] {
        let stride: usize = self.dims.iter().skip(1).product();
        &self.data[index * stride..(index + 1) * stride]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        let stride: usize = self.dims.iter().skip(1).product();
        self.data.chunks(stride.max(1))
    }

    pub fn reshape(self, dims: impl Into<Vec<usize>>) -> VaeResult<Self> {
        Self::new(self.data, dims)
    }

    pub fn into_parts(self) -> (Vec<f32>, Vec<usize>) {
        (self.data, self.dims)
    }

    /// (min, max) over all values, None for an empty array
    pub fn value_range(&self) -> Option<(f32, f32)> {
        let mut it = self.data.iter().copied();
        let first = it.next()?;
        Some(it.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
    }

    /// Pixels fed to the model must lie in [0, 1]. NaN is never in range.
    pub fn check_normalized(&self) -> VaeResult<()> {
        if self.data.iter().all(|v| (0.0..=1.0).contains(v)) {
            return Ok(());
        }
        let (min, max) = if self.data.iter().any(|v| v.is_nan()) {
            (f32::NAN, f32::NAN)
        } else {
            self.value_range().unwrap_or((f32::NAN, f32::NAN))
        };
        Err(VaeError::NotNormalized { min, max })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_must_match_len() {
        assert!(HostArray::new(vec![0.0; 6], [2, 3]).is_ok());
        assert!(matches!(
            HostArray::new(vec![0.0; 5], [2, 3]),
            Err(VaeError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_rows() {
        let a = HostArray::new((0..6).map(|v| v as f32).collect(), [3, 2]).unwrap();
        assert_eq!(a.row(1), &[2.0, 3.0]);
        assert_eq!(a.rows().count(), 3);
    }

    #[test]
    fn test_normalization_check() {
        let ok = HostArray::new(vec![0.0, 0.5, 1.0], [3]).unwrap();
        assert!(ok.check_normalized().is_ok());

        let raw = HostArray::new(vec![0.0, 128.0, 255.0], [3]).unwrap();
        assert!(matches!(
            raw.check_normalized(),
            Err(VaeError::NotNormalized { max, .. }) if max == 255.0
        ));

        let nan = HostArray::new(vec![0.5, f32::NAN, 0.2, 0.1], [4]).unwrap();
        assert!(matches!(
            nan.check_normalized(),
            Err(VaeError::NotNormalized { min, .. }) if min.is_nan()
        ));
    }
}
