use rand::{seq::SliceRandom, Rng};

use crate::data::preprocessor::{expand_batch, expand_stacked_batch};
use crate::data::splitter::holdout_indices;
use crate::domain::{
    array::HostArray,
    error::{VaeError, VaeResult},
    hyperparams::InputShape,
};

/// An in-memory set of normalised samples.
/// A sample is one frame (h, w, c) or one stack of k frames (k, h, w, c).
#[derive(Debug, Clone)]
pub struct ImageDataset {
    data:        Vec<f32>,
    sample_dims: Vec<usize>,
    sample_len:  usize,
}

/// A contiguous run of samples borrowed from the dataset.
#[derive(Debug, Clone, Copy)]
pub struct Batch<'a> {
    pub data: &'a [f32],
    pub size: usize,
}

impl ImageDataset {
    /// Build a dataset of single frames. Rank 2/3 input is expanded the
    /// same way inference batches are.
    pub fn from_frames(frames: HostArray, shape: &InputShape) -> VaeResult<Self> {
        let frames = expand_batch(frames, shape)?;
        frames.check_normalized()?;
        let (data, _) = frames.into_parts();
        Ok(Self {
            data,
            sample_dims: shape.dims().to_vec(),
            sample_len:  shape.frame_len(),
        })
    }

    /// Build a dataset from an (n, k, h, w, c) array of frame stacks.
    pub fn from_stacked(stacks: HostArray, shape: &InputShape, k: usize) -> VaeResult<Self> {
        let stacks = expand_stacked_batch(stacks, shape, k)?;
        stacks.check_normalized()?;
        let (data, dims) = stacks.into_parts();
        if dims[1] != k {
            return Err(VaeError::ShapeMismatch {
                expected: vec![dims[0], k, shape.height, shape.width, shape.channels],
                actual:   dims,
            });
        }
        Ok(Self {
            data,
            sample_dims: vec![k, shape.height, shape.width, shape.channels],
            sample_len:  k * shape.frame_len(),
        })
    }

    /// Sliding windows of `k` consecutive frames: n frames give n - k + 1 stacks.
    pub fn stack_frames(&self, k: usize) -> VaeResult<Self> {
        if self.sample_dims.len() != 3 {
            return Err(VaeError::BadRank(self.sample_dims.len() + 1));
        }
        if k == 0 || self.len() < k {
            return Err(VaeError::EmptyDataset);
        }

        let windows = self.len() - k + 1;
        let mut data = Vec::with_capacity(windows * k * self.sample_len);
        for start in 0..windows {
            data.extend_from_slice(&self.data[start * self.sample_len..(start + k) * self.sample_len]);
        }

        let mut sample_dims = vec![k];
        sample_dims.extend_from_slice(&self.sample_dims);
        Ok(Self { data, sample_dims, sample_len: k * self.sample_len })
    }

    pub fn len(&self) -> usize {
        self.data.len() / self.sample_len.max(1)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn sample_dims(&self) -> &[usize] {
        &self.sample_dims
    }

    pub fn sample(&self, index: usize) -> &[f32] {
        &self.data[index * self.sample_len..(index + 1) * self.sample_len]
    }

    /// Reorder the samples in place. Any ordering a caller relied on
    /// (e.g. frame sequence) is gone afterwards.
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.shuffle(rng);

        let mut shuffled = Vec::with_capacity(self.data.len());
        for idx in order {
            shuffled.extend_from_slice(self.sample(idx));
        }
        self.data = shuffled;
    }

    /// ceil(len / batch_size)
    pub fn num_batches(&self, batch_size: usize) -> usize {
        self.len().div_ceil(batch_size.max(1))
    }

    /// Consecutive batches of `batch_size` samples; the last may be smaller.
    pub fn batches(&self, batch_size: usize) -> impl Iterator<Item = Batch<'_>> {
        let sample_len = self.sample_len;
        self.data
            .chunks(batch_size.max(1) * sample_len)
            .map(move |chunk| Batch { data: chunk, size: chunk.len() / sample_len })
    }

    /// Random (train, holdout) split by sample.
    pub fn split<R: Rng + ?Sized>(self, holdout_fraction: f64, rng: &mut R) -> (Self, Self) {
        let (train_idx, test_idx) = holdout_indices(self.len(), holdout_fraction, rng);
        (self.gather(&train_idx), self.gather(&test_idx))
    }

    /// All samples as one (n, ...sample_dims) array
    pub fn to_array(&self) -> VaeResult<HostArray> {
        let mut dims = vec![self.len()];
        dims.extend_from_slice(&self.sample_dims);
        HostArray::new(self.data.clone(), dims)
    }

    fn gather(&self, indices: &[usize]) -> Self {
        let mut data = Vec::with_capacity(indices.len() * self.sample_len);
        for &idx in indices {
            data.extend_from_slice(self.sample(idx));
        }
        Self { data, sample_dims: self.sample_dims.clone(), sample_len: self.sample_len }
    }
}
