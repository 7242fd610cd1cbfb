// ============================================================
// Layer 4 — Image Batcher
// ============================================================
// Turns borrowed host batches into device tensors.
//
//   frames:  n * h*w*c values         → Tensor [n, h, w, c]
//   stacked: n * k * h*w*c values     → k tensors [n, h, w, c],
//                                        tensor i holds frame i of
//                                        every stack
//   latents: n * d values             → Tensor [n, d]
//
// Reference: Burn Book §4 (Batcher)

use burn::prelude::*;

use crate::domain::hyperparams::InputShape;

/// Holds the target device so tensors are created on the correct GPU/CPU.
#[derive(Clone, Debug)]
pub struct ImageBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> ImageBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    /// `data` must hold a whole number of frames of `shape`.
    pub fn frames(&self, data: &[f32], shape: &InputShape) -> Tensor<B, 4> {
        let n = data.len() / shape.frame_len();
        let tensor_data = TensorData::new(data.to_vec(), [n, shape.height, shape.width, shape.channels]);
        Tensor::<B, 4>::from_data(tensor_data, &self.device)
    }

    /// Split stacks of k frames into k per-position frame tensors.
    pub fn stacked(&self, data: &[f32], k: usize, shape: &InputShape) -> Vec<Tensor<B, 4>> {
        let frame_len = shape.frame_len();
        let n = data.len() / (k * frame_len);

        (0..k)
            .map(|i| {
                let mut frame_i = Vec::with_capacity(n * frame_len);
                for stack in data.chunks(k * frame_len) {
                    frame_i.extend_from_slice(&stack[i * frame_len..(i + 1) * frame_len]);
                }
                self.frames(&frame_i, shape)
            })
            .collect()
    }

    pub fn latents(&self, data: &[f32], latent_dim: usize) -> Tensor<B, 2> {
        let n = data.len() / latent_dim;
        let tensor_data = TensorData::new(data.to_vec(), [n, latent_dim]);
        Tensor::<B, 2>::from_data(tensor_data, &self.device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_frames_shape() {
        let batcher = ImageBatcher::<TestBackend>::new(Default::default());
        let shape = InputShape::new(2, 3, 1);
        let t = batcher.frames(&[0.5; 12], &shape);
        assert_eq!(t.dims(), [2, 2, 3, 1]);
    }

    #[test]
    fn test_stacked_groups_by_position() {
        let batcher = ImageBatcher::<TestBackend>::new(Default::default());
        let shape = InputShape::new(1, 1, 1);
        // two stacks of three 1x1 frames: [0, 1, 2] and [10, 11, 12]
        let data = [0.0, 1.0, 2.0, 10.0, 11.0, 12.0];
        let frames = batcher.stacked(&data, 3, &shape);
        assert_eq!(frames.len(), 3);

        let second: Vec<f32> = frames[1].clone().into_data().to_vec().unwrap();
        assert_eq!(second, vec![1.0, 11.0]);
    }
}
