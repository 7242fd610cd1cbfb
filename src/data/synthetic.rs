// ============================================================
// Layer 4 — Synthetic Sprites
// ============================================================
// A square sprite rendered at every position of the frame, the
// same idea as the dSprites "translation" subset. Two factors of
// variation (x, y) make it a quick sanity check for whether a VAE
// learns a disentangled position code.

use anyhow::{ensure, Result};

use crate::domain::{array::HostArray, hyperparams::InputShape, traits::DatasetSource};

#[derive(Debug, Clone)]
pub struct Translations {
    shape:  InputShape,
    side:   usize,
    stride: usize,
}

impl Translations {
    pub fn new(shape: InputShape, side: usize) -> Self {
        Self { shape, side, stride: 1 }
    }

    /// Only place the sprite at every `stride`-th position along each axis
    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride.max(1);
        self
    }

    fn positions(&self, extent: usize) -> Vec<usize> {
        (0..=extent - self.side).step_by(self.stride).collect()
    }
}

impl DatasetSource for Translations {
    fn load(&self) -> Result<HostArray> {
        let InputShape { height, width, channels } = self.shape;
        ensure!(
            self.side > 0 && self.side <= height && self.side <= width,
            "sprite side {} does not fit a {} frame",
            self.side,
            self.shape
        );

        let rows = self.positions(height);
        let cols = self.positions(width);
        let frame_len = self.shape.frame_len();

        let mut data = Vec::with_capacity(rows.len() * cols.len() * frame_len);
        for &top in &rows {
            for &left in &cols {
                let mut frame = vec![0.0f32; frame_len];
                for y in top..top + self.side {
                    for x in left..left + self.side {
                        let px = (y * width + x) * channels;
                        frame[px..px + channels].fill(1.0);
                    }
                }
                data.extend(frame);
            }
        }

        let n = rows.len() * cols.len();
        tracing::debug!("Rendered {} translation frames of {}", n, self.shape);
        Ok(HostArray::new(data, [n, height, width, channels])?)
    }
}
