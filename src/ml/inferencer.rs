// ============================================================
// Layer 5 — Inferencer
// ============================================================
// Host-array facing encode / sample / decode on a network that
// carries no autodiff graph. Both model wrappers build one of
// these from `network.valid()` whenever inference is requested.

use anyhow::{anyhow, Result};
use burn::prelude::*;

use crate::data::{batcher::ImageBatcher, preprocessor::expand_batch};
use crate::domain::{
    array::HostArray,
    error::VaeError,
    hyperparams::InputShape,
};
use crate::ml::model::VaeNetwork;

/// Latent statistics for a batch, each of shape (n, latent_dim).
#[derive(Debug, Clone, PartialEq)]
pub struct LatentStats {
    pub mu:     HostArray,
    pub logvar: HostArray,
}

/// Copy a device tensor back into a host array of the same shape.
pub fn to_host<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<HostArray> {
    let dims = tensor.dims().to_vec();
    let values: Vec<f32> = tensor
        .into_data()
        .convert::<f32>()
        .to_vec()
        .map_err(|e| anyhow!("Cannot read tensor data: {e:?}"))?;
    Ok(HostArray::new(values, dims)?)
}

pub struct Inferencer<B: Backend> {
    network: VaeNetwork<B>,
    shape:   InputShape,
    batcher: ImageBatcher<B>,
}

impl<B: Backend> Inferencer<B> {
    pub fn new(network: VaeNetwork<B>, shape: InputShape, device: B::Device) -> Self {
        Self { network, shape, batcher: ImageBatcher::new(device) }
    }

    fn images(&self, batch: HostArray) -> Result<Tensor<B, 4>> {
        let batch = expand_batch(batch, &self.shape)?;
        batch.check_normalized()?;
        tracing::debug!("Encoding batch with shape {:?}", batch.dims());
        Ok(self.batcher.frames(batch.data(), &self.shape))
    }

    fn latents(&self, latents: HostArray) -> Result<Tensor<B, 2>> {
        let latent_dim = self.network.latent_dim();
        let width = match latents.dims() {
            [d]    => *d,
            [_, d] => *d,
            dims   => return Err(VaeError::BadRank(dims.len()).into()),
        };
        if width != latent_dim {
            return Err(VaeError::LatentDimMismatch { expected: latent_dim, actual: width }.into());
        }
        Ok(self.batcher.latents(latents.data(), latent_dim))
    }

    /// Deterministic: returns the posterior parameters, no sampling.
    pub fn encode(&self, batch: HostArray) -> Result<LatentStats> {
        let (mu, logvar) = self.network.encode(self.images(batch)?);
        Ok(LatentStats { mu: to_host(mu)?, logvar: to_host(logvar)? })
    }

    /// Posterior parameters plus one reparameterized draw z.
    pub fn encode_and_sample(&self, batch: HostArray) -> Result<(LatentStats, HostArray)> {
        let (mu, logvar) = self.network.encode(self.images(batch)?);
        let z = self.network.sample(mu.clone(), logvar.clone());
        Ok((LatentStats { mu: to_host(mu)?, logvar: to_host(logvar)? }, to_host(z)?))
    }

    /// Latents of shape (d) or (n, d) → frames (n, h, w, c).
    pub fn decode(&self, latents: HostArray) -> Result<HostArray> {
        let z = self.latents(latents)?;
        to_host(self.network.decode(z))
    }

    /// Draw z from N(mu, exp(logvar)) and decode it.
    pub fn decode_stats(&self, stats: &LatentStats) -> Result<HostArray> {
        if stats.mu.dims() != stats.logvar.dims() {
            return Err(VaeError::ShapeMismatch {
                expected: stats.mu.dims().to_vec(),
                actual:   stats.logvar.dims().to_vec(),
            }
            .into());
        }
        let mu     = self.latents(stats.mu.clone())?;
        let logvar = self.latents(stats.logvar.clone())?;
        to_host(self.network.decode(self.network.sample(mu, logvar)))
    }

    /// Encode, sample and decode in one pass.
    pub fn reconstruct(&self, batch: HostArray) -> Result<HostArray> {
        to_host(self.network.forward(self.images(batch)?).reconstruction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::hyperparams::Network;
    use crate::ml::model::VaeNetworkConfig;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn inferencer(latent_dim: usize) -> Inferencer<TestBackend> {
        let shape = InputShape::new(4, 4, 1);
        let net = VaeNetworkConfig::new(Network::Dense, shape, latent_dim)
            .init::<TestBackend>(&Default::default())
            .unwrap();
        Inferencer::new(net, shape, Default::default())
    }

    #[test]
    fn test_decode_wrong_width_fails() {
        let inf = inferencer(5);
        let err = inf.decode(HostArray::zeros([2, 3])).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<VaeError>(),
            Some(VaeError::LatentDimMismatch { expected: 5, actual: 3 })
        ));
    }

    #[test]
    fn test_decode_stats_rows_must_agree() {
        let inf = inferencer(3);
        let stats = LatentStats { mu: HostArray::zeros([2, 3]), logvar: HostArray::zeros([3, 3]) };
        let err = inf.decode_stats(&stats).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<VaeError>(),
            Some(VaeError::ShapeMismatch { expected, actual }) if expected == &[2, 3] && actual == &[3, 3]
        ));

        let stats = LatentStats { mu: HostArray::zeros([2, 3]), logvar: HostArray::zeros([2, 3]) };
        assert_eq!(inf.decode_stats(&stats).unwrap().dims(), &[2, 4, 4, 1]);
    }

    #[test]
    fn test_decode_single_vector() {
        let inf = inferencer(5);
        let out = inf.decode(HostArray::zeros([5])).unwrap();
        assert_eq!(out.dims(), &[1, 4, 4, 1]);
        assert!(inf.decode(HostArray::zeros([1, 1, 5])).is_err());
    }

    #[test]
    fn test_encode_is_deterministic() {
        let inf = inferencer(3);
        let batch = HostArray::new(vec![0.25; 32], [2, 4, 4]).unwrap();
        let a = inf.encode(batch.clone()).unwrap();
        let b = inf.encode(batch).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.mu.dims(), &[2, 3]);
    }

    #[test]
    fn test_encode_decode_round_trip_shape() {
        let inf = inferencer(3);
        let batch = HostArray::new(vec![0.5; 48], [3, 4, 4, 1]).unwrap();
        let (stats, z) = inf.encode_and_sample(batch.clone()).unwrap();
        assert_eq!(z.dims(), &[3, 3]);
        assert_eq!(inf.decode(stats.mu.clone()).unwrap().dims(), batch.dims());
        assert_eq!(inf.decode_stats(&stats).unwrap().dims(), batch.dims());
        assert_eq!(inf.reconstruct(batch.clone()).unwrap().dims(), batch.dims());
    }

    #[test]
    fn test_encode_rejects_raw_pixels() {
        let inf = inferencer(3);
        let batch = HostArray::new(vec![200.0; 16], [4, 4]).unwrap();
        let err = inf.encode(batch).unwrap_err();
        assert!(matches!(err.downcast_ref::<VaeError>(), Some(VaeError::NotNormalized { .. })));
    }
}
