// ============================================================
// Layer 5 — Loss Composer
// ============================================================
//   reconstruction = MSE(x, x̂)                 (plain VAE)
//                  = mean BCE(x, x̂) [* h²]      (stacked VAE)
//   kl_j           = mean_batch( -0.5 * (1 + logvar_j - mu_j² - exp(logvar_j)) )
//   kl             = Σ_j kl_j
//   total          = reconstruction + beta * kl
//
// kl_j is the closed-form KL between N(mu_j, exp(logvar_j)) and N(0, 1).

use anyhow::{anyhow, Result};
use burn::prelude::*;

use crate::domain::error::{VaeError, VaeResult};
use crate::ml::trainer::StepStats;

/// Output clamp for the cross-entropy, matches the usual Keras epsilon
const BCE_EPS: f64 = 1e-7;

/// All loss terms of one batch, still on the device.
pub struct LossTerms<B: Backend> {
    /// reconstruction + beta * kl, shape [1]
    pub total:          Tensor<B, 1>,
    pub reconstruction: Tensor<B, 1>,
    /// Σ_j kl_j, unscaled by beta, shape [1]
    pub kl:             Tensor<B, 1>,
    /// kl_j per latent dimension, shape [latent_dim]
    pub kl_per_dim:     Tensor<B, 1>,
}

impl<B: Backend> LossTerms<B> {
    /// Pull the numbers the training loop reports back to the host.
    /// `mu` and `logvar` may stack several frames along axis 0.
    pub fn stats(&self, mu: Tensor<B, 2>, logvar: Tensor<B, 2>) -> Result<StepStats> {
        Ok(StepStats {
            loss:           scalar(self.total.clone()),
            reconstruction: scalar(self.reconstruction.clone()),
            kl:             scalar(self.kl.clone()),
            kl_per_dim:     values(self.kl_per_dim.clone())?,
            mu_mean:        values(mu.mean_dim(0))?,
            sigma_mean:     values(logvar.mul_scalar(0.5).exp().mean_dim(0))?,
        })
    }
}

fn scalar<B: Backend>(t: Tensor<B, 1>) -> f64 {
    t.into_scalar().elem::<f64>()
}

fn values<B: Backend, const D: usize>(t: Tensor<B, D>) -> Result<Vec<f64>> {
    t.into_data()
        .convert::<f64>()
        .to_vec()
        .map_err(|e| anyhow!("Cannot read loss values: {e:?}"))
}

/// Per-dimension KL averaged over the batch: [n, d] → [d]
pub fn kl_per_dimension<B: Backend>(mu: Tensor<B, 2>, logvar: Tensor<B, 2>) -> Tensor<B, 1> {
    let [_, latent_dim] = mu.dims();
    let dkl = (logvar.clone().add_scalar(1.0) - mu.powf_scalar(2.0) - logvar.exp()).mul_scalar(-0.5);
    dkl.mean_dim(0).reshape([latent_dim])
}

pub fn mean_squared_error<B: Backend>(input: Tensor<B, 4>, reconstruction: Tensor<B, 4>) -> Tensor<B, 1> {
    (reconstruction - input).powf_scalar(2.0).mean()
}

/// Element-wise binary cross-entropy averaged over every value.
pub fn binary_cross_entropy<B: Backend>(input: Tensor<B, 4>, reconstruction: Tensor<B, 4>) -> Tensor<B, 1> {
    let p = reconstruction.clamp(BCE_EPS, 1.0 - BCE_EPS);
    let bce = (input.clone() * p.clone().log() + input.neg().add_scalar(1.0) * p.neg().add_scalar(1.0).log()).neg();
    bce.mean()
}

/// total = reconstruction + beta * Σ kl_per_dim
pub fn compose<B: Backend>(reconstruction: Tensor<B, 1>, kl_per_dim: Tensor<B, 1>, beta: f64) -> LossTerms<B> {
    let kl = kl_per_dim.clone().sum();
    let total = reconstruction.clone() + kl.clone().mul_scalar(beta);
    LossTerms { total, reconstruction, kl, kl_per_dim }
}

/// Loss of the plain VAE: MSE reconstruction.
pub fn vae_loss<B: Backend>(
    input:          Tensor<B, 4>,
    reconstruction: Tensor<B, 4>,
    mu:             Tensor<B, 2>,
    logvar:         Tensor<B, 2>,
    beta:           f64,
) -> LossTerms<B> {
    compose(mean_squared_error(input, reconstruction), kl_per_dimension(mu, logvar), beta)
}

/// One frame position of a stacked batch.
pub struct FrameTerms<B: Backend> {
    pub input:          Tensor<B, 4>,
    pub reconstruction: Tensor<B, 4>,
    pub mu:             Tensor<B, 2>,
    pub logvar:         Tensor<B, 2>,
}

/// Loss of the stacked VAE: reconstruction and per-dimension KL are
/// averaged over the k frame positions before composing.
/// `scale` multiplies the cross-entropy (h² when scaling is enabled).
pub fn stacked_loss<B: Backend>(
    frames: Vec<FrameTerms<B>>,
    scale:  f64,
    beta:   f64,
) -> VaeResult<LossTerms<B>> {
    let k = frames.len();
    let mut iter = frames.into_iter();
    let first = iter
        .next()
        .ok_or_else(|| VaeError::InvalidParams("k must be at least 1".into()))?;

    let frame_terms = |f: FrameTerms<B>| {
        let r = binary_cross_entropy(f.input, f.reconstruction).mul_scalar(scale);
        (r, kl_per_dimension(f.mu, f.logvar))
    };

    let (rec, kl) = iter.fold(frame_terms(first), |(rec, kl), f| {
        let (r, d) = frame_terms(f);
        (rec + r, kl + d)
    });

    Ok(compose(rec.div_scalar(k as f64), kl.div_scalar(k as f64), beta))
}
