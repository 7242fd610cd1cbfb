// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All Burn-specific model code lives here.
//
//   model.rs      — Encoder/decoder networks per architecture
//                   family, reparameterised sampling
//
//   loss.rs       — MSE / BCE reconstruction, per-dimension KL,
//                   beta weighting, stacked averaging
//
//   trainer.rs    — Backend-agnostic epoch/batch loop with
//                   progress log, summaries and checkpoints
//
//   inferencer.rs — Host-array encode / sample / decode on the
//                   inner (non-autodiff) backend
//
//   vae.rs        — Plain VAE: run directory, training, inference
//
//   stacked.rs    — Frame-stacked VAE with warm starts
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Kingma & Welling (2014) Auto-Encoding Variational Bayes

/// Encoder/decoder network architectures
pub mod model;

/// Loss terms
pub mod loss;

/// Shared training loop
pub mod trainer;

/// Inference on host arrays
pub mod inferencer;

/// Plain variational autoencoder
pub mod vae;

/// Frame-stacked variational autoencoder
pub mod stacked;
