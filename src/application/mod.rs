// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Orchestrates the other layers to accomplish one goal each:
// training a run, retraining a stacked VAE, or inspecting a
// finished run.
//
// Rules for this layer:
//   - No ML math or model code here
//   - No argument parsing or printing here (that's Layer 1)
//   - Only workflow coordination
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// Plain VAE training, fresh or resumed
pub mod train_use_case;

// Frame-stacked VAE training with warm starts
pub mod retrain_use_case;

// Encoding images and decoding latents with a finished run
pub mod inspect_use_case;
