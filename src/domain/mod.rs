// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Pure Rust structs, enums and traits that define what the
// system works with. No Burn types and no file I/O live here.
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// Dense f32 arrays exchanged with collaborators
pub mod array;

// Typed error enum shared by every layer
pub mod error;

// Hyperparameter record, network families and input shapes
pub mod hyperparams;

// Collaborator seams: datasets, metric sinks, checkpoints
pub mod traits;
