// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The seams between the training core and its collaborators:
//
//   DatasetSource → anything that yields normalised pixel arrays
//   ScalarSink    → anything that accepts tagged scalar summaries
//   Checkpointable→ anything whose parameters can be saved/restored
//                   under a tag, independent of the ML engine
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use anyhow::Result;

use crate::domain::array::HostArray;

// ─── DatasetSource ────────────────────────────────────────────────────────────
/// Supplies a batch of images, shape (n, height, width, channels),
/// with values already normalised to [0, 1].
///
/// Implementations:
///   - ImageDirLoader → a directory of PNG/JPEG files
///   - Translations   → synthetic sprites at every position
pub trait DatasetSource {
    fn load(&self) -> Result<HostArray>;
}

// ─── ScalarSink ───────────────────────────────────────────────────────────────
/// Receives scalar summaries tagged by name and step.
/// The core only writes to a sink; it never reads back.
pub trait ScalarSink {
    fn scalar(&mut self, tag: &str, step: u64, value: f64) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Sink that drops everything
pub struct NullSink;

impl ScalarSink for NullSink {
    fn scalar(&mut self, _tag: &str, _step: u64, _value: f64) -> Result<()> {
        Ok(())
    }
}

// ─── Checkpointable ───────────────────────────────────────────────────────────
/// Any model whose learned parameters can be persisted under a tag.
///
/// Implementations:
///   - Vae        → tags "latest" (end of epoch) or anything on demand
///   - StackedVae → tags "weights" and "base_weights"
pub trait Checkpointable {
    fn save(&self, tag: &str) -> Result<()>;

    fn load(&mut self, tag: &str) -> Result<()>;
}
