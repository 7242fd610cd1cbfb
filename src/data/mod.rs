// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between pixels on disk and tensors on a device:
//
//   image files / synthetic sprites
//       │
//       ▼
//   ImageDirLoader / Translations → normalised HostArray
//       │
//       ▼
//   Preprocessor      → completes batch rank to (n, h, w, c)
//       │
//       ▼
//   ImageDataset      → shuffling, batching, splitting, stacking
//       │
//       ▼
//   ImageBatcher      → device tensors for the model
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Converts host batches into Burn tensors
pub mod batcher;

/// In-memory dataset with in-place shuffling and batch iteration
pub mod dataset;

/// Loads image directories and writes decoded frames
pub mod loader;

/// Batch rank expansion and shape checks
pub mod preprocessor;

/// Shuffles and splits data into train/test sets
pub mod splitter;

/// Synthetic translated-square sprites
pub mod synthetic;
