// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns shared by the model wrappers and the
// application layer:
//
//   settings.rs   — Model/chosen roots and the selected device,
//                   built once by the CLI
//
//   checkpoint.rs — One run directory: params.json plus tagged
//                   weight records (NamedMpkFileRecorder)
//
//   metrics.rs    — progress.csv, one row per processed batch
//
//   summary.rs    — TensorBoard scalar summaries under board/
//
// Reference: Rust Book §7 (Modules)
//            Burn Book §5 (Checkpointing)

/// Runtime roots and accelerator selection
pub mod settings;

/// Run directory persistence: params and weights
pub mod checkpoint;

/// Per-batch CSV progress log
pub mod metrics;

/// JSON-lines scalar summaries
pub mod summary;
