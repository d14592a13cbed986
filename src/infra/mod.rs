// ============================================================
// Layer 6 - Infrastructure Layer
// ============================================================
// File-backed concerns shared by the upper layers:
//
//   checkpoint.rs   network weights (CompactRecorder), the
//                   NetworkConfig and the vocabulary as JSON
//
//   embeddings.rs   pretrained word vectors from a text file,
//                   aligned to the vocabulary
//
//   report.rs       per-sample prediction CSV
//
// Reference: Burn Book §5 (Checkpointing)
//            Rust Book §9 (Error Handling with anyhow)

/// Network checkpoint saving and loading
pub mod checkpoint;

/// Text-format pretrained embeddings
pub mod embeddings;

/// Prediction CSV writer
pub mod report;
