// ============================================================
// Layer 4 - Data Pipeline
// ============================================================
// From sample files on disk to padded tensor batches:
//
//   samples.json / .jsonl
//       │
//       ▼
//   loader         → parses samples, groups them by memory layout
//       │
//       ▼
//   sample         → StorySample / KeyValueSample (token ids)
//       │
//       ▼
//   batcher        → pads ids, builds token / segment / output masks
//
// Tokenisation happens upstream; every id refers to the vocabulary
// saved next to the checkpoint.
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Reads sample files and vocabularies
pub mod loader;

/// Token-id samples for story and key-value memories
pub mod sample;

/// Pads samples into tensor batches with masks
pub mod batcher;
