// ============================================================
// Layer 3 - Domain Layer
// ============================================================
// Plain Rust types describing the problem: the vocabulary with
// its `@entity<N>` slot convention, pretrained vector tables and
// the provider trait that produces them.
//
// Rules for this layer:
//   - NO Burn framework types
//   - NO file I/O
//   - Only plain Rust structs, enums and traits

/// Token <-> index table and entity slot decoding
pub mod vocabulary;

/// Pretrained vectors aligned to a vocabulary
pub mod embedding;

/// Provider abstractions implemented by the infra layer
pub mod traits;
