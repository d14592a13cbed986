// ============================================================
// Model Errors
// ============================================================
// Typed failures raised by the networks themselves.
//
//   Construction time:  InvalidHops, EmbeddingDimMismatch,
//                       EmbeddingRowsMismatch
//   Forward pass:       MissingEntity, UnknownToken,
//                       NotAnEntity, SlotOutOfRange,
//                       EmptyMemory, NeedsKeyValueMemory
//
// Forward-pass errors mean the batch is inconsistent with the
// vocabulary or the output space. They abort the pass; there is
// nothing to retry.

use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("number of hops must be between 1 and 3, got {0}")]
    InvalidHops(usize),

    #[error("pretrained embeddings have dimension {found}, model expects {expected}")]
    EmbeddingDimMismatch { expected: usize, found: usize },

    #[error("pretrained embeddings have {found} rows, vocabulary has {expected}")]
    EmbeddingRowsMismatch { expected: usize, found: usize },

    #[error("top-attended segment {segment} of batch row {row} has no entity token")]
    MissingEntity { row: usize, segment: usize },

    #[error("token id {0} is not in the vocabulary")]
    UnknownToken(usize),

    #[error("value token id {0} is not an @entity token")]
    NotAnEntity(usize),

    #[error("entity slot {slot} is outside the output space of size {output_size}")]
    SlotOutOfRange { slot: usize, output_size: usize },

    #[error("batch row {row} has no non-padding value to select")]
    EmptyMemory { row: usize },

    #[error("{0} reads a key-value memory but was given plain story samples")]
    NeedsKeyValueMemory(&'static str),
}
