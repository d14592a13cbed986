// ============================================================
// Layer 3 - Core Traits (Abstractions)
// ============================================================
// Seams between the networks and the outside world. Nothing here
// knows about Burn tensors.

use anyhow::Result;

use crate::domain::embedding::PretrainedTable;
use crate::domain::vocabulary::Vocabulary;

// ─── EmbeddingProvider ────────────────────────────────────────────────────────
/// Anything that can produce pretrained word vectors for a vocabulary.
///
/// Implementations:
///   - TextEmbeddingFile → whitespace separated `token v1 .. vD` lines
pub trait EmbeddingProvider {
    /// Align the source vectors to `vocab`. The returned table has
    /// exactly `vocab.len()` rows.
    fn load(&self, vocab: &Vocabulary, freeze: bool) -> Result<PretrainedTable>;
}
