// ============================================================
// Layer 5 - Key-Value Attention Classifier
// ============================================================
// Single hop, no output layer. Attention over the keys picks a
// value directly:
//
//   keys, query ──K──▶ cosine ──masked log-softmax──▶ logp [b, s]
//
//   Argmax        value of the top key, scored with that key's logp
//   AttentionSum  Σ exp(logp) per distinct value (segment order),
//                 best mass wins, scored with ln(mass)
//
// Values are vocabulary ids. The chosen id is decoded to its
// @entity slot, and every other output slot gets
// UNSELECTED_LOG_PROB. Selection runs on the host, row by row, so
// tie-breaking follows segment order.

use burn::{module::Ignored, nn::Embedding, prelude::*};
use serde::{Deserialize, Serialize};

use crate::data::batcher::KeyValueBatch;
use crate::domain::embedding::PretrainedTable;
use crate::domain::vocabulary::Vocabulary;
use crate::error::{ModelError, ModelResult};
use crate::ml::attention::cosine_scores;
use crate::ml::embedder::{check_token_ids, embed_query, embed_segments, embedding_table, SegmentReduction};
use crate::ml::masking::masked_log_softmax;

/// Log-probability given to every slot that was not selected.
pub const UNSELECTED_LOG_PROB: f32 = -100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Selection {
    Argmax,
    AttentionSum,
}

#[derive(Config, Debug)]
pub struct KvAttentionConfig {
    pub vocab_size:  usize,
    pub embed_size:  usize,
    pub output_size: usize,
    #[config(default = true)]
    pub positional: bool,
    #[config(default = false)]
    pub average_embeddings: bool,
    #[config(default = "Selection::Argmax")]
    pub selection: Selection,
    #[config(default = false)]
    pub freeze_embeddings: bool,
}

impl KvAttentionConfig {
    pub fn init<B: Backend>(
        &self,
        device:     &B::Device,
        pretrained: Option<&PretrainedTable>,
    ) -> ModelResult<KvAttention<B>> {
        let keys = embedding_table::<B>(self.vocab_size, self.embed_size, pretrained, self.freeze_embeddings, device)?;
        tracing::info!(
            "KV attention classifier ready: embed_size={}, output_size={}, selection={:?}",
            self.embed_size, self.output_size, self.selection,
        );
        Ok(KvAttention {
            keys,
            output_size: self.output_size,
            reduction:   Ignored(SegmentReduction { positional: self.positional, average: self.average_embeddings }),
            selection:   Ignored(self.selection),
        })
    }
}

#[derive(Module, Debug)]
pub struct KvAttention<B: Backend> {
    pub keys:        Embedding<B>,
    pub output_size: usize,
    pub reduction:   Ignored<SegmentReduction>,
    pub selection:   Ignored<Selection>,
}

#[derive(Debug, Clone)]
pub struct KvSelection<B: Backend> {
    /// Sparse log-probabilities [batch, output_size]
    pub log_probs: Tensor<B, 2>,
    /// Output slot of the selected value, per row
    pub chosen: Vec<usize>,
    /// Attention log-probabilities over keys [batch, segments]
    pub attention: Tensor<B, 2>,
}

/// One row of host-side memory: attention log-probs, value ids and
/// segment validity, all indexed by segment.
#[derive(Debug, Clone, Copy)]
pub struct MemoryRow<'a> {
    pub log_probs: &'a [f32],
    pub values:    &'a [usize],
    pub valid:     &'a [f32],
}

impl MemoryRow<'_> {
    fn segments(&self) -> impl Iterator<Item = (usize, f32)> + '_ {
        (0..self.values.len())
            .filter(|&s| self.valid[s] > 0.0)
            .map(|s| (self.values[s], self.log_probs[s]))
    }
}

/// Value of the first highest-scoring valid key.
pub fn argmax_selection(row: MemoryRow<'_>) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (value, logp) in row.segments() {
        if best.map_or(true, |(_, b)| logp > b) {
            best = Some((value, logp));
        }
    }
    best
}

/// Value with the largest summed attention; first seen wins ties.
pub fn attention_sum_selection(row: MemoryRow<'_>) -> Option<(usize, f32)> {
    let mut mass: Vec<(usize, f32)> = Vec::new();
    for (value, logp) in row.segments() {
        match mass.iter_mut().find(|(v, _)| *v == value) {
            Some((_, m)) => *m += logp.exp(),
            None         => mass.push((value, logp.exp())),
        }
    }

    let mut best: Option<(usize, f32)> = None;
    for &(value, m) in &mass {
        if best.map_or(true, |(_, b)| m > b) {
            best = Some((value, m));
        }
    }
    best.map(|(value, m)| (value, m.ln()))
}

/// Run the selection over every row: the chosen value id and its
/// log-probability, one pair per row.
pub fn select_values(
    selection: Selection,
    log_probs: &[f32],
    values:    &[usize],
    valid:     &[f32],
    segments:  usize,
) -> ModelResult<Vec<(usize, f32)>> {
    let batch = if segments == 0 { 0 } else { values.len() / segments };
    (0..batch)
        .map(|r| {
            let span = r * segments..(r + 1) * segments;
            let row  = MemoryRow {
                log_probs: &log_probs[span.clone()],
                values:    &values[span.clone()],
                valid:     &valid[span],
            };
            let picked = match selection {
                Selection::Argmax       => argmax_selection(row),
                Selection::AttentionSum => attention_sum_selection(row),
            };
            picked.ok_or(ModelError::EmptyMemory { row: r })
        })
        .collect()
}

/// Decode each chosen value id to its entity slot and scatter the
/// scores into a row-major `[batch, output_size]` matrix.
pub fn sparse_log_probs(
    picked:      &[(usize, f32)],
    vocab:       &Vocabulary,
    output_size: usize,
) -> ModelResult<(Vec<f32>, Vec<usize>)> {
    let mut out    = vec![UNSELECTED_LOG_PROB; picked.len() * output_size];
    let mut chosen = Vec::with_capacity(picked.len());

    for (r, &(value, logp)) in picked.iter().enumerate() {
        let slot = match vocab.slot_of(value) {
            None             => return Err(ModelError::UnknownToken(value)),
            Some(None)       => return Err(ModelError::NotAnEntity(value)),
            Some(Some(slot)) => slot,
        };
        if slot >= output_size {
            return Err(ModelError::SlotOutOfRange { slot, output_size });
        }
        out[r * output_size + slot] = logp;
        chosen.push(slot);
    }
    Ok((out, chosen))
}

impl<B: Backend> KvAttention<B> {
    /// Attention log-probabilities over the keys, `[batch, segments]`.
    pub fn attention(&self, batch: &KeyValueBatch<B>) -> Tensor<B, 2> {
        let keys  = embed_segments(&self.keys, batch.keys.clone(), batch.key_mask.clone(), *self.reduction);
        let query = embed_query(&self.keys, batch.query.clone(), batch.query_mask.clone(), *self.reduction);
        masked_log_softmax(cosine_scores(keys, query), batch.segment_mask.clone())
    }

    pub fn forward(&self, batch: &KeyValueBatch<B>, vocab: &Vocabulary) -> ModelResult<KvSelection<B>> {
        check_token_ids(&self.keys, &batch.keys)?;
        check_token_ids(&self.keys, &batch.query)?;

        let attention = self.attention(batch);
        let [rows, segments] = attention.dims();
        let device = attention.device();

        let log_probs: Vec<f32> = attention.clone().into_data().iter::<f32>().collect();
        let values: Vec<usize> = batch
            .values
            .clone()
            .into_data()
            .iter::<i64>()
            .map(|v| v.max(0) as usize)
            .collect();
        let valid: Vec<f32> = batch.segment_mask.clone().into_data().iter::<f32>().collect();

        let picked           = select_values(*self.selection, &log_probs, &values, &valid, segments)?;
        let (sparse, chosen) = sparse_log_probs(&picked, vocab, self.output_size)?;
        tracing::debug!("KV attention selected {:?}", chosen);

        Ok(KvSelection {
            log_probs: Tensor::from_data(TensorData::new(sparse, [rows, self.output_size]), &device),
            chosen,
            attention,
        })
    }
}
