// ============================================================
// Layer 5 - End-To-End Memory Network (MemN2N)
// ============================================================
// Story reader with 1..=3 hops over sentence memories.
//
//   query ──A──▶ u₀
//   story ──A──▶ m (attend)      story ──C──▶ c (aggregate)
//   hop k:  p = masked_softmax(cos(m, u))   o = read(p, c)
//           u ← G(o) + u                    (all but the last hop)
//   last:   feature(o, u[, entity feature]) ──Linear──▶ masked log-softmax
//
// Embedding tables per hop:
//
//   hop 1, 2 : attend with A, aggregate with C
//   hop 3    : attend with C, aggregate with D   (D only exists for 3 hops)
//
// Reference: Sukhbaatar et al. (2015) End-To-End Memory Networks

use burn::{
    module::Ignored,
    nn::{Embedding, Linear, LinearConfig},
    prelude::*,
};

use crate::data::batcher::StoryBatch;
use crate::domain::embedding::PretrainedTable;
use crate::domain::vocabulary::Vocabulary;
use crate::error::ModelResult;
use crate::ml::attention::Aggregation;
use crate::ml::embedder::{check_token_ids, embed_query, embed_segments, embedding_table, SegmentReduction};
use crate::ml::entity_feature::attention_feature;
use crate::ml::hop::{run_hops, validate_hops, HopMemory};
use crate::ml::output::{output_feature, OutputFeature, OutputHead};

#[derive(Config, Debug)]
pub struct MemN2NConfig {
    pub vocab_size:  usize,
    pub embed_size:  usize,
    pub output_size: usize,
    /// Reasoning hops, 1..=3
    #[config(default = 1)]
    pub hops: usize,
    #[config(default = "Aggregation::SoftWeighted")]
    pub aggregation: Aggregation,
    #[config(default = true)]
    pub positional: bool,
    #[config(default = false)]
    pub average_embeddings: bool,
    #[config(default = "OutputFeature::Fused")]
    pub output_feature: OutputFeature,
    /// Mark every embedding table no_grad
    #[config(default = false)]
    pub freeze_embeddings: bool,
}

impl MemN2NConfig {
    pub fn reduction(&self) -> SegmentReduction {
        SegmentReduction { positional: self.positional, average: self.average_embeddings }
    }

    pub fn init<B: Backend>(
        &self,
        device:     &B::Device,
        pretrained: Option<&PretrainedTable>,
    ) -> ModelResult<MemN2N<B>> {
        let hops  = validate_hops(self.hops)?;
        let table = || {
            embedding_table::<B>(self.vocab_size, self.embed_size, pretrained, self.freeze_embeddings, device)
        };

        let attend_table    = table()?;
        let aggregate_table = table()?;
        let third_table     = if hops == 3 { Some(table()?) } else { None };
        let projection      = (hops > 1)
            .then(|| LinearConfig::new(self.embed_size, self.embed_size).init(device));
        let head = OutputHead::new(
            self.output_feature.size(self.embed_size, self.output_size),
            self.output_size,
            device,
        );

        tracing::info!(
            "MemN2N ready: hops={}, embed_size={}, output_size={}, aggregation={:?}, output={:?}",
            hops, self.embed_size, self.output_size, self.aggregation, self.output_feature,
        );

        Ok(MemN2N {
            attend_table,
            aggregate_table,
            third_table,
            projection,
            head,
            hops,
            output_size:    self.output_size,
            reduction:      Ignored(self.reduction()),
            aggregation:    Ignored(self.aggregation),
            output_feature: Ignored(self.output_feature),
        })
    }
}

#[derive(Module, Debug)]
pub struct MemN2N<B: Backend> {
    /// A: query and hop 1-2 attention memory
    pub attend_table:    Embedding<B>,
    /// C: hop 1-2 aggregation memory, hop 3 attention memory
    pub aggregate_table: Embedding<B>,
    /// D: hop 3 aggregation memory
    pub third_table:     Option<Embedding<B>>,
    /// G: query update between hops
    pub projection:      Option<Linear<B>>,
    pub head:            OutputHead<B>,
    pub hops:            usize,
    pub output_size:     usize,
    pub reduction:       Ignored<SegmentReduction>,
    pub aggregation:     Ignored<Aggregation>,
    pub output_feature:  Ignored<OutputFeature>,
}

/// Log-probabilities over output slots plus the final hop attention.
#[derive(Debug, Clone)]
pub struct MemoryOutput<B: Backend> {
    /// [batch, output_size]
    pub log_probs: Tensor<B, 2>,
    /// [batch, segments]
    pub attention: Tensor<B, 2>,
}

impl<B: Backend> MemN2N<B> {
    /// `(attend, aggregate)` tables for hop `k` (0-based).
    fn tables_for_hop(&self, k: usize) -> (&Embedding<B>, &Embedding<B>) {
        match (k, &self.third_table) {
            (2, Some(third)) => (&self.aggregate_table, third),
            _                => (&self.attend_table, &self.aggregate_table),
        }
    }

    fn hop_memory(&self, k: usize, batch: &StoryBatch<B>) -> HopMemory<B> {
        let (attend, aggregate) = self.tables_for_hop(k);
        let embed = |table: &Embedding<B>| {
            embed_segments(table, batch.story.clone(), batch.story_mask.clone(), *self.reduction)
        };
        HopMemory { attend: embed(attend), aggregate: embed(aggregate) }
    }

    /// Initial query state `u₀`.
    pub fn embed_query(&self, batch: &StoryBatch<B>) -> Tensor<B, 2> {
        embed_query(&self.attend_table, batch.query.clone(), batch.query_mask.clone(), *self.reduction)
    }

    /// The vocabulary is only consulted when the output uses an
    /// attention feature.
    pub fn forward(&self, batch: &StoryBatch<B>, vocab: &Vocabulary) -> ModelResult<MemoryOutput<B>> {
        check_token_ids(&self.attend_table, &batch.story)?;
        check_token_ids(&self.attend_table, &batch.query)?;

        let last = run_hops(
            self.hops,
            self.embed_query(batch),
            batch.segment_mask.clone(),
            *self.aggregation,
            self.projection.as_ref(),
            |k| self.hop_memory(k, batch),
        );

        let att_feature = match self.output_feature.policy() {
            Some(policy) => Some(attention_feature(
                policy,
                batch.story.clone(),
                last.attention.clone(),
                vocab,
                self.output_size,
            )?),
            None => None,
        };

        let feature   = output_feature(*self.output_feature, last.output, last.query, att_feature);
        let log_probs = self.head.forward(feature, batch.output_mask.clone());

        Ok(MemoryOutput { log_probs, attention: last.attention })
    }
}
