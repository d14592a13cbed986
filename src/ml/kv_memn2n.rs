// ============================================================
// Layer 5 - Key-Value Memory Network
// ============================================================
// Memory split into keys (token sequences) and values (one atomic
// vocabulary id per key). Hop k owns one embedding table K_k:
//
//   keys   ──K_k──▶ [b, s, d]   embed_segments   (attention)
//   values ──K_k──▶ [b, s, d]   plain lookup     (aggregation)
//   query  ──K_1──▶ u₀
//
// Tables K_2 and K_3 are only allocated when the hop count needs
// them. The output is always the fused [o, u, o+u, o*u] feature.
//
// Reference: Miller et al. (2016) Key-Value Memory Networks

use burn::{
    module::Ignored,
    nn::{Embedding, Linear, LinearConfig},
    prelude::*,
};

use crate::data::batcher::KeyValueBatch;
use crate::domain::embedding::PretrainedTable;
use crate::error::ModelResult;
use crate::ml::attention::Aggregation;
use crate::ml::embedder::{
    check_token_ids, embed_query, embed_segments, embed_values, embedding_table, SegmentReduction,
};
use crate::ml::hop::{run_hops, validate_hops, HopMemory};
use crate::ml::memn2n::MemoryOutput;
use crate::ml::output::{output_feature, OutputFeature, OutputHead};

#[derive(Config, Debug)]
pub struct KvMemN2NConfig {
    pub vocab_size:  usize,
    pub embed_size:  usize,
    pub output_size: usize,
    #[config(default = 1)]
    pub hops: usize,
    #[config(default = "Aggregation::SoftWeighted")]
    pub aggregation: Aggregation,
    #[config(default = true)]
    pub positional: bool,
    #[config(default = false)]
    pub average_embeddings: bool,
    #[config(default = false)]
    pub freeze_embeddings: bool,
}

impl KvMemN2NConfig {
    pub fn reduction(&self) -> SegmentReduction {
        SegmentReduction { positional: self.positional, average: self.average_embeddings }
    }

    pub fn init<B: Backend>(
        &self,
        device:     &B::Device,
        pretrained: Option<&PretrainedTable>,
    ) -> ModelResult<KvMemN2N<B>> {
        let hops = validate_hops(self.hops)?;

        let tables = (0..hops)
            .map(|_| embedding_table::<B>(self.vocab_size, self.embed_size, pretrained, self.freeze_embeddings, device))
            .collect::<ModelResult<Vec<_>>>()?;
        let projection = (hops > 1)
            .then(|| LinearConfig::new(self.embed_size, self.embed_size).init(device));
        let head = OutputHead::new(
            OutputFeature::Fused.size(self.embed_size, self.output_size),
            self.output_size,
            device,
        );

        tracing::info!(
            "KV-MemN2N ready: hops={}, embed_size={}, output_size={}, aggregation={:?}",
            hops, self.embed_size, self.output_size, self.aggregation,
        );

        Ok(KvMemN2N {
            tables,
            projection,
            head,
            hops,
            reduction:   Ignored(self.reduction()),
            aggregation: Ignored(self.aggregation),
        })
    }
}

#[derive(Module, Debug)]
pub struct KvMemN2N<B: Backend> {
    /// K_1..K_hops
    pub tables:      Vec<Embedding<B>>,
    pub projection:  Option<Linear<B>>,
    pub head:        OutputHead<B>,
    pub hops:        usize,
    pub reduction:   Ignored<SegmentReduction>,
    pub aggregation: Ignored<Aggregation>,
}

impl<B: Backend> KvMemN2N<B> {
    fn hop_memory(&self, k: usize, batch: &KeyValueBatch<B>) -> HopMemory<B> {
        let table = &self.tables[k.min(self.tables.len() - 1)];
        HopMemory {
            attend:    embed_segments(table, batch.keys.clone(), batch.key_mask.clone(), *self.reduction),
            aggregate: embed_values(table, batch.values.clone()),
        }
    }

    /// Key, value and query ids must all be vocabulary ids.
    pub fn forward(&self, batch: &KeyValueBatch<B>) -> ModelResult<MemoryOutput<B>> {
        check_token_ids(&self.tables[0], &batch.keys)?;
        check_token_ids(&self.tables[0], &batch.values)?;
        check_token_ids(&self.tables[0], &batch.query)?;

        let query = embed_query(&self.tables[0], batch.query.clone(), batch.query_mask.clone(), *self.reduction);

        let last = run_hops(
            self.hops,
            query,
            batch.segment_mask.clone(),
            *self.aggregation,
            self.projection.as_ref(),
            |k| self.hop_memory(k, batch),
        );

        let feature   = output_feature(OutputFeature::Fused, last.output, last.query, None);
        let log_probs = self.head.forward(feature, batch.output_mask.clone());

        Ok(MemoryOutput { log_probs, attention: last.attention })
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::batcher::KeyValueBatcher;
    use crate::data::sample::KeyValueSample;
    use crate::error::ModelError;
    use crate::ml::test_support::{assert_close, values, TestBackend};

    fn batch() -> KeyValueBatch<TestBackend> {
        let items = vec![
            KeyValueSample { keys: vec![vec![1, 2], vec![3]], values: vec![4, 5], query: vec![1],    candidates: vec![],     answer: Some(0) },
            KeyValueSample { keys: vec![vec![2]],             values: vec![4],    query: vec![3, 2], candidates: vec![1, 2], answer: Some(1) },
        ];
        KeyValueBatcher::new(Default::default(), 3).batch(&items)
    }

    #[test]
    fn test_one_table_per_hop() {
        let device = Default::default();
        for hops in 1..=3 {
            let model = KvMemN2NConfig::new(6, 4, 3).with_hops(hops).init::<TestBackend>(&device, None).unwrap();
            assert_eq!(model.tables.len(), hops);
            assert_eq!(model.projection.is_some(), hops > 1);
        }
        let err = KvMemN2NConfig::new(6, 4, 3).with_hops(0).init::<TestBackend>(&device, None).unwrap_err();
        assert_eq!(err, ModelError::InvalidHops(0));
    }

    #[test]
    fn test_forward_shapes_and_mask() {
        let device = Default::default();
        for hops in 1..=3 {
            let model = KvMemN2NConfig::new(6, 4, 3)
                .with_hops(hops)
                .with_aggregation(Aggregation::HardSelect)
                .init::<TestBackend>(&device, None)
                .unwrap();
            let out = model.forward(&batch()).unwrap();
            assert_eq!(out.log_probs.dims(), [2, 3]);
            assert_eq!(out.attention.dims(), [2, 2]);

            let logp = values(out.log_probs);
            assert!(logp[3] < -1.0e29);
            assert_close(logp[4].exp() + logp[5].exp(), 1.0, 1e-5);
        }
    }

    #[test]
    fn test_value_ids_outside_vocabulary_fail() {
        // Output space is wider than the vocabulary; value 7 is still unknown
        let items = vec![KeyValueSample { keys: vec![vec![1]], values: vec![7], query: vec![1], candidates: vec![], answer: None }];
        let batch = KeyValueBatcher::<TestBackend>::new(Default::default(), 10).batch(&items);
        let model = KvMemN2NConfig::new(6, 4, 10).init::<TestBackend>(&Default::default(), None).unwrap();

        assert_eq!(model.forward(&batch).unwrap_err(), ModelError::UnknownToken(7));
    }

    #[test]
    fn test_freeze_embeddings_covers_every_hop_table() {
        type Ad = burn::backend::Autodiff<TestBackend>;
        let model = KvMemN2NConfig::new(6, 4, 3)
            .with_hops(3)
            .with_freeze_embeddings(true)
            .init::<Ad>(&Default::default(), None)
            .unwrap();
        assert!(model.tables.iter().all(|t| !t.weight.val().is_require_grad()));
    }
}
