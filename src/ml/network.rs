// ============================================================
// Layer 5 - Network Selection
// ============================================================
// One entry point over the four architectures so the upper layers
// can build, store and run any of them from a JSON config.
//
//   architecture       memory it reads      output
//   memn2n             story (or KV keys)   log-probs + attention
//   kv_memn2n          key-value            log-probs + attention
//   kv_attention       key-value            sparse log-probs + attention
//   query_classifier   none                 log-probs
//
// The config is tagged by "architecture":
//
//   { "architecture": "memn2n", "vocab_size": 120, "embed_size": 32,
//     "output_size": 10, "hops": 2, ... }

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::data::batcher::{KeyValueBatch, StoryBatch};
use crate::domain::embedding::PretrainedTable;
use crate::domain::vocabulary::Vocabulary;
use crate::error::{ModelError, ModelResult};
use crate::ml::kv_attention::{KvAttention, KvAttentionConfig};
use crate::ml::kv_memn2n::{KvMemN2N, KvMemN2NConfig};
use crate::ml::memn2n::{MemN2N, MemN2NConfig};
use crate::ml::query_classifier::{QueryClassifier, QueryClassifierConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "architecture")]
pub enum NetworkConfig {
    #[serde(rename = "memn2n")]
    MemN2N(MemN2NConfig),
    #[serde(rename = "kv_memn2n")]
    KvMemN2N(KvMemN2NConfig),
    #[serde(rename = "kv_attention")]
    KvAttention(KvAttentionConfig),
    #[serde(rename = "query_classifier")]
    QueryClassifier(QueryClassifierConfig),
}

impl NetworkConfig {
    pub fn name(&self) -> &'static str {
        match self {
            NetworkConfig::MemN2N(_)          => "memn2n",
            NetworkConfig::KvMemN2N(_)        => "kv_memn2n",
            NetworkConfig::KvAttention(_)     => "kv_attention",
            NetworkConfig::QueryClassifier(_) => "query_classifier",
        }
    }

    /// Embedding tables are built no_grad, including after a reload.
    pub fn freeze_embeddings(&self) -> bool {
        match self {
            NetworkConfig::MemN2N(c)          => c.freeze_embeddings,
            NetworkConfig::KvMemN2N(c)        => c.freeze_embeddings,
            NetworkConfig::KvAttention(c)     => c.freeze_embeddings,
            NetworkConfig::QueryClassifier(c) => c.freeze_embeddings,
        }
    }

    pub fn vocab_size(&self) -> usize {
        match self {
            NetworkConfig::MemN2N(c)          => c.vocab_size,
            NetworkConfig::KvMemN2N(c)        => c.vocab_size,
            NetworkConfig::KvAttention(c)     => c.vocab_size,
            NetworkConfig::QueryClassifier(c) => c.vocab_size,
        }
    }

    pub fn embed_size(&self) -> usize {
        match self {
            NetworkConfig::MemN2N(c)          => c.embed_size,
            NetworkConfig::KvMemN2N(c)        => c.embed_size,
            NetworkConfig::KvAttention(c)     => c.embed_size,
            NetworkConfig::QueryClassifier(c) => c.embed_size,
        }
    }

    pub fn output_size(&self) -> usize {
        match self {
            NetworkConfig::MemN2N(c)          => c.output_size,
            NetworkConfig::KvMemN2N(c)        => c.output_size,
            NetworkConfig::KvAttention(c)     => c.output_size,
            NetworkConfig::QueryClassifier(c) => c.output_size,
        }
    }

    /// Whether the network needs values next to its keys.
    pub fn reads_key_value(&self) -> bool {
        matches!(self, NetworkConfig::KvMemN2N(_) | NetworkConfig::KvAttention(_))
    }

    pub fn init<B: Backend>(
        &self,
        device:     &B::Device,
        pretrained: Option<&PretrainedTable>,
    ) -> ModelResult<Network<B>> {
        Ok(match self {
            NetworkConfig::MemN2N(c)          => Network::MemN2N(c.init(device, pretrained)?),
            NetworkConfig::KvMemN2N(c)        => Network::KvMemN2N(c.init(device, pretrained)?),
            NetworkConfig::KvAttention(c)     => Network::KvAttention(c.init(device, pretrained)?),
            NetworkConfig::QueryClassifier(c) => Network::QueryClassifier(c.init(device, pretrained)?),
        })
    }
}

#[derive(Debug, Clone)]
pub enum Network<B: Backend> {
    MemN2N(MemN2N<B>),
    KvMemN2N(KvMemN2N<B>),
    KvAttention(KvAttention<B>),
    QueryClassifier(QueryClassifier<B>),
}

/// A batch in whichever memory layout the samples came in.
#[derive(Debug, Clone)]
pub enum MemoryBatch<B: Backend> {
    Story(StoryBatch<B>),
    KeyValue(KeyValueBatch<B>),
}

impl<B: Backend> MemoryBatch<B> {
    fn query(&self) -> (Tensor<B, 2, Int>, Tensor<B, 2>, Tensor<B, 2>) {
        match self {
            MemoryBatch::Story(b)    => (b.query.clone(), b.query_mask.clone(), b.output_mask.clone()),
            MemoryBatch::KeyValue(b) => (b.query.clone(), b.query_mask.clone(), b.output_mask.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Prediction<B: Backend> {
    /// [batch, output_size]
    pub log_probs: Tensor<B, 2>,
    /// Final-hop attention [batch, segments], absent for the query classifier.
    /// Log-probabilities for the KV attention classifier, probabilities otherwise.
    pub attention: Option<Tensor<B, 2>>,
}

impl<B: Backend> Network<B> {
    pub fn name(&self) -> &'static str {
        match self {
            Network::MemN2N(_)          => "memn2n",
            Network::KvMemN2N(_)        => "kv_memn2n",
            Network::KvAttention(_)     => "kv_attention",
            Network::QueryClassifier(_) => "query_classifier",
        }
    }

    pub fn forward(&self, batch: &MemoryBatch<B>, vocab: &Vocabulary) -> ModelResult<Prediction<B>> {
        match (self, batch) {
            (Network::MemN2N(m), MemoryBatch::Story(b)) => {
                let out = m.forward(b, vocab)?;
                Ok(Prediction { log_probs: out.log_probs, attention: Some(out.attention) })
            }
            (Network::MemN2N(m), MemoryBatch::KeyValue(b)) => {
                let out = m.forward(&b.as_story(), vocab)?;
                Ok(Prediction { log_probs: out.log_probs, attention: Some(out.attention) })
            }
            (Network::KvMemN2N(m), MemoryBatch::KeyValue(b)) => {
                let out = m.forward(b)?;
                Ok(Prediction { log_probs: out.log_probs, attention: Some(out.attention) })
            }
            (Network::KvAttention(m), MemoryBatch::KeyValue(b)) => {
                let out = m.forward(b, vocab)?;
                Ok(Prediction { log_probs: out.log_probs, attention: Some(out.attention) })
            }
            (Network::QueryClassifier(m), batch) => {
                let (query, query_mask, output_mask) = batch.query();
                Ok(Prediction { log_probs: m.forward(query, query_mask, output_mask)?, attention: None })
            }
            (network, MemoryBatch::Story(_)) => Err(ModelError::NeedsKeyValueMemory(network.name())),
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::batcher::{KeyValueBatcher, StoryBatcher};
    use crate::data::sample::{KeyValueSample, StorySample};
    use crate::ml::attention::Aggregation;
    use crate::ml::test_support::TestBackend;

    // ids: 1 a, 2 b, 3 @entity1
    fn vocab() -> Vocabulary {
        Vocabulary::from_tokens(["a", "b", "@entity1"])
    }

    fn kv_sample() -> KeyValueSample {
        KeyValueSample { keys: vec![vec![1, 2], vec![3]], values: vec![3, 3], query: vec![2], candidates: vec![], answer: Some(1) }
    }

    fn configs() -> Vec<NetworkConfig> {
        vec![
            NetworkConfig::MemN2N(MemN2NConfig::new(4, 3, 2).with_hops(2)),
            NetworkConfig::KvMemN2N(KvMemN2NConfig::new(4, 3, 2)),
            NetworkConfig::KvAttention(KvAttentionConfig::new(4, 3, 2)),
            NetworkConfig::QueryClassifier(QueryClassifierConfig::new(4, 3, 2)),
        ]
    }

    #[test]
    fn test_config_json_is_tagged_by_architecture() {
        let cfg  = NetworkConfig::MemN2N(MemN2NConfig::new(10, 8, 4).with_aggregation(Aggregation::HardSelect));
        let json = serde_json::to_value(&cfg).unwrap();
        assert_eq!(json["architecture"], "memn2n");
        assert_eq!(json["hops"], 1);

        let back: NetworkConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back.name(), "memn2n");
        assert_eq!((back.vocab_size(), back.embed_size(), back.output_size()), (10, 8, 4));
    }

    #[test]
    fn test_every_network_reads_key_value_batches() {
        let vocab = vocab();
        let batch = MemoryBatch::KeyValue(KeyValueBatcher::<TestBackend>::new(Default::default(), 2).batch(&[kv_sample()]));

        for cfg in configs() {
            let network = cfg.init::<TestBackend>(&Default::default(), None).unwrap();
            let pred    = network.forward(&batch, &vocab).unwrap();
            assert_eq!(pred.log_probs.dims(), [1, 2], "{}", cfg.name());
            assert_eq!(pred.attention.is_some(), cfg.name() != "query_classifier");
        }
    }

    #[test]
    fn test_key_value_networks_reject_story_batches() {
        let vocab = vocab();
        let story = StorySample { story: vec![vec![1]], query: vec![2], candidates: vec![], answer: None };
        let batch = MemoryBatch::Story(StoryBatcher::<TestBackend>::new(Default::default(), 2).batch(&[story]));

        for cfg in configs() {
            let network = cfg.init::<TestBackend>(&Default::default(), None).unwrap();
            let result  = network.forward(&batch, &vocab);
            if cfg.reads_key_value() {
                assert_eq!(result.unwrap_err(), ModelError::NeedsKeyValueMemory(cfg.name()));
            } else {
                assert!(result.is_ok());
            }
        }
    }

    #[test]
    fn test_every_network_rejects_unknown_query_ids() {
        let vocab = vocab();
        let mut sample = kv_sample();
        sample.query = vec![2, 4];
        let batch = MemoryBatch::KeyValue(KeyValueBatcher::<TestBackend>::new(Default::default(), 2).batch(&[sample]));

        for cfg in configs() {
            let network = cfg.init::<TestBackend>(&Default::default(), None).unwrap();
            let err     = network.forward(&batch, &vocab).unwrap_err();
            assert_eq!(err, ModelError::UnknownToken(4), "{}", cfg.name());
        }
    }
}
