// ============================================================
// Layer 2 - InitUseCase
// ============================================================
// Builds a fresh network and writes it out as a checkpoint:
//
//   Step 1: Load the vocabulary              (Layer 4 - data)
//   Step 2: Load pretrained vectors, if any  (Layer 6 - infra)
//   Step 3: Build the network config         (Layer 5 - ml)
//   Step 4: Initialise the network           (Layer 5 - ml)
//   Step 5: Save weights, config, vocabulary (Layer 6 - infra)
//
// The output slot count defaults to one past the largest
// @entity slot in the vocabulary.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::loader::load_vocabulary;
use crate::domain::traits::EmbeddingProvider;
use crate::domain::vocabulary::Vocabulary;
use crate::infra::{checkpoint::CheckpointManager, embeddings::TextEmbeddingFile};
use crate::ml::{
    attention::Aggregation,
    inferencer::InferBackend,
    kv_attention::{KvAttentionConfig, Selection},
    kv_memn2n::KvMemN2NConfig,
    memn2n::MemN2NConfig,
    network::NetworkConfig,
    output::OutputFeature,
    query_classifier::QueryClassifierConfig,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Architecture {
    MemN2N,
    KvMemN2N,
    KvAttention,
    QueryClassifier,
}

/// Where pretrained vectors come from and whether they stay fixed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PretrainedOptions {
    pub path:   String,
    pub freeze: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitConfig {
    pub vocab_path:         String,
    pub checkpoint_dir:     String,
    pub architecture:       Architecture,
    pub embed_size:         usize,
    /// Defaults to the largest @entity slot + 1
    pub output_size:        Option<usize>,
    pub hops:               usize,
    pub aggregation:        Aggregation,
    pub positional:         bool,
    pub average_embeddings: bool,
    pub output_feature:     OutputFeature,
    pub selection:          Selection,
    pub pretrained:         Option<PretrainedOptions>,
}

impl Default for InitConfig {
    fn default() -> Self {
        Self {
            vocab_path:         "data/vocab.txt".to_string(),
            checkpoint_dir:     "checkpoints".to_string(),
            architecture:       Architecture::MemN2N,
            embed_size:         64,
            output_size:        None,
            hops:               1,
            aggregation:        Aggregation::SoftWeighted,
            positional:         true,
            average_embeddings: false,
            output_feature:     OutputFeature::Fused,
            selection:          Selection::Argmax,
            pretrained:         None,
        }
    }
}

impl InitConfig {
    fn output_size(&self, vocab: &Vocabulary) -> Result<usize> {
        if let Some(size) = self.output_size {
            return Ok(size);
        }
        match vocab.max_entity_slot() {
            Some(slot) => Ok(slot + 1),
            None => bail!("vocabulary has no @entity tokens; pass an explicit output size"),
        }
    }

    /// Network config for this vocabulary.
    pub fn network_config(&self, vocab: &Vocabulary) -> Result<NetworkConfig> {
        let (v, d, o) = (vocab.len(), self.embed_size, self.output_size(vocab)?);
        let freeze    = self.pretrained.as_ref().is_some_and(|p| p.freeze);
        Ok(match self.architecture {
            Architecture::MemN2N => NetworkConfig::MemN2N(
                MemN2NConfig::new(v, d, o)
                    .with_hops(self.hops)
                    .with_aggregation(self.aggregation)
                    .with_positional(self.positional)
                    .with_average_embeddings(self.average_embeddings)
                    .with_output_feature(self.output_feature)
                    .with_freeze_embeddings(freeze),
            ),
            Architecture::KvMemN2N => NetworkConfig::KvMemN2N(
                KvMemN2NConfig::new(v, d, o)
                    .with_hops(self.hops)
                    .with_aggregation(self.aggregation)
                    .with_positional(self.positional)
                    .with_average_embeddings(self.average_embeddings)
                    .with_freeze_embeddings(freeze),
            ),
            Architecture::KvAttention => NetworkConfig::KvAttention(
                KvAttentionConfig::new(v, d, o)
                    .with_positional(self.positional)
                    .with_average_embeddings(self.average_embeddings)
                    .with_selection(self.selection)
                    .with_freeze_embeddings(freeze),
            ),
            Architecture::QueryClassifier => NetworkConfig::QueryClassifier(
                QueryClassifierConfig::new(v, d, o)
                    .with_average_embeddings(self.average_embeddings)
                    .with_freeze_embeddings(freeze),
            ),
        })
    }
}

pub struct InitUseCase {
    config: InitConfig,
}

impl InitUseCase {
    pub fn new(config: InitConfig) -> Self {
        Self { config }
    }

    /// Returns the config the checkpoint was written with.
    pub fn execute(&self) -> Result<NetworkConfig> {
        let cfg = &self.config;

        // Step 1
        let vocab = load_vocabulary(&cfg.vocab_path)?;

        // Step 2
        let pretrained = match &cfg.pretrained {
            Some(p) => Some(TextEmbeddingFile::new(&p.path).load(&vocab, p.freeze)?),
            None    => None,
        };

        // Step 3 + 4
        let network_cfg = cfg.network_config(&vocab)?;
        let device      = Default::default();
        let network     = network_cfg
            .init::<InferBackend>(&device, pretrained.as_ref())
            .with_context(|| format!("Cannot build {}", network_cfg.name()))?;

        // Step 5
        let ckpt = CheckpointManager::new(&cfg.checkpoint_dir);
        ckpt.save_config(&network_cfg)?;
        ckpt.save_vocab(&vocab)?;
        ckpt.save_network(&network)?;

        tracing::info!(
            "Initialised {} (vocab={}, output={}) in '{}'",
            network_cfg.name(), network_cfg.vocab_size(), network_cfg.output_size(), cfg.checkpoint_dir,
        );
        Ok(network_cfg)
    }
}
