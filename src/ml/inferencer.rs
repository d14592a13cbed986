// ============================================================
// Layer 5 - Inferencer
// ============================================================
// Loads a checkpoint and predicts answer slots for sample sets.
//
//   samples ──batcher──▶ MemoryBatch ──Network──▶ log_probs [b, out]
//                                               └▶ attention [b, s]
//   log_probs ──first argmax per row──▶ slot, log_prob
//
// The backend is chosen at compile time: Wgpu with the `wgpu`
// feature, the NdArray CPU backend otherwise.

use anyhow::{Context, Result};
use burn::prelude::*;

use crate::data::batcher::{KeyValueBatcher, StoryBatcher};
use crate::data::loader::SampleSet;
use crate::domain::vocabulary::Vocabulary;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::network::{MemoryBatch, Network, NetworkConfig, Prediction};

#[cfg(feature = "wgpu")]
pub type InferBackend = burn::backend::Wgpu;
#[cfg(not(feature = "wgpu"))]
pub type InferBackend = burn::backend::NdArray;

pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Decoded prediction for one sample.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplePrediction {
    pub slot:      usize,
    pub log_prob:  f32,
    /// Final-hop attention over the sample's segments (padding trimmed)
    pub attention: Option<Vec<f32>>,
}

pub struct Inferencer<B: Backend> {
    network:    Network<B>,
    config:     NetworkConfig,
    vocab:      Vocabulary,
    device:     B::Device,
    batch_size: usize,
}

impl Inferencer<InferBackend> {
    pub fn from_checkpoint(ckpt: &CheckpointManager) -> Result<Self> {
        let device  = Default::default();
        let config  = ckpt.load_config()?;
        let vocab   = ckpt.load_vocab()?;
        let network = ckpt.load_network::<InferBackend>(&config, &device)?;
        Ok(Self::new(network, config, vocab, device))
    }
}

impl<B: Backend> Inferencer<B> {
    pub fn new(network: Network<B>, config: NetworkConfig, vocab: Vocabulary, device: B::Device) -> Self {
        Self { network, config, vocab, device, batch_size: DEFAULT_BATCH_SIZE }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn predict(&self, samples: &SampleSet) -> Result<Vec<SamplePrediction>> {
        let output_size = self.config.output_size();
        let mut out = Vec::with_capacity(samples.len());

        match samples {
            SampleSet::Story(items) => {
                let batcher = StoryBatcher::<B>::new(self.device.clone(), output_size);
                for chunk in items.chunks(self.batch_size) {
                    let lengths = chunk.iter().map(|s| s.story.len()).collect::<Vec<_>>();
                    let batch   = MemoryBatch::Story(batcher.batch(chunk));
                    out.extend(self.run(&batch, &lengths)?);
                }
            }
            SampleSet::KeyValue(items) => {
                let batcher = KeyValueBatcher::<B>::new(self.device.clone(), output_size);
                for chunk in items.chunks(self.batch_size) {
                    let lengths = chunk.iter().map(|s| s.keys.len()).collect::<Vec<_>>();
                    let batch   = MemoryBatch::KeyValue(batcher.batch(chunk));
                    out.extend(self.run(&batch, &lengths)?);
                }
            }
        }
        tracing::info!("Predicted {} samples with {}", out.len(), self.network.name());
        Ok(out)
    }

    fn run(&self, batch: &MemoryBatch<B>, lengths: &[usize]) -> Result<Vec<SamplePrediction>> {
        let Prediction { log_probs, attention } = self
            .network
            .forward(batch, &self.vocab)
            .with_context(|| format!("{} forward pass failed", self.network.name()))?;

        let [rows, slots] = log_probs.dims();
        let log_probs: Vec<f32> = log_probs.into_data().iter::<f32>().collect();
        let attention = attention.map(|a| {
            let [_, segments] = a.dims();
            (segments, a.into_data().iter::<f32>().collect::<Vec<f32>>())
        });
        tracing::debug!("Decoded batch of {rows} rows");

        Ok((0..rows)
            .map(|r| {
                let (slot, log_prob) = first_max(&log_probs[r * slots..(r + 1) * slots]);
                let attention = attention.as_ref().map(|(segments, values)| {
                    let row = &values[r * segments..(r + 1) * segments];
                    row[..lengths[r].min(*segments)].to_vec()
                });
                SamplePrediction { slot, log_prob, attention }
            })
            .collect())
    }
}

/// Index and value of the first maximum.
pub fn first_max(row: &[f32]) -> (usize, f32) {
    row.iter()
        .copied()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, v)| if v > best.1 { (i, v) } else { best })
}

/// Fraction of predictions matching the gold answer, over samples that have one.
pub fn accuracy(predictions: &[SamplePrediction], answers: &[Option<usize>]) -> Option<f64> {
    let scored: Vec<bool> = predictions
        .iter()
        .zip(answers)
        .filter_map(|(p, a)| a.map(|a| p.slot == a))
        .collect();
    if scored.is_empty() {
        return None;
    }
    Some(scored.iter().filter(|&&hit| hit).count() as f64 / scored.len() as f64)
}
