// ============================================================
// Layer 5 - Attention Feature (entity-slot pooling)
// ============================================================
// Routes segment-level attention onto the output vocabulary by
// looking at which entity each segment mentions.
//
//   Hard: top-attended segment → first @entity<N> in it → slot N = 1.0
//   Soft: every segment        → first @entity<N> in it → slot N += attention
//
// These are sequential scans over host data, row by row, segment
// by segment, token by token. "First entity token" and "first
// top segment" depend on that order. Padding (id 0) is skipped.
//
// The vocabulary is an explicit argument: decoding is a pure
// function of (token ids, vocabulary).

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::vocabulary::Vocabulary;
use crate::error::{ModelError, ModelResult};
use crate::ml::attention::first_argmax;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeaturePolicy {
    /// One-hot on the entity of the top-attended segment
    Hard,
    /// Attention mass summed per mentioned entity
    Soft,
}

/// Story token ids copied to the host, `[batch, segments, tokens]`.
#[derive(Debug, Clone, PartialEq)]
pub struct StoryTokens {
    batch:    usize,
    segments: usize,
    tokens:   usize,
    ids:      Vec<usize>,
}

impl StoryTokens {
    pub fn new(batch: usize, segments: usize, tokens: usize, ids: Vec<usize>) -> Self {
        assert_eq!(ids.len(), batch * segments * tokens, "story ids do not match their shape");
        Self { batch, segments, tokens, ids }
    }

    pub fn from_tensor<B: Backend>(story: Tensor<B, 3, Int>) -> Self {
        let [batch, segments, tokens] = story.dims();
        let ids = story
            .into_data()
            .iter::<i64>()
            .map(|id| id.max(0) as usize)
            .collect();
        Self::new(batch, segments, tokens, ids)
    }

    pub fn batch(&self) -> usize {
        self.batch
    }

    pub fn segments(&self) -> usize {
        self.segments
    }

    pub fn segment(&self, row: usize, segment: usize) -> &[usize] {
        let start = (row * self.segments + segment) * self.tokens;
        &self.ids[start..start + self.tokens]
    }
}

/// Slot of the first entity token in a segment, skipping padding.
pub fn first_entity(segment: &[usize], vocab: &Vocabulary) -> ModelResult<Option<usize>> {
    for &id in segment {
        if id == 0 {
            continue;
        }
        match vocab.slot_of(id) {
            None             => return Err(ModelError::UnknownToken(id)),
            Some(Some(slot)) => return Ok(Some(slot)),
            Some(None)       => {}
        }
    }
    Ok(None)
}

fn check_slot(slot: usize, output_size: usize) -> ModelResult<usize> {
    if slot < output_size {
        Ok(slot)
    } else {
        Err(ModelError::SlotOutOfRange { slot, output_size })
    }
}

/// Hard policy. `top[row]` is the top-attended segment of that row.
/// Returns a row-major `[batch, output_size]` one-hot matrix.
pub fn hard_feature(
    story:       &StoryTokens,
    top:         &[usize],
    vocab:       &Vocabulary,
    output_size: usize,
) -> ModelResult<Vec<f32>> {
    let mut feature = vec![0.0f32; story.batch() * output_size];
    for (row, &segment) in top.iter().enumerate() {
        let slot = first_entity(story.segment(row, segment), vocab)?
            .ok_or(ModelError::MissingEntity { row, segment })?;
        feature[row * output_size + check_slot(slot, output_size)?] = 1.0;
    }
    Ok(feature)
}

/// Soft policy. `attention` is row-major `[batch, segments]`.
pub fn soft_feature(
    story:       &StoryTokens,
    attention:   &[f32],
    vocab:       &Vocabulary,
    output_size: usize,
) -> ModelResult<Vec<f32>> {
    let mut feature = vec![0.0f32; story.batch() * output_size];
    for row in 0..story.batch() {
        for segment in 0..story.segments() {
            let Some(slot) = first_entity(story.segment(row, segment), vocab)? else {
                continue;
            };
            let mass = attention[row * story.segments() + segment];
            feature[row * output_size + check_slot(slot, output_size)?] += mass;
        }
    }
    Ok(feature)
}

/// Tensor-level entry point used by the networks.
pub fn attention_feature<B: Backend>(
    policy:      FeaturePolicy,
    story:       Tensor<B, 3, Int>,
    attention:   Tensor<B, 2>,
    vocab:       &Vocabulary,
    output_size: usize,
) -> ModelResult<Tensor<B, 2>> {
    let device = attention.device();
    let tokens = StoryTokens::from_tensor(story);

    let feature = match policy {
        FeaturePolicy::Hard => {
            let top: Vec<usize> = first_argmax(attention)
                .into_data()
                .iter::<i64>()
                .map(|i| i as usize)
                .collect();
            hard_feature(&tokens, &top, vocab, output_size)?
        }
        FeaturePolicy::Soft => {
            let attention: Vec<f32> = attention.into_data().iter::<f32>().collect();
            soft_feature(&tokens, &attention, vocab, output_size)?
        }
    };

    Ok(Tensor::from_data(
        TensorData::new(feature, [tokens.batch(), output_size]),
        &device,
    ))
}
