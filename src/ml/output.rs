// ============================================================
// Layer 5 - Output Fusion and Head
// ============================================================
// Final feature built from the last hop:
//
//   Fused                  [o, u, o+u, o*u]                4·d
//   FusedWithAttention     [o, u, o+u, o*u, att_feature]   4·d + output_size
//   AttentionOnly          att_feature                     output_size
//
// then   logits = Linear(feature)   and
//        log_probs = masked_log_softmax(logits, output_mask)

use burn::{
    nn::{Linear, LinearConfig},
    prelude::*,
};
use serde::{Deserialize, Serialize};

use crate::ml::entity_feature::FeaturePolicy;
use crate::ml::masking::masked_log_softmax;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFeature {
    Fused,
    FusedWithAttention(FeaturePolicy),
    AttentionOnly(FeaturePolicy),
}

impl OutputFeature {
    /// Width of the feature vector fed to the output head.
    pub fn size(&self, embed_size: usize, output_size: usize) -> usize {
        match self {
            OutputFeature::Fused                 => 4 * embed_size,
            OutputFeature::FusedWithAttention(_) => 4 * embed_size + output_size,
            OutputFeature::AttentionOnly(_)      => output_size,
        }
    }

    /// Attention-feature policy, if this output uses one.
    pub fn policy(&self) -> Option<FeaturePolicy> {
        match *self {
            OutputFeature::Fused                      => None,
            OutputFeature::FusedWithAttention(policy) => Some(policy),
            OutputFeature::AttentionOnly(policy)      => Some(policy),
        }
    }
}

/// `[o, u, o+u, o*u]` along the feature axis.
pub fn fuse<B: Backend>(output: Tensor<B, 2>, query: Tensor<B, 2>) -> Tensor<B, 2> {
    let sum  = output.clone() + query.clone();
    let prod = output.clone() * query.clone();
    Tensor::cat(vec![output, query, sum, prod], 1)
}

/// Assemble the final feature for an output configuration.
/// `attention_feature` must be present whenever the config uses one.
pub fn output_feature<B: Backend>(
    feature:           OutputFeature,
    output:            Tensor<B, 2>,
    query:             Tensor<B, 2>,
    attention_feature: Option<Tensor<B, 2>>,
) -> Tensor<B, 2> {
    match (feature, attention_feature) {
        (OutputFeature::AttentionOnly(_), Some(att)) => att,
        (OutputFeature::FusedWithAttention(_), Some(att)) => {
            Tensor::cat(vec![fuse(output, query), att], 1)
        }
        _ => fuse(output, query),
    }
}

#[derive(Module, Debug)]
pub struct OutputHead<B: Backend> {
    pub linear: Linear<B>,
}

impl<B: Backend> OutputHead<B> {
    pub fn new(input_size: usize, output_size: usize, device: &B::Device) -> Self {
        Self { linear: LinearConfig::new(input_size, output_size).init(device) }
    }

    /// feature: [batch, input_size] → log-probabilities [batch, output_size]
    pub fn forward(&self, feature: Tensor<B, 2>, output_mask: Tensor<B, 2>) -> Tensor<B, 2> {
        masked_log_softmax(self.linear.forward(feature), output_mask)
    }
}
