// ============================================================
// Layer 5 - Attention and Aggregation
// ============================================================
// One attention step over embedded memory segments:
//
//   query    [b, d]     ──broadcast──▶ [b, s, d]
//   memory   [b, s, d]  ──cosine────▶ scores    [b, s]
//   scores              ──masked softmax over segments──▶ attention [b, s]
//
// and the two ways of reading memory with that attention:
//
//   HardSelect    → the aggregation vector of the top segment
//                   (first occurrence wins on ties)
//   SoftWeighted  → Σ_s attention[s] · memory[s]

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::ml::masking::masked_softmax;

/// Lower bound on vector norms in the cosine similarity.
pub const COSINE_EPS: f32 = 1e-8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Aggregation {
    /// Read only the single top-attended segment
    HardSelect,
    /// Attention-weighted sum over all segments
    SoftWeighted,
}

/// Cosine similarity between every memory segment and the query.
/// Zero vectors (fully padded segments) score 0.
pub fn cosine_scores<B: Backend>(memory: Tensor<B, 3>, query: Tensor<B, 2>) -> Tensor<B, 2> {
    let [batch, segments, dim] = memory.dims();
    let query = query.unsqueeze_dim::<3>(1).expand([batch, segments, dim]);

    let dot      = (memory.clone() * query.clone()).sum_dim(2);
    let mem_norm = memory.powf_scalar(2.0).sum_dim(2).sqrt().clamp_min(COSINE_EPS);
    let q_norm   = query.powf_scalar(2.0).sum_dim(2).sqrt().clamp_min(COSINE_EPS);

    (dot / (mem_norm * q_norm)).reshape([batch, segments])
}

/// Attention distribution over the valid segments.
pub fn attend<B: Backend>(
    memory:       Tensor<B, 3>,
    query:        Tensor<B, 2>,
    segment_mask: Tensor<B, 2>,
) -> Tensor<B, 2> {
    masked_softmax(cosine_scores(memory, query), segment_mask)
}

/// Row-wise argmax that always returns the lowest index among ties.
pub fn first_argmax<B: Backend>(x: Tensor<B, 2>) -> Tensor<B, 1, Int> {
    let [rows, cols] = x.dims();
    let device = x.device();

    let row_max = x.clone().max_dim(1).expand([rows, cols]);
    let is_max  = x.greater_equal(row_max);
    let positions = Tensor::<B, 1, Int>::arange(0..cols as i64, &device)
        .reshape([1, cols])
        .expand([rows, cols]);

    positions
        .mask_fill(is_max.bool_not(), cols as i64)
        .min_dim(1)
        .reshape([rows])
}

/// Pick one segment vector per batch row.
pub fn select_segments<B: Backend>(memory: Tensor<B, 3>, index: Tensor<B, 1, Int>) -> Tensor<B, 2> {
    let [batch, _, dim] = memory.dims();
    let index = index.reshape([batch, 1, 1]).expand([batch, 1, dim]);
    memory.gather(1, index).reshape([batch, dim])
}

/// Read memory with an attention distribution.
pub fn aggregate<B: Backend>(
    attention:   Tensor<B, 2>,
    memory:      Tensor<B, 3>,
    aggregation: Aggregation,
) -> Tensor<B, 2> {
    let [batch, segments, dim] = memory.dims();
    match aggregation {
        Aggregation::HardSelect => select_segments(memory, first_argmax(attention)),
        Aggregation::SoftWeighted => {
            let weights = attention.unsqueeze_dim::<3>(2).expand([batch, segments, dim]);
            (memory * weights).sum_dim(1).reshape([batch, dim])
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::test_support::{assert_close, int_values, values, TestBackend};

    fn memory() -> Tensor<TestBackend, 3> {
        Tensor::from_floats(
            [[[1.0, 0.0], [0.0, 1.0], [2.0, 0.0]]],
            &Default::default(),
        )
    }

    #[test]
    fn test_cosine_scores() {
        let query  = Tensor::from_floats([[3.0, 0.0]], &Default::default());
        let scores = values(cosine_scores(memory(), query));
        assert_close(scores[0], 1.0, 1e-6);
        assert_close(scores[1], 0.0, 1e-6);
        assert_close(scores[2], 1.0, 1e-6);
    }

    #[test]
    fn test_zero_segment_scores_zero() {
        let mem    = Tensor::<TestBackend, 3>::from_floats([[[0.0, 0.0], [1.0, 1.0]]], &Default::default());
        let query  = Tensor::from_floats([[1.0, 1.0]], &Default::default());
        let scores = values(cosine_scores(mem, query));
        assert_eq!(scores[0], 0.0);
        assert_close(scores[1], 1.0, 1e-6);
    }

    #[test]
    fn test_attention_ignores_masked_segments() {
        let query = Tensor::from_floats([[1.0, 0.0]], &Default::default());
        let mask  = Tensor::from_floats([[1.0, 1.0, 0.0]], &Default::default());
        let att   = values(attend(memory(), query, mask));
        assert_eq!(att[2], 0.0);
        assert_close(att[0] + att[1], 1.0, 1e-6);
        assert!(att[0] > att[1]);
    }

    #[test]
    fn test_first_argmax_breaks_ties_low() {
        let x = Tensor::<TestBackend, 2>::from_floats(
            [[0.2, 0.4, 0.4], [0.5, 0.1, 0.5], [0.1, 0.2, 0.7]],
            &Default::default(),
        );
        assert_eq!(int_values(first_argmax(x)), vec![1, 0, 2]);
    }

    #[test]
    fn test_hard_select_reads_argmax_segment() {
        let att = Tensor::from_floats([[0.2, 0.5, 0.3]], &Default::default());
        let out = values(aggregate(att, memory(), Aggregation::HardSelect));
        assert_eq!(out, vec![0.0, 1.0]);
    }

    #[test]
    fn test_hard_select_tie_reads_first_segment() {
        let att = Tensor::from_floats([[0.4, 0.2, 0.4]], &Default::default());
        let out = values(aggregate(att, memory(), Aggregation::HardSelect));
        assert_eq!(out, vec![1.0, 0.0]);
    }

    #[test]
    fn test_soft_weighted_sum() {
        let mem = Tensor::<TestBackend, 3>::from_floats(
            [[[1.0, 2.0], [3.0, -1.0]]],
            &Default::default(),
        );
        let att = Tensor::from_floats([[0.3, 0.7]], &Default::default());
        let out = values(aggregate(att, mem, Aggregation::SoftWeighted));
        // 0.3·[1, 2] + 0.7·[3, −1]
        assert_close(out[0], 2.4, 1e-6);
        assert_close(out[1], -0.1, 1e-6);
    }
}
