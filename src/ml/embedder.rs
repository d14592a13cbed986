// ============================================================
// Layer 5 - Embedders
// ============================================================
// Turns token ids into one vector per segment.
//
//   embed_segments : [batch, segments, tokens] → [batch, segments, dim]
//   embed_query    : [batch, tokens]           → [batch, dim]
//   embed_values   : [batch, segments]         → [batch, segments, dim]
//
// Segment recipe (shared by stories, keys and queries):
//   1. look up every token               [b, s, t, d]
//   2. × position encoding (optional)    broadcast over b and s
//   3. × token mask                      padding rows become 0
//   4. Σ over tokens                     [b, s, d]
//   5. ÷ valid token count (optional)    0 count → ÷ +∞ → 0
//
// Values are atomic: a plain lookup with no mask or position.

use burn::{
    module::Param,
    nn::{Embedding, EmbeddingConfig, Initializer},
    prelude::*,
};
use serde::{Deserialize, Serialize};

use crate::domain::embedding::PretrainedTable;
use crate::error::{ModelError, ModelResult};
use crate::ml::position::position_encoding;

/// Standard deviation of randomly initialised embedding rows.
pub const INIT_STD: f64 = 0.1;

/// How a sequence of token embeddings collapses into one vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentReduction {
    /// Weight tokens by the fixed position encoding
    pub positional: bool,
    /// Divide the sum by the number of valid tokens
    pub average: bool,
}

/// Embed every segment of a story (or every key of a key-value memory).
pub fn embed_segments<B: Backend>(
    table:     &Embedding<B>,
    tokens:    Tensor<B, 3, Int>,
    mask:      Tensor<B, 3>,
    reduction: SegmentReduction,
) -> Tensor<B, 3> {
    let [batch, segments, len] = tokens.dims();
    let dim    = table.weight.dims()[1];
    let device = tokens.device();

    let emb: Tensor<B, 4> = table
        .forward(tokens.reshape([batch * segments, len]))
        .reshape([batch, segments, len, dim]);

    let emb = if reduction.positional {
        let pe = position_encoding::<B>(len, dim, &device)
            .reshape([1, 1, len, dim])
            .expand([batch, segments, len, dim]);
        emb * pe
    } else {
        emb
    };

    let emb    = emb * mask.clone().unsqueeze_dim::<4>(3).expand([batch, segments, len, dim]);
    let summed = emb.sum_dim(2).reshape([batch, segments, dim]);

    if !reduction.average {
        return summed;
    }
    let counts = mask.sum_dim(2); // [b, s, 1]
    let counts = counts.clone().mask_fill(counts.equal_elem(0.0), f32::INFINITY);
    summed / counts.expand([batch, segments, dim])
}

/// Embed a query as a single segment.
pub fn embed_query<B: Backend>(
    table:     &Embedding<B>,
    tokens:    Tensor<B, 2, Int>,
    mask:      Tensor<B, 2>,
    reduction: SegmentReduction,
) -> Tensor<B, 2> {
    let [batch, len] = tokens.dims();
    let dim = table.weight.dims()[1];
    embed_segments(
        table,
        tokens.reshape([batch, 1, len]),
        mask.reshape([batch, 1, len]),
        reduction,
    )
    .reshape([batch, dim])
}

/// Direct lookup for value slots.
pub fn embed_values<B: Backend>(table: &Embedding<B>, values: Tensor<B, 2, Int>) -> Tensor<B, 3> {
    table.forward(values)
}

/// Fail with `UnknownToken` on the first id that has no row in `table`.
pub fn check_token_ids<B: Backend, const D: usize>(
    table: &Embedding<B>,
    ids:   &Tensor<B, D, Int>,
) -> ModelResult<()> {
    let [rows, _] = table.weight.dims();
    let unknown = ids
        .clone()
        .into_data()
        .iter::<i64>()
        .find(|&id| id < 0 || id as usize >= rows);
    match unknown {
        Some(id) => Err(ModelError::UnknownToken(id as usize)),
        None     => Ok(()),
    }
}

/// Build an embedding table, either random normal(0, INIT_STD) or
/// seeded from pretrained vectors. Rows the pretrained source did not
/// cover keep their random values. The table is marked no_grad when
/// `freeze` is set or the pretrained source asks for it.
pub fn embedding_table<B: Backend>(
    vocab_size: usize,
    embed_size: usize,
    pretrained: Option<&PretrainedTable>,
    freeze:     bool,
    device:     &B::Device,
) -> ModelResult<Embedding<B>> {
    let mut table = EmbeddingConfig::new(vocab_size, embed_size)
        .with_initializer(Initializer::Normal { mean: 0.0, std: INIT_STD })
        .init(device);

    let Some(pretrained) = pretrained else {
        return Ok(if freeze { table.no_grad() } else { table });
    };
    if pretrained.dim != embed_size {
        return Err(ModelError::EmbeddingDimMismatch { expected: embed_size, found: pretrained.dim });
    }
    if pretrained.rows() != vocab_size {
        return Err(ModelError::EmbeddingRowsMismatch { expected: vocab_size, found: pretrained.rows() });
    }

    let loaded = Tensor::<B, 2>::from_data(
        TensorData::new(pretrained.values.clone(), [vocab_size, embed_size]),
        device,
    );
    let found: Vec<f32> = pretrained.found.iter().map(|&f| if f { 1.0 } else { 0.0 }).collect();
    let found = Tensor::<B, 1>::from_data(TensorData::new(found, [vocab_size]), device)
        .reshape([vocab_size, 1])
        .expand([vocab_size, embed_size])
        .greater_elem(0.5);

    let weight   = table.weight.val().mask_where(found, loaded);
    table.weight = Param::from_tensor(weight);

    let frozen = freeze || pretrained.freeze;
    if frozen {
        table = table.no_grad();
    }
    tracing::debug!(
        "Seeded embedding table from pretrained vectors: {}/{} rows, frozen={}",
        pretrained.coverage(), vocab_size, frozen,
    );
    Ok(table)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::test_support::{assert_close, fixed_table, values, TestBackend};

    const SUM: SegmentReduction = SegmentReduction { positional: false, average: false };
    const AVG: SegmentReduction = SegmentReduction { positional: false, average: true };

    fn table() -> Embedding<TestBackend> {
        fixed_table(&[
            [0.0, 0.0],  // pad
            [1.0, 2.0],
            [3.0, 4.0],
            [10.0, 10.0],
        ])
    }

    fn story(ids: [[[i32; 3]; 2]; 1]) -> Tensor<TestBackend, 3, Int> {
        Tensor::from_ints(ids, &Default::default())
    }

    #[test]
    fn test_sum_ignores_padding_tokens() {
        let mask = Tensor::from_floats([[[1.0, 1.0, 0.0], [1.0, 0.0, 0.0]]], &Default::default());
        let a = values(embed_segments(&table(), story([[[1, 2, 0], [3, 0, 0]]]), mask.clone(), SUM));
        // Same real tokens, garbage in the padded positions
        let b = values(embed_segments(&table(), story([[[1, 2, 3], [3, 3, 1]]]), mask, SUM));

        assert_eq!(a, vec![4.0, 6.0, 10.0, 10.0]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_average_divides_by_valid_count() {
        let mask = Tensor::from_floats([[[1.0, 1.0, 0.0], [1.0, 0.0, 0.0]]], &Default::default());
        let out  = values(embed_segments(&table(), story([[[1, 2, 0], [3, 0, 0]]]), mask, AVG));
        assert_eq!(out, vec![2.0, 3.0, 10.0, 10.0]);
    }

    #[test]
    fn test_all_masked_segment_is_zero_not_nan() {
        let mask = Tensor::from_floats([[[0.0, 0.0, 0.0], [0.0, 0.0, 0.0]]], &Default::default());
        for reduction in [SUM, AVG] {
            let out = values(embed_segments(&table(), story([[[1, 2, 3], [3, 2, 1]]]), mask.clone(), reduction));
            assert!(out.iter().all(|&v| v == 0.0), "{reduction:?} gave {out:?}");
        }
    }

    #[test]
    fn test_positional_weighting_changes_word_order_sensitivity() {
        let pos  = SegmentReduction { positional: true, average: false };
        let mask = Tensor::from_floats([[[1.0, 1.0, 0.0], [1.0, 1.0, 0.0]]], &Default::default());
        let out  = values(embed_segments(&table(), story([[[1, 2, 0], [2, 1, 0]]]), mask, pos));
        // Plain sums would be identical; positional sums are not
        assert!(out[0..2] != out[2..4]);
    }

    #[test]
    fn test_query_matches_single_segment() {
        let q    = Tensor::<TestBackend, 2, Int>::from_ints([[1, 2, 0]], &Default::default());
        let mask = Tensor::<TestBackend, 2>::from_floats([[1.0, 1.0, 0.0]], &Default::default());
        let out  = embed_query(&table(), q, mask, AVG);
        assert_eq!(out.dims(), [1, 2]);
        let out = values(out);
        assert_close(out[0], 2.0, 1e-6);
        assert_close(out[1], 3.0, 1e-6);
    }

    #[test]
    fn test_values_are_plain_lookup() {
        let v   = Tensor::<TestBackend, 2, Int>::from_ints([[3, 0]], &Default::default());
        let out = embed_values(&table(), v);
        assert_eq!(out.dims(), [1, 2, 2]);
        assert_eq!(values(out), vec![10.0, 10.0, 0.0, 0.0]);
    }

    #[test]
    fn test_pretrained_dimension_mismatch_fails() {
        let pretrained = PretrainedTable { dim: 3, values: vec![0.0; 12], found: vec![true; 4], freeze: false };
        let err = embedding_table::<TestBackend>(4, 2, Some(&pretrained), false, &Default::default()).unwrap_err();
        assert_eq!(err, ModelError::EmbeddingDimMismatch { expected: 2, found: 3 });
    }

    #[test]
    fn test_pretrained_rows_missing_keep_random_init() {
        let pretrained = PretrainedTable {
            dim:    2,
            values: vec![0.0, 0.0, 5.0, 6.0, 0.0, 0.0],
            found:  vec![false, true, false],
            freeze: true,
        };
        let table = embedding_table::<TestBackend>(3, 2, Some(&pretrained), false, &Default::default()).unwrap();
        let w = values(table.weight.val());
        assert_eq!(&w[2..4], &[5.0, 6.0]);
        // Random rows are drawn from N(0, 0.1): never exactly the zero fill
        assert!(w[0] != 0.0 || w[1] != 0.0);
    }

    #[test]
    fn test_token_ids_must_index_the_table() {
        let device = Default::default();
        let known  = Tensor::<TestBackend, 3, Int>::from_ints([[[1, 3, 0]]], &device);
        assert_eq!(check_token_ids(&table(), &known), Ok(()));

        let unknown = Tensor::<TestBackend, 2, Int>::from_ints([[2, 4, 9]], &device);
        assert_eq!(check_token_ids(&table(), &unknown), Err(ModelError::UnknownToken(4)));
    }

    #[test]
    fn test_freeze_flag_marks_table_no_grad() {
        type Ad = burn::backend::Autodiff<TestBackend>;
        let device = Default::default();

        let trainable = embedding_table::<Ad>(3, 2, None, false, &device).unwrap();
        assert!(trainable.weight.val().is_require_grad());

        let frozen = embedding_table::<Ad>(3, 2, None, true, &device).unwrap();
        assert!(!frozen.weight.val().is_require_grad());
    }
}
