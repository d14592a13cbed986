// ============================================================
// Layer 5 - Position Encoding
// ============================================================
// Fixed (non-learned) weights that make a bag-of-words sum aware
// of word order inside a segment:
//
//   w[j][k] = 1 + 4 · (k − (D+1)/2) · (j − (L+1)/2) / (D · L)
//
//   j = token position   1..=L
//   k = embedding dim    1..=D
//
// The weights multiply each token embedding before the sum, so a
// token keeps its embedding direction and only its per-dimension
// scale changes. A one-token segment gets all-ones weights.
//
// Reference: Sukhbaatar et al. (2015) End-To-End Memory Networks §4.1

use burn::prelude::*;

/// Row-major `[sentence_len, embed_size]` weights.
pub fn position_weights(sentence_len: usize, embed_size: usize) -> Vec<f32> {
    let l = sentence_len as f32;
    let d = embed_size as f32;
    let mut weights = Vec::with_capacity(sentence_len * embed_size);
    for j in 1..=sentence_len {
        for k in 1..=embed_size {
            let centred = (k as f32 - (d + 1.0) / 2.0) * (j as f32 - (l + 1.0) / 2.0);
            weights.push(1.0 + 4.0 * centred / (d * l));
        }
    }
    weights
}

/// Position encoding as a `[sentence_len, embed_size]` tensor.
pub fn position_encoding<B: Backend>(
    sentence_len: usize,
    embed_size:   usize,
    device:       &B::Device,
) -> Tensor<B, 2> {
    let data = TensorData::new(
        position_weights(sentence_len, embed_size),
        [sentence_len, embed_size],
    );
    Tensor::from_data(data, device)
}
