// ============================================================
// Layer 5 - Masked Normalisation
// ============================================================
// Softmax variants restricted to the valid positions of the last
// axis. The mask is a Float 0/1 tensor with the same shape as the
// scores (1 = valid).
//
//   masked_softmax      → probabilities, exactly 0 where masked
//   masked_log_softmax  → log-probabilities, MASK_SENTINEL-ish where masked
//   masked_softmin      → masked_softmax of the negated scores
//
// Masked scores are replaced by a large negative finite value
// before normalising, so exp() of them underflows to exactly 0.
// A fully masked row comes out as zeros (softmax) or a finite
// uniform row (log-softmax), never NaN.

use burn::{prelude::*, tensor::activation};

/// Finite stand-in for log(0).
pub const MASK_SENTINEL: f32 = -1.0e30;

pub fn masked_softmax<B: Backend, const D: usize>(
    scores: Tensor<B, D>,
    mask:   Tensor<B, D>,
) -> Tensor<B, D> {
    let invalid = mask.clone().lower_equal_elem(0.0);
    let probs   = activation::softmax(scores.mask_fill(invalid, MASK_SENTINEL), D - 1);
    probs * mask
}

pub fn masked_log_softmax<B: Backend, const D: usize>(
    scores: Tensor<B, D>,
    mask:   Tensor<B, D>,
) -> Tensor<B, D> {
    let invalid = mask.lower_equal_elem(0.0);
    activation::log_softmax(scores.mask_fill(invalid, MASK_SENTINEL), D - 1)
}

/// Softmin for distance-like scores: small distance, large weight.
pub fn masked_softmin<B: Backend, const D: usize>(
    scores: Tensor<B, D>,
    mask:   Tensor<B, D>,
) -> Tensor<B, D> {
    masked_softmax(scores.neg(), mask)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::test_support::{assert_close, values, TestBackend};

    fn scores() -> Tensor<TestBackend, 2> {
        Tensor::from_floats([[1.0, 2.0, 3.0], [0.5, -4.0, 2.0]], &Default::default())
    }

    #[test]
    fn test_masked_positions_are_exactly_zero() {
        let mask  = Tensor::from_floats([[1.0, 0.0, 1.0], [0.0, 1.0, 1.0]], &Default::default());
        let probs = values(masked_softmax(scores(), mask));

        assert_eq!(probs[1], 0.0);
        assert_eq!(probs[3], 0.0);
        assert_close(probs[0] + probs[2], 1.0, 1e-6);
        assert_close(probs[4] + probs[5], 1.0, 1e-6);
        // Same ratio as an unmasked softmax over the valid pair
        assert_close(probs[2] / probs[0], (2.0f32).exp(), 1e-4);
    }

    #[test]
    fn test_fully_masked_row_is_finite() {
        let mask  = Tensor::from_floats([[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]], &Default::default());
        let probs = values(masked_softmax(scores(), mask.clone()));
        assert!(probs.iter().all(|p| p.is_finite()));
        assert_eq!(&probs[0..3], &[0.0, 0.0, 0.0]);
        assert_close(probs[3..].iter().sum::<f32>(), 1.0, 1e-6);

        let logp = values(masked_log_softmax(scores(), mask));
        assert!(logp.iter().all(|p| p.is_finite()));
    }

    #[test]
    fn test_log_softmax_matches_log_of_softmax_on_valid_entries() {
        let mask = Tensor::from_floats([[1.0, 1.0, 0.0], [1.0, 0.0, 1.0]], &Default::default());
        let p    = values(masked_softmax(scores(), mask.clone()));
        let logp = values(masked_log_softmax(scores(), mask));

        for i in [0, 1, 3, 5] {
            assert_close(logp[i], p[i].ln(), 1e-5);
        }
        assert!(logp[2] < -1.0e29);
        assert!(logp[4] < -1.0e29);
    }

    #[test]
    fn test_softmin_prefers_small_scores() {
        let mask  = Tensor::from_floats([[1.0, 1.0, 1.0], [1.0, 1.0, 0.0]], &Default::default());
        let probs = values(masked_softmin(scores(), mask));
        assert!(probs[0] > probs[1] && probs[1] > probs[2]);
        assert!(probs[4] > probs[3]);
        assert_eq!(probs[5], 0.0);
    }
}
