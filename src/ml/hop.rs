// ============================================================
// Layer 5 - Hops and the Multi-Hop Controller
// ============================================================
// A hop reads memory with the current query:
//
//   attention = masked_softmax(cos(memory_attend, u))
//   o         = aggregate(attention, memory_aggregate)
//
// Between hops the query is updated as a linear residual chain:
//
//   u_next = G(o) + u            (G = Linear(d, d), no activation)
//
// The controller runs 1..=3 hops. Each network supplies the memory
// for a given hop index through a closure, so MemN2N and the
// key-value network share the same loop while embedding memory
// their own way.

use burn::{nn::Linear, prelude::*};

use crate::error::{ModelError, ModelResult};
use crate::ml::attention::{aggregate, attend, Aggregation};

pub const MIN_HOPS: usize = 1;
pub const MAX_HOPS: usize = 3;

pub fn validate_hops(hops: usize) -> ModelResult<usize> {
    if (MIN_HOPS..=MAX_HOPS).contains(&hops) {
        Ok(hops)
    } else {
        Err(ModelError::InvalidHops(hops))
    }
}

/// Embedded memory for one hop.
#[derive(Debug, Clone)]
pub struct HopMemory<B: Backend> {
    /// Compared against the query            [b, s, d]
    pub attend: Tensor<B, 3>,
    /// Read out with the attention weights    [b, s, d]
    pub aggregate: Tensor<B, 3>,
}

/// What the final hop hands to the output head.
#[derive(Debug, Clone)]
pub struct FinalHop<B: Backend> {
    /// Aggregated memory `o`                  [b, d]
    pub output: Tensor<B, 2>,
    /// Query `u` that entered the final hop   [b, d]
    pub query: Tensor<B, 2>,
    /// Final hop attention                    [b, s]
    pub attention: Tensor<B, 2>,
}

/// One attend-and-aggregate step. Returns `(o, attention)`.
pub fn hop<B: Backend>(
    memory:       &HopMemory<B>,
    query:        Tensor<B, 2>,
    segment_mask: Tensor<B, 2>,
    aggregation:  Aggregation,
) -> (Tensor<B, 2>, Tensor<B, 2>) {
    let attention = attend(memory.attend.clone(), query, segment_mask);
    let output    = aggregate(attention.clone(), memory.aggregate.clone(), aggregation);
    (output, attention)
}

/// Residual query update between hops.
pub fn next_query<B: Backend>(projection: &Linear<B>, output: Tensor<B, 2>, query: Tensor<B, 2>) -> Tensor<B, 2> {
    projection.forward(output) + query
}

/// Run `hops` hops starting from `query`.
///
/// Without a projection the update is the identity residual `o + u`.
pub fn run_hops<B, F>(
    hops:         usize,
    query:        Tensor<B, 2>,
    segment_mask: Tensor<B, 2>,
    aggregation:  Aggregation,
    projection:   Option<&Linear<B>>,
    mut memory:   F,
) -> FinalHop<B>
where
    B: Backend,
    F: FnMut(usize) -> HopMemory<B>,
{
    let last = hops.max(MIN_HOPS) - 1;

    let mut query = query;
    for k in 0..last {
        let (output, _) = hop(&memory(k), query.clone(), segment_mask.clone(), aggregation);
        query = match projection {
            Some(g) => next_query(g, output, query),
            None    => output + query,
        };
        tracing::trace!("hop {}/{} updated the query", k + 1, hops);
    }

    let (output, attention) = hop(&memory(last), query.clone(), segment_mask, aggregation);
    FinalHop { output, query, attention }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::test_support::{assert_close, values, TestBackend};
    use burn::nn::LinearConfig;

    fn memory() -> HopMemory<TestBackend> {
        let device = Default::default();
        HopMemory {
            attend:    Tensor::from_floats([[[1.0, 0.0], [0.0, 1.0]]], &device),
            aggregate: Tensor::from_floats([[[5.0, 5.0], [-1.0, 2.0]]], &device),
        }
    }

    #[test]
    fn test_hop_count_bounds() {
        assert_eq!(validate_hops(0), Err(ModelError::InvalidHops(0)));
        assert_eq!(validate_hops(4), Err(ModelError::InvalidHops(4)));
        for h in 1..=3 {
            assert_eq!(validate_hops(h), Ok(h));
        }
    }

    #[test]
    fn test_single_hop_returns_incoming_query() {
        let device = Default::default();
        let query  = Tensor::<TestBackend, 2>::from_floats([[1.0, 0.0]], &device);
        let mask   = Tensor::from_floats([[1.0, 1.0]], &device);
        let fin    = run_hops(1, query, mask, Aggregation::HardSelect, None, |_| memory());

        assert_eq!(values(fin.query), vec![1.0, 0.0]);
        assert_eq!(values(fin.output), vec![5.0, 5.0]);
        let att = values(fin.attention);
        assert!(att[0] > att[1]);
    }

    #[test]
    fn test_residual_update_feeds_next_hop() {
        let device = Default::default();
        let projection = LinearConfig::new(2, 2).init::<TestBackend>(&device);
        let query  = Tensor::<TestBackend, 2>::from_floats([[1.0, 0.0]], &device);
        let mask   = Tensor::from_floats([[1.0, 1.0]], &device);

        let mut seen = Vec::new();
        let fin = run_hops(2, query.clone(), mask, Aggregation::HardSelect, Some(&projection), |k| {
            seen.push(k);
            memory()
        });

        let expected = next_query(&projection, Tensor::from_floats([[5.0, 5.0]], &device), query);
        for (a, b) in values(fin.query).into_iter().zip(values(expected)) {
            assert_close(a, b, 1e-6);
        }
        assert_eq!(seen, vec![0, 1]);
    }
}
