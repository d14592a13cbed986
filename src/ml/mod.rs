// ============================================================
// Layer 5 - ML / Model Layer (Burn)
// ============================================================
// All Burn specific code lives here. The domain layer stays free
// of tensors; data/batcher.rs only builds input tensors.
//
// Building blocks, bottom up:
//
//   masking.rs          masked softmax / log-softmax / softmin
//   position.rs         fixed position encoding
//   embedder.rs         token ids → segment vectors, table init
//   attention.rs        cosine attention, hard / soft aggregation
//   entity_feature.rs   attention pooled onto @entity slots
//   hop.rs              one hop and the multi-hop controller
//   output.rs           [o, u, o+u, o*u] fusion and the output head
//
// Networks:
//
//   memn2n.rs           end-to-end memory network
//   kv_memn2n.rs        key-value memory network
//   kv_attention.rs     key-value attention classifier
//   query_classifier.rs query-only baseline
//   network.rs          config-driven selection over the four
//
//   inferencer.rs       loads a checkpoint and predicts answer slots
//
// Reference: Burn Book §3 (Building Blocks)
//            Sukhbaatar et al. (2015) End-To-End Memory Networks

pub mod masking;
pub mod position;
pub mod embedder;
pub mod attention;
pub mod entity_feature;
pub mod hop;
pub mod output;

pub mod memn2n;
pub mod kv_memn2n;
pub mod kv_attention;
pub mod query_classifier;
pub mod network;

/// Inference engine: checkpoint in, answer slots out
pub mod inferencer;
