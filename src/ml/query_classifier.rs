// ============================================================
// Layer 5 - Query-Only Classifier
// ============================================================
// No-context baseline: the answer is predicted from the query
// alone, without reading any story.
//
//   query ──E──▶ positional reduction ──Linear(d, out)──▶ masked log-softmax

use burn::{module::Ignored, nn::Embedding, prelude::*};

use crate::domain::embedding::PretrainedTable;
use crate::error::ModelResult;
use crate::ml::embedder::{check_token_ids, embed_query, embedding_table, SegmentReduction};
use crate::ml::output::OutputHead;

#[derive(Config, Debug)]
pub struct QueryClassifierConfig {
    pub vocab_size:  usize,
    pub embed_size:  usize,
    pub output_size: usize,
    #[config(default = false)]
    pub average_embeddings: bool,
    #[config(default = false)]
    pub freeze_embeddings: bool,
}

impl QueryClassifierConfig {
    pub fn init<B: Backend>(
        &self,
        device:     &B::Device,
        pretrained: Option<&PretrainedTable>,
    ) -> ModelResult<QueryClassifier<B>> {
        let embedding = embedding_table::<B>(self.vocab_size, self.embed_size, pretrained, self.freeze_embeddings, device)?;
        tracing::info!(
            "Query classifier ready: embed_size={}, output_size={}",
            self.embed_size, self.output_size,
        );
        Ok(QueryClassifier {
            embedding,
            head:      OutputHead::new(self.embed_size, self.output_size, device),
            reduction: Ignored(SegmentReduction { positional: true, average: self.average_embeddings }),
        })
    }
}

#[derive(Module, Debug)]
pub struct QueryClassifier<B: Backend> {
    pub embedding: Embedding<B>,
    pub head:      OutputHead<B>,
    pub reduction: Ignored<SegmentReduction>,
}

impl<B: Backend> QueryClassifier<B> {
    /// query: [batch, tokens] → log-probabilities [batch, output_size]
    pub fn forward(
        &self,
        query:       Tensor<B, 2, Int>,
        query_mask:  Tensor<B, 2>,
        output_mask: Tensor<B, 2>,
    ) -> ModelResult<Tensor<B, 2>> {
        check_token_ids(&self.embedding, &query)?;
        let u = embed_query(&self.embedding, query, query_mask, *self.reduction);
        Ok(self.head.forward(u, output_mask))
    }
}
