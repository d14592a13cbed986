// ============================================================
// Layer 4 - Memory Batchers
// ============================================================
// Converts samples of token ids into padded tensors plus the
// masks every network expects.
//
// Story batch shapes (S = max segments, T = max tokens in batch):
//
//   story         [N, S, T]  Int    zero padded
//   story_mask    [N, S, T]  Float  1 = real token
//   segment_mask  [N, S]     Float  1 = segment with ≥ 1 token
//   query         [N, Tq]    Int
//   query_mask    [N, Tq]    Float
//   output_mask   [N, O]     Float  1 = allowed answer slot
//
// Key-value batches add `values [N, S] Int`, one per key.
//
// Everything is flattened row-major first and reshaped once,
// exactly like a single Vec → [N, S, T] reshape.

use burn::prelude::*;

use crate::data::sample::{KeyValueSample, StorySample};

// ─── Batches ──────────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct StoryBatch<B: Backend> {
    pub story:        Tensor<B, 3, Int>,
    pub story_mask:   Tensor<B, 3>,
    pub segment_mask: Tensor<B, 2>,
    pub query:        Tensor<B, 2, Int>,
    pub query_mask:   Tensor<B, 2>,
    pub output_mask:  Tensor<B, 2>,
}

#[derive(Debug, Clone)]
pub struct KeyValueBatch<B: Backend> {
    pub keys:         Tensor<B, 3, Int>,
    pub key_mask:     Tensor<B, 3>,
    pub values:       Tensor<B, 2, Int>,
    pub segment_mask: Tensor<B, 2>,
    pub query:        Tensor<B, 2, Int>,
    pub query_mask:   Tensor<B, 2>,
    pub output_mask:  Tensor<B, 2>,
}

impl<B: Backend> KeyValueBatch<B> {
    /// Same memory seen as a plain story (keys only).
    pub fn as_story(&self) -> StoryBatch<B> {
        StoryBatch {
            story:        self.keys.clone(),
            story_mask:   self.key_mask.clone(),
            segment_mask: self.segment_mask.clone(),
            query:        self.query.clone(),
            query_mask:   self.query_mask.clone(),
            output_mask:  self.output_mask.clone(),
        }
    }
}

// ─── Padding helpers ──────────────────────────────────────────────────────────
struct Padded3 {
    ids:      Vec<i32>,
    mask:     Vec<f32>,
    segments: Vec<f32>,
    dims:     [usize; 3],
}

fn pad_segments<'a>(rows: impl Iterator<Item = &'a Vec<Vec<usize>>> + Clone) -> Padded3 {
    let batch    = rows.clone().count();
    let segments = rows.clone().map(|r| r.len()).max().unwrap_or(0).max(1);
    let tokens   = rows.clone().flat_map(|r| r.iter().map(|s| s.len())).max().unwrap_or(0).max(1);

    let mut ids  = Vec::with_capacity(batch * segments * tokens);
    let mut mask = Vec::with_capacity(batch * segments * tokens);
    let mut segs = Vec::with_capacity(batch * segments);

    for row in rows {
        for s in 0..segments {
            let segment = row.get(s).map(Vec::as_slice).unwrap_or(&[]);
            segs.push(if segment.is_empty() { 0.0 } else { 1.0 });
            for t in 0..tokens {
                match segment.get(t) {
                    Some(&id) => { ids.push(id as i32); mask.push(1.0); }
                    None      => { ids.push(0);         mask.push(0.0); }
                }
            }
        }
    }
    Padded3 { ids, mask, segments: segs, dims: [batch, segments, tokens] }
}

fn pad_queries<'a>(rows: impl Iterator<Item = &'a Vec<usize>> + Clone) -> (Vec<i32>, Vec<f32>, [usize; 2]) {
    let batch  = rows.clone().count();
    let tokens = rows.clone().map(|q| q.len()).max().unwrap_or(0).max(1);

    let mut ids  = Vec::with_capacity(batch * tokens);
    let mut mask = Vec::with_capacity(batch * tokens);
    for row in rows {
        for t in 0..tokens {
            match row.get(t) {
                Some(&id) => { ids.push(id as i32); mask.push(1.0); }
                None      => { ids.push(0);         mask.push(0.0); }
            }
        }
    }
    (ids, mask, [batch, tokens])
}

/// Candidate slots → 0/1 rows. An empty candidate list allows every slot;
/// slots beyond `output_size` are ignored.
pub fn output_mask_rows<'a>(candidates: impl Iterator<Item = &'a Vec<usize>>, output_size: usize) -> Vec<f32> {
    let mut mask = Vec::new();
    for row in candidates {
        if row.is_empty() {
            mask.extend(std::iter::repeat(1.0).take(output_size));
            continue;
        }
        let mut line = vec![0.0f32; output_size];
        for &slot in row.iter().filter(|&&s| s < output_size) {
            line[slot] = 1.0;
        }
        mask.extend(line);
    }
    mask
}

fn int3<B: Backend>(ids: Vec<i32>, dims: [usize; 3], device: &B::Device) -> Tensor<B, 3, Int> {
    Tensor::<B, 1, Int>::from_ints(ids.as_slice(), device).reshape(dims)
}

fn int2<B: Backend>(ids: Vec<i32>, dims: [usize; 2], device: &B::Device) -> Tensor<B, 2, Int> {
    Tensor::<B, 1, Int>::from_ints(ids.as_slice(), device).reshape(dims)
}

fn float<B: Backend, const D: usize>(values: Vec<f32>, dims: [usize; D], device: &B::Device) -> Tensor<B, D> {
    Tensor::<B, 1>::from_floats(values.as_slice(), device).reshape(dims)
}

// ─── StoryBatcher ─────────────────────────────────────────────────────────────
/// Holds the target device and output width.
#[derive(Clone, Debug)]
pub struct StoryBatcher<B: Backend> {
    pub device:      B::Device,
    pub output_size: usize,
}

impl<B: Backend> StoryBatcher<B> {
    pub fn new(device: B::Device, output_size: usize) -> Self {
        Self { device, output_size }
    }

    pub fn batch(&self, items: &[StorySample]) -> StoryBatch<B> {
        let batch = items.len();
        let story = pad_segments(items.iter().map(|s| &s.story));
        let [_, segments, _] = story.dims;
        let (query, query_mask, query_dims) = pad_queries(items.iter().map(|s| &s.query));
        let output_mask = output_mask_rows(items.iter().map(|s| &s.candidates), self.output_size);

        StoryBatch {
            story:        int3(story.ids, story.dims, &self.device),
            story_mask:   float(story.mask, story.dims, &self.device),
            segment_mask: float(story.segments, [batch, segments], &self.device),
            query:        int2(query, query_dims, &self.device),
            query_mask:   float(query_mask, query_dims, &self.device),
            output_mask:  float(output_mask, [batch, self.output_size], &self.device),
        }
    }
}

// ─── KeyValueBatcher ──────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct KeyValueBatcher<B: Backend> {
    pub device:      B::Device,
    pub output_size: usize,
}

impl<B: Backend> KeyValueBatcher<B> {
    pub fn new(device: B::Device, output_size: usize) -> Self {
        Self { device, output_size }
    }

    pub fn batch(&self, items: &[KeyValueSample]) -> KeyValueBatch<B> {
        let batch = items.len();
        let keys  = pad_segments(items.iter().map(|s| &s.keys));
        let [_, segments, _] = keys.dims;

        // One value per key slot; padded keys get value 0
        let values: Vec<i32> = items
            .iter()
            .flat_map(|s| (0..segments).map(move |i| s.values.get(i).copied().unwrap_or(0) as i32))
            .collect();

        let (query, query_mask, query_dims) = pad_queries(items.iter().map(|s| &s.query));
        let output_mask = output_mask_rows(items.iter().map(|s| &s.candidates), self.output_size);

        KeyValueBatch {
            keys:         int3(keys.ids, keys.dims, &self.device),
            key_mask:     float(keys.mask, keys.dims, &self.device),
            values:       int2(values, [batch, segments], &self.device),
            segment_mask: float(keys.segments, [batch, segments], &self.device),
            query:        int2(query, query_dims, &self.device),
            query_mask:   float(query_mask, query_dims, &self.device),
            output_mask:  float(output_mask, [batch, self.output_size], &self.device),
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::test_support::{int_values, values, TestBackend};

    fn samples() -> Vec<StorySample> {
        vec![
            StorySample { story: vec![vec![1, 2, 3], vec![4]], query: vec![5], candidates: vec![1], answer: Some(1) },
            StorySample { story: vec![vec![6]],                query: vec![7, 8], candidates: vec![], answer: None },
        ]
    }

    #[test]
    fn test_story_shapes_follow_longest_sample() {
        let b = StoryBatcher::<TestBackend>::new(Default::default(), 3).batch(&samples());
        assert_eq!(b.story.dims(), [2, 2, 3]);
        assert_eq!(b.story_mask.dims(), [2, 2, 3]);
        assert_eq!(b.segment_mask.dims(), [2, 2]);
        assert_eq!(b.query.dims(), [2, 2]);
        assert_eq!(b.output_mask.dims(), [2, 3]);
    }

    #[test]
    fn test_padding_and_masks() {
        let b = StoryBatcher::<TestBackend>::new(Default::default(), 3).batch(&samples());
        assert_eq!(int_values(b.story), vec![1, 2, 3, 4, 0, 0, 6, 0, 0, 0, 0, 0]);
        assert_eq!(
            values(b.story_mask),
            vec![1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        );
        assert_eq!(values(b.segment_mask), vec![1.0, 1.0, 1.0, 0.0]);
        assert_eq!(values(b.query_mask), vec![1.0, 0.0, 1.0, 1.0]);
        // Row 0 allows slot 1 only; row 1 has no candidates → all slots
        assert_eq!(values(b.output_mask), vec![0.0, 1.0, 0.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_key_value_values_align_with_keys() {
        let items = vec![
            KeyValueSample { keys: vec![vec![1], vec![2, 3]], values: vec![4, 5], query: vec![1], candidates: vec![], answer: None },
            KeyValueSample { keys: vec![vec![6]],             values: vec![7],    query: vec![2], candidates: vec![], answer: None },
        ];
        let b = KeyValueBatcher::<TestBackend>::new(Default::default(), 8).batch(&items);
        assert_eq!(b.keys.dims(), [2, 2, 2]);
        assert_eq!(int_values(b.values), vec![4, 5, 7, 0]);
        assert_eq!(values(b.segment_mask), vec![1.0, 1.0, 1.0, 0.0]);
    }
}
