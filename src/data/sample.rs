use serde::{Deserialize, Serialize};

/// One reading-comprehension example as token ids.
///
/// Token id 0 is padding and must not appear inside a segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorySample {
    /// Story segments (sentences or windows), each a list of token ids
    pub story: Vec<Vec<usize>>,

    /// Query token ids
    pub query: Vec<usize>,

    /// Output slots allowed as answers. Empty means every slot.
    #[serde(default)]
    pub candidates: Vec<usize>,

    /// Gold output slot, when known
    #[serde(default)]
    pub answer: Option<usize>,
}

/// A key-value memory example: one value token per key segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValueSample {
    pub keys: Vec<Vec<usize>>,

    /// Same length as `keys`; vocabulary ids, usually `@entity` tokens
    pub values: Vec<usize>,

    pub query: Vec<usize>,

    #[serde(default)]
    pub candidates: Vec<usize>,

    #[serde(default)]
    pub answer: Option<usize>,
}

impl KeyValueSample {
    /// View the keys as a story, dropping the values.
    pub fn as_story(&self) -> StorySample {
        StorySample {
            story:      self.keys.clone(),
            query:      self.query.clone(),
            candidates: self.candidates.clone(),
            answer:     self.answer,
        }
    }
}

/// Samples of either memory layout, as read from disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Sample {
    KeyValue(KeyValueSample),
    Story(StorySample),
}

impl Sample {
    pub fn answer(&self) -> Option<usize> {
        match self {
            Sample::KeyValue(s) => s.answer,
            Sample::Story(s)    => s.answer,
        }
    }
}
