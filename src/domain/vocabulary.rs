// ============================================================
// Layer 3 - Vocabulary
// ============================================================
// Bidirectional token <-> index table shared by every network.
//
// Conventions:
//   - index 0 is the padding token and never carries meaning
//   - answer candidates are written `@entity<N>`, where N is the
//     output slot the network predicts for that candidate
//
// Example:
//   "@entity7"  → slot 7
//   "@entity"   → not an entity (no digits)
//   "house"     → not an entity
//
// On disk the vocabulary is the plain JSON object
// { "token": index, ... } and is checked on load so that every
// index in use belongs to exactly one token.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Textual prefix marking an entity token.
pub const ENTITY_PREFIX: &str = "@entity";

/// Token stored at index 0.
pub const PAD_TOKEN: &str = "<pad>";

/// Decode the output slot encoded in an entity token.
/// Returns None for any token that is not `@entity<digits>`.
pub fn entity_slot(token: &str) -> Option<usize> {
    let digits = token.strip_prefix(ENTITY_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "HashMap<String, usize>", into = "HashMap<String, usize>")]
pub struct Vocabulary {
    word_idx: HashMap<String, usize>,
    /// Dense reverse table; `None` marks an index with no token.
    idx_word: Vec<Option<String>>,
}

impl Vocabulary {
    /// An empty vocabulary holding only the padding token.
    pub fn new() -> Self {
        let mut word_idx = HashMap::new();
        word_idx.insert(PAD_TOKEN.to_string(), 0);
        Self { word_idx, idx_word: vec![Some(PAD_TOKEN.to_string())] }
    }

    /// Build a vocabulary from tokens in order, starting at index 1.
    /// Repeated tokens keep their first index.
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut vocab = Self::new();
        for token in tokens {
            vocab.insert(token);
        }
        vocab
    }

    /// Build from an explicit token → index map.
    /// Fails if two tokens share an index.
    pub fn from_word_idx(word_idx: HashMap<String, usize>) -> Result<Self> {
        let size = word_idx.values().copied().max().map_or(0, |m| m + 1);
        let mut idx_word: Vec<Option<String>> = vec![None; size];
        for (token, &idx) in &word_idx {
            if let Some(existing) = &idx_word[idx] {
                bail!("index {idx} is used by both '{existing}' and '{token}'");
            }
            idx_word[idx] = Some(token.clone());
        }
        Ok(Self { word_idx, idx_word })
    }

    /// Insert a token if missing and return its index.
    pub fn insert(&mut self, token: impl Into<String>) -> usize {
        let token = token.into();
        if let Some(&idx) = self.word_idx.get(&token) {
            return idx;
        }
        let idx = self.idx_word.len();
        self.idx_word.push(Some(token.clone()));
        self.word_idx.insert(token, idx);
        idx
    }

    pub fn index(&self, token: &str) -> Option<usize> {
        self.word_idx.get(token).copied()
    }

    pub fn token(&self, idx: usize) -> Option<&str> {
        self.idx_word.get(idx).and_then(|t| t.as_deref())
    }

    /// Output slot for a token id, if that id is an entity token.
    /// The outer None means the id is unknown.
    pub fn slot_of(&self, idx: usize) -> Option<Option<usize>> {
        self.token(idx).map(entity_slot)
    }

    /// Number of rows an embedding table needs (highest index + 1).
    pub fn len(&self) -> usize {
        self.idx_word.len()
    }

    pub fn is_empty(&self) -> bool {
        self.word_idx.is_empty()
    }

    /// Iterate `(index, token)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.idx_word
            .iter()
            .enumerate()
            .filter_map(|(i, t)| t.as_deref().map(|t| (i, t)))
    }

    /// Largest entity slot mentioned anywhere in the vocabulary.
    pub fn max_entity_slot(&self) -> Option<usize> {
        self.word_idx.keys().filter_map(|t| entity_slot(t)).max()
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<HashMap<String, usize>> for Vocabulary {
    type Error = anyhow::Error;

    fn try_from(map: HashMap<String, usize>) -> Result<Self> {
        Self::from_word_idx(map)
    }
}

impl From<Vocabulary> for HashMap<String, usize> {
    fn from(v: Vocabulary) -> Self {
        v.word_idx
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_slot_decoding() {
        assert_eq!(entity_slot("@entity7"), Some(7));
        assert_eq!(entity_slot("@entity123"), Some(123));
        assert_eq!(entity_slot("@entity"), None);
        assert_eq!(entity_slot("@entityx"), None);
        assert_eq!(entity_slot("entity7"), None);
        assert_eq!(entity_slot("house"), None);
    }

    #[test]
    fn test_from_tokens_reserves_padding() {
        let vocab = Vocabulary::from_tokens(["the", "@entity3", "the"]);
        assert_eq!(vocab.token(0), Some(PAD_TOKEN));
        assert_eq!(vocab.index("the"), Some(1));
        assert_eq!(vocab.index("@entity3"), Some(2));
        assert_eq!(vocab.len(), 3);
        assert_eq!(vocab.slot_of(2), Some(Some(3)));
        assert_eq!(vocab.slot_of(1), Some(None));
        assert_eq!(vocab.slot_of(99), None);
    }

    #[test]
    fn test_duplicate_index_rejected() {
        let mut map = HashMap::new();
        map.insert("a".to_string(), 1);
        map.insert("b".to_string(), 1);
        assert!(Vocabulary::from_word_idx(map).is_err());
    }

    #[test]
    fn test_json_round_trip_keeps_indices() {
        let vocab = Vocabulary::from_tokens(["mary", "@entity0", "kitchen"]);
        let json  = serde_json::to_string(&vocab).unwrap();
        let back: Vocabulary = serde_json::from_str(&json).unwrap();
        for (idx, token) in vocab.iter() {
            assert_eq!(back.index(token), Some(idx));
        }
        assert_eq!(back.max_entity_slot(), Some(0));
    }
}
