// ============================================================
// Layer 4 - Sample Loader
// ============================================================
// Reads token-id samples from disk. Two layouts are accepted:
//
//   samples.json   → one JSON array of samples
//   samples.jsonl  → one JSON sample per line (blank lines skipped)
//
// and the vocabulary that gives those ids their tokens.
//
// A file must not mix story and key-value samples.

use anyhow::{bail, Context, Result};
use std::{fs, path::Path};

use crate::data::sample::{KeyValueSample, Sample, StorySample};
use crate::domain::vocabulary::Vocabulary;

/// All samples of one file, grouped by memory layout.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleSet {
    Story(Vec<StorySample>),
    KeyValue(Vec<KeyValueSample>),
}

impl SampleSet {
    pub fn len(&self) -> usize {
        match self {
            SampleSet::Story(s)    => s.len(),
            SampleSet::KeyValue(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn answers(&self) -> Vec<Option<usize>> {
        match self {
            SampleSet::Story(s)    => s.iter().map(|x| x.answer).collect(),
            SampleSet::KeyValue(s) => s.iter().map(|x| x.answer).collect(),
        }
    }
}

pub fn parse_samples(text: &str) -> Result<Vec<Sample>> {
    if text.trim_start().starts_with('[') {
        return serde_json::from_str(text).context("Cannot parse sample array");
    }
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line).with_context(|| format!("Cannot parse sample on line {}", n + 1))
        })
        .collect()
}

pub fn group_samples(samples: Vec<Sample>) -> Result<SampleSet> {
    let total = samples.len();
    let mut stories = Vec::new();
    let mut kv      = Vec::new();
    for sample in samples {
        match sample {
            Sample::Story(s)    => stories.push(s),
            Sample::KeyValue(s) => kv.push(s),
        }
    }
    match (stories.is_empty(), kv.is_empty()) {
        (_, true)     => Ok(SampleSet::Story(stories)),
        (true, false) => Ok(SampleSet::KeyValue(kv)),
        (false, false) => bail!(
            "sample file mixes {} story and {} key-value samples (of {total})",
            stories.len(), kv.len(),
        ),
    }
}

pub fn load_samples(path: impl AsRef<Path>) -> Result<SampleSet> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .with_context(|| format!("Cannot read samples from '{}'", path.display()))?;
    let set = group_samples(parse_samples(&text)?)?;
    tracing::info!("Loaded {} samples from '{}'", set.len(), path.display());
    Ok(set)
}

/// A vocabulary is either a JSON `{token: index}` object or a plain
/// list with one token per line (indices assigned from 1).
pub fn parse_vocabulary(text: &str) -> Result<Vocabulary> {
    if text.trim_start().starts_with('{') {
        return serde_json::from_str(text).context("Cannot parse vocabulary map");
    }
    Ok(Vocabulary::from_tokens(
        text.lines().map(str::trim).filter(|t| !t.is_empty()),
    ))
}

pub fn load_vocabulary(path: impl AsRef<Path>) -> Result<Vocabulary> {
    let path  = path.as_ref();
    let text  = fs::read_to_string(path)
        .with_context(|| format!("Cannot read vocabulary from '{}'", path.display()))?;
    let vocab = parse_vocabulary(&text)?;
    tracing::info!("Loaded vocabulary of {} entries from '{}'", vocab.len(), path.display());
    Ok(vocab)
}
