// ============================================================
// Layer 3 - Pretrained Embedding Table
// ============================================================
// A plain, framework-free description of pretrained word vectors
// aligned to a Vocabulary. The ml layer turns it into a Burn
// Embedding; rows whose token was not found in the source keep
// the network's random initialisation.

/// Pretrained vectors laid out row-major, one row per vocabulary index.
#[derive(Debug, Clone, PartialEq)]
pub struct PretrainedTable {
    /// Vector dimensionality of the source
    pub dim: usize,

    /// `rows * dim` values; rows not found are zero-filled
    pub values: Vec<f32>,

    /// One flag per vocabulary index: true if the source had a vector
    pub found: Vec<bool>,

    /// Keep the table fixed for the lifetime of the model
    pub freeze: bool,
}

impl PretrainedTable {
    pub fn rows(&self) -> usize {
        self.found.len()
    }

    pub fn coverage(&self) -> usize {
        self.found.iter().filter(|&&f| f).count()
    }

    pub fn row(&self, idx: usize) -> Option<&[f32]> {
        if idx >= self.rows() {
            return None;
        }
        Some(&self.values[idx * self.dim..(idx + 1) * self.dim])
    }
}
