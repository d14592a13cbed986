// ============================================================
// Layer 6 - Pretrained Embedding File
// ============================================================
// Reads word vectors in the plain text layout used by GloVe and
// word2vec text exports:
//
//   [N D]                 optional header line (word2vec)
//   token v1 v2 .. vD     one vector per line
//
// Only tokens present in the vocabulary are kept. Vocabulary
// tokens missing from the file are reported as not found so the
// network keeps their random rows.

use anyhow::{bail, Context, Result};
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::PathBuf,
};

use crate::domain::embedding::PretrainedTable;
use crate::domain::traits::EmbeddingProvider;
use crate::domain::vocabulary::Vocabulary;

pub struct TextEmbeddingFile {
    path: PathBuf,
}

impl TextEmbeddingFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Parse vectors from any reader. Public for in-memory use.
    pub fn read(reader: impl BufRead, vocab: &Vocabulary, freeze: bool) -> Result<PretrainedTable> {
        let rows = vocab.len();
        let mut dim: Option<usize> = None;
        let mut values: Vec<f32>  = Vec::new();
        let mut found             = vec![false; rows];

        for (n, line) in reader.lines().enumerate() {
            let line   = line.with_context(|| format!("Cannot read line {}", n + 1))?;
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.is_empty() {
                continue;
            }
            // word2vec header: two integers
            if n == 0 && fields.len() == 2 && fields.iter().all(|f| f.parse::<usize>().is_ok()) {
                continue;
            }

            let (token, vector) = (fields[0], &fields[1..]);
            let width = *dim.get_or_insert_with(|| {
                values = vec![0.0; rows * vector.len()];
                vector.len()
            });
            if vector.len() != width {
                bail!("line {} has {} values, expected {width}", n + 1, vector.len());
            }

            let Some(idx) = vocab.index(token) else {
                continue;
            };
            for (k, v) in vector.iter().enumerate() {
                values[idx * width + k] = v
                    .parse()
                    .with_context(|| format!("Bad number '{v}' on line {}", n + 1))?;
            }
            found[idx] = true;
        }

        let Some(dim) = dim else {
            bail!("embedding source holds no vectors");
        };
        let table = PretrainedTable { dim, values, found, freeze };
        tracing::info!(
            "Pretrained vectors cover {}/{} vocabulary entries (dim={dim})",
            table.coverage(), rows,
        );
        Ok(table)
    }
}

impl EmbeddingProvider for TextEmbeddingFile {
    fn load(&self, vocab: &Vocabulary, freeze: bool) -> Result<PretrainedTable> {
        let file = File::open(&self.path)
            .with_context(|| format!("Cannot open embeddings '{}'", self.path.display()))?;
        Self::read(BufReader::new(file), vocab, freeze)
            .with_context(|| format!("Cannot load embeddings from '{}'", self.path.display()))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn vocab() -> Vocabulary {
        Vocabulary::from_tokens(["cat", "dog", "@entity0"])
    }

    #[test]
    fn test_rows_align_with_vocabulary() {
        let text  = "dog 1 2\nbird 9 9\ncat 3 4\n";
        let table = TextEmbeddingFile::read(text.as_bytes(), &vocab(), true).unwrap();

        assert_eq!(table.dim, 2);
        assert_eq!(table.rows(), 4);
        assert_eq!(table.found, vec![false, true, true, false]);
        assert_eq!(table.row(1), Some(&[3.0, 4.0][..]));
        assert_eq!(table.row(2), Some(&[1.0, 2.0][..]));
        assert_eq!(table.row(3), Some(&[0.0, 0.0][..]));
        assert!(table.freeze);
    }

    #[test]
    fn test_header_line_is_skipped() {
        let table = TextEmbeddingFile::read("2 3\ncat 1 1 1\n".as_bytes(), &vocab(), false).unwrap();
        assert_eq!(table.dim, 3);
        assert_eq!(table.coverage(), 1);
    }

    #[test]
    fn test_inconsistent_width_reports_line() {
        let err = TextEmbeddingFile::read("cat 1 2\ndog 1\n".as_bytes(), &vocab(), false).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "@entity0 0.5 -0.5").unwrap();
        let table = TextEmbeddingFile::new(file.path()).load(&vocab(), false).unwrap();
        assert_eq!(table.row(3), Some(&[0.5, -0.5][..]));
    }
}
