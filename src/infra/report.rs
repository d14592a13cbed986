// ============================================================
// Layer 6 - Prediction Report
// ============================================================
// Writes one CSV row per predicted sample so runs can be compared
// or plotted later.
//
// Example output:
//   sample,slot,log_prob,answer,correct
//   0,3,-0.412300,3,true
//   1,0,-1.093100,,
//
// `answer` and `correct` are left empty for unlabelled samples.

use anyhow::{Context, Result};
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use crate::ml::inferencer::SamplePrediction;

pub struct PredictionReport {
    csv_path: PathBuf,
}

impl PredictionReport {
    pub fn new(csv_path: impl Into<PathBuf>) -> Self {
        Self { csv_path: csv_path.into() }
    }

    /// Overwrite the report with `predictions`.
    pub fn write(&self, predictions: &[SamplePrediction], answers: &[Option<usize>]) -> Result<()> {
        if let Some(parent) = self.csv_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&self.csv_path)
            .with_context(|| format!("Cannot create report '{}'", self.csv_path.display()))?;
        let mut f = BufWriter::new(file);

        writeln!(f, "sample,slot,log_prob,answer,correct")?;
        for (i, p) in predictions.iter().enumerate() {
            match answers.get(i).copied().flatten() {
                Some(a) => writeln!(f, "{i},{},{:.6},{a},{}", p.slot, p.log_prob, p.slot == a)?,
                None    => writeln!(f, "{i},{},{:.6},,", p.slot, p.log_prob)?,
            }
        }
        f.flush()?;

        tracing::debug!("Wrote {} predictions to '{}'", predictions.len(), self.csv_path.display());
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}
