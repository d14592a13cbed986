// ============================================================
// Layer 2 - PredictUseCase
// ============================================================
// Loads a checkpoint and predicts an answer slot per sample:
//
//   Step 1: Load network, config, vocab   (Layer 6 - infra)
//   Step 2: Load samples                  (Layer 4 - data)
//   Step 3: Run inference                 (Layer 5 - ml)
//   Step 4: Score against gold answers
//   Step 5: Write the CSV report, if any  (Layer 6 - infra)

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::data::loader::load_samples;
use crate::infra::{checkpoint::CheckpointManager, report::PredictionReport};
use crate::ml::inferencer::{accuracy, Inferencer, SamplePrediction, DEFAULT_BATCH_SIZE};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictConfig {
    pub checkpoint_dir: String,
    pub samples_path:   String,
    pub batch_size:     usize,
    /// CSV report destination
    pub report_path:    Option<String>,
}

impl Default for PredictConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: "checkpoints".to_string(),
            samples_path:   "data/samples.jsonl".to_string(),
            batch_size:     DEFAULT_BATCH_SIZE,
            report_path:    None,
        }
    }
}

/// Everything the CLI needs to print.
#[derive(Debug, Clone)]
pub struct PredictOutcome {
    pub architecture: &'static str,
    pub predictions:  Vec<SamplePrediction>,
    pub answers:      Vec<Option<usize>>,
    /// None when no sample carries an answer
    pub accuracy:     Option<f64>,
}

pub struct PredictUseCase {
    config: PredictConfig,
}

impl PredictUseCase {
    pub fn new(config: PredictConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<PredictOutcome> {
        let cfg = &self.config;

        // Step 1
        let ckpt       = CheckpointManager::new(&cfg.checkpoint_dir);
        let inferencer = Inferencer::from_checkpoint(&ckpt)?.with_batch_size(cfg.batch_size);

        // Step 2
        let samples = load_samples(&cfg.samples_path)?;

        // Step 3
        let predictions = inferencer.predict(&samples)?;

        // Step 4
        let answers  = samples.answers();
        let accuracy = accuracy(&predictions, &answers);
        if let Some(acc) = accuracy {
            tracing::info!("Accuracy: {:.4}", acc);
        }

        // Step 5
        if let Some(path) = &cfg.report_path {
            PredictionReport::new(path).write(&predictions, &answers)?;
        }

        Ok(PredictOutcome {
            architecture: inferencer.config().name(),
            predictions,
            answers,
            accuracy,
        })
    }
}
