// ============================================================
// Layer 6 - Checkpoint Manager
// ============================================================
// Saves and restores a network using Burn's CompactRecorder.
//
// What gets saved per checkpoint:
//   1. network.mpk    weights of every learned parameter
//   2. network.json   NetworkConfig, tagged by architecture
//   3. vocab.json     token → index map
//
// The config is needed to rebuild the exact architecture (hop
// count, table count, head width, frozen tables) before the
// weights can be loaded into it. The vocabulary is needed to decode @entity
// slots and must match the one the tables were built for.
//
// File layout:
//   checkpoints/
//     network.mpk
//     network.json
//     vocab.json
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::domain::vocabulary::Vocabulary;
use crate::ml::network::{Network, NetworkConfig};

const WEIGHTS_FILE: &str = "network";
const CONFIG_FILE:  &str = "network.json";
const VOCAB_FILE:   &str = "vocab.json";

/// Manages one checkpoint directory.
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Create a manager over `dir`; the directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", self.dir.display()))
    }

    /// Record any Burn module under `{dir}/{name}` (the recorder adds the extension).
    pub fn save_module<B: Backend, M: Module<B>>(&self, module: &M, name: &str) -> Result<()> {
        self.ensure_dir()?;
        let path = self.dir.join(name);
        CompactRecorder::new()
            .record(module.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save weights to '{}'", path.display()))?;
        tracing::debug!("Saved weights to '{}'", path.display());
        Ok(())
    }

    /// Load weights recorded by `save_module` into a freshly built module.
    /// The module must have the same architecture as the recorded one.
    pub fn load_module<B: Backend, M: Module<B>>(&self, module: M, name: &str, device: &B::Device) -> Result<M> {
        let path   = self.dir.join(name);
        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .with_context(|| {
                format!("Cannot load weights '{}'. Have you run 'init' first?", path.display())
            })?;
        Ok(module.load_record(record))
    }

    pub fn save_network<B: Backend>(&self, network: &Network<B>) -> Result<()> {
        match network {
            Network::MemN2N(m)          => self.save_module(m, WEIGHTS_FILE),
            Network::KvMemN2N(m)        => self.save_module(m, WEIGHTS_FILE),
            Network::KvAttention(m)     => self.save_module(m, WEIGHTS_FILE),
            Network::QueryClassifier(m) => self.save_module(m, WEIGHTS_FILE),
        }
    }

    /// Rebuild the network from its config, then restore its weights.
    pub fn load_network<B: Backend>(&self, config: &NetworkConfig, device: &B::Device) -> Result<Network<B>> {
        let network = config
            .init::<B>(device, None)
            .with_context(|| format!("Cannot rebuild '{}' from its config", config.name()))?;
        let network = match network {
            Network::MemN2N(m)          => Network::MemN2N(self.load_module(m, WEIGHTS_FILE, device)?),
            Network::KvMemN2N(m)        => Network::KvMemN2N(self.load_module(m, WEIGHTS_FILE, device)?),
            Network::KvAttention(m)     => Network::KvAttention(self.load_module(m, WEIGHTS_FILE, device)?),
            Network::QueryClassifier(m) => Network::QueryClassifier(self.load_module(m, WEIGHTS_FILE, device)?),
        };
        tracing::info!("Loaded {} weights from '{}'", network.name(), self.dir.display());
        Ok(network)
    }

    pub fn save_config(&self, config: &NetworkConfig) -> Result<()> {
        self.write_json(CONFIG_FILE, config)
    }

    pub fn load_config(&self) -> Result<NetworkConfig> {
        self.read_json(CONFIG_FILE)
    }

    pub fn save_vocab(&self, vocab: &Vocabulary) -> Result<()> {
        self.write_json(VOCAB_FILE, vocab)
    }

    pub fn load_vocab(&self) -> Result<Vocabulary> {
        self.read_json(VOCAB_FILE)
    }

    fn write_json<T: Serialize>(&self, file: &str, value: &T) -> Result<()> {
        self.ensure_dir()?;
        let path = self.dir.join(file);
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&path, json).with_context(|| format!("Cannot write '{}'", path.display()))?;
        tracing::debug!("Saved '{}'", path.display());
        Ok(())
    }

    fn read_json<T: DeserializeOwned>(&self, file: &str) -> Result<T> {
        let path = self.dir.join(file);
        let json = fs::read_to_string(&path).with_context(|| {
            format!("Cannot read '{}'. Make sure you have run 'init' first.", path.display())
        })?;
        serde_json::from_str(&json).with_context(|| format!("Malformed '{}'", path.display()))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::memn2n::MemN2NConfig;
    use crate::ml::test_support::{values, TestBackend};
    use tempfile::TempDir;

    #[test]
    fn test_config_and_vocab_round_trip() {
        let tmp  = TempDir::new().unwrap();
        let ckpt = CheckpointManager::new(tmp.path().join("ckpt"));

        let config = NetworkConfig::MemN2N(MemN2NConfig::new(5, 4, 2).with_hops(3));
        let vocab  = Vocabulary::from_tokens(["mary", "@entity0", "@entity1"]);
        ckpt.save_config(&config).unwrap();
        ckpt.save_vocab(&vocab).unwrap();

        let back = ckpt.load_config().unwrap();
        assert_eq!(back.name(), "memn2n");
        assert_eq!(back.output_size(), 2);
        assert_eq!(ckpt.load_vocab().unwrap().index("@entity1"), Some(3));
    }

    #[test]
    fn test_weights_survive_reload() {
        let tmp    = TempDir::new().unwrap();
        let ckpt   = CheckpointManager::new(tmp.path());
        let device = Default::default();

        let config  = NetworkConfig::MemN2N(MemN2NConfig::new(5, 4, 2).with_hops(2));
        let network = config.init::<TestBackend>(&device, None).unwrap();
        ckpt.save_network(&network).unwrap();

        let loaded = ckpt.load_network::<TestBackend>(&config, &device).unwrap();
        match (network, loaded) {
            (Network::MemN2N(a), Network::MemN2N(b)) => {
                assert_eq!(values(a.attend_table.weight.val()), values(b.attend_table.weight.val()));
                assert_eq!(b.hops, 2);
            }
            _ => panic!("architecture changed on reload"),
        }
    }

    #[test]
    fn test_frozen_embeddings_stay_frozen_after_reload() {
        type Ad = burn::backend::Autodiff<TestBackend>;
        let tmp    = TempDir::new().unwrap();
        let ckpt   = CheckpointManager::new(tmp.path());
        let device = Default::default();

        let config = NetworkConfig::MemN2N(MemN2NConfig::new(5, 4, 2).with_freeze_embeddings(true));
        ckpt.save_config(&config).unwrap();
        ckpt.save_network(&config.init::<TestBackend>(&device, None).unwrap()).unwrap();

        let config = ckpt.load_config().unwrap();
        assert!(config.freeze_embeddings());
        match ckpt.load_network::<Ad>(&config, &device).unwrap() {
            Network::MemN2N(m) => {
                assert!(!m.attend_table.weight.val().is_require_grad());
                assert!(!m.aggregate_table.weight.val().is_require_grad());
                assert!(m.head.linear.weight.val().is_require_grad());
            }
            _ => panic!("architecture changed on reload"),
        }
    }

    #[test]
    fn test_missing_checkpoint_is_an_error() {
        let tmp  = TempDir::new().unwrap();
        let ckpt = CheckpointManager::new(tmp.path());
        let err  = ckpt.load_config().unwrap_err();
        assert!(format!("{err:#}").contains("network.json"));
    }
}
