// ============================================================
// Layer 1 - CLI Commands and Arguments
// ============================================================
// Defines the two subcommands, `init` and `predict`, and all
// their flags. Clap types stop here: every argument struct
// converts into its application-layer config with `From`.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand, ValueEnum};

use crate::application::init_use_case::{Architecture, InitConfig, PretrainedOptions};
use crate::application::predict_use_case::PredictConfig;
use crate::ml::{
    attention::Aggregation,
    entity_feature::FeaturePolicy,
    kv_attention::Selection,
    output::OutputFeature,
};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a freshly initialised network and save it as a checkpoint
    Init(InitArgs),

    /// Predict answer slots for a sample file with a saved checkpoint
    Predict(PredictArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArchitectureArg {
    Memn2n,
    KvMemn2n,
    KvAttention,
    QueryClassifier,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregationArg {
    /// Read only the top-attended segment
    Hard,
    /// Attention-weighted sum of all segments
    Soft,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeatureArg {
    None,
    Hard,
    Soft,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionArg {
    Argmax,
    AttentionSum,
}

/// All arguments for the `init` command.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Vocabulary: JSON {token: index} map or one token per line
    #[arg(long, default_value = "data/vocab.txt")]
    pub vocab: String,

    /// Directory to write the checkpoint to
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    #[arg(long, value_enum, default_value_t = ArchitectureArg::Memn2n)]
    pub architecture: ArchitectureArg,

    /// Embedding dimensionality
    #[arg(long, default_value_t = 64)]
    pub embed_size: usize,

    /// Number of output slots; defaults to the largest @entity slot + 1
    #[arg(long)]
    pub output_size: Option<usize>,

    /// Reasoning hops (1 to 3)
    #[arg(long, default_value_t = 1)]
    pub hops: usize,

    #[arg(long, value_enum, default_value_t = AggregationArg::Soft)]
    pub aggregation: AggregationArg,

    /// Plain token sums instead of position-weighted sums
    #[arg(long)]
    pub no_positional: bool,

    /// Average token embeddings instead of summing them
    #[arg(long)]
    pub average: bool,

    /// Entity attention feature fed to the output layer (memn2n only)
    #[arg(long, value_enum, default_value_t = FeatureArg::None)]
    pub attention_feature: FeatureArg,

    /// Use the attention feature as the only output input
    #[arg(long)]
    pub attention_only: bool,

    /// Value selection of the kv-attention classifier
    #[arg(long, value_enum, default_value_t = SelectionArg::Argmax)]
    pub selection: SelectionArg,

    /// Pretrained word vectors, `token v1 .. vD` per line
    #[arg(long)]
    pub pretrained: Option<String>,

    /// Keep pretrained vectors fixed
    #[arg(long, requires = "pretrained")]
    pub freeze: bool,
}

impl InitArgs {
    fn output_feature(&self) -> OutputFeature {
        let policy = match self.attention_feature {
            FeatureArg::None => return OutputFeature::Fused,
            FeatureArg::Hard => FeaturePolicy::Hard,
            FeatureArg::Soft => FeaturePolicy::Soft,
        };
        if self.attention_only {
            OutputFeature::AttentionOnly(policy)
        } else {
            OutputFeature::FusedWithAttention(policy)
        }
    }
}

impl From<InitArgs> for InitConfig {
    fn from(a: InitArgs) -> Self {
        InitConfig {
            output_feature:     a.output_feature(),
            architecture: match a.architecture {
                ArchitectureArg::Memn2n          => Architecture::MemN2N,
                ArchitectureArg::KvMemn2n        => Architecture::KvMemN2N,
                ArchitectureArg::KvAttention     => Architecture::KvAttention,
                ArchitectureArg::QueryClassifier => Architecture::QueryClassifier,
            },
            aggregation: match a.aggregation {
                AggregationArg::Hard => Aggregation::HardSelect,
                AggregationArg::Soft => Aggregation::SoftWeighted,
            },
            selection: match a.selection {
                SelectionArg::Argmax       => Selection::Argmax,
                SelectionArg::AttentionSum => Selection::AttentionSum,
            },
            pretrained:         a.pretrained.map(|path| PretrainedOptions { path, freeze: a.freeze }),
            vocab_path:         a.vocab,
            checkpoint_dir:     a.checkpoint_dir,
            embed_size:         a.embed_size,
            output_size:        a.output_size,
            hops:               a.hops,
            positional:         !a.no_positional,
            average_embeddings: a.average,
        }
    }
}

/// All arguments for the `predict` command.
#[derive(Args, Debug)]
pub struct PredictArgs {
    /// JSON array or JSON-lines file of token-id samples
    #[arg(long)]
    pub samples: String,

    /// Directory written by `init`
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    /// Write a per-sample CSV report here
    #[arg(long)]
    pub report: Option<String>,

    /// Print the final-hop attention of every sample
    #[arg(long)]
    pub inspect: bool,
}

impl From<&PredictArgs> for PredictConfig {
    fn from(a: &PredictArgs) -> Self {
        PredictConfig {
            checkpoint_dir: a.checkpoint_dir.clone(),
            samples_path:   a.samples.clone(),
            batch_size:     a.batch_size,
            report_path:    a.report.clone(),
        }
    }
}
