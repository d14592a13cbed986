// ============================================================
// Layer 1 - CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction. Arguments are parsed
// with `clap`; all work is delegated to Layer 2.
//
// Two commands are supported:
//   1. `init`    - build a network from a vocabulary and checkpoint it
//   2. `predict` - load a checkpoint and answer a sample file
//
// Reference: Rust Book §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, InitArgs, PredictArgs};

#[derive(Parser, Debug)]
#[command(
    name = "memnet-qa",
    version,
    about = "Memory-network readers that answer cloze questions with @entity slots."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Init(args)    => run_init(args),
            Commands::Predict(args) => run_predict(args),
        }
    }
}

fn run_init(args: InitArgs) -> Result<()> {
    use crate::application::init_use_case::InitUseCase;

    tracing::info!("Initialising network from vocabulary '{}'", args.vocab);
    let dir    = args.checkpoint_dir.clone();
    let config = InitUseCase::new(args.into()).execute()?;

    println!(
        "Initialised {} (vocab {}, embed {}, output {}) in '{}'.",
        config.name(), config.vocab_size(), config.embed_size(), config.output_size(), dir,
    );
    Ok(())
}

fn run_predict(args: PredictArgs) -> Result<()> {
    use crate::application::predict_use_case::PredictUseCase;

    let outcome = PredictUseCase::new((&args).into()).execute()?;

    for (i, p) in outcome.predictions.iter().enumerate() {
        let gold = match outcome.answers.get(i).copied().flatten() {
            Some(a) => format!("  gold=@entity{a}"),
            None    => String::new(),
        };
        println!("{i:>5}  @entity{:<4} logp={:.4}{gold}", p.slot, p.log_prob);

        if args.inspect {
            if let Some(att) = &p.attention {
                let cells: Vec<String> = att.iter().map(|a| format!("{a:.3}")).collect();
                println!("       attention [{}]", cells.join(", "));
            }
        }
    }

    match outcome.accuracy {
        Some(acc) => println!("\n{}: accuracy {:.2}% over labelled samples", outcome.architecture, acc * 100.0),
        None      => println!("\n{}: {} predictions", outcome.architecture, outcome.predictions.len()),
    }
    Ok(())
}
