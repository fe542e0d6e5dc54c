// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Two commands are supported:
//   1. `train`    — trains the classifier on the sound dataset
//   2. `evaluate` — loads the best checkpoint and runs the
//                   held-out test pass again
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

// Declare the commands submodule
pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, EvaluateArgs, TrainArgs};

/// The main CLI struct — clap reads the fields and generates
/// argument parsing code automatically via the Parser derive macro.
#[derive(Parser, Debug)]
#[command(
    name = "urbansound-cls",
    version = "0.1.0",
    about = "Train a sound classifier on UrbanSound8K, then evaluate it."
)]
pub struct Cli {
    /// The subcommand to run (train or evaluate)
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    /// This keeps the CLI layer thin — it only routes, never computes.
    /// The handlers are associated functions: the match moves the
    /// args out of `self`, so no receiver survives to borrow.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)    => Self::run_train(args),
            Commands::Evaluate(args) => Self::run_evaluate(args),
        }
    }

    /// Handles the `train` subcommand.
    /// Converts CLI args into a TrainConfig and hands off to Layer 2.
    fn run_train(args: TrainArgs) -> Result<()> {
        use crate::application::train_use_case::TrainUseCase;

        tracing::info!("Starting training on dataset in: {}", args.data_dir);

        // Convert CLI args → application config (separates presentation from domain)
        let use_case = TrainUseCase::new(args.into());
        use_case.execute()?;

        println!("Training complete. Best checkpoint saved.");
        Ok(())
    }

    /// Handles the `evaluate` subcommand.
    /// Restores the best checkpoint and reports test metrics.
    fn run_evaluate(args: EvaluateArgs) -> Result<()> {
        use crate::application::evaluate_use_case::EvaluateUseCase;

        let use_case = EvaluateUseCase::new(args.output_dir);
        use_case.execute()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::train_use_case::TrainConfig;

    #[test]
    fn test_train_args_parse_and_convert() {
        let cli = Cli::try_parse_from([
            "urbansound-cls",
            "train",
            "--epochs", "3",
            "--task-classes", "siren,dog_bark",
            "--valid-folds", "8,9",
        ])
        .unwrap();

        // Moving the args out of the parsed Cli is exactly what
        // run() does before dispatching.
        let Commands::Train(args) = cli.command else {
            panic!("expected the train subcommand");
        };
        let cfg: TrainConfig = args.into();
        assert_eq!(cfg.epochs, 3);
        assert_eq!(cfg.task_classes, vec!["siren", "dog_bark"]);
        assert_eq!(cfg.valid_folds, vec![8, 9]);
        assert_eq!(cfg.num_classes(), 2);
    }
}
