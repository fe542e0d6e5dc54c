// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands: `train` and `evaluate`
// and all their configurable flags.
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for missing args
//   - type conversion (string → usize, f64, etc.)
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};

use crate::application::train_use_case::TrainConfig;

/// The two top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the sound classifier on the UrbanSound8K dataset
    Train(TrainArgs),

    /// Evaluate the best stored checkpoint on the test split
    Evaluate(EvaluateArgs),
}

/// All arguments for the `train` command.
/// Each field becomes a --flag on the command line.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Root of the UrbanSound8K dataset (audio/ + metadata/)
    #[arg(long, default_value = "data/UrbanSound8K")]
    pub data_dir: String,

    /// Directory for manifests, the encoder and checkpoints
    #[arg(long, default_value = "results/urbansound")]
    pub output_dir: String,

    /// Sound classes to train on, comma separated.
    /// Defaults to all ten UrbanSound8K classes.
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "air_conditioner,car_horn,children_playing,dog_bark,\
                         drilling,engine_idling,gun_shot,jackhammer,siren,street_music"
    )]
    pub task_classes: Vec<String>,

    /// Dataset folds used for training
    #[arg(long, value_delimiter = ',', default_value = "1,2,3,4,5,6,7,8")]
    pub train_folds: Vec<u32>,

    /// Dataset folds used for validation
    #[arg(long, value_delimiter = ',', default_value = "9")]
    pub valid_folds: Vec<u32>,

    /// Dataset folds held out for the final test pass
    #[arg(long, value_delimiter = ',', default_value = "10")]
    pub test_folds: Vec<u32>,

    /// Working sample rate — every clip is resampled to this
    #[arg(long, default_value_t = 16_000)]
    pub sample_rate: u32,

    /// Number of clips processed together in one forward pass
    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    /// Number of full passes through the training data
    #[arg(long, default_value_t = 25)]
    pub epochs: usize,

    /// How fast the model learns — too high causes instability,
    /// too low causes slow convergence
    #[arg(long, default_value_t = 1e-3)]
    pub lr: f64,

    /// Multiplier applied to the learning rate on each decay
    #[arg(long, default_value_t = 0.5)]
    pub lr_decay_factor: f64,

    /// Decay the learning rate every this many epochs (0 = never)
    #[arg(long, default_value_t = 10)]
    pub lr_decay_every: usize,

    /// Number of learned filterbank channels
    #[arg(long, default_value_t = 40)]
    pub n_feats: usize,

    /// Analysis frame length in samples (25 ms at 16 kHz)
    #[arg(long, default_value_t = 400)]
    pub frame_len: usize,

    /// Hop between frames in samples (10 ms at 16 kHz)
    #[arg(long, default_value_t = 160)]
    pub hop: usize,

    /// Width of the embedding layers
    #[arg(long, default_value_t = 128)]
    pub embed_dim: usize,

    /// Compress filterbank power to a decibel scale
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub amp_to_db: bool,

    /// Mean/variance normalise features over unpadded frames
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub normalize: bool,

    /// Scale the loss before backward so small gradients survive
    /// reduced-precision arithmetic
    #[arg(long, default_value_t = false, action = clap::ArgAction::Set)]
    pub mixed_precision: bool,

    /// Clip each update's gradient norm to this ceiling
    #[arg(long, default_value_t = 5.0)]
    pub max_grad_norm: f32,

    /// Cumulative non-finite losses tolerated before aborting
    /// (the counter never resets during a run)
    #[arg(long, default_value_t = 3)]
    pub nonfinite_patience: usize,

    /// Emit the buffered train loss every this many steps (0 = never)
    #[arg(long, default_value_t = 50)]
    pub log_frequency: usize,

    /// Write JSONL stat records for the dashboard instead of
    /// plain-text summaries
    #[arg(long, default_value_t = false, action = clap::ArgAction::Set)]
    pub use_dashboard: bool,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// This is the boundary between Layer 1 and Layer 2 —
/// the application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            data_dir:           a.data_dir,
            output_dir:         a.output_dir,
            task_classes:       a.task_classes,
            train_folds:        a.train_folds,
            valid_folds:        a.valid_folds,
            test_folds:         a.test_folds,
            sample_rate:        a.sample_rate,
            batch_size:         a.batch_size,
            epochs:             a.epochs,
            lr:                 a.lr,
            lr_decay_factor:    a.lr_decay_factor,
            lr_decay_every:     a.lr_decay_every,
            n_feats:            a.n_feats,
            frame_len:          a.frame_len,
            hop:                a.hop,
            embed_dim:          a.embed_dim,
            amp_to_db:          a.amp_to_db,
            normalize:          a.normalize,
            mixed_precision:    a.mixed_precision,
            max_grad_norm:      a.max_grad_norm,
            nonfinite_patience: a.nonfinite_patience,
            log_frequency:      a.log_frequency,
            use_dashboard:      a.use_dashboard,
        }
    }
}

/// All arguments for the `evaluate` command
#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Output directory of the training run to evaluate
    #[arg(long, default_value = "results/urbansound")]
    pub output_dir: String,
}
