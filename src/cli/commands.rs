// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the subcommands and all their configurable flags:
//
//   train    — fresh plain VAE run
//   resume   — continue a plain VAE run from a saved tag
//   encode   — images → latent statistics (JSON)
//   decode   — latent vectors or prior samples → PNG frames
//   retrain  — frame-stacked VAE next to an RL run
//
// Every argument struct converts into its application-layer
// config with `From`, so Layer 2 never sees clap types.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::application::{
    inspect_use_case::{DecodeConfig, EncodeConfig, RunRef},
    retrain_use_case::RetrainConfig,
    train_use_case::{FrameSource, ResumeFrom, TrainConfig},
};
use crate::domain::hyperparams::{InputShape, Network};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a new VAE run
    Train(TrainArgs),

    /// Continue training an existing run
    Resume(ResumeArgs),

    /// Encode images with a trained run
    Encode(EncodeArgs),

    /// Decode latent vectors with a trained run
    Decode(DecodeArgs),

    /// Train a frame-stacked VAE for an RL run
    Retrain(RetrainArgs),
}

// ─── Shared argument groups ───────────────────────────────────────────────────
/// Where frames come from. Without --data-dir a synthetic sprite set is used.
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Directory of PNG/JPEG frames, read in file-name order
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Side of the synthetic square sprite when no --data-dir is given
    #[arg(long, default_value_t = 8)]
    pub sprite_side: usize,
}

impl From<SourceArgs> for FrameSource {
    fn from(a: SourceArgs) -> Self {
        match a.data_dir {
            Some(dir) => FrameSource::Directory(dir),
            None      => FrameSource::Sprites { side: a.sprite_side },
        }
    }
}

/// Loop settings shared by every training command.
#[derive(Args, Debug, Clone)]
pub struct LoopArgs {
    /// Samples per gradient step; the last batch of an epoch may be smaller
    #[arg(long, default_value_t = 128)]
    pub batch_size: usize,

    /// Passes over the dataset
    #[arg(long, default_value_t = 50)]
    pub epochs: usize,

    /// Print a progress table every N batches (0 disables it)
    #[arg(long, default_value_t = 10)]
    pub print_freq: usize,

    /// Seed for shuffling and splitting
    #[arg(long)]
    pub seed: Option<u64>,

    /// Hide the per-epoch progress bar
    #[arg(long)]
    pub no_progress: bool,
}

impl LoopArgs {
    fn print_freq(&self) -> Option<usize> {
        (self.print_freq > 0).then_some(self.print_freq)
    }
}

/// A finished run and the weights to use from it.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Run group, stored as vae-<name>
    #[arg(long)]
    pub name: String,

    /// Run directory inside the group
    #[arg(long)]
    pub run_id: String,

    /// Weights tag to load
    #[arg(long, default_value = "latest")]
    pub tag: String,
}

impl From<RunArgs> for RunRef {
    fn from(a: RunArgs) -> Self {
        RunRef { name: a.name, run_id: a.run_id, tag: a.tag }
    }
}

// ─── train ────────────────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Run group, stored as vae-<name>
    #[arg(long, default_value = "sprites")]
    pub name: String,

    #[command(flatten)]
    pub source: SourceArgs,

    /// Frame shape as HxW or HxWxC, e.g. 64x64x1
    #[arg(long)]
    pub input_shape: Option<InputShape>,

    /// Architecture: dense, dsprites, atari, pendulum, pendulum-mini
    #[arg(long, default_value = "dsprites")]
    pub network: Network,

    #[arg(long, default_value_t = 20)]
    pub latent_dim: usize,

    /// Weight of the KL term
    #[arg(long, default_value_t = 44.4)]
    pub beta: f64,

    #[arg(long, default_value_t = 5e-3)]
    pub lr: f64,

    /// Fraction of frames held out for evaluation
    #[arg(long, default_value_t = 0.0)]
    pub test_fraction: f64,

    #[command(flatten)]
    pub training: LoopArgs,
}

impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            name:          a.name,
            source:        a.source.into(),
            input_shape:   a.input_shape,
            network:       a.network,
            latent_dim:    a.latent_dim,
            beta:          a.beta,
            lr:            a.lr,
            batch_size:    a.training.batch_size,
            epochs:        a.training.epochs,
            print_freq:    a.training.print_freq(),
            seed:          a.training.seed,
            test_fraction: a.test_fraction,
            show_progress: !a.training.no_progress,
            resume:        None,
        }
    }
}

// ─── resume ───────────────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct ResumeArgs {
    #[command(flatten)]
    pub run: RunArgs,

    #[command(flatten)]
    pub source: SourceArgs,

    /// Fraction of frames held out for evaluation
    #[arg(long, default_value_t = 0.0)]
    pub test_fraction: f64,

    #[command(flatten)]
    pub training: LoopArgs,
}

impl From<ResumeArgs> for TrainConfig {
    fn from(a: ResumeArgs) -> Self {
        TrainConfig {
            name:          a.run.name,
            source:        a.source.into(),
            input_shape:   None,
            batch_size:    a.training.batch_size,
            epochs:        a.training.epochs,
            print_freq:    a.training.print_freq(),
            seed:          a.training.seed,
            test_fraction: a.test_fraction,
            show_progress: !a.training.no_progress,
            resume:        Some(ResumeFrom { run_id: a.run.run_id, tag: a.run.tag }),
            ..TrainConfig::default()
        }
    }
}

// ─── encode / decode ──────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct EncodeArgs {
    #[command(flatten)]
    pub run: RunArgs,

    #[command(flatten)]
    pub source: SourceArgs,

    /// Write the latent statistics here instead of stdout
    #[arg(long)]
    pub output: Option<PathBuf>,
}

impl From<EncodeArgs> for EncodeConfig {
    fn from(a: EncodeArgs) -> Self {
        EncodeConfig { run: a.run.into(), source: a.source.into(), output: a.output }
    }
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// JSON file with one latent vector or an array of them
    #[arg(long)]
    pub latents: Option<PathBuf>,

    /// Prior samples to decode when no --latents file is given
    #[arg(long, default_value_t = 8)]
    pub samples: usize,

    /// Directory for the decoded PNG frames
    #[arg(long, default_value = "decoded")]
    pub out_dir: PathBuf,
}

impl From<DecodeArgs> for DecodeConfig {
    fn from(a: DecodeArgs) -> Self {
        DecodeConfig { run: a.run.into(), latents: a.latents, samples: a.samples, out_dir: a.out_dir }
    }
}

// ─── retrain ──────────────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct RetrainArgs {
    /// RL run directory; the VAE is stored in <rl-path>/vae/
    #[arg(long)]
    pub rl_path: PathBuf,

    #[command(flatten)]
    pub source: SourceArgs,

    /// Frame shape as HxW or HxWxC, e.g. 64x64x1
    #[arg(long)]
    pub input_shape: Option<InputShape>,

    #[arg(long, default_value = "pendulum")]
    pub network: Network,

    #[arg(long, default_value_t = 20)]
    pub latent_dim: usize,

    #[arg(long, default_value_t = 1.0)]
    pub beta: f64,

    #[arg(long, default_value_t = 1e-3)]
    pub lr: f64,

    /// Consecutive frames per stack
    #[arg(long, default_value_t = 5)]
    pub k: usize,

    /// Use the plain mean cross-entropy instead of scaling it by height²
    #[arg(long)]
    pub unscaled_re_loss: bool,

    /// Warm-start from <chosen-root>/<INIT_FROM>/
    #[arg(long)]
    pub init_from: Option<String>,

    /// Adopt the warm-start run's hyperparameters
    #[arg(long, requires = "init_from")]
    pub with_attrs: bool,

    #[command(flatten)]
    pub training: LoopArgs,
}

impl From<RetrainArgs> for RetrainConfig {
    fn from(a: RetrainArgs) -> Self {
        RetrainConfig {
            rl_path:        a.rl_path,
            source:         a.source.into(),
            input_shape:    a.input_shape,
            network:        a.network,
            latent_dim:     a.latent_dim,
            beta:           a.beta,
            lr:             a.lr,
            k:              a.k,
            scaled_re_loss: !a.unscaled_re_loss,
            init_from:      a.init_from,
            with_attrs:     a.with_attrs,
            batch_size:     a.training.batch_size,
            epochs:         a.training.epochs,
            print_freq:     a.training.print_freq(),
            seed:           a.training.seed,
            show_progress:  !a.training.no_progress,
        }
    }
}
