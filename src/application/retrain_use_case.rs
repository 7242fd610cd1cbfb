// ============================================================
// Layer 2 — RetrainUseCase
// ============================================================
// Trains a frame-stacked VAE next to an RL run:
//
//   Step 1: Build / warm-start the model  (Layer 5 - ml)
//   Step 2: Load frames, stack k at a time (Layer 4 - data)
//   Step 3: Train                         (Layer 5 - ml)

use anyhow::Result;
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::application::train_use_case::FrameSource;
use crate::data::dataset::ImageDataset;
use crate::domain::{
    error::VaeError,
    hyperparams::{HyperParams, InputShape, Network},
};
use crate::infra::settings::Settings;
use crate::ml::{
    stacked::{StackedVae, WarmStart},
    trainer::{TrainOptions, TrainReport},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrainConfig {
    /// RL run directory; the VAE lives in `<rl_path>/vae/`
    pub rl_path:        PathBuf,
    pub source:         FrameSource,
    pub input_shape:    Option<InputShape>,
    pub network:        Network,
    pub latent_dim:     usize,
    pub beta:           f64,
    pub lr:             f64,
    pub k:              usize,
    pub scaled_re_loss: bool,
    pub init_from:      Option<String>,
    pub with_attrs:     bool,
    pub batch_size:     usize,
    pub epochs:         usize,
    pub print_freq:     Option<usize>,
    pub seed:           Option<u64>,
    pub show_progress:  bool,
}

impl Default for RetrainConfig {
    fn default() -> Self {
        Self {
            rl_path:        PathBuf::from("retrain"),
            source:         FrameSource::Sprites { side: 8 },
            input_shape:    Some(InputShape::new(64, 64, 1)),
            network:        Network::Pendulum,
            latent_dim:     20,
            beta:           1.0,
            lr:             1e-3,
            k:              5,
            scaled_re_loss: true,
            init_from:      None,
            with_attrs:     false,
            batch_size:     155,
            epochs:         50,
            print_freq:     Some(5),
            seed:           None,
            show_progress:  true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetrainOutcome {
    pub run_dir: PathBuf,
    pub report:  TrainReport,
}

pub struct RetrainUseCase {
    config: RetrainConfig,
}

impl RetrainUseCase {
    pub fn new(config: RetrainConfig) -> Self {
        Self { config }
    }

    pub fn execute<B: AutodiffBackend>(&self, settings: &Settings, device: B::Device) -> Result<RetrainOutcome> {
        let cfg = &self.config;
        let shape = cfg.input_shape.ok_or(VaeError::MissingInputShape)?;

        let params = HyperParams {
            network:        cfg.network,
            latent_dim:     cfg.latent_dim,
            beta:           cfg.beta,
            lr:             cfg.lr,
            scaled_re_loss: cfg.scaled_re_loss,
            ..HyperParams::stacked(shape, cfg.k)
        };
        let warm = WarmStart { init_from: cfg.init_from.clone(), with_attrs: cfg.with_attrs };

        // ── Step 1: Build / warm-start the model ──────────────────────────────
        // Adopted attributes may change the frame shape and k, so the data
        // is loaded afterwards.
        let mut vae = StackedVae::<B>::new(settings, &cfg.rl_path, params, warm, device)?;
        let shape = vae.params().input_shape;

        // ── Step 2: Load and stack frames ─────────────────────────────────────
        let frames = ImageDataset::from_frames(cfg.source.load(shape)?, &shape)?;
        let mut stacks = frames.stack_frames(vae.k())?;
        tracing::info!("Built {} stacks of {} frames", stacks.len(), vae.k());

        // ── Step 3: Train ─────────────────────────────────────────────────────
        let options = TrainOptions {
            batch_size:    cfg.batch_size,
            epochs:        cfg.epochs,
            print_freq:    cfg.print_freq,
            show_progress: cfg.show_progress,
            seed:          cfg.seed,
        };
        let report = vae.train(&mut stacks, options)?;

        Ok(RetrainOutcome { run_dir: vae.run_dir().to_path_buf(), report })
    }
}
