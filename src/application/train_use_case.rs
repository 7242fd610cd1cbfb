// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates a plain VAE training run in order:
//
//   Step 1: Create or reopen the run      (Layer 5 - ml, Layer 6 - infra)
//   Step 2: Load frames at the run shape  (Layer 4 - data)
//   Step 3: Build the dataset             (Layer 4 - data)
//   Step 4: Optional train/test split     (Layer 4 - data)
//   Step 5: Train                         (Layer 5 - ml)
//   Step 6: Evaluate on held-out frames   (Layer 5 - ml)
//
// Reference: Burn Book §5 (Training)

use anyhow::Result;
use burn::tensor::backend::AutodiffBackend;
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::data::{dataset::ImageDataset, loader::ImageDirLoader, synthetic::Translations};
use crate::domain::{
    array::HostArray,
    error::VaeError,
    hyperparams::{HyperParams, InputShape, Network},
    traits::{Checkpointable, DatasetSource},
};
use crate::infra::settings::Settings;
use crate::ml::{
    trainer::{TrainOptions, TrainReport},
    vae::{EvalReport, Vae},
};

// ─── Data source ──────────────────────────────────────────────────────────────
/// Where training frames come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FrameSource {
    /// Every PNG/JPEG in a directory, in file-name order
    Directory(PathBuf),
    /// A white square of the given side at every position
    Sprites { side: usize },
}

impl FrameSource {
    pub fn load(&self, shape: InputShape) -> Result<HostArray> {
        match self {
            FrameSource::Directory(dir) => ImageDirLoader::new(dir, shape).load(),
            FrameSource::Sprites { side } => Translations::new(shape, *side).load(),
        }
    }
}

/// RNG for splits: seeded when a seed is given.
pub(crate) fn split_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None       => StdRng::from_entropy(),
    }
}

// ─── Training Configuration ──────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Runs are grouped under `vae-<name>`
    pub name:          String,
    pub source:        FrameSource,
    pub input_shape:   Option<InputShape>,
    pub network:       Network,
    pub latent_dim:    usize,
    pub beta:          f64,
    pub lr:            f64,
    pub batch_size:    usize,
    pub epochs:        usize,
    pub print_freq:    Option<usize>,
    pub seed:          Option<u64>,
    /// Fraction of frames held out for evaluation; 0 disables the split
    pub test_fraction: f64,
    pub show_progress: bool,
    /// Continue an existing run instead of creating one
    pub resume:        Option<ResumeFrom>,
}

/// An existing run and the weights to continue from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeFrom {
    pub run_id: String,
    pub tag:    String,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            name:          "sprites".to_string(),
            source:        FrameSource::Sprites { side: 8 },
            input_shape:   Some(InputShape::new(64, 64, 1)),
            network:       Network::Dsprites,
            latent_dim:    20,
            beta:          44.4,
            lr:            5e-3,
            batch_size:    128,
            epochs:        50,
            print_freq:    Some(10),
            seed:          None,
            test_fraction: 0.0,
            show_progress: true,
            resume:        None,
        }
    }
}

impl TrainConfig {
    fn options(&self) -> TrainOptions {
        TrainOptions {
            batch_size:    self.batch_size,
            epochs:        self.epochs,
            print_freq:    self.print_freq,
            show_progress: self.show_progress,
            seed:          self.seed,
        }
    }

    fn params(&self, input_shape: InputShape) -> HyperParams {
        HyperParams {
            network: self.network,
            latent_dim: self.latent_dim,
            beta: self.beta,
            lr: self.lr,
            ..HyperParams::new(input_shape)
        }
    }
}

/// What a finished run reports back to the CLI.
#[derive(Debug, Clone)]
pub struct TrainOutcome {
    pub run_dir:    PathBuf,
    pub report:     TrainReport,
    pub evaluation: Option<EvalReport>,
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    pub fn execute<B: AutodiffBackend>(&self, settings: &Settings, device: B::Device) -> Result<TrainOutcome> {
        let cfg = &self.config;
        settings.ensure_dirs()?;

        // ── Step 1: Create or reopen the run ──────────────────────────────────
        // A resumed run takes its shape from params.json; a fresh one needs it.
        let mut vae = match &cfg.resume {
            Some(resume) => {
                let mut vae = Vae::<B>::open(settings, &cfg.name, &resume.run_id, device)?;
                vae.load(&resume.tag)?;
                vae
            }
            None => {
                let shape = cfg.input_shape.ok_or(VaeError::MissingInputShape)?;
                Vae::<B>::new(settings, &cfg.name, cfg.params(shape), device)?
            }
        };
        let shape = vae.params().input_shape;

        // ── Step 2: Load frames ───────────────────────────────────────────────
        let frames = cfg.source.load(shape)?;
        tracing::info!("Loaded {} frames of {}", frames.len(), shape);

        // ── Step 3: Build the dataset ─────────────────────────────────────────
        let dataset = ImageDataset::from_frames(frames, &shape)?;

        // ── Step 4: Train / test split ────────────────────────────────────────
        let (mut train_set, test_set) = if cfg.test_fraction > 0.0 {
            let mut rng = split_rng(cfg.seed);
            let (train, test) = dataset.split(cfg.test_fraction, &mut rng);
            tracing::info!("Split: {} train, {} test", train.len(), test.len());
            (train, Some(test))
        } else {
            (dataset, None)
        };

        // ── Step 5: Train ─────────────────────────────────────────────────────
        let report = vae.train(&mut train_set, cfg.options())?;

        // ── Step 6: Evaluate ──────────────────────────────────────────────────
        let evaluation = match test_set {
            Some(test) if !test.is_empty() => Some(vae.evaluate(&test, cfg.batch_size)?),
            _ => None,
        };

        Ok(TrainOutcome { run_dir: vae.run_dir().to_path_buf(), report, evaluation })
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::settings::Accelerator;
    use crate::ml::vae::LATEST;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray>;

    fn small_config() -> TrainConfig {
        TrainConfig {
            source:        FrameSource::Sprites { side: 3 },
            input_shape:   Some(InputShape::new(8, 8, 1)),
            network:       Network::Dense,
            latent_dim:    2,
            beta:          1.0,
            lr:            1e-3,
            batch_size:    8,
            epochs:        1,
            print_freq:    None,
            seed:          Some(11),
            show_progress: false,
            ..TrainConfig::default()
        }
    }

    #[test]
    fn test_fresh_run_with_holdout() {
        let home = tempfile::tempdir().unwrap();
        let settings = Settings::new(home.path(), Accelerator::Cpu);
        let config = TrainConfig { test_fraction: 0.25, ..small_config() };

        let outcome = TrainUseCase::new(config).execute::<TestBackend>(&settings, Default::default()).unwrap();

        // 36 sprites, a quarter held out
        assert_eq!(outcome.report.samples_seen, 27);
        assert_eq!(outcome.evaluation.unwrap().samples, 9);
        assert!(outcome.run_dir.join("latest.mpk").exists());
    }

    #[test]
    fn test_missing_shape_is_reported() {
        let home = tempfile::tempdir().unwrap();
        let settings = Settings::new(home.path(), Accelerator::Cpu);
        let config = TrainConfig { input_shape: None, ..small_config() };

        let err = TrainUseCase::new(config)
            .execute::<TestBackend>(&settings, Default::default())
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<VaeError>(), Some(VaeError::MissingInputShape)));
    }

    #[test]
    fn test_resume_continues_existing_run() {
        let home = tempfile::tempdir().unwrap();
        let settings = Settings::new(home.path(), Accelerator::Cpu);
        let first = TrainUseCase::new(small_config())
            .execute::<TestBackend>(&settings, Default::default())
            .unwrap();
        let run_id = first.run_dir.file_name().unwrap().to_string_lossy().to_string();

        let config = TrainConfig {
            input_shape: None,
            resume: Some(ResumeFrom { run_id, tag: LATEST.to_string() }),
            ..small_config()
        };
        let second = TrainUseCase::new(config).execute::<TestBackend>(&settings, Default::default()).unwrap();

        assert_eq!(second.run_dir, first.run_dir);
        let csv = std::fs::read_to_string(first.run_dir.join("progress.csv")).unwrap();
        let rows = csv.lines().count() - 1;
        assert_eq!(rows as u64, first.report.batches + second.report.batches);
    }
}
