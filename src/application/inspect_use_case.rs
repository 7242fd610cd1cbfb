// ============================================================
// Layer 2 — Inspect Use Cases
// ============================================================
// Use a finished run without training it:
//
//   EncodeUseCase: images on disk → latent statistics as JSON
//   DecodeUseCase: latent vectors (or prior samples) → PNG frames

use anyhow::{Context, Result};
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::application::train_use_case::FrameSource;
use crate::data::loader::write_frame;
use crate::domain::{
    array::HostArray,
    error::{VaeError, VaeResult},
    traits::Checkpointable,
};
use crate::infra::settings::Settings;
use crate::ml::{inferencer::LatentStats, vae::Vae};

/// Which run and which weights to use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRef {
    pub name:   String,
    pub run_id: String,
    pub tag:    String,
}

impl RunRef {
    fn open<B: AutodiffBackend>(&self, settings: &Settings, device: B::Device) -> Result<Vae<B>> {
        let mut vae = Vae::<B>::open(settings, &self.name, &self.run_id, device)?;
        vae.load(&self.tag)?;
        Ok(vae)
    }
}

// ─── Encode ───────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodeConfig {
    pub run:    RunRef,
    pub source: FrameSource,
    /// Write JSON here; the CLI prints it when None
    pub output: Option<PathBuf>,
}

/// Latent statistics as nested rows, one per frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedFrames {
    pub mu:     Vec<Vec<f32>>,
    pub logvar: Vec<Vec<f32>>,
}

impl From<&LatentStats> for EncodedFrames {
    fn from(stats: &LatentStats) -> Self {
        Self {
            mu:     stats.mu.rows().map(<[f32]>::to_vec).collect(),
            logvar: stats.logvar.rows().map(<[f32]>::to_vec).collect(),
        }
    }
}

pub struct EncodeUseCase {
    config: EncodeConfig,
}

impl EncodeUseCase {
    pub fn new(config: EncodeConfig) -> Self {
        Self { config }
    }

    pub fn execute<B: AutodiffBackend>(&self, settings: &Settings, device: B::Device) -> Result<EncodedFrames> {
        let cfg = &self.config;
        let vae = cfg.run.open::<B>(settings, device)?;

        let frames  = cfg.source.load(vae.params().input_shape)?;
        let encoded = EncodedFrames::from(&vae.encode(frames)?);
        tracing::info!("Encoded {} frames", encoded.mu.len());

        if let Some(path) = &cfg.output {
            let json = serde_json::to_string_pretty(&encoded)?;
            fs::write(path, json)
                .with_context(|| format!("Cannot write '{}'", path.display()))?;
            tracing::info!("Wrote latent statistics to '{}'", path.display());
        }
        Ok(encoded)
    }
}

// ─── Decode ───────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodeConfig {
    pub run:     RunRef,
    /// JSON file holding an array of latent vectors; None samples the prior
    pub latents: Option<PathBuf>,
    /// Number of prior samples when no latents are given
    pub samples: usize,
    pub out_dir: PathBuf,
}

pub struct DecodeUseCase {
    config: DecodeConfig,
}

impl DecodeUseCase {
    pub fn new(config: DecodeConfig) -> Self {
        Self { config }
    }

    /// Returns the paths of the written frames.
    pub fn execute<B: AutodiffBackend>(&self, settings: &Settings, device: B::Device) -> Result<Vec<PathBuf>> {
        let cfg = &self.config;
        let vae = cfg.run.open::<B>(settings, device)?;

        let frames = match &cfg.latents {
            Some(path) => vae.decode(read_latents(path)?)?,
            None => {
                // z ~ N(0, 1): decode_stats with mu = 0, logvar = 0
                let prior = HostArray::zeros([cfg.samples, vae.latent_dim()]);
                vae.decode_stats(&LatentStats { mu: prior.clone(), logvar: prior })?
            }
        };

        fs::create_dir_all(&cfg.out_dir)
            .with_context(|| format!("Cannot create '{}'", cfg.out_dir.display()))?;

        let shape = vae.params().input_shape;
        let mut written = Vec::with_capacity(frames.len());
        for (i, frame) in frames.rows().enumerate() {
            let path = cfg.out_dir.join(format!("frame_{i:04}.png"));
            write_frame(frame, &shape, &path)?;
            written.push(path);
        }
        tracing::info!("Decoded {} frames into '{}'", written.len(), cfg.out_dir.display());
        Ok(written)
    }
}

/// Read `[[z0, z1, ...], ...]` (or a single `[z0, z1, ...]`) from JSON.
fn read_latents(path: &Path) -> Result<HostArray> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Cannot read latents from '{}'", path.display()))?;
    Ok(parse_latents(&json)?)
}

fn parse_latents(json: &str) -> VaeResult<HostArray> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Latents {
        One(Vec<f32>),
        Many(Vec<Vec<f32>>),
    }

    match serde_json::from_str(json)? {
        Latents::One(z) => {
            let d = z.len();
            HostArray::new(z, [d])
        }
        Latents::Many(rows) => {
            let d = rows.first().map_or(0, Vec::len);
            if let Some(bad) = rows.iter().find(|r| r.len() != d) {
                return Err(VaeError::ShapeMismatch { expected: vec![d], actual: vec![bad.len()] });
            }
            let n = rows.len();
            HostArray::new(rows.concat(), [n, d])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::train_use_case::{TrainConfig, TrainUseCase};
    use crate::domain::hyperparams::{InputShape, Network};
    use crate::infra::settings::Accelerator;
    use crate::ml::vae::LATEST;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray>;

    /// Train a tiny run and return a reference to it.
    fn trained_run(settings: &Settings) -> RunRef {
        let config = TrainConfig {
            name:          "tiny".into(),
            source:        FrameSource::Sprites { side: 3 },
            input_shape:   Some(InputShape::new(8, 8, 1)),
            network:       Network::Dense,
            latent_dim:    3,
            beta:          1.0,
            lr:            1e-3,
            batch_size:    12,
            epochs:        1,
            print_freq:    None,
            seed:          Some(2),
            show_progress: false,
            ..TrainConfig::default()
        };
        let outcome = TrainUseCase::new(config).execute::<TestBackend>(settings, Default::default()).unwrap();
        RunRef {
            name:   "tiny".into(),
            run_id: outcome.run_dir.file_name().unwrap().to_string_lossy().to_string(),
            tag:    LATEST.into(),
        }
    }

    #[test]
    fn test_parse_latents() {
        assert_eq!(parse_latents("[0.1, 0.2]").unwrap().dims(), &[2]);
        assert_eq!(parse_latents("[[0, 1], [2, 3], [4, 5]]").unwrap().dims(), &[3, 2]);
        assert!(matches!(parse_latents("[[0, 1], [2]]"), Err(VaeError::ShapeMismatch { .. })));
        assert!(matches!(parse_latents("{\"z\": 1}"), Err(VaeError::Json(_))));
    }

    #[test]
    fn test_encode_then_decode_run() {
        let home = tempfile::tempdir().unwrap();
        let settings = Settings::new(home.path(), Accelerator::Cpu);
        let run = trained_run(&settings);

        let encoded_path = home.path().join("encoded.json");
        let encoded = EncodeUseCase::new(EncodeConfig {
            run:    run.clone(),
            source: FrameSource::Sprites { side: 3 },
            output: Some(encoded_path.clone()),
        })
        .execute::<TestBackend>(&settings, Default::default())
        .unwrap();
        assert_eq!(encoded.mu.len(), 36);
        assert!(encoded.mu.iter().all(|row| row.len() == 3));

        // feed the means back in as latents
        fs::write(&encoded_path, serde_json::to_string(&encoded.mu[..4]).unwrap()).unwrap();
        let out_dir = home.path().join("decoded");
        let written = DecodeUseCase::new(DecodeConfig {
            run,
            latents: Some(encoded_path),
            samples: 0,
            out_dir: out_dir.clone(),
        })
        .execute::<TestBackend>(&settings, Default::default())
        .unwrap();

        assert_eq!(written.len(), 4);
        assert!(out_dir.join("frame_0003.png").exists());
    }

    #[test]
    fn test_decode_prior_samples() {
        let home = tempfile::tempdir().unwrap();
        let settings = Settings::new(home.path(), Accelerator::Cpu);
        let run = trained_run(&settings);

        let written = DecodeUseCase::new(DecodeConfig {
            run,
            latents: None,
            samples: 2,
            out_dir: home.path().join("prior"),
        })
        .execute::<TestBackend>(&settings, Default::default())
        .unwrap();
        assert_eq!(written.len(), 2);
    }
}
