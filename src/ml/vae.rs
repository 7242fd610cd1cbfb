// ============================================================
// Layer 5 — Vae
// ============================================================
// The plain variational autoencoder: one network, MSE
// reconstruction, beta-weighted KL. Owns its run directory:
//
//   <model_root>/vae-<name>/<network>-b<beta>-lat<d>-lr<lr>-<date>/
//     params.json  latest.mpk  progress.csv  board/events.out.tfevents.*
//
// Training runs on the autodiff backend B; inference runs on
// `network.valid()` (B::InnerBackend) so no graph is recorded.
//
// Reference: Kingma & Welling (2014) Auto-Encoding Variational Bayes
//            Higgins et al. (2017) beta-VAE

use anyhow::{Context, Result};
use burn::{
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use chrono::Local;
use std::path::Path;

use crate::data::{
    batcher::ImageBatcher,
    dataset::{Batch, ImageDataset},
};
use crate::domain::{
    array::HostArray,
    error::VaeError,
    hyperparams::HyperParams,
    traits::Checkpointable,
};
use crate::infra::{
    checkpoint::CheckpointManager,
    settings::Settings,
    summary::SummaryWriter,
};
use crate::ml::{
    inferencer::{Inferencer, LatentStats},
    loss::vae_loss,
    model::{VaeNetwork, VaeNetworkConfig},
    trainer::{StepStats, TrainOptions, TrainReport, TrainStep, Trainer},
};

/// Tag saved at the end of every epoch
pub const LATEST: &str = "latest";

/// Mean losses over a held-out dataset
#[derive(Debug, Clone, PartialEq)]
pub struct EvalReport {
    pub samples:        usize,
    pub reconstruction: f64,
    pub kl:             f64,
    pub total:          f64,
}

pub struct Vae<B: AutodiffBackend> {
    params:      HyperParams,
    network:     VaeNetwork<B>,
    checkpoints: CheckpointManager,
    device:      B::Device,
}

impl<B: AutodiffBackend> Vae<B> {
    /// Start a fresh run under `<model_root>/vae-<name>/<run_id>/`.
    pub fn new(settings: &Settings, name: &str, params: HyperParams, device: B::Device) -> Result<Self> {
        let run_id = params.run_id(Local::now());
        Self::create_in(settings.vae_run_dir(name, &run_id), params, device)
    }

    /// Start a fresh run in an explicit directory; writes params.json.
    pub fn create_in(dir: impl AsRef<Path>, params: HyperParams, device: B::Device) -> Result<Self> {
        params.validate()?;
        let checkpoints = CheckpointManager::create(dir.as_ref())?;
        checkpoints.save_params(&params)?;

        let network = VaeNetworkConfig::from_params(&params).init(&device)?;
        tracing::info!("Created VAE run '{}'", checkpoints.dir().display());

        Ok(Self { params, network, checkpoints, device })
    }

    /// Reopen `<model_root>/vae-<name>/<run_id>/` from its params.json.
    /// Weights are not restored until `load(tag)` is called.
    pub fn open(settings: &Settings, name: &str, run_id: &str, device: B::Device) -> Result<Self> {
        Self::open_dir(settings.vae_run_dir(name, run_id), device)
    }

    pub fn open_dir(dir: impl AsRef<Path>, device: B::Device) -> Result<Self> {
        let checkpoints = CheckpointManager::open(dir.as_ref());
        let params = checkpoints.load_params()?;
        let network = VaeNetworkConfig::from_params(&params).init(&device)?;
        tracing::info!("Opened VAE run '{}' ({})", checkpoints.dir().display(), params.network);

        Ok(Self { params, network, checkpoints, device })
    }

    pub fn params(&self) -> &HyperParams {
        &self.params
    }

    pub fn run_dir(&self) -> &Path {
        self.checkpoints.dir()
    }

    pub fn latent_dim(&self) -> usize {
        self.params.latent_dim
    }

    // ─── Training ─────────────────────────────────────────────────────────────

    /// Train on `dataset`, shuffling it in place every epoch.
    /// A fresh Adam optimiser is created for every call.
    pub fn train(&mut self, dataset: &mut ImageDataset, options: TrainOptions) -> Result<TrainReport> {
        let run_dir = self.run_dir().to_path_buf();
        let sink = SummaryWriter::create(&run_dir)?;

        let mut session = VaeSession {
            optim:   AdamConfig::new().with_epsilon(1e-8).init::<B, VaeNetwork<B>>(),
            batcher: ImageBatcher::new(self.device.clone()),
            vae:     self,
        };

        Trainer::new(options, Box::new(sink)).fit(&mut session, dataset, &run_dir)
    }

    /// Mean reconstruction and KL over `dataset` without updating weights.
    pub fn evaluate(&self, dataset: &ImageDataset, batch_size: usize) -> Result<EvalReport> {
        if dataset.is_empty() {
            return Err(VaeError::EmptyDataset.into());
        }
        let network = self.network.valid();
        let batcher = ImageBatcher::<B::InnerBackend>::new(self.device.clone());

        let (mut rec, mut kl, mut total) = (0.0f64, 0.0f64, 0.0f64);
        for batch in dataset.batches(batch_size) {
            let x = batcher.frames(batch.data, &self.params.input_shape);
            let out = network.forward(x.clone());
            let terms = vae_loss(x, out.reconstruction, out.mu, out.logvar, self.params.beta);

            // weight by batch size so a short last batch counts less
            let w = batch.size as f64;
            rec   += w * terms.reconstruction.into_scalar().elem::<f64>();
            kl    += w * terms.kl.into_scalar().elem::<f64>();
            total += w * terms.total.into_scalar().elem::<f64>();
        }

        let n = dataset.len() as f64;
        let report = EvalReport {
            samples:        dataset.len(),
            reconstruction: rec / n,
            kl:             kl / n,
            total:          total / n,
        };
        tracing::info!(
            "Evaluated {} samples: rec={:.4} kl={:.4} total={:.4}",
            report.samples, report.reconstruction, report.kl, report.total,
        );
        Ok(report)
    }

    // ─── Inference ────────────────────────────────────────────────────────────

    pub fn inferencer(&self) -> Inferencer<B::InnerBackend> {
        Inferencer::new(self.network.valid(), self.params.input_shape, self.device.clone())
    }

    pub fn encode(&self, batch: HostArray) -> Result<LatentStats> {
        self.inferencer().encode(batch)
    }

    pub fn encode_and_sample(&self, batch: HostArray) -> Result<(LatentStats, HostArray)> {
        self.inferencer().encode_and_sample(batch)
    }

    pub fn decode(&self, latents: HostArray) -> Result<HostArray> {
        self.inferencer().decode(latents)
    }

    /// Sample z ~ N(mu, exp(logvar)) and decode it.
    pub fn decode_stats(&self, stats: &LatentStats) -> Result<HostArray> {
        self.inferencer().decode_stats(stats)
    }

    pub fn reconstruct(&self, batch: HostArray) -> Result<HostArray> {
        self.inferencer().reconstruct(batch)
    }
}

impl<B: AutodiffBackend> Checkpointable for Vae<B> {
    fn save(&self, tag: &str) -> Result<()> {
        self.checkpoints.save_weights::<B, _>(&self.network, tag)
    }

    fn load(&mut self, tag: &str) -> Result<()> {
        self.network = self
            .checkpoints
            .load_weights::<B, _>(self.network.clone(), tag, &self.device)
            .with_context(|| format!("Cannot restore VAE from '{}'", self.run_dir().display()))?;
        Ok(())
    }
}

// ─── Training session ─────────────────────────────────────────────────────────
/// Borrows the model for one `train` call together with its optimiser.
struct VaeSession<'a, B: AutodiffBackend, O: Optimizer<VaeNetwork<B>, B>> {
    vae:     &'a mut Vae<B>,
    optim:   O,
    batcher: ImageBatcher<B>,
}

impl<B: AutodiffBackend, O: Optimizer<VaeNetwork<B>, B>> TrainStep for VaeSession<'_, B, O> {
    fn latent_dim(&self) -> usize {
        self.vae.params.latent_dim
    }

    fn beta(&self) -> f64 {
        self.vae.params.beta
    }

    fn sample_dims(&self) -> Vec<usize> {
        self.vae.params.input_shape.dims().to_vec()
    }

    fn step(&mut self, batch: Batch<'_>) -> Result<StepStats> {
        let HyperParams { beta, lr, input_shape, .. } = self.vae.params;

        let x   = self.batcher.frames(batch.data, &input_shape);
        let out = self.vae.network.forward(x.clone());
        let terms = vae_loss(x, out.reconstruction, out.mu.clone(), out.logvar.clone(), beta);
        let stats = terms.stats(out.mu, out.logvar)?;

        // Backward pass + Adam update
        let grads = GradientsParams::from_grads(terms.total.backward(), &self.vae.network);
        self.vae.network = self.optim.step(lr, self.vae.network.clone(), grads);

        Ok(stats)
    }

    fn checkpoint(&mut self) -> Result<()> {
        self.vae.save(LATEST)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::Translations;
    use crate::domain::{
        hyperparams::{InputShape, Network},
        traits::DatasetSource,
    };
    use crate::infra::settings::Accelerator;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray>;

    fn params(latent_dim: usize) -> HyperParams {
        let mut p = HyperParams::new(InputShape::new(8, 8, 1));
        p.network    = Network::Dense;
        p.latent_dim = latent_dim;
        p.beta       = 1.0;
        p.lr         = 1e-3;
        p
    }

    fn sprites() -> ImageDataset {
        let shape = InputShape::new(8, 8, 1);
        let frames = Translations::new(shape, 3).with_stride(2).load().unwrap();
        ImageDataset::from_frames(frames, &shape).unwrap()
    }

    fn quiet(batch_size: usize, epochs: usize) -> TrainOptions {
        TrainOptions { batch_size, epochs, print_freq: None, show_progress: false, seed: Some(1) }
    }

    #[test]
    fn test_new_run_writes_params() {
        let home = tempfile::tempdir().unwrap();
        let settings = Settings::new(home.path(), Accelerator::Cpu);
        let vae = Vae::<TestBackend>::new(&settings, "sprites", params(4), Default::default()).unwrap();

        assert!(vae.run_dir().starts_with(home.path().join("models").join("vae-sprites")));
        let name = vae.run_dir().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("dense-b1-lat4-lr0.001-"), "run id was {name}");
        assert!(vae.run_dir().join("params.json").exists());
    }

    #[test]
    fn test_trained_weights_reload_with_identical_encoder() {
        let dir = tempfile::tempdir().unwrap();
        let mut vae = Vae::<TestBackend>::create_in(dir.path(), params(3), Default::default()).unwrap();
        let mut data = sprites();
        let batch = data.to_array().unwrap();
        let untrained = vae.encode(batch.clone()).unwrap();

        let report = vae.train(&mut data, quiet(4, 2)).unwrap();
        assert!(report.batches > 0);
        vae.save("snapshot").unwrap();

        let before = vae.encode(batch.clone()).unwrap();
        assert_ne!(before, untrained, "training moved the encoder");

        // reopening builds a freshly initialised network
        let mut reopened = Vae::<TestBackend>::open_dir(dir.path(), Default::default()).unwrap();
        assert_ne!(reopened.encode(batch.clone()).unwrap(), before);

        reopened.load("snapshot").unwrap();
        assert_eq!(reopened.encode(batch.clone()).unwrap(), before);

        // the end-of-epoch checkpoint holds the same weights
        let mut latest = Vae::<TestBackend>::open_dir(dir.path(), Default::default()).unwrap();
        latest.load(LATEST).unwrap();
        assert_eq!(latest.encode(batch).unwrap(), before);
    }

    #[test]
    fn test_training_writes_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let mut vae = Vae::<TestBackend>::create_in(dir.path(), params(2), Default::default()).unwrap();
        let mut data = sprites();
        let n = data.len();

        let report = vae.train(&mut data, quiet(4, 2)).unwrap();

        assert_eq!(report.samples_seen, 2 * n);
        assert!(report.last_epoch_loss.is_finite());
        assert_eq!(data.len(), n, "shuffle keeps every sample");
        assert!(dir.path().join("latest.mpk").exists());
        let board = std::fs::read_dir(dir.path().join("board")).unwrap();
        assert!(board
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .any(|name| name.starts_with("events.out.tfevents")));

        let csv = std::fs::read_to_string(dir.path().join("progress.csv")).unwrap();
        assert_eq!(csv.lines().count(), 1 + report.batches as usize);
    }

    #[test]
    fn test_decode_rejects_wrong_latent_width() {
        let dir = tempfile::tempdir().unwrap();
        let vae = Vae::<TestBackend>::create_in(dir.path(), params(5), Default::default()).unwrap();
        let err = vae.decode(HostArray::zeros([2, 3])).unwrap_err();
        assert_eq!(err.to_string(), "vae has latent space of 5, got 3");
    }

    #[test]
    fn test_open_without_params_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = Vae::<TestBackend>::open_dir(dir.path().join("missing"), Default::default())
            .err()
            .unwrap();
        assert!(matches!(err.downcast_ref::<VaeError>(), Some(VaeError::ParamsUnreadable { .. })));
    }

    #[test]
    fn test_evaluate_reports_finite_means() {
        let dir = tempfile::tempdir().unwrap();
        let vae = Vae::<TestBackend>::create_in(dir.path(), params(2), Default::default()).unwrap();
        let report = vae.evaluate(&sprites(), 5).unwrap();
        assert!(report.reconstruction > 0.0 && report.reconstruction.is_finite());
        assert!((report.total - (report.reconstruction + report.kl)).abs() < 1e-4);
    }
}
