// ============================================================
// Layer 5 — StackedVae
// ============================================================
// A VAE trained on stacks of k consecutive frames. One shared
// network encodes every frame position; losses are averaged
// over the k positions:
//
//   rec = mean_k( mean BCE(x_i, x̂_i) * h² )     (h² only if scaled_re_loss)
//   kl  = mean_k( kl_per_dim_i )
//   total = rec + beta * Σ kl
//
// The concatenated means U = [mu_0 | mu_1 | … | mu_{k-1}] of shape
// (n, k * d) are the state representation handed to an RL agent.
//
// Run directory: <rl_path>/vae/
//   params.json       ← written unless parameters are adopted
//   weights.mpk       ← saved at the end of every epoch
//   base_weights.mpk  ← snapshot of the warm-start weights
//   params_old.json   ← warm-start record that was not adopted

use anyhow::{Context, Result};
use burn::{
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use std::path::Path;

use crate::data::{
    batcher::ImageBatcher,
    dataset::{Batch, ImageDataset},
    preprocessor::expand_stacked_batch,
};
use crate::domain::{
    array::HostArray,
    error::{VaeError, VaeResult},
    hyperparams::{HyperParams, InputShape},
    traits::Checkpointable,
};
use crate::infra::{
    checkpoint::{CheckpointManager, PARAMS_FILE},
    settings::Settings,
    summary::SummaryWriter,
};
use crate::ml::{
    inferencer::{Inferencer, LatentStats},
    loss::{stacked_loss, FrameTerms},
    model::{VaeNetwork, VaeNetworkConfig},
    trainer::{StepStats, TrainOptions, TrainReport, TrainStep, Trainer},
};

/// Tag saved at the end of every epoch and loaded when warm-starting
pub const WEIGHTS: &str = "weights";
/// Snapshot of the warm-start weights before any retraining
pub const BASE_WEIGHTS: &str = "base_weights";
const OLD_PARAMS_FILE: &str = "params_old.json";

/// Where a stacked VAE takes its initial weights from.
#[derive(Debug, Clone, Default)]
pub struct WarmStart {
    /// Directory name under the chosen root
    pub init_from:  Option<String>,
    /// Adopt the source run's hyperparameters instead of the given ones
    pub with_attrs: bool,
}

/// Encodings of a batch of stacks.
#[derive(Debug, Clone, PartialEq)]
pub struct StackedLatents {
    /// One entry per frame position, each (n, d)
    pub frames: Vec<LatentStats>,
    /// Concatenated means, (n, k * d)
    pub u:      HostArray,
}

pub struct StackedVae<B: AutodiffBackend> {
    params:      HyperParams,
    k:           usize,
    network:     VaeNetwork<B>,
    checkpoints: CheckpointManager,
    device:      B::Device,
}

impl<B: AutodiffBackend> StackedVae<B> {
    pub fn new(
        settings: &Settings,
        rl_path:  &Path,
        params:   HyperParams,
        warm:     WarmStart,
        device:   B::Device,
    ) -> Result<Self> {
        if warm.with_attrs && warm.init_from.is_none() {
            return Err(VaeError::InvalidParams(
                "with_attrs needs init_from: there are no weights to take attributes from".into(),
            )
            .into());
        }
        params.validate()?;
        let k = params
            .k
            .ok_or_else(|| VaeError::InvalidParams("stacked VAE needs k".into()))?;

        let checkpoints = CheckpointManager::create(rl_path.join("vae"))?;
        tracing::info!("Storing files under '{}'", checkpoints.dir().display());

        let Some(init_from) = warm.init_from else {
            checkpoints.save_params(&params)?;
            let network = VaeNetworkConfig::from_params(&params).init(&device)?;
            log_params(&params);
            return Ok(Self { params, k, network, checkpoints, device });
        };

        let source_dir = settings.chosen_dir(&init_from);
        let source     = CheckpointManager::open(&source_dir);

        let params = if warm.with_attrs {
            tracing::info!("Using parameters from '{}'", source_dir.display());
            let mut adopted = source.load_params()?;
            adopted.k.get_or_insert(k);
            checkpoints.import_params(&source_dir, PARAMS_FILE)?;
            adopted
        } else {
            check_weights_fit(&source.load_params()?, &params)?;
            checkpoints.save_params(&params)?;
            checkpoints.import_params(&source_dir, OLD_PARAMS_FILE)?;
            tracing::info!("Keeping new parameters");
            params
        };
        let k = params.k.unwrap_or(k);

        let network = VaeNetworkConfig::from_params(&params).init::<B>(&device)?;
        let network = source
            .load_weights::<B, _>(network, WEIGHTS, &device)
            .with_context(|| format!("Cannot warm-start from '{}'", source_dir.display()))?;

        let vae = Self { params, k, network, checkpoints, device };
        vae.save(BASE_WEIGHTS)?;
        vae.save(WEIGHTS)?;
        log_params(&vae.params);
        Ok(vae)
    }

    pub fn params(&self) -> &HyperParams {
        &self.params
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn run_dir(&self) -> &Path {
        self.checkpoints.dir()
    }

    pub fn latent_dim(&self) -> usize {
        self.params.latent_dim
    }

    /// Cross-entropy multiplier: h² when scaled, else 1.
    fn rec_scale(&self) -> f64 {
        if self.params.scaled_re_loss {
            (self.params.input_shape.height * self.params.input_shape.height) as f64
        } else {
            1.0
        }
    }

    // ─── Training ─────────────────────────────────────────────────────────────

    /// `dataset` must hold stacks of shape (k, h, w, c).
    pub fn train(&mut self, dataset: &mut ImageDataset, options: TrainOptions) -> Result<TrainReport> {
        let run_dir = self.run_dir().to_path_buf();
        let sink = SummaryWriter::create(&run_dir)?;

        let mut session = StackedSession {
            optim:   AdamConfig::new().with_epsilon(1e-8).init::<B, VaeNetwork<B>>(),
            batcher: ImageBatcher::new(self.device.clone()),
            scale:   self.rec_scale(),
            vae:     self,
        };

        Trainer::new(options, Box::new(sink)).fit(&mut session, dataset, &run_dir)
    }

    // ─── Inference ────────────────────────────────────────────────────────────

    fn inferencer(&self) -> Inferencer<B::InnerBackend> {
        Inferencer::new(self.network.valid(), self.params.input_shape, self.device.clone())
    }

    /// Encode single frames (rank 2–4) with the shared network.
    pub fn encode(&self, batch: HostArray) -> Result<LatentStats> {
        self.inferencer().encode(batch)
    }

    /// Encode (n, k, h, w, c) stacks frame position by frame position.
    /// Lower-rank input is read as single frames, giving one position.
    pub fn encode_stacked(&self, batch: HostArray) -> Result<StackedLatents> {
        let stacks = expand_stacked_batch(batch, &self.params.input_shape, self.k)?;
        stacks.check_normalized()?;

        // single frames arrive as stacks of one
        let positions  = stacks.dims()[1];
        let inferencer = self.inferencer();
        let frames = (0..positions)
            .map(|j| inferencer.encode(frame_position(&stacks, j, &self.params.input_shape)?))
            .collect::<Result<Vec<_>>>()?;

        let mus: Vec<&HostArray> = frames.iter().map(|s| &s.mu).collect();
        let u = concat_columns(&mus)?;
        Ok(StackedLatents { frames, u })
    }

    /// Decode latent vectors (d) or (n, d).
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

    /// Reconstruction of the first frame of every stack.
    pub fn reconstruct_stacked(&self, batch: HostArray) -> Result<HostArray> {
        let stacks = expand_stacked_batch(batch, &self.params.input_shape, self.k)?;
        self.inferencer()
            .reconstruct(frame_position(&stacks, 0, &self.params.input_shape)?)
    }
}

impl<B: AutodiffBackend> Checkpointable for StackedVae<B> {
    fn save(&self, tag: &str) -> Result<()> {
        self.checkpoints.save_weights::<B, _>(&self.network, tag)
    }

    fn load(&mut self, tag: &str) -> Result<()> {
        self.network = self
            .checkpoints
            .load_weights::<B, _>(self.network.clone(), tag, &self.device)?;
        Ok(())
    }
}

fn log_params(params: &HyperParams) {
    tracing::info!(
        "Stacked VAE: network={} latent_dim={} beta={} k={:?} shape={} scaled_re_loss={}",
        params.network, params.latent_dim, params.beta, params.k, params.input_shape, params.scaled_re_loss,
    );
}

/// Weights saved under `source` only load into a network built from the
/// same architecture, latent width and frame shape.
fn check_weights_fit(source: &HyperParams, params: &HyperParams) -> VaeResult<()> {
    let clash = |what: &str, old: String, new: String| {
        Err(VaeError::InvalidParams(format!(
            "cannot warm-start: source {what} is {old} but {new} was requested"
        )))
    };
    if source.network != params.network {
        return clash("network", source.network.to_string(), params.network.to_string());
    }
    if source.latent_dim != params.latent_dim {
        return clash("latent_dim", source.latent_dim.to_string(), params.latent_dim.to_string());
    }
    if source.input_shape != params.input_shape {
        return clash("input shape", source.input_shape.to_string(), params.input_shape.to_string());
    }
    Ok(())
}

/// Frame `j` of every stack in an (n, k, h, w, c) array → (n, h, w, c)
fn frame_position(stacks: &HostArray, j: usize, shape: &InputShape) -> VaeResult<HostArray> {
    let frame_len = shape.frame_len();
    let k = stacks.dims()[1];
    let mut data = Vec::with_capacity(stacks.len() * frame_len);
    for stack in stacks.data().chunks(k * frame_len) {
        data.extend_from_slice(&stack[j * frame_len..(j + 1) * frame_len]);
    }
    HostArray::new(data, [stacks.len(), shape.height, shape.width, shape.channels])
}

/// Join (n, d_i) arrays side by side → (n, Σ d_i)
fn concat_columns(parts: &[&HostArray]) -> VaeResult<HostArray> {
    let n = parts.first().map_or(0, |p| p.len());
    let width: usize = parts.iter().map(|p| p.dims()[1]).sum();

    let mut data = Vec::with_capacity(n * width);
    for i in 0..n {
        for part in parts {
            data.extend_from_slice(part.row(i));
        }
    }
    HostArray::new(data, [n, width])
}

// ─── Training session ─────────────────────────────────────────────────────────
struct StackedSession<'a, B: AutodiffBackend, O: Optimizer<VaeNetwork<B>, B>> {
    vae:     &'a mut StackedVae<B>,
    optim:   O,
    batcher: ImageBatcher<B>,
    scale:   f64,
}

impl<B: AutodiffBackend, O: Optimizer<VaeNetwork<B>, B>> TrainStep for StackedSession<'_, B, O> {
    fn latent_dim(&self) -> usize {
        self.vae.params.latent_dim
    }

    fn beta(&self) -> f64 {
        self.vae.params.beta
    }

    fn sample_dims(&self) -> Vec<usize> {
        let mut dims = vec![self.vae.k];
        dims.extend(self.vae.params.input_shape.dims());
        dims
    }

    fn step(&mut self, batch: Batch<'_>) -> Result<StepStats> {
        let HyperParams { beta, lr, input_shape, .. } = self.vae.params;

        let mut frames  = Vec::with_capacity(self.vae.k);
        let mut mus     = Vec::with_capacity(self.vae.k);
        let mut logvars = Vec::with_capacity(self.vae.k);
        for x in self.batcher.stacked(batch.data, self.vae.k, &input_shape) {
            let out = self.vae.network.forward(x.clone());
            mus.push(out.mu.clone());
            logvars.push(out.logvar.clone());
            frames.push(FrameTerms {
                input:          x,
                reconstruction: out.reconstruction,
                mu:             out.mu,
                logvar:         out.logvar,
            });
        }

        let terms = stacked_loss(frames, self.scale, beta)?;
        let stats = terms.stats(Tensor::cat(mus, 0), Tensor::cat(logvars, 0))?;

        let grads = GradientsParams::from_grads(terms.total.backward(), &self.vae.network);
        self.vae.network = self.optim.step(lr, self.vae.network.clone(), grads);

        Ok(stats)
    }

    fn checkpoint(&mut self) -> Result<()> {
        self.vae.save(WEIGHTS)
    }

    fn loss_column(&self) -> &'static str {
        "rec-loss"
    }

    fn progress_loss(&self, stats: &StepStats) -> f64 {
        stats.reconstruction
    }
}
