// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Generic epoch/batch loop shared by the plain and stacked VAE.
// The model side is abstracted behind `TrainStep`: one call does
// forward + loss + backward + Adam update on one batch and
// reports host-side statistics. Everything else lives here:
//
//   - in-place shuffle of the dataset at the start of every epoch
//   - throughput  = batches_done / elapsed_secs
//   - ETA         = (total_batches - batches_done) / throughput
//                   total_batches = ceil(n / batch_size) * epochs
//   - progress table every `print_freq` batches
//   - progress.csv row and scalar summaries after every batch
//   - checkpoint at the end of every epoch
//
// State machine:
//   Uninitialized → Ready → Training ⇄ Checkpointed → Done
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use anyhow::{Context, Result};
use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use rand::{rngs::StdRng, SeedableRng};
use std::{path::Path, time::Instant};

use crate::data::dataset::{Batch, ImageDataset};
use crate::domain::{error::VaeError, traits::ScalarSink};
use crate::infra::metrics::{BatchMetrics, ProgressLog};

// ─── Options ──────────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub batch_size:    usize,
    pub epochs:        usize,
    /// Print a progress table every N batches; never when None
    pub print_freq:    Option<usize>,
    /// Draw an indicatif bar per epoch
    pub show_progress: bool,
    /// Fixed seed for the per-epoch shuffles
    pub seed:          Option<u64>,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            batch_size:    64,
            epochs:        1,
            print_freq:    Some(100),
            show_progress: true,
            seed:          None,
        }
    }
}

// ─── Step statistics ──────────────────────────────────────────────────────────
/// Host-side numbers from one optimisation step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepStats {
    pub loss:           f64,
    pub reconstruction: f64,
    /// Σ_j kl_j, unscaled by beta
    pub kl:             f64,
    pub kl_per_dim:     Vec<f64>,
    /// batch mean of mu per latent dimension
    pub mu_mean:        Vec<f64>,
    /// batch mean of the posterior std exp(0.5 * logvar) per latent dimension
    pub sigma_mean:     Vec<f64>,
}

/// One model's view of training.
pub trait TrainStep {
    fn latent_dim(&self) -> usize;

    fn beta(&self) -> f64;

    /// Shape of one dataset sample the model accepts.
    fn sample_dims(&self) -> Vec<usize>;

    /// Forward, loss, backward and one optimiser update.
    fn step(&mut self, batch: Batch<'_>) -> Result<StepStats>;

    /// End-of-epoch save.
    fn checkpoint(&mut self) -> Result<()>;

    /// Name of the fourth progress.csv column.
    fn loss_column(&self) -> &'static str {
        "loss"
    }

    /// Value written to that column.
    fn progress_loss(&self, stats: &StepStats) -> f64 {
        stats.loss
    }
}

// ─── State ────────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainState {
    Uninitialized,
    Ready,
    Training,
    Checkpointed,
    Done,
}

/// Summary of a finished `fit` call.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainReport {
    pub epochs:          usize,
    pub batches:         u64,
    pub samples_seen:    usize,
    /// Mean step loss over the last epoch
    pub last_epoch_loss: f64,
}

// ─── Trainer ──────────────────────────────────────────────────────────────────
pub struct Trainer {
    options: TrainOptions,
    state:   TrainState,
    sink:    Box<dyn ScalarSink>,
}

impl Trainer {
    pub fn new(options: TrainOptions, sink: Box<dyn ScalarSink>) -> Self {
        Self { options, state: TrainState::Uninitialized, sink }
    }

    pub fn state(&self) -> TrainState {
        self.state
    }

    fn transition(&mut self, next: TrainState) {
        tracing::debug!("Training state {:?} → {:?}", self.state, next);
        self.state = next;
    }

    /// Checks the dataset against the model before the first step.
    fn prepare<S: TrainStep>(&mut self, model: &S, dataset: &ImageDataset) -> Result<()> {
        if self.options.batch_size == 0 || self.options.epochs == 0 {
            return Err(VaeError::InvalidParams("batch_size and epochs must be positive".into()).into());
        }
        if dataset.is_empty() {
            return Err(VaeError::EmptyDataset.into());
        }
        let expected = model.sample_dims();
        if dataset.sample_dims() != expected.as_slice() {
            return Err(VaeError::ShapeMismatch {
                expected,
                actual: dataset.sample_dims().to_vec(),
            }
            .into());
        }
        self.transition(TrainState::Ready);
        Ok(())
    }

    /// Run `epochs` passes over `dataset`, shuffling it in place.
    /// Progress rows go to `<run_dir>/progress.csv`.
    pub fn fit<S: TrainStep>(
        &mut self,
        model:   &mut S,
        dataset: &mut ImageDataset,
        run_dir: &Path,
    ) -> Result<TrainReport> {
        self.prepare(model, dataset)?;

        let mut progress = ProgressLog::create(run_dir, model.loss_column(), model.latent_dim())?;
        let mut rng = match self.options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None       => StdRng::from_entropy(),
        };

        let batch_size        = self.options.batch_size;
        let epochs            = self.options.epochs;
        let batches_per_epoch = dataset.num_batches(batch_size);
        let total_batches     = (batches_per_epoch * epochs) as u64;

        tracing::info!(
            "Training on {} samples: {} epochs × {} batches of ≤{}",
            dataset.len(), epochs, batches_per_epoch, batch_size,
        );

        let start = Instant::now();
        let mut batches_done    = 0u64;
        let mut samples_seen    = 0usize;
        let mut last_epoch_loss = f64::NAN;

        for epoch in 0..epochs {
            self.transition(TrainState::Training);
            dataset.shuffle(&mut rng);

            let bar = self.progress_bar(batches_per_epoch)?;
            let mut epoch_loss = 0.0f64;
            let mut epoch_batches = 0usize;

            for (i, batch) in dataset.batches(batch_size).enumerate() {
                let stats = model
                    .step(batch)
                    .with_context(|| format!("Training step failed at epoch {epoch}, batch {i}"))?;

                let step = batches_done;
                batches_done  += 1;
                samples_seen  += batch.size;
                epoch_loss    += stats.loss;
                epoch_batches += 1;

                let bps = batches_done as f64 / start.elapsed().as_secs_f64().max(1e-9);
                let eta = (total_batches - batches_done) as f64 / bps;

                progress.log(&BatchMetrics {
                    timestamp:  Local::now(),
                    epoch,
                    batch:      step,
                    loss:       model.progress_loss(&stats),
                    kl_loss:    stats.kl,
                    kl_per_dim: stats.kl_per_dim.clone(),
                })?;
                self.write_summaries(step, epoch, bps, model.beta(), &stats)?;

                if let Some(freq) = self.options.print_freq {
                    if freq > 0 && i % freq == 0 {
                        let table = progress_table(epoch, epochs, i, batches_per_epoch, &stats, bps, eta);
                        if bar.is_hidden() {
                            println!("{table}");
                        } else {
                            bar.println(table);
                        }
                    }
                }

                bar.set_message(format!("loss={:.4}", stats.loss));
                bar.inc(1);
            }
            bar.finish_and_clear();

            last_epoch_loss = epoch_loss / epoch_batches.max(1) as f64;
            println!(
                "Epoch {:>3}/{} | loss={:.4} | {:.1} batch/s",
                epoch + 1,
                epochs,
                last_epoch_loss,
                batches_done as f64 / start.elapsed().as_secs_f64().max(1e-9),
            );

            model.checkpoint()?;
            self.sink.flush()?;
            self.transition(TrainState::Checkpointed);
        }

        self.transition(TrainState::Done);
        tracing::info!("Training complete after {} batches", batches_done);

        Ok(TrainReport { epochs, batches: batches_done, samples_seen, last_epoch_loss })
    }

    fn progress_bar(&self, len: usize) -> Result<ProgressBar> {
        if !self.options.show_progress {
            return Ok(ProgressBar::hidden());
        }
        let bar = ProgressBar::new(len as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("  {bar:40.cyan/blue} {pos}/{len} [{elapsed_precise}] {msg}")?,
        );
        Ok(bar)
    }

    fn write_summaries(&mut self, step: u64, epoch: usize, bps: f64, beta: f64, stats: &StepStats) -> Result<()> {
        let sink = self.sink.as_mut();

        sink.scalar("batches-per-second", step, bps)?;
        sink.scalar("episode", step, epoch as f64)?;
        sink.scalar("loss/scaled-kl", step, beta * stats.kl)?;
        sink.scalar("loss/reconstruction-loss", step, stats.reconstruction)?;
        sink.scalar("loss/total-loss", step, stats.loss)?;
        sink.scalar("loss/mean-dkl", step, stats.kl)?;

        for (i, kl) in stats.kl_per_dim.iter().enumerate() {
            sink.scalar(&format!("zj_kl/z{i}-kl"), step, *kl)?;
        }
        for (i, mu) in stats.mu_mean.iter().enumerate() {
            sink.scalar(&format!("zj_mu/z{i}-mu"), step, *mu)?;
        }
        for (i, sigma) in stats.sigma_mean.iter().enumerate() {
            sink.scalar(&format!("zj_var/z{i}-var"), step, *sigma)?;
        }
        Ok(())
    }
}

// ─── Formatting ───────────────────────────────────────────────────────────────
fn progress_table(
    epoch:   usize,
    epochs:  usize,
    batch:   usize,
    batches: usize,
    stats:   &StepStats,
    bps:     f64,
    eta:     f64,
) -> String {
    let per_dim = stats
        .kl_per_dim
        .iter()
        .map(|kl| format!("{kl:.3}"))
        .collect::<Vec<_>>()
        .join(" ");

    format!(
        "Epoch {:>3}/{} | batch {:>5}/{} | loss={:.4} | rec={:.4} | kl={:.4} | {:.1} batch/s | ETA {}\n  kl/dim: [{}]",
        epoch + 1, epochs, batch + 1, batches,
        stats.loss, stats.reconstruction, stats.kl,
        bps, format_eta(eta), per_dim,
    )
}

/// Seconds → "HH:MM:SS"
pub fn format_eta(secs: f64) -> String {
    if !secs.is_finite() || secs < 0.0 {
        return "--:--:--".to_string();
    }
    let secs = secs.round() as u64;
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{array::HostArray, hyperparams::InputShape, traits::NullSink};

    /// Counts steps and checkpoints without touching a backend.
    struct CountingModel {
        steps:       usize,
        samples:     usize,
        checkpoints: usize,
        fail_at:     Option<usize>,
    }

    impl CountingModel {
        fn new() -> Self {
            Self { steps: 0, samples: 0, checkpoints: 0, fail_at: None }
        }
    }

    impl TrainStep for CountingModel {
        fn latent_dim(&self) -> usize { 2 }
        fn beta(&self) -> f64 { 1.0 }
        fn sample_dims(&self) -> Vec<usize> { vec![2, 2, 1] }

        fn step(&mut self, batch: Batch<'_>) -> Result<StepStats> {
            if Some(self.steps) == self.fail_at {
                anyhow::bail!("backend failure");
            }
            self.steps   += 1;
            self.samples += batch.size;
            Ok(StepStats {
                loss:           1.0,
                reconstruction: 0.5,
                kl:             0.5,
                kl_per_dim:     vec![0.25, 0.25],
                mu_mean:        vec![0.0, 0.0],
                sigma_mean:     vec![1.0, 1.0],
            })
        }

        fn checkpoint(&mut self) -> Result<()> {
            self.checkpoints += 1;
            Ok(())
        }
    }

    fn dataset(n: usize) -> ImageDataset {
        let array = HostArray::new(vec![0.5; n * 4], [n, 2, 2, 1]).unwrap();
        ImageDataset::from_frames(array, &InputShape::new(2, 2, 1)).unwrap()
    }

    fn options(batch_size: usize, epochs: usize) -> TrainOptions {
        TrainOptions { batch_size, epochs, print_freq: None, show_progress: false, seed: Some(7) }
    }

    #[test]
    fn test_every_sample_processed_once_per_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = CountingModel::new();
        let mut ds = dataset(10);
        let mut trainer = Trainer::new(options(4, 3), Box::new(NullSink));

        let report = trainer.fit(&mut model, &mut ds, dir.path()).unwrap();

        assert_eq!(model.steps, 9, "ceil(10 / 4) batches per epoch");
        assert_eq!(model.samples, 30);
        assert_eq!(model.checkpoints, 3);
        assert_eq!(report.batches, 9);
        assert_eq!(trainer.state(), TrainState::Done);
    }

    #[test]
    fn test_progress_log_has_row_per_batch() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = CountingModel::new();
        let mut ds = dataset(5);
        Trainer::new(options(2, 2), Box::new(NullSink))
            .fit(&mut model, &mut ds, dir.path())
            .unwrap();

        let text = std::fs::read_to_string(dir.path().join("progress.csv")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "date,#episode,#batch,loss,kl-loss,z0-kl,z1-kl");
        assert_eq!(lines.len(), 1 + 6);
    }

    /// Records every scalar; clones share one log.
    #[derive(Default, Clone)]
    struct RecordingSink(std::rc::Rc<std::cell::RefCell<Vec<(String, u64, f64)>>>);

    impl ScalarSink for RecordingSink {
        fn scalar(&mut self, tag: &str, step: u64, value: f64) -> Result<()> {
            self.0.borrow_mut().push((tag.to_string(), step, value));
            Ok(())
        }
    }

    #[test]
    fn test_summaries_per_batch() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RecordingSink::default();
        let mut model = CountingModel::new();
        let mut ds = dataset(4);
        Trainer::new(options(2, 1), Box::new(sink.clone()))
            .fit(&mut model, &mut ds, dir.path())
            .unwrap();

        let events = sink.0.borrow();
        let value = |tag: &str, step: u64| {
            events
                .iter()
                .find(|(t, s, _)| t == tag && *s == step)
                .map(|(_, _, v)| *v)
                .unwrap_or_else(|| panic!("no {tag} at step {step}"))
        };
        assert_eq!(value("loss/total-loss", 1), 1.0);
        assert_eq!(value("loss/mean-dkl", 0), 0.5, "summed KL, not averaged over dims");
        assert_eq!(value("loss/scaled-kl", 0), 0.5);
        assert_eq!(value("zj_kl/z1-kl", 0), 0.25);
        assert_eq!(value("zj_var/z0-var", 1), 1.0);
    }

    #[test]
    fn test_shape_mismatch_fails_before_first_step() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = CountingModel::new();
        let array = HostArray::new(vec![0.5; 18], [2, 3, 3, 1]).unwrap();
        let mut ds = ImageDataset::from_frames(array, &InputShape::new(3, 3, 1)).unwrap();

        let mut trainer = Trainer::new(options(2, 1), Box::new(NullSink));
        let err = trainer.fit(&mut model, &mut ds, dir.path()).unwrap_err();

        assert!(matches!(err.downcast_ref::<VaeError>(), Some(VaeError::ShapeMismatch { .. })));
        assert_eq!(model.steps, 0);
        assert_eq!(trainer.state(), TrainState::Uninitialized);
    }

    #[test]
    fn test_failing_step_aborts_without_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = CountingModel::new();
        model.fail_at = Some(1);
        let mut ds = dataset(8);

        let result = Trainer::new(options(2, 2), Box::new(NullSink)).fit(&mut model, &mut ds, dir.path());

        assert!(result.is_err());
        assert_eq!(model.steps, 1);
        assert_eq!(model.checkpoints, 0);
    }

    #[test]
    fn test_format_eta() {
        assert_eq!(format_eta(3725.4), "01:02:05");
        assert_eq!(format_eta(0.0), "00:00:00");
        assert_eq!(format_eta(f64::INFINITY), "--:--:--");
    }
}
