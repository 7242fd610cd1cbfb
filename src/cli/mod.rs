// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses arguments with clap, builds the runtime Settings,
// picks the Burn backend and hands off to Layer 2. Results are
// printed here and nowhere else.
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, Autodiff, NdArray, Wgpu},
    tensor::backend::AutodiffBackend,
};
use clap::Parser;
use commands::{Commands, DecodeArgs, EncodeArgs, ResumeArgs, RetrainArgs, TrainArgs};
use std::path::PathBuf;

use crate::application::{
    inspect_use_case::{DecodeUseCase, EncodeUseCase, EncodedFrames},
    retrain_use_case::{RetrainOutcome, RetrainUseCase},
    train_use_case::{TrainOutcome, TrainUseCase},
};
use crate::infra::settings::{Accelerator, Settings};

#[derive(Parser, Debug)]
#[command(
    name = "pixel-vae",
    version,
    about = "Train beta-VAEs on pixel observations, then encode and decode with them."
)]
pub struct Cli {
    /// Root for models/ and chosen-ones/ [default: ~/.pixel-vae]
    #[arg(long, global = true, env = "PIXEL_VAE_HOME")]
    pub home: Option<PathBuf>,

    /// Device to compute on
    #[arg(long, global = true, value_enum, default_value = "cpu", env = "PIXEL_VAE_ACCELERATOR")]
    pub accelerator: Accelerator,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Build the settings and dispatch to the matching use case.
    pub fn run(self) -> Result<()> {
        let home = match self.home {
            Some(home) => home,
            None       => Settings::default_home()?,
        };
        let settings = Settings::new(home, self.accelerator);
        settings.announce();

        match self.command {
            Commands::Train(args)   => run_train(&settings, args),
            Commands::Resume(args)  => run_resume(&settings, args),
            Commands::Encode(args)  => run_encode(&settings, args),
            Commands::Decode(args)  => run_decode(&settings, args),
            Commands::Retrain(args) => run_retrain(&settings, args),
        }
    }
}

fn run_train(settings: &Settings, args: TrainArgs) -> Result<()> {
    tracing::info!("Starting {} training run '{}'", args.network, args.name);
    let outcome = on_backend(settings, &TrainUseCase::new(args.into()))?;
    print_train_outcome(&outcome);
    Ok(())
}

fn run_resume(settings: &Settings, args: ResumeArgs) -> Result<()> {
    tracing::info!("Resuming run '{}' from '{}'", args.run.run_id, args.run.tag);
    let outcome = on_backend(settings, &TrainUseCase::new(args.into()))?;
    print_train_outcome(&outcome);
    Ok(())
}

fn run_encode(settings: &Settings, args: EncodeArgs) -> Result<()> {
    let to_stdout = args.output.is_none();
    let encoded = on_backend(settings, &EncodeUseCase::new(args.into()))?;
    if to_stdout {
        println!("{}", serde_json::to_string_pretty(&encoded)?);
    } else {
        println!("Encoded {} frames.", encoded.mu.len());
    }
    Ok(())
}

fn run_decode(settings: &Settings, args: DecodeArgs) -> Result<()> {
    let written = on_backend(settings, &DecodeUseCase::new(args.into()))?;
    println!("Decoded {} frames.", written.len());
    Ok(())
}

fn run_retrain(settings: &Settings, args: RetrainArgs) -> Result<()> {
    tracing::info!("Retraining stacked VAE for '{}'", args.rl_path.display());
    let outcome = on_backend(settings, &RetrainUseCase::new(args.into()))?;
    println!(
        "Training complete: {} batches. Weights saved in '{}'.",
        outcome.report.batches,
        outcome.run_dir.display()
    );
    Ok(())
}

fn print_train_outcome(outcome: &TrainOutcome) {
    println!(
        "Training complete: {} batches, final epoch loss {:.4}. Run saved in '{}'.",
        outcome.report.batches,
        outcome.report.last_epoch_loss,
        outcome.run_dir.display()
    );
    if let Some(eval) = &outcome.evaluation {
        println!(
            "Held-out ({} frames): reconstruction={:.4} kl={:.4} total={:.4}",
            eval.samples, eval.reconstruction, eval.kl, eval.total
        );
    }
}

// ─── Backend dispatch ─────────────────────────────────────────────────────────
/// A use case that runs on any autodiff backend.
trait BackendTask {
    type Output;

    fn run<B: AutodiffBackend>(self, settings: &Settings, device: B::Device) -> Result<Self::Output>;
}

/// Runs `task` on the backend selected by `settings.accelerator`.
fn on_backend<T: BackendTask>(settings: &Settings, task: T) -> Result<T::Output> {
    match settings.accelerator {
        Accelerator::Cpu => task.run::<Autodiff<NdArray>>(settings, NdArrayDevice::default()),
        Accelerator::Gpu => task.run::<Autodiff<Wgpu>>(settings, WgpuDevice::default()),
    }
}

impl BackendTask for &TrainUseCase {
    type Output = TrainOutcome;

    fn run<B: AutodiffBackend>(self, settings: &Settings, device: B::Device) -> Result<TrainOutcome> {
        self.execute::<B>(settings, device)
    }
}

impl BackendTask for &RetrainUseCase {
    type Output = RetrainOutcome;

    fn run<B: AutodiffBackend>(self, settings: &Settings, device: B::Device) -> Result<RetrainOutcome> {
        self.execute::<B>(settings, device)
    }
}

impl BackendTask for &EncodeUseCase {
    type Output = EncodedFrames;

    fn run<B: AutodiffBackend>(self, settings: &Settings, device: B::Device) -> Result<EncodedFrames> {
        self.execute::<B>(settings, device)
    }
}

impl BackendTask for &DecodeUseCase {
    type Output = Vec<PathBuf>;

    fn run<B: AutodiffBackend>(self, settings: &Settings, device: B::Device) -> Result<Vec<PathBuf>> {
        self.execute::<B>(settings, device)
    }
}
