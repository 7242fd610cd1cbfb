// ============================================================
// Layer 6 — Runtime Settings
// ============================================================
// Where runs live on disk and which device computes them. Built
// once by the CLI and passed down explicitly.
//
//   <home>/models/vae-<name>/<run_id>/   ← plain VAE runs
//   <home>/chosen-ones/<id>/            ← curated runs used to
//                                         warm-start stacked VAEs

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

const HOME_DIR: &str = ".pixel-vae";

/// Device family a run computes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum Accelerator {
    /// burn NdArray backend on the CPU
    Cpu,
    /// burn Wgpu backend on the default adapter
    Gpu,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub model_root:  PathBuf,
    pub chosen_root: PathBuf,
    pub accelerator: Accelerator,
}

impl Settings {
    pub fn new(home: impl AsRef<Path>, accelerator: Accelerator) -> Self {
        let home = home.as_ref();
        Self {
            model_root:  home.join("models"),
            chosen_root: home.join("chosen-ones"),
            accelerator,
        }
    }

    /// `<home>/.pixel-vae` for the current user.
    pub fn default_home() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .context("Cannot locate the home directory; pass --home or set PIXEL_VAE_HOME")?;
        Ok(home.join(HOME_DIR))
    }

    pub fn vae_run_dir(&self, name: &str, run_id: &str) -> PathBuf {
        self.model_root.join(format!("vae-{name}")).join(run_id)
    }

    pub fn chosen_dir(&self, id: &str) -> PathBuf {
        self.chosen_root.join(id)
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.model_root, &self.chosen_root] {
            fs::create_dir_all(dir)
                .with_context(|| format!("Cannot create '{}'", dir.display()))?;
        }
        Ok(())
    }

    /// Report which device was selected; CPU training is slow enough
    /// to warrant a warning.
    pub fn announce(&self) {
        match self.accelerator {
            Accelerator::Gpu => tracing::info!("Using GPU (wgpu) for training."),
            Accelerator::Cpu => tracing::warn!("Only training on CPU."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_layout() {
        let settings = Settings::new("/tmp/pv", Accelerator::Cpu);
        assert_eq!(
            settings.vae_run_dir("sprites", "dense-b1-lat5-lr0.001-2024-01-01T00:00"),
            PathBuf::from("/tmp/pv/models/vae-sprites/dense-b1-lat5-lr0.001-2024-01-01T00:00")
        );
        assert_eq!(settings.chosen_dir("pend"), PathBuf::from("/tmp/pv/chosen-ones/pend"));
    }

    #[test]
    fn test_default_home_is_absolute() {
        let home = Settings::default_home().unwrap();
        assert!(home.is_absolute(), "got {}", home.display());
        assert!(home.ends_with(".pixel-vae"));
    }
}
