// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores everything that belongs to one run directory:
//
//   <run_dir>/
//     params.json        ← hyperparameter record
//     <tag>.mpk          ← network parameters saved under <tag>
//     params_old.json    ← record of a warm-start source that was
//                          not adopted (stacked VAE only)
//
// Weights use Burn's NamedMpkFileRecorder at full precision so a
// save → load round trip reproduces the parameters bit for bit.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{bail, Context, Result};
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::domain::{
    error::{VaeError, VaeResult},
    hyperparams::HyperParams,
};

pub const PARAMS_FILE: &str = "params.json";

type WeightsRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

/// Manages one run directory.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Use `dir` as a run directory, creating it if needed.
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create run directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    /// Use an existing run directory without touching the filesystem.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn params_path(&self) -> PathBuf {
        self.dir.join(PARAMS_FILE)
    }

    pub fn save_params(&self, params: &HyperParams) -> Result<()> {
        let path = self.params_path();
        let json = serde_json::to_string_pretty(params)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write params to '{}'", path.display()))?;
        tracing::debug!("Saved hyperparameters to '{}'", path.display());
        Ok(())
    }

    /// Read and validate params.json. Any failure is reported as
    /// `ParamsUnreadable`; there is no partial recovery.
    pub fn load_params(&self) -> VaeResult<HyperParams> {
        let path = self.params_path();
        let unreadable = |reason: String| VaeError::ParamsUnreadable { path: path.clone(), reason };

        let json = fs::read_to_string(&path).map_err(|e| unreadable(e.to_string()))?;
        HyperParams::from_json(&json).map_err(|e| unreadable(e.to_string()))
    }

    /// Copy another run's params.json into this directory as `file_name`.
    pub fn import_params(&self, source_dir: &Path, file_name: &str) -> Result<()> {
        let from = source_dir.join(PARAMS_FILE);
        let to   = self.dir.join(file_name);
        fs::copy(&from, &to)
            .with_context(|| format!("Cannot copy '{}' to '{}'", from.display(), to.display()))?;
        Ok(())
    }

    /// Path of the weights saved under `tag` (without extension; the
    /// recorder appends it).
    pub fn weights_stem(&self, tag: &str) -> PathBuf {
        self.dir.join(tag)
    }

    pub fn save_weights<B: Backend, M: Module<B>>(&self, module: &M, tag: &str) -> Result<()> {
        check_tag(tag)?;
        let path = self.weights_stem(tag);

        Recorder::<B>::record(&WeightsRecorder::new(), module.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save weights to '{}'", path.display()))?;

        tracing::info!("Saving weights '{}'", tag);
        Ok(())
    }

    /// Restore weights saved under `tag` into `module`.
    /// The module must have the architecture the weights were saved from.
    pub fn load_weights<B: Backend, M: Module<B>>(
        &self,
        module: M,
        tag:    &str,
        device: &B::Device,
    ) -> Result<M> {
        check_tag(tag)?;
        let path = self.weights_stem(tag);

        let record: M::Record = Recorder::<B>::load(&WeightsRecorder::new(), path.clone(), device)
            .with_context(|| format!("Cannot load weights '{}'", path.display()))?;

        tracing::info!("Loading weights from '{}'", tag);
        Ok(module.load_record(record))
    }
}

/// Tags become file names: no separators, no extension.
fn check_tag(tag: &str) -> Result<()> {
    if tag.is_empty() || tag.contains(['/', '\\', '.']) {
        bail!("Invalid checkpoint tag '{tag}'");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::hyperparams::{InputShape, Network};

    fn params() -> HyperParams {
        let mut p = HyperParams::new(InputShape::new(8, 8, 1));
        p.network = Network::Dense;
        p
    }

    #[test]
    fn test_params_round_trip() {
        let dir  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::create(dir.path().join("run")).unwrap();
        ckpt.save_params(&params()).unwrap();
        assert_eq!(ckpt.load_params().unwrap(), params());
    }

    #[test]
    fn test_missing_params_is_unreadable() {
        let dir  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::open(dir.path());
        assert!(matches!(ckpt.load_params(), Err(VaeError::ParamsUnreadable { .. })));
    }

    #[test]
    fn test_corrupt_params_is_unreadable() {
        let dir  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::open(dir.path());
        fs::write(ckpt.params_path(), "{ not json").unwrap();
        assert!(matches!(ckpt.load_params(), Err(VaeError::ParamsUnreadable { .. })));
    }

    #[test]
    fn test_bad_tags_rejected() {
        assert!(check_tag("latest").is_ok());
        assert!(check_tag("base_weights").is_ok());
        assert!(check_tag("").is_err());
        assert!(check_tag("../escape").is_err());
        assert!(check_tag("weights.v2").is_err());
    }
}
