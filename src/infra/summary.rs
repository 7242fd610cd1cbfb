// ============================================================
// Layer 6 — Summary Writer
// ============================================================
// Scalar summaries for TensorBoard, written as event files under
// <run_dir>/board/ (events.out.tfevents.<time>.<host>). Point
// `tensorboard --logdir <run_dir>/board` at it to plot a run.

use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tensorboard_rs::summary_writer::SummaryWriter as EventWriter;

use crate::domain::traits::ScalarSink;

pub const BOARD_DIR: &str = "board";

pub struct SummaryWriter {
    logdir: PathBuf,
    writer: EventWriter,
}

impl SummaryWriter {
    /// Start a new event file in `<run_dir>/board/`. Earlier event
    /// files of a resumed run are left in place.
    pub fn create(run_dir: &Path) -> Result<Self> {
        let logdir = run_dir.join(BOARD_DIR);
        fs::create_dir_all(&logdir)
            .with_context(|| format!("Cannot create '{}'", logdir.display()))?;

        let writer = EventWriter::new(&logdir);
        Ok(Self { logdir, writer })
    }

    pub fn logdir(&self) -> &Path {
        &self.logdir
    }
}

impl ScalarSink for SummaryWriter {
    fn scalar(&mut self, tag: &str, step: u64, value: f64) -> Result<()> {
        self.writer.add_scalar(tag, value as f32, step as usize);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush();
        Ok(())
    }
}

impl Drop for SummaryWriter {
    fn drop(&mut self) {
        self.writer.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_files(dir: &Path) -> Vec<(String, u64)> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap())
            .map(|e| (e.file_name().to_string_lossy().to_string(), e.metadata().unwrap().len()))
            .filter(|(name, _)| name.starts_with("events.out.tfevents"))
            .collect()
    }

    #[test]
    fn test_scalars_land_in_event_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = SummaryWriter::create(dir.path()).unwrap();
        sink.scalar("loss/total-loss", 0, 1.5).unwrap();
        sink.scalar("zj_kl/z0-kl", 1, 0.25).unwrap();
        sink.flush().unwrap();

        assert_eq!(sink.logdir(), dir.path().join(BOARD_DIR));
        let files = event_files(sink.logdir());
        assert_eq!(files.len(), 1);
        assert!(files[0].1 > 0);
    }
}
