// ============================================================
// Layer 6 — Progress Log
// ============================================================
// Records one CSV row per processed batch in <run_dir>/progress.csv.
//
//   date,#episode,#batch,loss,kl-loss,z0-kl,z1-kl,...
//   2024-03-09T14:05:11.482113,0,0,0.184532,3.221870,0.410233,...
//
// `#episode` is the epoch, `#batch` the global batch counter.
// The fourth column is the total loss for the plain VAE and the
// reconstruction loss for the stacked VAE (`rec-loss`). The KL
// columns are unscaled by beta.
//
// Reference: Rust Book §12 (I/O and File Handling)

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use std::{
    fs::{self, File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

pub const PROGRESS_FILE: &str = "progress.csv";

/// One row of the progress log
#[derive(Debug, Clone)]
pub struct BatchMetrics {
    pub timestamp:  DateTime<Local>,
    pub epoch:      usize,
    pub batch:      u64,
    /// total loss (plain) or reconstruction loss (stacked)
    pub loss:       f64,
    pub kl_loss:    f64,
    pub kl_per_dim: Vec<f64>,
}

/// Appends batch metrics to progress.csv.
pub struct ProgressLog {
    csv_path:   PathBuf,
    file:       File,
    latent_dim: usize,
}

impl ProgressLog {
    /// Open `<dir>/progress.csv` for appending.
    /// Writes the header only if the file is new, so resumed runs
    /// keep extending the same log.
    pub fn create(dir: &Path, loss_column: &str, latent_dim: usize) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let csv_path = dir.join(PROGRESS_FILE);
        let is_new = !csv_path.exists();

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&csv_path)
            .with_context(|| format!("Cannot open progress log '{}'", csv_path.display()))?;

        if is_new {
            writeln!(file, "{}", header(loss_column, latent_dim))?;
            tracing::debug!("Created progress log: '{}'", csv_path.display());
        }

        Ok(Self { csv_path, file, latent_dim })
    }

    pub fn log(&mut self, m: &BatchMetrics) -> Result<()> {
        if m.kl_per_dim.len() != self.latent_dim {
            bail!(
                "Progress row has {} KL columns, log expects {}",
                m.kl_per_dim.len(),
                self.latent_dim
            );
        }

        let mut row = format!(
            "{},{},{},{:.6},{:.6}",
            m.timestamp.format("%Y-%m-%dT%H:%M:%S%.6f"),
            m.epoch,
            m.batch,
            m.loss,
            m.kl_loss,
        );
        for kl in &m.kl_per_dim {
            row.push_str(&format!(",{kl:.6}"));
        }

        writeln!(self.file, "{row}")?;
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

pub fn header(loss_column: &str, latent_dim: usize) -> String {
    let mut header = format!("date,#episode,#batch,{loss_column},kl-loss");
    for i in 0..latent_dim {
        header.push_str(&format!(",z{i}-kl"));
    }
    header
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn row(batch: u64) -> BatchMetrics {
        BatchMetrics {
            timestamp:  Local::now(),
            epoch:      1,
            batch,
            loss:       0.5,
            kl_loss:    0.25,
            kl_per_dim: vec![0.125, 0.125],
        }
    }

    #[test]
    fn test_header_columns() {
        assert_eq!(header("loss", 3), "date,#episode,#batch,loss,kl-loss,z0-kl,z1-kl,z2-kl");
        assert_eq!(header("rec-loss", 0), "date,#episode,#batch,rec-loss,kl-loss");
    }

    #[test]
    fn test_rows_append_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut log = ProgressLog::create(dir.path(), "loss", 2).unwrap();
            log.log(&row(0)).unwrap();
            log.log(&row(1)).unwrap();
        }
        let mut log = ProgressLog::create(dir.path(), "loss", 2).unwrap();
        log.log(&row(2)).unwrap();

        let text = fs::read_to_string(log.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4, "one header and three rows");
        assert_eq!(lines[0], header("loss", 2));
        assert!(lines[3].ends_with(",1,2,0.500000,0.250000,0.125000,0.125000"));
    }

    #[test]
    fn test_wrong_kl_width_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = ProgressLog::create(dir.path(), "loss", 3).unwrap();
        assert!(log.log(&row(0)).is_err());
    }
}
