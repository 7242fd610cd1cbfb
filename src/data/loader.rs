// ============================================================
// Layer 4 — Image Loader
// ============================================================
// Loads every PNG/JPEG in a directory into one normalised
// (n, height, width, channels) array using the image crate.
//
//   - files are read in file-name order, so numbered frames
//     stay in sequence for frame stacking
//   - images are resized to the configured frame size
//   - 1 channel → luma, 3 → RGB, 4 → RGBA
//   - u8 pixel values are divided by 255
//
// Reference: image crate documentation
//            Rust Book §9 (Error Handling)

use anyhow::{bail, Context, Result};
use image::{imageops::FilterType, DynamicImage, GrayImage, RgbImage, RgbaImage};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::domain::{array::HostArray, hyperparams::InputShape, traits::DatasetSource};

const EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Loads all images from a given directory.
/// Implements the DatasetSource trait from Layer 3.
pub struct ImageDirLoader {
    dir:   PathBuf,
    shape: InputShape,
}

impl ImageDirLoader {
    pub fn new(dir: impl Into<PathBuf>, shape: InputShape) -> Self {
        Self { dir: dir.into(), shape }
    }

    fn image_paths(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("Cannot read directory '{}'", self.dir.display()))?
        {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if is_image {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }
}

impl DatasetSource for ImageDirLoader {
    fn load(&self) -> Result<HostArray> {
        let paths = self.image_paths()?;
        let mut data = Vec::with_capacity(paths.len() * self.shape.frame_len());
        let mut count = 0usize;

        for path in &paths {
            match load_frame(path, &self.shape) {
                Ok(frame) => {
                    data.extend(frame);
                    count += 1;
                }
                // Log a warning but continue — don't fail on one bad file
                Err(e) => tracing::warn!("Skipping '{}': {:#}", path.display(), e),
            }
        }

        if count == 0 {
            bail!("No readable images in '{}'", self.dir.display());
        }

        tracing::info!("Loaded {} images from '{}'", count, self.dir.display());
        let InputShape { height, width, channels } = self.shape;
        Ok(HostArray::new(data, [count, height, width, channels])?)
    }
}

/// Decode one image file into normalised HWC values.
fn load_frame(path: &Path, shape: &InputShape) -> Result<Vec<f32>> {
    let img = image::open(path)
        .with_context(|| format!("Cannot decode '{}'", path.display()))?;

    let (w, h) = (shape.width as u32, shape.height as u32);
    let img = if img.width() != w || img.height() != h {
        img.resize_exact(w, h, FilterType::Triangle)
    } else {
        img
    };

    let raw = match shape.channels {
        1 => img.to_luma8().into_raw(),
        3 => img.to_rgb8().into_raw(),
        4 => img.to_rgba8().into_raw(),
        c => bail!("Unsupported channel count {c}"),
    };

    Ok(raw.into_iter().map(|v| v as f32 / 255.0).collect())
}

/// Write one normalised HWC frame to an image file (format from extension).
pub fn write_frame(frame: &[f32], shape: &InputShape, path: &Path) -> Result<()> {
    let (w, h) = (shape.width as u32, shape.height as u32);
    let bytes: Vec<u8> = frame
        .iter()
        .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
        .collect();

    let img = match shape.channels {
        1 => GrayImage::from_raw(w, h, bytes).map(DynamicImage::ImageLuma8),
        3 => RgbImage::from_raw(w, h, bytes).map(DynamicImage::ImageRgb8),
        4 => RgbaImage::from_raw(w, h, bytes).map(DynamicImage::ImageRgba8),
        c => bail!("Unsupported channel count {c}"),
    }
    .with_context(|| format!("Frame does not fit a {shape} image"))?;

    img.save(path)
        .with_context(|| format!("Cannot write '{}'", path.display()))?;
    tracing::debug!("Wrote frame to '{}'", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_written_frames_load_back_normalised() {
        let dir   = tempfile::tempdir().unwrap();
        let shape = InputShape::new(4, 4, 1);

        let mut frame = vec![0.0f32; 16];
        frame[5] = 1.0;
        write_frame(&frame, &shape, &dir.path().join("000.png")).unwrap();
        write_frame(&vec![1.0; 16], &shape, &dir.path().join("001.png")).unwrap();
        fs::write(dir.path().join("notes.txt"), "not an image").unwrap();

        let array = ImageDirLoader::new(dir.path(), shape).load().unwrap();
        assert_eq!(array.dims(), &[2, 4, 4, 1]);
        assert_eq!(array.row(0)[5], 1.0);
        assert_eq!(array.row(0)[0], 0.0);
        assert!(array.row(1).iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_empty_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ImageDirLoader::new(dir.path(), InputShape::new(4, 4, 1));
        assert!(loader.load().is_err());
    }
}
