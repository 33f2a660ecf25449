//! Image optimizer.
//!
//! Re-encodes PNG and JPEG files and copies everything else, mirroring the
//! source tree under `img/`. Preview images are left to
//! [`PreviewCompiler`](crate::preview::PreviewCompiler).

use std::fs;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{DynamicImage, ImageFormat};
use rayon::prelude::*;
use serde::Deserialize;

use crate::output::{collect_sources, AssetError, CompileReport, Destinations};
use crate::preview::is_preview;

const TASK: &str = "images";

/// Image optimizer settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageConfig {
    /// JPEG quality, 1-100
    #[serde(default = "default_quality")]
    pub quality: u8,
}

fn default_quality() -> u8 {
    80
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            quality: default_quality(),
        }
    }
}

/// Optimizes every non-preview image in a directory tree.
#[derive(Debug, Clone)]
pub struct ImageCompiler {
    source_dir: PathBuf,
    destinations: Destinations,
    config: ImageConfig,
    preview_suffix: String,
}

impl ImageCompiler {
    pub fn new(
        source_dir: PathBuf,
        destinations: Destinations,
        config: ImageConfig,
        preview_suffix: impl Into<String>,
    ) -> Self {
        Self {
            source_dir,
            destinations,
            config,
            preview_suffix: preview_suffix.into(),
        }
    }

    /// Optimize all images.
    pub fn compile(&self) -> Result<CompileReport, AssetError> {
        let mut report = CompileReport::default();
        let sources = collect_sources(&self.source_dir, true, |p| {
            !is_preview(p, &self.preview_suffix)
        });

        let quality = self.config.quality.clamp(1, 100);
        let processed: Vec<(&PathBuf, Result<Vec<u8>, String>)> = sources
            .par_iter()
            .map(|path| (path, optimize(path, quality)))
            .collect();

        for (path, result) in processed {
            match result {
                Ok(bytes) => {
                    let relative = path.strip_prefix(&self.source_dir).unwrap_or(path);
                    report.record(self.destinations.write(&Path::new("img").join(relative), &bytes)?);
                }
                Err(message) => report.skip(TASK, path, message),
            }
        }

        tracing::debug!(task = TASK, files = sources.len(), "optimized images");
        Ok(report)
    }
}

/// Produce the bytes to publish for one image.
fn optimize(path: &Path, quality: u8) -> Result<Vec<u8>, String> {
    let original = fs::read(path).map_err(|e| e.to_string())?;

    let reencoded = match ImageFormat::from_path(path).ok() {
        Some(ImageFormat::Png) => encode_png(&decode(&original, ImageFormat::Png)?)?,
        Some(ImageFormat::Jpeg) => encode_jpeg(&decode(&original, ImageFormat::Jpeg)?, quality)?,
        _ => return Ok(original),
    };

    // Never publish something bigger than what we were given.
    Ok(if reencoded.len() < original.len() {
        reencoded
    } else {
        original
    })
}

pub(crate) fn decode(bytes: &[u8], format: ImageFormat) -> Result<DynamicImage, String> {
    image::load_from_memory_with_format(bytes, format).map_err(|e| format!("cannot decode image: {}", e))
}

pub(crate) fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, String> {
    let mut out = Vec::new();
    let encoder = PngEncoder::new_with_quality(&mut out, CompressionType::Best, FilterType::Adaptive);
    img.write_with_encoder(encoder)
        .map_err(|e| format!("cannot encode PNG: {}", e))?;
    Ok(out)
}

pub(crate) fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, String> {
    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);
    encoder
        .encode_image(&img.to_rgb8())
        .map_err(|e| format!("cannot encode JPEG: {}", e))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::tempdir;

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }))
    }

    fn setup() -> (tempfile::TempDir, ImageCompiler) {
        let temp = tempdir().unwrap();
        let src = temp.path().join("img");
        fs::create_dir_all(src.join("posts")).unwrap();
        let compiler = ImageCompiler::new(
            src,
            Destinations::new([temp.path().join("site"), temp.path().join("assets")]),
            ImageConfig::default(),
            "-preview",
        );
        (temp, compiler)
    }

    #[test]
    fn mirrors_tree_and_skips_previews() {
        let (temp, compiler) = setup();
        let src = temp.path().join("img");
        gradient(32, 32).save(src.join("posts/photo.png")).unwrap();
        gradient(32, 32).save(src.join("posts/photo-preview.png")).unwrap();
        fs::write(src.join("logo.svg"), "<svg xmlns=\"http://www.w3.org/2000/svg\"/>").unwrap();

        let report = compiler.compile().unwrap();

        assert_eq!(report.written, 2);
        assert!(temp.path().join("site/img/posts/photo.png").exists());
        assert!(temp.path().join("assets/img/logo.svg").exists());
        assert!(!temp.path().join("site/img/posts/photo-preview.png").exists());
    }

    #[test]
    fn output_is_decodable_and_not_larger() {
        let (temp, compiler) = setup();
        let src = temp.path().join("img/posts/shot.jpg");
        gradient(64, 48).save(&src).unwrap();

        compiler.compile().unwrap();

        let out = fs::read(temp.path().join("site/img/posts/shot.jpg")).unwrap();
        assert!(out.len() <= fs::read(&src).unwrap().len());
        let img = image::load_from_memory(&out).unwrap();
        assert_eq!((img.width(), img.height()), (64, 48));
    }

    #[test]
    fn skips_corrupt_image() {
        let (temp, compiler) = setup();
        let src = temp.path().join("img");
        fs::write(src.join("broken.png"), b"not a png").unwrap();
        gradient(8, 8).save(src.join("fine.png")).unwrap();

        let report = compiler.compile().unwrap();

        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].path.ends_with("broken.png"));
        assert!(temp.path().join("site/img/fine.png").exists());
    }

    #[test]
    fn second_run_is_idempotent() {
        let (temp, compiler) = setup();
        gradient(16, 16).save(temp.path().join("img/a.png")).unwrap();

        compiler.compile().unwrap();
        let first = fs::read(temp.path().join("site/img/a.png")).unwrap();
        let report = compiler.compile().unwrap();

        assert_eq!(first, fs::read(temp.path().join("site/img/a.png")).unwrap());
        assert_eq!(report.written, 0);
    }
}
