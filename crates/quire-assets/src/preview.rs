//! Social preview images.
//!
//! Files named `<name><suffix>.<ext>` (suffix `-preview` by default) are
//! scaled and cropped to one canonical size.

use std::fs;
use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use serde::Deserialize;

use crate::image::{decode, encode_jpeg, encode_png};
use crate::output::{collect_sources, AssetError, CompileReport, Destinations};

const TASK: &str = "preview-images";

/// Preview image settings.
#[derive(Debug, Clone, Deserialize)]
pub struct PreviewConfig {
    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    /// File stem suffix marking preview images
    #[serde(default = "default_suffix")]
    pub suffix: String,

    /// JPEG quality, 1-100
    #[serde(default = "default_quality")]
    pub quality: u8,
}

fn default_width() -> u32 {
    1200
}
fn default_height() -> u32 {
    630
}
fn default_suffix() -> String {
    "-preview".to_string()
}
fn default_quality() -> u8 {
    85
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            suffix: default_suffix(),
            quality: default_quality(),
        }
    }
}

/// Whether a file follows the preview naming convention.
pub fn is_preview(path: &Path, suffix: &str) -> bool {
    !suffix.is_empty()
        && path
            .file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(|stem| stem.ends_with(suffix))
}

/// Fit an image into `width` x `height` without ever enlarging it.
///
/// Images at least as large as the target in both dimensions are scaled
/// and center-cropped to exactly the target. Smaller images keep their scale;
/// only a dimension exceeding the target is center-cropped.
pub fn fit_preview(img: DynamicImage, width: u32, height: u32) -> DynamicImage {
    let (w, h) = img.dimensions();

    if w >= width && h >= height {
        if (w, h) == (width, height) {
            return img;
        }
        return img.resize_to_fill(width, height, FilterType::Lanczos3);
    }

    let crop_w = w.min(width);
    let crop_h = h.min(height);
    if (crop_w, crop_h) == (w, h) {
        return img;
    }
    img.crop_imm((w - crop_w) / 2, (h - crop_h) / 2, crop_w, crop_h)
}

/// Resizes preview images to the canonical social-card size.
#[derive(Debug, Clone)]
pub struct PreviewCompiler {
    source_dir: PathBuf,
    destinations: Destinations,
    config: PreviewConfig,
}

impl PreviewCompiler {
    pub fn new(source_dir: PathBuf, destinations: Destinations, config: PreviewConfig) -> Self {
        Self {
            source_dir,
            destinations,
            config,
        }
    }

    /// Resize all preview images.
    pub fn compile(&self) -> Result<CompileReport, AssetError> {
        let mut report = CompileReport::default();
        let sources = collect_sources(&self.source_dir, true, |p| {
            is_preview(p, &self.config.suffix)
        });

        for path in &sources {
            match self.render(path) {
                Ok(bytes) => {
                    let relative = path.strip_prefix(&self.source_dir).unwrap_or(path);
                    report.record(self.destinations.write(&Path::new("img").join(relative), &bytes)?);
                }
                Err(message) => report.skip(TASK, path, message),
            }
        }

        tracing::debug!(task = TASK, files = sources.len(), "resized preview images");
        Ok(report)
    }

    fn render(&self, path: &Path) -> Result<Vec<u8>, String> {
        let format = match ImageFormat::from_path(path) {
            Ok(format @ (ImageFormat::Png | ImageFormat::Jpeg)) => format,
            _ => return Err("preview images must be PNG or JPEG".to_string()),
        };

        let bytes = fs::read(path).map_err(|e| e.to_string())?;
        let img = fit_preview(decode(&bytes, format)?, self.config.width, self.config.height);

        match format {
            ImageFormat::Jpeg => encode_jpeg(&img, self.config.quality.clamp(1, 100)),
            _ => encode_png(&img),
        }
    }
}
