//! Lighting pre-check for registration photos.

use std::path::{Path, PathBuf};

use faceid_core::lighting::{self, LightingStats, LightingThresholds, LightingWarning};
use image::DynamicImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PhotoError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("photo has no pixels")]
    Empty,
}

/// Load a registration photo and check its lighting.
pub fn check_photo(path: &Path) -> Result<Option<LightingWarning>, PhotoError> {
    let img = image::open(path).map_err(|source| PhotoError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    assess_image(&img)
}

fn assess_image(img: &DynamicImage) -> Result<Option<LightingWarning>, PhotoError> {
    let gray = img.to_luma8();
    let stats = LightingStats::from_luma(gray.as_raw()).ok_or(PhotoError::Empty)?;
    tracing::debug!(
        mean = stats.mean,
        dark = stats.dark_fraction,
        std_dev = stats.std_dev,
        "photo lighting"
    );
    Ok(lighting::assess(&stats, &LightingThresholds::default()))
}
