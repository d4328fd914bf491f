//! Lighting heuristics over 8-bit luma samples.

use serde::{Deserialize, Serialize};

/// Pixels below this luma count as "dark".
const DARK_PIXEL_LEVEL: u8 = 32;

/// Summary of a frame's (or photo's) luma distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LightingStats {
    /// Average pixel brightness (0.0–255.0).
    pub mean: f32,
    /// Share of pixels darker than 32 (0.0–1.0).
    pub dark_fraction: f32,
    /// Standard deviation of brightness.
    pub std_dev: f32,
}

impl LightingStats {
    /// Compute stats over a grayscale buffer. `None` for an empty buffer.
    pub fn from_luma(gray: &[u8]) -> Option<Self> {
        if gray.is_empty() {
            return None;
        }
        let n = gray.len() as f32;
        let mean = gray.iter().map(|&b| b as f32).sum::<f32>() / n;
        let dark = gray.iter().filter(|&&p| p < DARK_PIXEL_LEVEL).count();
        let variance = gray.iter().map(|&b| (b as f32 - mean).powi(2)).sum::<f32>() / n;
        Some(Self {
            mean,
            dark_fraction: dark as f32 / n,
            std_dev: variance.sqrt(),
        })
    }
}

/// Why the current lighting is likely to hurt recognition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightingWarning {
    TooDark,
    TooBright,
    LowContrast,
    /// A face was found but the detector was unsure of it.
    FaceUnclear,
}

impl LightingWarning {
    pub fn message(&self) -> &'static str {
        match self {
            Self::TooDark => "Lighting is too dark. Move to a brighter area or face a light source.",
            Self::TooBright => "Lighting is too bright. Avoid direct light behind or on the camera.",
            Self::LowContrast => "Image looks washed out. Improve lighting for better recognition.",
            Self::FaceUnclear => "Face not clearly visible. Look at the camera in even light.",
        }
    }
}

/// Thresholds for [`assess`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightingThresholds {
    pub min_mean: f32,
    pub max_mean: f32,
    pub max_dark_fraction: f32,
    pub min_std_dev: f32,
}

impl Default for LightingThresholds {
    fn default() -> Self {
        Self {
            min_mean: 50.0,
            max_mean: 210.0,
            max_dark_fraction: 0.6,
            min_std_dev: 12.0,
        }
    }
}

/// Classify lighting. Darkness wins over brightness, which wins over contrast.
pub fn assess(stats: &LightingStats, thresholds: &LightingThresholds) -> Option<LightingWarning> {
    if stats.mean < thresholds.min_mean || stats.dark_fraction > thresholds.max_dark_fraction {
        Some(LightingWarning::TooDark)
    } else if stats.mean > thresholds.max_mean {
        Some(LightingWarning::TooBright)
    } else if stats.std_dev < thresholds.min_std_dev {
        Some(LightingWarning::LowContrast)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(len: usize, lo: u8, hi: u8) -> Vec<u8> {
        let span = (hi - lo) as usize + 1;
        (0..len).map(|i| lo + (i % span) as u8).collect()
    }

    #[test]
    fn test_stats_empty() {
        assert!(LightingStats::from_luma(&[]).is_none());
    }

    #[test]
    fn test_stats_uniform() {
        let stats = LightingStats::from_luma(&[128u8; 100]).unwrap();
        assert!((stats.mean - 128.0).abs() < 1e-4);
        assert_eq!(stats.dark_fraction, 0.0);
        assert!(stats.std_dev.abs() < 1e-4);
    }

    #[test]
    fn test_all_black_is_too_dark() {
        let stats = LightingStats::from_luma(&[0u8; 1000]).unwrap();
        assert_eq!(stats.dark_fraction, 1.0);
        assert_eq!(
            assess(&stats, &LightingThresholds::default()),
            Some(LightingWarning::TooDark)
        );
    }

    #[test]
    fn test_mostly_dark_with_bright_spot_is_too_dark() {
        // 70% black, 30% white: mean is fine (~76) but the dark share is not.
        let mut gray = vec![5u8; 700];
        gray.extend(vec![250u8; 300]);
        let stats = LightingStats::from_luma(&gray).unwrap();
        assert!(stats.mean > 50.0);
        assert_eq!(
            assess(&stats, &LightingThresholds::default()),
            Some(LightingWarning::TooDark)
        );
    }

    #[test]
    fn test_overexposed_is_too_bright() {
        let stats = LightingStats::from_luma(&gradient(1000, 220, 255)).unwrap();
        assert_eq!(
            assess(&stats, &LightingThresholds::default()),
            Some(LightingWarning::TooBright)
        );
    }

    #[test]
    fn test_flat_midtones_are_low_contrast() {
        let stats = LightingStats::from_luma(&gradient(1000, 120, 130)).unwrap();
        assert_eq!(
            assess(&stats, &LightingThresholds::default()),
            Some(LightingWarning::LowContrast)
        );
    }

    #[test]
    fn test_normal_scene_has_no_warning() {
        let stats = LightingStats::from_luma(&gradient(1000, 40, 200)).unwrap();
        assert_eq!(assess(&stats, &LightingThresholds::default()), None);
    }
}
