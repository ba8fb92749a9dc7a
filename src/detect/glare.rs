//! Glare (specular hot-spot) analysis
//!
//! A pixel counts as glare when it is both very bright and nearly colourless.
//! White card stock is bright too but keeps some tint, which is what the
//! saturation test separates.

use crate::errors::CaptureError;
use crate::types::PixelBuffer;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlareThresholds {
    pub step: u32,
    /// Luminance above which a pixel may be glare
    pub brightness: f32,
    /// `(max - min) / max` below which a bright pixel is treated as glare
    pub max_saturation: f32,
    /// Multiplier from glare-pixel ratio to score
    pub sensitivity: f32,
    /// Glare-pixel ratio that trips `has_glare` regardless of score
    pub pixel_fraction: f32,
    /// Hot-spot grid is `grid` x `grid` cells
    pub grid: u32,
    /// Glare ratio inside a cell for it to count as a hot-spot
    pub hotspot_cell_fraction: f32,
}

impl Default for GlareThresholds {
    fn default() -> Self {
        Self {
            step: 4,
            brightness: 240.0,
            max_saturation: 0.15,
            sensitivity: 4.0,
            pixel_fraction: 0.05,
            grid: 8,
            hotspot_cell_fraction: 0.25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlareMetrics {
    pub has_glare: bool,
    /// 1.0 = severe glare
    pub score: f32,
    pub glare_ratio: f32,
    pub hotspot_count: u32,
    /// Luminance histogram of the sampled pixels, for tuning only
    pub brightness_histogram: Vec<u32>,
}

impl GlareMetrics {
    pub fn neutral() -> Self {
        Self {
            has_glare: false,
            score: 0.0,
            glare_ratio: 0.0,
            hotspot_count: 0,
            brightness_histogram: vec![0; 256],
        }
    }
}

/// `(max - min) / max` over RGB, 0 for black
#[inline]
pub fn saturation([r, g, b]: [u8; 3]) -> f32 {
    let max = r.max(g).max(b) as f32;
    let min = r.min(g).min(b) as f32;
    if max == 0.0 {
        0.0
    } else {
        (max - min) / max
    }
}

#[derive(Debug, Clone)]
pub struct GlareAnalyzer {
    thresholds: GlareThresholds,
    /// Score above which the frame has glare
    max_score: f32,
}

impl Default for GlareAnalyzer {
    fn default() -> Self {
        Self::new(GlareThresholds::default(), 0.35)
    }
}

impl GlareAnalyzer {
    pub fn new(thresholds: GlareThresholds, max_score: f32) -> Self {
        Self {
            thresholds,
            max_score,
        }
    }

    pub fn analyze(&self, frame: &PixelBuffer) -> Result<GlareMetrics, CaptureError> {
        let t = &self.thresholds;
        let step = t.step.max(1);
        let grid = t.grid.max(1);
        if frame.width() < grid || frame.height() < grid {
            return Err(CaptureError::stage(
                "glare",
                format!("frame {}x{} smaller than hot-spot grid", frame.width(), frame.height()),
            ));
        }

        let mut histogram = vec![0u32; 256];
        let mut cell_total = vec![0u32; (grid * grid) as usize];
        let mut cell_glare = vec![0u32; (grid * grid) as usize];
        let mut sampled = 0u32;
        let mut glare = 0u32;

        for y in (0..frame.height()).step_by(step as usize) {
            let cy = y * grid / frame.height();
            for x in (0..frame.width()).step_by(step as usize) {
                let rgb = frame.rgb(x, y);
                let lum = frame.luminance(x, y);
                histogram[(lum as usize).min(255)] += 1;
                sampled += 1;

                let cell = (cy * grid + x * grid / frame.width()) as usize;
                cell_total[cell] += 1;

                if lum > t.brightness && saturation(rgb) < t.max_saturation {
                    glare += 1;
                    cell_glare[cell] += 1;
                }
            }
        }

        let glare_ratio = glare as f32 / sampled.max(1) as f32;
        let score = (glare_ratio * t.sensitivity).min(1.0);
        let hotspot_count = cell_glare
            .iter()
            .zip(&cell_total)
            .filter(|&(&g, &total)| total > 0 && g as f32 / total as f32 >= t.hotspot_cell_fraction)
            .count() as u32;

        let has_glare = score > self.max_score || glare_ratio > t.pixel_fraction;
        if has_glare {
            log::debug!(
                "Glare detected: ratio={:.3} score={:.3} hotspots={}",
                glare_ratio,
                score,
                hotspot_count
            );
        }

        Ok(GlareMetrics {
            has_glare,
            score,
            glare_ratio,
            hotspot_count,
            brightness_histogram: histogram,
        })
    }
}
