//! Focus / blur scoring
//!
//! The focus measure is the mean absolute 4-neighbour Laplacian of luminance
//! over a step-sampled grid. Sobel gradient magnitude and Laplacian variance
//! are reported alongside for diagnostics.

use crate::errors::CaptureError;
use crate::types::PixelBuffer;
use serde::{Deserialize, Serialize};

/// Scores below this value mean "blurry"; `is_blurry` and `score` are
/// derived from the same thresholds so they cannot disagree.
pub const BLURRY_SCORE_CEILING: f32 = 0.3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharpnessThresholds {
    /// Focus measure below which the frame is blurry
    pub low: f32,
    /// Focus measure at or above which the score saturates at 1.0
    pub high: f32,
    pub step: u32,
}

impl Default for SharpnessThresholds {
    fn default() -> Self {
        Self {
            low: 5.0,
            high: 25.0,
            step: 2,
        }
    }
}

impl SharpnessThresholds {
    /// Map a raw focus measure into [0, 1]
    pub fn score(&self, focus: f32) -> f32 {
        if focus < self.low {
            (focus / self.low).max(0.0) * BLURRY_SCORE_CEILING
        } else if focus < self.high {
            BLURRY_SCORE_CEILING
                + (1.0 - BLURRY_SCORE_CEILING) * (focus - self.low) / (self.high - self.low)
        } else {
            1.0
        }
    }

    pub fn is_blurry(&self, focus: f32) -> bool {
        focus < self.low
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharpnessMetrics {
    pub is_blurry: bool,
    /// 1.0 = sharp
    pub score: f32,
    /// Mean absolute Laplacian response (the focus measure)
    pub focus_measure: f32,
    /// Variance of the Laplacian response
    pub variance: f32,
    /// Mean Sobel gradient magnitude
    pub mean_gradient: f32,
}

impl SharpnessMetrics {
    /// Result used when blur detection is disabled or failed
    pub fn neutral() -> Self {
        Self {
            is_blurry: false,
            score: 1.0,
            focus_measure: 0.0,
            variance: 0.0,
            mean_gradient: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SharpnessAnalyzer {
    thresholds: SharpnessThresholds,
}

impl SharpnessAnalyzer {
    pub fn new(thresholds: SharpnessThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &SharpnessThresholds {
        &self.thresholds
    }

    pub fn analyze(&self, frame: &PixelBuffer) -> Result<SharpnessMetrics, CaptureError> {
        if frame.width() < 3 || frame.height() < 3 {
            return Err(CaptureError::stage(
                "sharpness",
                format!("frame {}x{} too small", frame.width(), frame.height()),
            ));
        }

        let step = self.thresholds.step.max(1) as usize;
        let lum = |x: u32, y: u32| frame.luminance(x, y);

        let mut count = 0u64;
        let mut lap_sum = 0.0f64;
        let mut lap_abs_sum = 0.0f64;
        let mut lap_sq_sum = 0.0f64;
        let mut grad_sum = 0.0f64;

        for y in (1..frame.height() - 1).step_by(step) {
            for x in (1..frame.width() - 1).step_by(step) {
                let c = lum(x, y);
                let n = lum(x, y - 1);
                let s = lum(x, y + 1);
                let w = lum(x - 1, y);
                let e = lum(x + 1, y);

                let laplacian = (4.0 * c - n - s - w - e) as f64;

                let nw = lum(x - 1, y - 1);
                let ne = lum(x + 1, y - 1);
                let sw = lum(x - 1, y + 1);
                let se = lum(x + 1, y + 1);
                let gx = (ne + 2.0 * e + se) - (nw + 2.0 * w + sw);
                let gy = (sw + 2.0 * s + se) - (nw + 2.0 * n + ne);

                lap_sum += laplacian;
                lap_abs_sum += laplacian.abs();
                lap_sq_sum += laplacian * laplacian;
                // Sobel kernels sum to 4 per side; scale back to luminance units
                grad_sum += ((gx * gx + gy * gy).sqrt() / 4.0) as f64;
                count += 1;
            }
        }

        let n = count.max(1) as f64;
        let focus_measure = (lap_abs_sum / n) as f32;
        let mean = lap_sum / n;
        let variance = (lap_sq_sum / n - mean * mean).max(0.0) as f32;
        let mean_gradient = (grad_sum / n) as f32;

        Ok(SharpnessMetrics {
            is_blurry: self.thresholds.is_blurry(focus_measure),
            score: self.thresholds.score(focus_measure).clamp(0.0, 1.0),
            focus_measure,
            variance,
            mean_gradient,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_mapping_is_continuous_and_monotonic() {
        let t = SharpnessThresholds::default();
        assert_eq!(t.score(0.0), 0.0);
        assert!((t.score(t.low) - BLURRY_SCORE_CEILING).abs() < 1e-6);
        assert!((t.score(t.high - 1e-3) - 1.0).abs() < 1e-3);
        assert_eq!(t.score(t.high * 10.0), 1.0);

        let mut last = -1.0;
        for i in 0..100 {
            let s = t.score(i as f32 * 0.5);
            assert!(s >= last);
            last = s;
        }
    }

    #[test]
    fn test_blurry_flag_matches_score() {
        let t = SharpnessThresholds::default();
        for i in 0..60 {
            let focus = i as f32;
            assert_eq!(t.is_blurry(focus), t.score(focus) < BLURRY_SCORE_CEILING);
        }
    }

    #[test]
    fn test_tiny_frame_rejected() {
        let frame = PixelBuffer::blank(2, 2, crate::types::PixelFormat::Rgb);
        assert!(SharpnessAnalyzer::default().analyze(&frame).is_err());
    }
}
