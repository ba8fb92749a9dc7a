//! Document presence detection
//!
//! Edge-density heuristic: scan inward from each frame border for the first
//! row/column where a sustained run of strong luminance steps appears, then
//! validate the rectangle against ID-card geometry. No contour or Hough pass
//! is involved.

use crate::errors::CaptureError;
use crate::types::{BoundingBox, PixelBuffer, Point};
use serde::{Deserialize, Serialize};

/// ID-1 card aspect ratio (85.60mm x 53.98mm)
pub const ID_CARD_ASPECT_RATIO: f32 = 1.586;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentDetectorConfig {
    /// Sample spacing in pixels along and across scan lines
    pub step: u32,
    /// Minimum luminance delta between adjacent samples to count as an edge
    pub edge_threshold: f32,
    /// Consecutive edge samples needed to accept a boundary
    pub min_run_length: usize,
    pub target_aspect_ratio: f32,
    /// Relative tolerance around the target ratio, both orientations
    pub aspect_tolerance: f32,
    pub min_coverage: f32,
    pub max_coverage: f32,
    /// Confidence for four boundaries alone. Plus either geometry credit it
    /// must stay under the default `min_document_confidence`.
    pub edge_credit: f32,
    pub aspect_credit: f32,
    pub coverage_credit: f32,
}

impl Default for DocumentDetectorConfig {
    fn default() -> Self {
        Self {
            step: 4,
            edge_threshold: 28.0,
            min_run_length: 8,
            target_aspect_ratio: ID_CARD_ASPECT_RATIO,
            aspect_tolerance: 0.30,
            min_coverage: 0.15,
            max_coverage: 0.90,
            edge_credit: 0.3,
            aspect_credit: 0.35,
            coverage_credit: 0.35,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDetection {
    pub detected: bool,
    pub confidence: f32,
    pub bounds: Option<BoundingBox>,
    pub corners: Option<[Point; 4]>,
    pub aspect_ratio: Option<f32>,
    pub aspect_valid: bool,
    /// Fraction of the frame covered by `bounds`
    pub coverage: f32,
}

impl DocumentDetection {
    pub fn not_detected() -> Self {
        Self {
            detected: false,
            confidence: 0.0,
            bounds: None,
            corners: None,
            aspect_ratio: None,
            aspect_valid: false,
            coverage: 0.0,
        }
    }
}

/// True when `ratio` is within `tolerance` of `target` in either orientation
pub fn is_id_card_aspect(ratio: f32, target: f32, tolerance: f32) -> bool {
    if !ratio.is_finite() || ratio <= 0.0 {
        return false;
    }
    let within = |expected: f32| ((ratio - expected) / expected).abs() <= tolerance;
    within(target) || within(1.0 / target)
}

#[derive(Debug, Clone, Default)]
pub struct DocumentDetector {
    config: DocumentDetectorConfig,
}

impl DocumentDetector {
    pub fn new(config: DocumentDetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DocumentDetectorConfig {
        &self.config
    }

    pub fn detect(&self, frame: &PixelBuffer) -> Result<DocumentDetection, CaptureError> {
        let step = self.config.step.max(1);
        let (w, h) = (frame.width(), frame.height());
        if w < step * 4 || h < step * 4 {
            return Err(CaptureError::stage(
                "document",
                format!("frame {}x{} too small for step {}", w, h, step),
            ));
        }

        let lum = |x: u32, y: u32| frame.luminance(x, y);

        let left = self.scan_for_edge((step..=w / 2).step_by(step as usize), h, |x, y| {
            (lum(x, y) - lum(x - step, y)).abs()
        });
        let right = self.scan_for_edge((w / 2..w - step).rev().step_by(step as usize), h, |x, y| {
            (lum(x, y) - lum(x + step, y)).abs()
        });
        let top = self.scan_for_edge((step..=h / 2).step_by(step as usize), w, |y, x| {
            (lum(x, y) - lum(x, y - step)).abs()
        });
        let bottom = self.scan_for_edge((h / 2..h - step).rev().step_by(step as usize), w, |y, x| {
            (lum(x, y) - lum(x, y + step)).abs()
        });

        let (left, right, top, bottom) = match (left, right, top, bottom) {
            (Some(l), Some(r), Some(t), Some(b)) => (l, r, t, b),
            found => {
                log::trace!("Document edges incomplete: {:?}", found);
                return Ok(DocumentDetection::not_detected());
            }
        };

        // Boundaries sit midway between the two samples that straddle the edge
        let half = step as f32 / 2.0;
        let x0 = left as f32 - half;
        let x1 = right as f32 + half;
        let y0 = top as f32 - half;
        let y1 = bottom as f32 + half;
        if x1 <= x0 || y1 <= y0 {
            return Ok(DocumentDetection::not_detected());
        }

        let bounds = BoundingBox::new(x0, y0, x1 - x0, y1 - y0);
        let aspect_ratio = bounds.width / bounds.height;
        let coverage = bounds.area() / frame.area();

        let aspect_valid = is_id_card_aspect(
            aspect_ratio,
            self.config.target_aspect_ratio,
            self.config.aspect_tolerance,
        );
        let coverage_valid =
            (self.config.min_coverage..=self.config.max_coverage).contains(&coverage);

        let mut confidence = self.config.edge_credit;
        if aspect_valid {
            confidence += self.config.aspect_credit;
        }
        if coverage_valid {
            confidence += self.config.coverage_credit;
        }

        log::trace!(
            "Document bounds {:?} aspect={:.3} coverage={:.3}",
            bounds,
            aspect_ratio,
            coverage
        );

        Ok(DocumentDetection {
            detected: true,
            confidence: confidence.min(1.0),
            bounds: Some(bounds),
            corners: Some(bounds.corners()),
            aspect_ratio: Some(aspect_ratio),
            aspect_valid,
            coverage,
        })
    }

    /// First scan position whose perpendicular samples contain a long enough
    /// run of above-threshold deltas. `delta(pos, t)` is evaluated at scan
    /// position `pos` and perpendicular offset `t`.
    fn scan_for_edge<I, F>(&self, positions: I, span: u32, delta: F) -> Option<u32>
    where
        I: Iterator<Item = u32>,
        F: Fn(u32, u32) -> f32,
    {
        let step = self.config.step.max(1) as usize;
        for pos in positions {
            let mut run = 0usize;
            for t in (0..span).step_by(step) {
                if delta(pos, t) > self.config.edge_threshold {
                    run += 1;
                    if run >= self.config.min_run_length {
                        return Some(pos);
                    }
                } else {
                    run = 0;
                }
            }
        }
        None
    }
}
