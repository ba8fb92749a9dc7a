//! Document motion filter
//!
//! Compares consecutive document bounds. Small deltas are detector jitter,
//! not motion. The edge-scan detector is noisy enough that this gate can be
//! switched off entirely through `DetectionConfig::enable_motion_gating`.

use crate::types::BoundingBox;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionFilter {
    pub enabled: bool,
    /// Per-dimension delta, in pixels, still treated as jitter
    pub jitter_px: f32,
}

impl Default for MotionFilter {
    fn default() -> Self {
        Self {
            enabled: true,
            jitter_px: 8.0,
        }
    }
}

impl MotionFilter {
    pub fn new(enabled: bool, jitter_px: f32) -> Self {
        Self {
            enabled,
            jitter_px: jitter_px.max(0.0),
        }
    }

    pub fn disabled() -> Self {
        Self::new(false, 0.0)
    }

    /// True when the document moved by more than the jitter tolerance on any
    /// dimension. A missing box on either side is never motion.
    pub fn is_moving(&self, previous: Option<&BoundingBox>, current: Option<&BoundingBox>) -> bool {
        if !self.enabled {
            return false;
        }
        match (previous, current) {
            (Some(prev), Some(cur)) => [
                cur.x - prev.x,
                cur.y - prev.y,
                cur.width - prev.width,
                cur.height - prev.height,
            ]
            .iter()
            .any(|delta| delta.abs() > self.jitter_px),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x: f32, y: f32) -> BoundingBox {
        BoundingBox::new(x, y, 300.0, 190.0)
    }

    #[test]
    fn test_jitter_is_not_motion() {
        let filter = MotionFilter::new(true, 8.0);
        assert!(!filter.is_moving(Some(&bbox(100.0, 100.0)), Some(&bbox(104.0, 96.0))));
        assert!(!filter.is_moving(Some(&bbox(100.0, 100.0)), Some(&bbox(108.0, 100.0))));
    }

    #[test]
    fn test_large_shift_is_motion() {
        let filter = MotionFilter::new(true, 8.0);
        assert!(filter.is_moving(Some(&bbox(100.0, 100.0)), Some(&bbox(120.0, 100.0))));

        let grown = BoundingBox::new(100.0, 100.0, 340.0, 190.0);
        assert!(filter.is_moving(Some(&bbox(100.0, 100.0)), Some(&grown)));
    }

    #[test]
    fn test_missing_bounds_never_moving() {
        let filter = MotionFilter::default();
        assert!(!filter.is_moving(None, Some(&bbox(0.0, 0.0))));
        assert!(!filter.is_moving(Some(&bbox(0.0, 0.0)), None));
        assert!(!filter.is_moving(None, None));
    }

    #[test]
    fn test_disabled_filter() {
        let filter = MotionFilter::disabled();
        assert!(!filter.is_moving(Some(&bbox(0.0, 0.0)), Some(&bbox(300.0, 300.0))));
    }
}
