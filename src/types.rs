//! Shared value types for the capture-quality pipeline
//!
//! Frames, geometry, per-frame detection results and the auto-capture
//! snapshot consumed by the UI layer.

use crate::errors::CaptureError;
use serde::{Deserialize, Serialize};

/// Pixel layout of a [`PixelBuffer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Rgb,
    Rgba,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Rgb => 3,
            PixelFormat::Rgba => 4,
        }
    }
}

/// One frame worth of row-major pixel data
///
/// Fields are private so every buffer has exactly
/// `width * height * channels` bytes; pixel accessors rely on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPixelBuffer")]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

#[derive(Deserialize)]
struct RawPixelBuffer {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

impl TryFrom<RawPixelBuffer> for PixelBuffer {
    type Error = CaptureError;

    fn try_from(raw: RawPixelBuffer) -> Result<Self, Self::Error> {
        Self::new(raw.width, raw.height, raw.format, raw.data)
    }
}

impl PixelBuffer {
    /// Wrap raw pixel bytes, checking that the length matches the dimensions
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> Result<Self, CaptureError> {
        if width == 0 || height == 0 {
            return Err(CaptureError::InvalidFrame(format!(
                "zero-sized frame {}x{}",
                width, height
            )));
        }
        let expected = width as usize * height as usize * format.channels();
        if data.len() != expected {
            return Err(CaptureError::InvalidFrame(format!(
                "expected {} bytes for {}x{} {:?}, got {}",
                expected,
                width,
                height,
                format,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    /// Allocate a zeroed buffer
    pub fn blank(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
            data: vec![0u8; width as usize * height as usize * format.channels()],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Overwrite the pixels in place. The byte count must match the buffer.
    pub fn refill(&mut self, data: &[u8]) -> Result<(), CaptureError> {
        if data.len() != self.data.len() {
            return Err(CaptureError::InvalidFrame(format!(
                "expected {} bytes for {}x{}, got {}",
                self.data.len(),
                self.width,
                self.height,
                data.len()
            )));
        }
        self.data.copy_from_slice(data);
        Ok(())
    }

    pub fn channels(&self) -> usize {
        self.format.channels()
    }

    pub fn area(&self) -> f32 {
        self.width as f32 * self.height as f32
    }

    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * self.channels()
    }

    /// RGB triple at (x, y); alpha is ignored
    #[inline]
    pub fn rgb(&self, x: u32, y: u32) -> [u8; 3] {
        let i = self.offset(x, y);
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    #[inline]
    pub fn set_rgb(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        let i = self.offset(x, y);
        self.data[i..i + 3].copy_from_slice(&rgb);
        if self.format == PixelFormat::Rgba {
            self.data[i + 3] = 255;
        }
    }

    /// Rec. 601 luma at (x, y), computed on the fly
    #[inline]
    pub fn luminance(&self, x: u32, y: u32) -> f32 {
        let [r, g, b] = self.rgb(x, y);
        0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32
    }
}

/// Axis-aligned rectangle in buffer-pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    /// Negative sizes are clamped to zero
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width: width.max(0.0),
            height: height.max(0.0),
        }
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Corners in clockwise order starting top-left
    pub fn corners(&self) -> [Point; 4] {
        [
            Point::new(self.x, self.y),
            Point::new(self.right(), self.y),
            Point::new(self.right(), self.bottom()),
            Point::new(self.x, self.bottom()),
        ]
    }

    /// True when the box lies entirely inside a `width` x `height` frame
    pub fn is_within(&self, width: u32, height: u32) -> bool {
        self.x >= 0.0
            && self.y >= 0.0
            && self.right() <= width as f32
            && self.bottom() <= height as f32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Coarse quality grade shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityGrade {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl QualityGrade {
    /// Map a normalized quality score onto a grade
    pub fn from_score(score: f32) -> Self {
        if score < 0.4 {
            QualityGrade::Poor
        } else if score < 0.65 {
            QualityGrade::Fair
        } else if score < 0.85 {
            QualityGrade::Good
        } else {
            QualityGrade::Excellent
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityGrade::Poor => "poor",
            QualityGrade::Fair => "fair",
            QualityGrade::Good => "good",
            QualityGrade::Excellent => "excellent",
        }
    }
}

/// Per-frame verdict produced by the quality aggregator.
///
/// `ready_for_capture`, `quality_score` and `overall_quality` are derived
/// by [`crate::quality::aggregate`] and never set independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    pub document_detected: bool,
    pub document_confidence: f32,
    pub document_bounds: Option<BoundingBox>,
    pub is_blurry: bool,
    pub blur_score: f32,
    pub has_glare: bool,
    pub glare_score: f32,
    pub face_detected: bool,
    pub face_confidence: f32,
    pub face_bounds: Option<BoundingBox>,
    pub face_weak_match: bool,
    pub is_moving: bool,
    pub ready_for_capture: bool,
    pub quality_score: f32,
    pub overall_quality: QualityGrade,
    pub timestamp: u64,
}

/// Phase of the auto-capture state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CapturePhase {
    Idle,
    Accumulating,
    CountingDown,
    Captured,
}

/// Snapshot of the auto-capture controller for progress rings and hints
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoCaptureState {
    pub phase: CapturePhase,
    pub is_counting_down: bool,
    pub countdown_progress: f32,
    pub remaining_ms: u64,
    /// True only on the snapshot that fired the capture
    pub should_capture: bool,
    pub stable_frames: u32,
    pub unstable_frames: u32,
}

impl AutoCaptureState {
    pub fn idle() -> Self {
        Self {
            phase: CapturePhase::Idle,
            is_counting_down: false,
            countdown_progress: 0.0,
            remaining_ms: 0,
            should_capture: false,
            stable_frames: 0,
            unstable_frames: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureTrigger {
    Auto,
    Manual,
}

/// "Capture now". The caller pulls a full-resolution image from its source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureEvent {
    pub trigger: CaptureTrigger,
    /// Pipeline clock, milliseconds
    pub at_ms: u64,
    pub captured_at: chrono::DateTime<chrono::Utc>,
}

impl CaptureEvent {
    pub fn new(trigger: CaptureTrigger, at_ms: u64) -> Self {
        Self {
            trigger,
            at_ms,
            captured_at: chrono::Utc::now(),
        }
    }
}
