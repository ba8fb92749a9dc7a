/// Quality aggregation
///
/// Fuses the per-stage outputs of one frame into a [`DetectionResult`]:
/// motion gating, capture readiness and the coarse quality grade.
pub mod motion;

pub use motion::MotionFilter;

use crate::config::DetectionConfig;
use crate::detect::{DocumentDetection, FaceDetection, GlareMetrics, SharpnessMetrics};
use crate::types::{BoundingBox, DetectionResult, QualityGrade};

pub const DOCUMENT_WEIGHT: f32 = 3.0;
pub const BLUR_WEIGHT: f32 = 2.0;
pub const GLARE_WEIGHT: f32 = 2.0;
pub const FACE_WEIGHT: f32 = 1.0;

/// Weighted quality score in [0, 1].
///
/// `face_confidence` is `None` when face detection is disabled, which drops
/// its weight from the normalisation.
pub fn quality_score(
    document_confidence: f32,
    blur_score: f32,
    glare_score: f32,
    face_confidence: Option<f32>,
) -> f32 {
    let unit = |v: f32| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };

    let mut weighted = DOCUMENT_WEIGHT * unit(document_confidence)
        + BLUR_WEIGHT * unit(blur_score)
        + GLARE_WEIGHT * (1.0 - unit(glare_score));
    let mut total = DOCUMENT_WEIGHT + BLUR_WEIGHT + GLARE_WEIGHT;

    if let Some(face) = face_confidence {
        weighted += FACE_WEIGHT * unit(face);
        total += FACE_WEIGHT;
    }

    (weighted / total).clamp(0.0, 1.0)
}

/// Raw outputs of the detection stages for one frame
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutputs {
    pub document: DocumentDetection,
    pub blur: SharpnessMetrics,
    pub glare: GlareMetrics,
    pub face: FaceDetection,
}

impl Default for StageOutputs {
    /// What a frame looks like when every stage is disabled or failed
    fn default() -> Self {
        Self {
            document: DocumentDetection::not_detected(),
            blur: SharpnessMetrics::neutral(),
            glare: GlareMetrics::neutral(),
            face: FaceDetection::none(),
        }
    }
}

impl StageOutputs {
    pub fn aggregate(
        &self,
        previous_bounds: Option<&BoundingBox>,
        config: &DetectionConfig,
        timestamp: u64,
    ) -> DetectionResult {
        aggregate(
            &self.document,
            &self.blur,
            &self.glare,
            &self.face,
            previous_bounds,
            config,
            timestamp,
        )
    }
}

/// Build the per-frame result. Pure: same inputs, same output.
pub fn aggregate(
    document: &DocumentDetection,
    blur: &SharpnessMetrics,
    glare: &GlareMetrics,
    face: &FaceDetection,
    previous_bounds: Option<&BoundingBox>,
    config: &DetectionConfig,
    timestamp: u64,
) -> DetectionResult {
    let motion = MotionFilter::new(config.enable_motion_gating, config.motion_jitter_px);

    let document_detected = document.detected;
    let document_confidence = if document_detected {
        document.confidence.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let document_bounds = if document_detected { document.bounds } else { None };
    let is_moving = motion.is_moving(previous_bounds, document_bounds.as_ref());

    let (face_detected, face_confidence, face_bounds, face_weak_match) =
        if config.enable_face_detection && face.detected {
            (true, face.confidence.clamp(0.0, 1.0), face.bounds, face.weak_match)
        } else {
            (false, 0.0, None, false)
        };

    // Face presence never gates readiness
    let ready_for_capture = document_detected
        && document_confidence >= config.min_document_confidence
        && !is_moving
        && (!config.enable_blur_detection || !blur.is_blurry)
        && (!config.enable_glare_detection || !glare.has_glare);

    let score = quality_score(
        document_confidence,
        blur.score,
        glare.score,
        config.enable_face_detection.then_some(face_confidence),
    );

    DetectionResult {
        document_detected,
        document_confidence,
        document_bounds,
        is_blurry: blur.is_blurry,
        blur_score: blur.score.clamp(0.0, 1.0),
        has_glare: glare.has_glare,
        glare_score: glare.score.clamp(0.0, 1.0),
        face_detected,
        face_confidence,
        face_bounds,
        face_weak_match,
        is_moving,
        ready_for_capture,
        quality_score: score,
        overall_quality: QualityGrade::from_score(score),
        timestamp,
    }
}
