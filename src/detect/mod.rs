/// Per-frame detection stages
///
/// Document presence, sharpness and glare read the same immutable frame and
/// share no state, so they can run concurrently. Face presence wraps a
/// pluggable model and only runs once a document has been found.
pub mod document;
pub mod face;
pub mod glare;
pub mod sharpness;

pub use document::{
    is_id_card_aspect, DocumentDetection, DocumentDetector, DocumentDetectorConfig,
    ID_CARD_ASPECT_RATIO,
};
pub use face::{
    select_face, FaceCandidate, FaceDetection, FaceModel, FaceModelError, FaceModelSession,
    FacePresenceDetector, FaceSelection, ModelLoadState, NullFaceModel,
};
pub use glare::{GlareAnalyzer, GlareMetrics, GlareThresholds};
pub use sharpness::{
    SharpnessAnalyzer, SharpnessMetrics, SharpnessThresholds, BLURRY_SCORE_CEILING,
};
