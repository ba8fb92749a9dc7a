//! Face presence detection over a pluggable model
//!
//! Any backend implementing [`FaceModel`] can be loaded into a
//! [`FaceModelSession`]. The session owns the model's load state; a failed or
//! slow load leaves face detection disabled without affecting other stages.

use crate::errors::CaptureError;
use crate::types::{BoundingBox, PixelBuffer};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FaceModelError {
    #[error("face model failed to load: {0}")]
    LoadFailed(String),
    #[error("face model load timed out after {0:?}")]
    Timeout(Duration),
    #[error("face model inference failed: {0}")]
    Inference(String),
}

/// One face proposed by a model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceCandidate {
    pub bounds: BoundingBox,
    pub confidence: f32,
}

/// "Detect faces in a pixel buffer"
pub trait FaceModel: Send + Sync {
    fn name(&self) -> &str {
        "face-model"
    }

    fn detect(&self, frame: &PixelBuffer) -> Result<Vec<FaceCandidate>, FaceModelError>;
}

/// Stand-in used when no model is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct NullFaceModel;

impl FaceModel for NullFaceModel {
    fn name(&self) -> &str {
        "null"
    }

    fn detect(&self, _frame: &PixelBuffer) -> Result<Vec<FaceCandidate>, FaceModelError> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelLoadState {
    Uninitialized,
    Loading,
    Ready,
    Failed,
}

struct SessionInner {
    state: ModelLoadState,
    model: Option<Arc<dyn FaceModel>>,
    error: Option<FaceModelError>,
}

/// Owns one face model and its load state. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct FaceModelSession {
    inner: Arc<RwLock<SessionInner>>,
}

impl Default for FaceModelSession {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FaceModelSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaceModelSession")
            .field("state", &self.state())
            .finish()
    }
}

impl FaceModelSession {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(SessionInner {
                state: ModelLoadState::Uninitialized,
                model: None,
                error: None,
            })),
        }
    }

    /// A session whose model is already available
    pub fn with_model(model: Arc<dyn FaceModel>) -> Self {
        let session = Self::new();
        session.install(model);
        session
    }

    pub fn state(&self) -> ModelLoadState {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).state
    }

    pub fn last_error(&self) -> Option<FaceModelError> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .error
            .clone()
    }

    /// The model, only once loading has succeeded
    pub fn model(&self) -> Option<Arc<dyn FaceModel>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        match inner.state {
            ModelLoadState::Ready => inner.model.clone(),
            _ => None,
        }
    }

    fn install(&self, model: Arc<dyn FaceModel>) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        log::info!("Face model '{}' ready", model.name());
        inner.model = Some(model);
        inner.state = ModelLoadState::Ready;
        inner.error = None;
    }

    fn fail(&self, error: FaceModelError) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        log::warn!("{}; face detection disabled for this session", error);
        inner.model = None;
        inner.state = ModelLoadState::Failed;
        inner.error = Some(error);
    }

    /// Load the model on the blocking pool, giving up after `timeout`.
    ///
    /// Only the first call loads. Later calls report the outcome of that
    /// load: `Ok` while loading or ready, the stored error once failed.
    pub async fn load<F>(&self, loader: F, timeout: Duration) -> Result<(), FaceModelError>
    where
        F: FnOnce() -> Result<Arc<dyn FaceModel>, FaceModelError> + Send + 'static,
    {
        {
            let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
            match inner.state {
                ModelLoadState::Loading | ModelLoadState::Ready => return Ok(()),
                ModelLoadState::Failed => {
                    return Err(inner
                        .error
                        .clone()
                        .unwrap_or_else(|| FaceModelError::LoadFailed("unknown".to_string())))
                }
                ModelLoadState::Uninitialized => inner.state = ModelLoadState::Loading,
            }
        }

        log::info!("Loading face model (timeout {:?})", timeout);
        let outcome = match tokio::time::timeout(timeout, tokio::task::spawn_blocking(loader)).await
        {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(FaceModelError::LoadFailed(join_error.to_string())),
            Err(_) => Err(FaceModelError::Timeout(timeout)),
        };

        match outcome {
            Ok(model) => {
                self.install(model);
                Ok(())
            }
            Err(error) => {
                self.fail(error.clone());
                Err(error)
            }
        }
    }
}

/// Which candidate counts as the face on the document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceSelection {
    pub min_confidence: f32,
    /// Candidate area over frame area, lower bound
    pub min_area_ratio: f32,
    pub max_area_ratio: f32,
}

impl Default for FaceSelection {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            min_area_ratio: 0.02,
            max_area_ratio: 0.25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceDetection {
    pub detected: bool,
    pub confidence: f32,
    pub bounds: Option<BoundingBox>,
    /// Best candidate failed the confidence floor or the area band
    pub weak_match: bool,
}

impl FaceDetection {
    pub fn none() -> Self {
        Self {
            detected: false,
            confidence: 0.0,
            bounds: None,
            weak_match: false,
        }
    }
}

/// Pick the best candidate for a face printed on an ID card.
///
/// Prefers the most confident candidate that clears the confidence floor,
/// lies fully inside the frame and has a plausible size. Failing that, the
/// most confident candidate is reported as a weak match.
pub fn select_face(
    candidates: &[FaceCandidate],
    width: u32,
    height: u32,
    selection: &FaceSelection,
) -> FaceDetection {
    let frame_area = width as f32 * height as f32;
    let usable = || {
        candidates
            .iter()
            .filter(|c| c.confidence.is_finite() && c.bounds.area() > 0.0)
    };

    let strong = usable()
        .filter(|c| {
            let ratio = c.bounds.area() / frame_area;
            c.confidence >= selection.min_confidence
                && (selection.min_area_ratio..=selection.max_area_ratio).contains(&ratio)
                && c.bounds.is_within(width, height)
        })
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence));

    let (best, weak_match) = match strong {
        Some(c) => (c, false),
        None => match usable().max_by(|a, b| a.confidence.total_cmp(&b.confidence)) {
            Some(c) => (c, true),
            None => return FaceDetection::none(),
        },
    };

    FaceDetection {
        detected: true,
        confidence: best.confidence.clamp(0.0, 1.0),
        bounds: Some(best.bounds),
        weak_match,
    }
}

/// Runs the session's model (if any) and applies [`select_face`]
#[derive(Debug, Clone, Default)]
pub struct FacePresenceDetector {
    session: FaceModelSession,
    selection: FaceSelection,
}

impl FacePresenceDetector {
    pub fn new(session: FaceModelSession, selection: FaceSelection) -> Self {
        Self { session, selection }
    }

    pub fn session(&self) -> &FaceModelSession {
        &self.session
    }

    /// True when a loaded model is available
    pub fn is_available(&self) -> bool {
        self.session.state() == ModelLoadState::Ready
    }

    pub fn detect(&self, frame: &PixelBuffer) -> Result<FaceDetection, CaptureError> {
        let model = match self.session.model() {
            Some(model) => model,
            None => return Ok(FaceDetection::none()),
        };
        let candidates = model
            .detect(frame)
            .map_err(|e| CaptureError::FaceModel(e.to_string()))?;
        Ok(select_face(&candidates, frame.width(), frame.height(), &self.selection))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(x: f32, y: f32, size: f32, confidence: f32) -> FaceCandidate {
        FaceCandidate {
            bounds: BoundingBox::new(x, y, size, size),
            confidence,
        }
    }

    #[test]
    fn test_prefers_plausible_candidate_over_more_confident_giant() {
        // 100x100 frame: a 60px box is 36% of the frame, a 20px box is 4%
        let candidates = [candidate(10.0, 10.0, 60.0, 0.95), candidate(50.0, 50.0, 20.0, 0.7)];
        let face = select_face(&candidates, 100, 100, &FaceSelection::default());
        assert!(face.detected);
        assert!(!face.weak_match);
        assert_eq!(face.confidence, 0.7);
    }

    #[test]
    fn test_edge_of_frame_candidate_rejected() {
        let candidates = [candidate(90.0, 40.0, 20.0, 0.9), candidate(30.0, 30.0, 20.0, 0.6)];
        let face = select_face(&candidates, 100, 100, &FaceSelection::default());
        assert_eq!(face.confidence, 0.6);
        assert!(!face.weak_match);
    }

    #[test]
    fn test_falls_back_to_weak_match() {
        let candidates = [candidate(10.0, 10.0, 5.0, 0.3), candidate(10.0, 10.0, 70.0, 0.4)];
        let face = select_face(&candidates, 100, 100, &FaceSelection::default());
        assert!(face.detected);
        assert!(face.weak_match);
        assert_eq!(face.confidence, 0.4);
    }

    #[test]
    fn test_no_candidates() {
        let face = select_face(&[], 100, 100, &FaceSelection::default());
        assert_eq!(face, FaceDetection::none());
        let nan = [candidate(10.0, 10.0, 20.0, f32::NAN)];
        assert_eq!(select_face(&nan, 100, 100, &FaceSelection::default()), FaceDetection::none());
    }

    #[test]
    fn test_uninitialized_session_reports_no_face() {
        let detector = FacePresenceDetector::default();
        assert!(!detector.is_available());
        let frame = PixelBuffer::blank(10, 10, crate::types::PixelFormat::Rgb);
        assert_eq!(detector.detect(&frame).unwrap(), FaceDetection::none());
    }

    #[tokio::test]
    async fn test_load_success() {
        let session = FaceModelSession::new();
        session
            .load(|| Ok(Arc::new(NullFaceModel) as Arc<dyn FaceModel>), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(session.state(), ModelLoadState::Ready);
        assert!(session.model().is_some());
    }

    #[tokio::test]
    async fn test_load_failure_is_permanent() {
        let session = FaceModelSession::new();
        let err = session
            .load(
                || Err(FaceModelError::LoadFailed("missing weights".to_string())),
                Duration::from_secs(1),
            )
            .await
            .unwrap_err();
        assert_eq!(err, FaceModelError::LoadFailed("missing weights".to_string()));
        assert_eq!(session.state(), ModelLoadState::Failed);

        // A second attempt does not retry
        let again = session
            .load(|| Ok(Arc::new(NullFaceModel) as Arc<dyn FaceModel>), Duration::from_secs(1))
            .await;
        assert!(again.is_err());
        assert!(session.model().is_none());
    }

    #[tokio::test]
    async fn test_slow_load_times_out() {
        let session = FaceModelSession::new();
        let err = session
            .load(
                || {
                    std::thread::sleep(Duration::from_millis(300));
                    Ok(Arc::new(NullFaceModel) as Arc<dyn FaceModel>)
                },
                Duration::from_millis(20),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FaceModelError::Timeout(_)));
        assert_eq!(session.state(), ModelLoadState::Failed);
    }
}
