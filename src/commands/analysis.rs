use crate::commands::config::current_detection_config;
use crate::config::{CaptureProfile, DetectionConfig};
use crate::detect::{FaceModel, FaceModelError, FaceModelSession, ModelLoadState};
use crate::pipeline::analyze_still;
use crate::sampler::decode_image;
use crate::types::DetectionResult;
use std::sync::Arc;
use std::time::Duration;
use tauri::command;

lazy_static::lazy_static! {
    // One face model per process, shared by every session
    static ref FACE_MODELS: FaceModelSession = FaceModelSession::new();
}

/// Handle to the process-wide face model session
pub fn face_models() -> FaceModelSession {
    FACE_MODELS.clone()
}

/// Load the face model used by all sessions. A failure leaves face
/// detection disabled for the rest of the process.
pub async fn load_face_model<F>(loader: F, timeout: Duration) -> Result<(), FaceModelError>
where
    F: FnOnce() -> Result<Arc<dyn FaceModel>, FaceModelError> + Send + 'static,
{
    FACE_MODELS.load(loader, timeout).await
}

/// Resolve the config for a request: explicit config, then profile preset,
/// then the stored configuration
pub(crate) fn resolve_config(
    config: Option<DetectionConfig>,
    profile: Option<CaptureProfile>,
) -> DetectionConfig {
    match (config, profile) {
        (Some(config), _) => config,
        (None, Some(profile)) => DetectionConfig::for_profile(profile),
        (None, None) => current_detection_config(),
    }
}

/// Analyse one encoded image (PNG/JPEG bytes)
#[command]
pub async fn analyze_frame(
    image_data: Vec<u8>,
    profile: Option<CaptureProfile>,
    config: Option<DetectionConfig>,
) -> Result<DetectionResult, String> {
    let config = resolve_config(config, profile);
    log::debug!("Analyzing {} byte frame", image_data.len());

    tokio::task::spawn_blocking(move || {
        let frame = decode_image(&image_data)?;
        analyze_still(frame, config, face_models())
    })
    .await
    .map_err(|e| format!("Task join error: {}", e))?
    .map_err(|e| {
        log::error!("Frame analysis failed: {}", e);
        format!("Frame analysis failed: {}", e)
    })
}

/// Load state of the shared face model
#[command]
pub async fn get_face_model_state() -> Result<ModelLoadState, String> {
    Ok(FACE_MODELS.state())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::id_card_scene;

    fn encode_png(frame: &crate::types::PixelBuffer) -> Vec<u8> {
        let image =
            image::RgbImage::from_raw(frame.width(), frame.height(), frame.data().to_vec()).unwrap();
        let mut bytes = std::io::Cursor::new(Vec::new());
        image.write_to(&mut bytes, image::ImageFormat::Png).unwrap();
        bytes.into_inner()
    }

    #[tokio::test]
    async fn test_analyze_frame_command() {
        let bytes = encode_png(&id_card_scene(640, 480));
        let result = analyze_frame(bytes, Some(CaptureProfile::DocumentBack), None)
            .await
            .unwrap();
        assert!(result.document_detected);
        assert!(result.ready_for_capture);
        assert!(!result.face_detected);
    }

    #[tokio::test]
    async fn test_analyze_frame_rejects_garbage() {
        let err = analyze_frame(vec![1, 2, 3], None, Some(DetectionConfig::default()))
            .await
            .unwrap_err();
        assert!(err.contains("Failed to decode image"));
    }

    #[test]
    fn test_explicit_config_wins_over_profile() {
        let config = DetectionConfig {
            min_stable_frames: 9,
            ..DetectionConfig::default()
        };
        let resolved = resolve_config(Some(config), Some(CaptureProfile::Selfie));
        assert_eq!(resolved.min_stable_frames, 9);
        assert!(!resolve_config(None, Some(CaptureProfile::DocumentBack)).enable_face_detection);
    }
}
