use crate::commands::analysis::{face_models, resolve_config};
use crate::config::{CaptureProfile, DetectionConfig};
use crate::errors::CaptureError;
use crate::pipeline::{CaptureLoop, SessionStats};
use crate::sampler::{
    CameraSource, FixedRateScheduler, FrameSource, MonotonicClock, StillImageSource,
};
use crate::session::{LiveSession, SessionHandle, SessionStatus};
use crate::types::CaptureEvent;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tauri::{command, AppHandle, Emitter, Runtime};
use tokio::sync::{watch, RwLock};

pub const STATUS_EVENT: &str = "idcapture://status";
pub const CAPTURE_EVENT: &str = "idcapture://capture";

const STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// How long a captured session waits for a reset before ending itself
const CAPTURED_LINGER: Duration = Duration::from_secs(60);

lazy_static::lazy_static! {
    static ref SESSION_REGISTRY: Arc<RwLock<HashMap<String, Arc<SessionHandle>>>> =
        Arc::new(RwLock::new(HashMap::new()));
}

/// Payload of [`CAPTURE_EVENT`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturePayload {
    pub session_id: String,
    pub event: CaptureEvent,
}

/// Start a live capture session on a camera or a still image.
///
/// Returns the session id. Status snapshots and capture events are emitted
/// as `idcapture://status` and `idcapture://capture`.
#[command]
pub async fn start_capture_session<R: Runtime>(
    app: AppHandle<R>,
    device_id: Option<String>,
    image_path: Option<String>,
    profile: Option<CaptureProfile>,
    config: Option<DetectionConfig>,
) -> Result<String, String> {
    let config = resolve_config(config, profile);
    config.validate()?;

    let handle = tokio::task::spawn_blocking(move || -> Result<SessionHandle, CaptureError> {
        let source: Box<dyn FrameSource> = match image_path {
            Some(path) => Box::new(StillImageSource::open(path)?),
            None => Box::new(CameraSource::open(device_id.as_deref().unwrap_or("0"))?),
        };
        let capture_loop =
            CaptureLoop::new(source, config, face_models(), Arc::new(MonotonicClock::new()))?;
        LiveSession::start_with_linger(
            capture_loop,
            FixedRateScheduler::display_refresh(),
            Some(CAPTURED_LINGER),
        )
    })
    .await
    .map_err(|e| format!("Task join error: {}", e))?
    .map_err(|e| {
        log::error!("Failed to start capture session: {}", e);
        format!("Failed to start capture session: {}", e)
    })?;

    let handle = Arc::new(handle);
    let session_id = handle.id().to_string();
    SESSION_REGISTRY
        .write()
        .await
        .insert(session_id.clone(), Arc::clone(&handle));
    forward_events(app, &handle);

    Ok(session_id)
}

fn forward_events<R: Runtime>(app: AppHandle<R>, handle: &SessionHandle) {
    let session_id = handle.id().to_string();

    if let Some(mut captures) = handle.take_captures() {
        let app = app.clone();
        let session_id = session_id.clone();
        tauri::async_runtime::spawn(async move {
            while let Some(event) = captures.recv().await {
                let payload = CapturePayload {
                    session_id: session_id.clone(),
                    event,
                };
                if let Err(e) = app.emit(CAPTURE_EVENT, &payload) {
                    log::warn!("Failed to emit capture event: {}", e);
                }
            }
        });
    }

    let status = handle.subscribe();
    tauri::async_runtime::spawn(async move {
        follow_status(status, |snapshot| {
            if let Err(e) = app.emit(STATUS_EVENT, snapshot) {
                log::warn!("Failed to emit status for {}: {}", session_id, e);
            }
        })
        .await;
        unregister(&session_id).await;
    });
}

/// Report the current status and every change until the session stops
/// running
async fn follow_status<F>(mut status: watch::Receiver<SessionStatus>, mut on_status: F)
where
    F: FnMut(&SessionStatus),
{
    loop {
        let snapshot = status.borrow_and_update().clone();
        on_status(&snapshot);
        if !snapshot.running || status.changed().await.is_err() {
            break;
        }
    }
}

/// Drop a finished session from the registry
async fn unregister(session_id: &str) {
    if SESSION_REGISTRY.write().await.remove(session_id).is_some() {
        log::debug!("Capture session {} removed from registry", session_id);
    }
}

async fn get_session(session_id: &str) -> Result<Arc<SessionHandle>, String> {
    SESSION_REGISTRY
        .read()
        .await
        .get(session_id)
        .cloned()
        .ok_or_else(|| format!("Unknown capture session: {}", session_id))
}

/// Stop a session and drop it from the registry
#[command]
pub async fn stop_capture_session(session_id: String) -> Result<SessionStats, String> {
    let handle = SESSION_REGISTRY
        .write()
        .await
        .remove(&session_id)
        .ok_or_else(|| format!("Unknown capture session: {}", session_id))?;

    tokio::task::spawn_blocking(move || handle.stop(STOP_TIMEOUT))
        .await
        .map_err(|e| format!("Task join error: {}", e))?
        .map_err(|e| e.to_string())
}

/// Abort a running countdown
#[command]
pub async fn cancel_auto_capture(session_id: String) -> Result<(), String> {
    get_session(&session_id)
        .await?
        .cancel()
        .map_err(|e| e.to_string())
}

/// Re-arm auto-capture for a retake
#[command]
pub async fn reset_auto_capture(session_id: String) -> Result<(), String> {
    get_session(&session_id)
        .await?
        .reset()
        .map_err(|e| e.to_string())
}

/// Capture now, regardless of stability
#[command]
pub async fn trigger_manual_capture(session_id: String) -> Result<(), String> {
    get_session(&session_id)
        .await?
        .manual_capture()
        .map_err(|e| e.to_string())
}

#[command]
pub async fn get_session_status(session_id: String) -> Result<SessionStatus, String> {
    Ok(get_session(&session_id).await?.status())
}

#[command]
pub async fn list_capture_sessions() -> Result<Vec<SessionStatus>, String> {
    let registry = SESSION_REGISTRY.read().await;
    Ok(registry.values().map(|handle| handle.status()).collect())
}
