//! idcapture: live identity-document capture assistant
//!
//! Analyses a live camera feed frame by frame and decides when an ID document
//! is well framed, sharp and free of glare, then fires a one-shot capture
//! after a short countdown.
//!
//! # Features
//! - Rate-limited, downscaled frame sampling from a camera or still image
//! - Document presence with ID-1 aspect-ratio checking
//! - Sharpness (Laplacian) and glare (bright, unsaturated hot-spot) analysis
//! - Pluggable face presence model with explicit load state
//! - Debounced auto-capture state machine with grace period and countdown
//! - Headless capture sessions and a Tauri plugin surface
//!
//! # Usage
//! Add this to your `Cargo.toml`:
//! ```toml
//! [dependencies]
//! idcapture = "0.1"
//! tauri = { version = "2.0", features = ["protocol-asset"] }
//! ```
//!
//! Then in your Tauri app:
//! ```rust,ignore
//! fn main() {
//!     tauri::Builder::default()
//!         .plugin(idcapture::init())
//!         .run(tauri::generate_context!())
//!         .expect("error while running tauri application");
//! }
//! ```
//!
//! Headless use drives a [`pipeline::CaptureLoop`] directly:
//! ```rust,ignore
//! use idcapture::{CaptureLoop, DetectionConfig, FaceModelSession, StillImageSource};
//! use idcapture::sampler::{FixedRateScheduler, MonotonicClock};
//! use std::sync::Arc;
//!
//! let source = StillImageSource::open("card.png")?;
//! let mut capture = CaptureLoop::new(
//!     Box::new(source),
//!     DetectionConfig::default(),
//!     FaceModelSession::new(),
//!     Arc::new(MonotonicClock::new()),
//! )?;
//! let event = capture.run(&mut FixedRateScheduler::display_refresh());
//! ```
pub mod auto_capture;
pub mod commands;
pub mod config;
pub mod detect;
pub mod errors;
pub mod pipeline;
pub mod quality;
pub mod sampler;
pub mod session;
pub mod types;

// Testing utilities - synthetic frames for offline testing
pub mod testing;

// Re-exports for convenience
pub use auto_capture::{AutoCaptureConfig, AutoCaptureController};
pub use config::{CaptureProfile, DetectionConfig, IdCaptureConfig};
pub use detect::{FaceModel, FaceModelSession, ModelLoadState};
pub use errors::CaptureError;
pub use pipeline::{analyze_still, CaptureLoop, DetectionPipeline, SessionStats};
pub use sampler::{FrameSampler, FrameSource, StillImageSource};
pub use session::{LiveSession, SessionHandle, SessionStatus};
pub use types::{
    AutoCaptureState, BoundingBox, CaptureEvent, CapturePhase, CaptureTrigger, DetectionResult,
    PixelBuffer, PixelFormat, QualityGrade,
};

use tauri::{
    plugin::{Builder, TauriPlugin},
    Runtime,
};

/// Initialize the idcapture plugin with all commands
pub fn init<R: Runtime>() -> TauriPlugin<R> {
    Builder::new("idcapture")
        .invoke_handler(tauri::generate_handler![
            // Stateless analysis
            commands::analysis::analyze_frame,
            commands::analysis::get_face_model_state,
            // Live sessions
            commands::session::start_capture_session,
            commands::session::stop_capture_session,
            commands::session::cancel_auto_capture,
            commands::session::reset_auto_capture,
            commands::session::trigger_manual_capture,
            commands::session::get_session_status,
            commands::session::list_capture_sessions,
            // Configuration
            commands::config::get_detection_config,
            commands::config::update_detection_config,
            commands::config::reset_detection_config,
        ])
        .build()
}

/// Initialize logging for idcapture
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "idcapture=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}

#[cfg(test)]
mod lib_tests {
    use super::*;

    #[test]
    fn test_crate_info() {
        let info = get_info();
        assert_eq!(info.name, "idcapture");
        assert!(!info.version.is_empty());
        assert!(!info.description.is_empty());
    }
}
