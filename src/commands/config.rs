use crate::config::{DetectionConfig, IdCaptureConfig};
use std::sync::{Arc, RwLock};
use tauri::command;

lazy_static::lazy_static! {
    static ref GLOBAL_CONFIG: Arc<RwLock<IdCaptureConfig>> = Arc::new(RwLock::new(IdCaptureConfig::load_or_default()));
}

/// Detection settings new sessions start from
pub fn current_detection_config() -> DetectionConfig {
    match GLOBAL_CONFIG.read() {
        Ok(config) => config.detection.clone(),
        Err(e) => {
            log::warn!("Config lock poisoned, using defaults: {}", e);
            DetectionConfig::default()
        }
    }
}

/// Get the detection configuration
#[command]
pub async fn get_detection_config() -> Result<DetectionConfig, String> {
    let config = GLOBAL_CONFIG.read().map_err(|e| e.to_string())?;
    Ok(config.detection.clone())
}

/// Replace the detection configuration and persist it
#[command]
pub async fn update_detection_config(detection: DetectionConfig) -> Result<(), String> {
    detection.validate()?;

    let snapshot = {
        let mut config = GLOBAL_CONFIG.write().map_err(|e| e.to_string())?;
        config.detection = detection;
        config.clone()
    };

    snapshot
        .save_to_file(IdCaptureConfig::default_path())
        .map_err(|e| e.to_string())?;

    log::info!("Detection configuration updated");
    Ok(())
}

/// Reset the detection configuration to defaults
#[command]
pub async fn reset_detection_config() -> Result<DetectionConfig, String> {
    let snapshot = {
        let mut config = GLOBAL_CONFIG
            .write()
            .map_err(|e| format!("Failed to write config: {}", e))?;
        config.detection = DetectionConfig::default();
        config.clone()
    };

    snapshot
        .save_to_file(IdCaptureConfig::default_path())
        .map_err(|e| e.to_string())?;

    Ok(snapshot.detection)
}
