use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureError {
    /// Source is not yet decodable (camera warming up, permission pending)
    SourceUnavailable(String),
    FrameExtraction(String),
    InvalidFrame(String),
    Stage { stage: &'static str, message: String },
    FaceModel(String),
    Config(String),
    Session(String),
}

impl CaptureError {
    pub fn stage(stage: &'static str, message: impl Into<String>) -> Self {
        CaptureError::Stage {
            stage,
            message: message.into(),
        }
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CaptureError::SourceUnavailable(msg) => write!(f, "Frame source unavailable: {}", msg),
            CaptureError::FrameExtraction(msg) => write!(f, "Frame extraction error: {}", msg),
            CaptureError::InvalidFrame(msg) => write!(f, "Invalid frame: {}", msg),
            CaptureError::Stage { stage, message } => {
                write!(f, "Detection stage '{}' failed: {}", stage, message)
            }
            CaptureError::FaceModel(msg) => write!(f, "Face model error: {}", msg),
            CaptureError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CaptureError::Session(msg) => write!(f, "Capture session error: {}", msg),
        }
    }
}

impl std::error::Error for CaptureError {}
