//! Live frame sources
//!
//! [`CameraSource`] reads from a physical camera through nokhwa;
//! [`StillImageSource`] serves a fixed image (CLI, tests, replays).

use crate::errors::CaptureError;
use crate::types::{PixelBuffer, PixelFormat};
use nokhwa::{
    pixel_format::RgbFormat,
    utils::{CameraIndex, RequestedFormat, RequestedFormatType},
    CallbackCamera,
};
use std::path::Path;

/// A live video/image source
pub trait FrameSource: Send {
    /// True once the source is delivering decoded pixels
    fn is_ready(&self) -> bool;

    /// Native resolution of the most recent frame, if known
    fn native_dimensions(&self) -> Option<(u32, u32)>;

    /// The current frame at native resolution
    fn current_frame(&mut self) -> Result<&PixelBuffer, CaptureError>;
}

/// Serves the same frame on every tick
#[derive(Debug, Clone)]
pub struct StillImageSource {
    frame: PixelBuffer,
    ready: bool,
}

impl StillImageSource {
    pub fn new(frame: PixelBuffer) -> Self {
        Self { frame, ready: true }
    }

    /// Decode an image file from disk
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CaptureError> {
        let path = path.as_ref();
        let image = image::open(path).map_err(|e| {
            CaptureError::SourceUnavailable(format!("Failed to open {:?}: {}", path, e))
        })?;
        let frame = to_pixel_buffer(image)?;
        log::info!("Loaded still image {:?} ({}x{})", path, frame.width(), frame.height());
        Ok(Self::new(frame))
    }

    /// Simulate a source that is not yet decodable
    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    /// Swap the frame served from the next tick on
    pub fn set_frame(&mut self, frame: PixelBuffer) {
        self.frame = frame;
    }
}

impl FrameSource for StillImageSource {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn native_dimensions(&self) -> Option<(u32, u32)> {
        Some((self.frame.width(), self.frame.height()))
    }

    fn current_frame(&mut self) -> Result<&PixelBuffer, CaptureError> {
        if !self.ready {
            return Err(CaptureError::SourceUnavailable("still image not ready".to_string()));
        }
        Ok(&self.frame)
    }
}

/// Decode an encoded image (PNG, JPEG, ...) into an RGB buffer
pub fn decode_image(bytes: &[u8]) -> Result<PixelBuffer, CaptureError> {
    let image = image::load_from_memory(bytes)
        .map_err(|e| CaptureError::InvalidFrame(format!("Failed to decode image: {}", e)))?;
    to_pixel_buffer(image)
}

fn to_pixel_buffer(image: image::DynamicImage) -> Result<PixelBuffer, CaptureError> {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    PixelBuffer::new(width, height, PixelFormat::Rgb, rgb.into_raw())
}

/// Physical camera decoded to RGB through nokhwa
pub struct CameraSource {
    camera: CallbackCamera,
    device_id: String,
    latest: Option<PixelBuffer>,
}

impl CameraSource {
    /// Open a camera by index and start streaming
    pub fn open(device_id: &str) -> Result<Self, CaptureError> {
        let device_index = device_id.parse::<u32>().map_err(|_| {
            CaptureError::SourceUnavailable(format!("Invalid device ID: {}", device_id))
        })?;

        let requested_format =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);

        let mut camera =
            CallbackCamera::new(CameraIndex::Index(device_index), requested_format, |_| {})
                .map_err(|e| {
                    CaptureError::SourceUnavailable(format!("Failed to initialize camera: {}", e))
                })?;

        camera.open_stream().map_err(|e| {
            CaptureError::SourceUnavailable(format!("Failed to start stream: {}", e))
        })?;

        log::info!("Opened camera {} for live analysis", device_id);
        Ok(Self {
            camera,
            device_id: device_id.to_string(),
            latest: None,
        })
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }
}

impl FrameSource for CameraSource {
    fn is_ready(&self) -> bool {
        self.camera.is_stream_open().unwrap_or(false)
    }

    fn native_dimensions(&self) -> Option<(u32, u32)> {
        self.latest.as_ref().map(|f| (f.width(), f.height()))
    }

    fn current_frame(&mut self) -> Result<&PixelBuffer, CaptureError> {
        let raw = self
            .camera
            .poll_frame()
            .map_err(|e| CaptureError::FrameExtraction(format!("Failed to poll frame: {}", e)))?;
        let decoded = raw
            .decode_image::<RgbFormat>()
            .map_err(|e| CaptureError::FrameExtraction(format!("Failed to decode frame: {}", e)))?;
        let (width, height) = decoded.dimensions();
        let data = decoded.into_raw();

        let same_shape = matches!(&self.latest, Some(f) if f.dimensions() == (width, height));
        if same_shape {
            if let Some(frame) = self.latest.as_mut() {
                frame.refill(&data)?;
            }
        } else {
            log::debug!("Camera {} resolution is now {}x{}", self.device_id, width, height);
            self.latest = Some(PixelBuffer::new(width, height, PixelFormat::Rgb, data)?);
        }

        self.latest
            .as_ref()
            .ok_or_else(|| CaptureError::FrameExtraction("no decoded frame".to_string()))
    }
}

// SAFETY: the camera is owned by exactly one session thread at a time and
// nokhwa serialises device access behind its own mutex.
unsafe impl Send for CameraSource {}

impl Drop for CameraSource {
    fn drop(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            log::warn!("Failed to stop camera {} stream: {}", self.device_id, e);
        }
    }
}
