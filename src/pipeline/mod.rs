//! Per-frame detection pipeline
//!
//! Runs the document, sharpness and glare stages over one sampled frame,
//! then the face stage when a document was found, and folds the outputs into
//! a [`DetectionResult`]. A failing stage never fails the frame: its error is
//! logged and replaced by the stage's neutral output.

pub mod capture_loop;

pub use capture_loop::{CaptureLoop, SessionStats, StepOutcome};

use crate::config::DetectionConfig;
use crate::detect::{
    DocumentDetection, DocumentDetector, FaceDetection, FaceModelSession, FacePresenceDetector,
    FaceSelection, GlareAnalyzer, GlareMetrics, GlareThresholds, SharpnessAnalyzer,
    SharpnessMetrics,
};
use crate::errors::CaptureError;
use crate::quality::StageOutputs;
use crate::sampler::{FrameSampler, StillImageSource};
use crate::types::{BoundingBox, DetectionResult, PixelBuffer};
use serde::{Deserialize, Serialize};
use std::thread::ScopedJoinHandle;

/// Counters across the frames this pipeline has analysed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub frames_analyzed: u64,
    pub ready_frames: u64,
    pub stage_failures: u64,
    pub face_runs: u64,
}

#[derive(Debug)]
pub struct DetectionPipeline {
    config: DetectionConfig,
    document: DocumentDetector,
    sharpness: SharpnessAnalyzer,
    glare: GlareAnalyzer,
    face: FacePresenceDetector,
    previous_bounds: Option<BoundingBox>,
    stats: PipelineStats,
}

impl DetectionPipeline {
    pub fn new(config: DetectionConfig, faces: FaceModelSession) -> Result<Self, CaptureError> {
        config.validate().map_err(CaptureError::Config)?;
        let selection = FaceSelection {
            min_confidence: config.min_face_confidence,
            ..FaceSelection::default()
        };
        Ok(Self {
            document: DocumentDetector::default(),
            sharpness: SharpnessAnalyzer::default(),
            glare: GlareAnalyzer::new(GlareThresholds::default(), config.max_glare_score),
            face: FacePresenceDetector::new(faces, selection),
            config,
            previous_bounds: None,
            stats: PipelineStats::default(),
        })
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn face_session(&self) -> &FaceModelSession {
        self.face.session()
    }

    /// Forget the previous frame's bounds
    pub fn reset(&mut self) {
        self.previous_bounds = None;
    }

    /// Analyse one frame. Never fails; see the module docs.
    pub fn analyze(&mut self, frame: &PixelBuffer, timestamp: u64) -> DetectionResult {
        let (document, blur, glare) = if self.config.parallel_stages {
            self.run_fast_stages_parallel(frame)
        } else {
            (
                self.run_document(frame),
                self.run_sharpness(frame),
                self.run_glare(frame),
            )
        };

        let mut outputs = StageOutputs {
            document: self.contain("document", document, DocumentDetection::not_detected),
            blur: self.contain("sharpness", blur, SharpnessMetrics::neutral),
            glare: self.contain("glare", glare, GlareMetrics::neutral),
            face: FaceDetection::none(),
        };

        // The face model is the expensive stage; skip it on empty frames
        if self.config.enable_face_detection
            && outputs.document.detected
            && self.face.is_available()
        {
            self.stats.face_runs += 1;
            let face = self.face.detect(frame);
            outputs.face = self.contain("face", face, FaceDetection::none);
        }

        let result = outputs.aggregate(self.previous_bounds.as_ref(), &self.config, timestamp);
        self.previous_bounds = result.document_bounds;

        self.stats.frames_analyzed += 1;
        if result.ready_for_capture {
            self.stats.ready_frames += 1;
        }
        log::debug!(
            "Frame {}: document={} ({:.2}) blur={:.2} glare={:.2} ready={} quality={}",
            timestamp,
            result.document_detected,
            result.document_confidence,
            result.blur_score,
            result.glare_score,
            result.ready_for_capture,
            result.overall_quality.as_str()
        );
        result
    }

    fn run_fast_stages_parallel(
        &self,
        frame: &PixelBuffer,
    ) -> (
        Result<DocumentDetection, CaptureError>,
        Result<SharpnessMetrics, CaptureError>,
        Result<GlareMetrics, CaptureError>,
    ) {
        std::thread::scope(|scope| {
            let document = scope.spawn(|| self.run_document(frame));
            let blur = scope.spawn(|| self.run_sharpness(frame));
            let glare = self.run_glare(frame);
            (join_stage("document", document), join_stage("sharpness", blur), glare)
        })
    }

    fn run_document(&self, frame: &PixelBuffer) -> Result<DocumentDetection, CaptureError> {
        if !self.config.enable_document_detection {
            return Ok(DocumentDetection::not_detected());
        }
        self.document.detect(frame)
    }

    fn run_sharpness(&self, frame: &PixelBuffer) -> Result<SharpnessMetrics, CaptureError> {
        if !self.config.enable_blur_detection {
            return Ok(SharpnessMetrics::neutral());
        }
        self.sharpness.analyze(frame)
    }

    fn run_glare(&self, frame: &PixelBuffer) -> Result<GlareMetrics, CaptureError> {
        if !self.config.enable_glare_detection {
            return Ok(GlareMetrics::neutral());
        }
        self.glare.analyze(frame)
    }

    fn contain<T>(
        &mut self,
        stage: &str,
        outcome: Result<T, CaptureError>,
        neutral: impl FnOnce() -> T,
    ) -> T {
        match outcome {
            Ok(value) => value,
            Err(e) => {
                log::warn!("{} stage failed, using neutral result: {}", stage, e);
                self.stats.stage_failures += 1;
                neutral()
            }
        }
    }
}

/// One-shot analysis of a still frame through the same sampling path a live
/// session uses
pub fn analyze_still(
    frame: PixelBuffer,
    config: DetectionConfig,
    faces: FaceModelSession,
) -> Result<DetectionResult, CaptureError> {
    let mut sampler = FrameSampler::new(config.target_fps, config.downscale);
    let mut pipeline = DetectionPipeline::new(config, faces)?;
    let mut source = StillImageSource::new(frame);
    let sampled = sampler
        .sample(&mut source, 0)
        .ok_or_else(|| CaptureError::InvalidFrame("frame could not be sampled".to_string()))?;
    Ok(pipeline.analyze(&sampled.buffer, sampled.timestamp_ms))
}

fn join_stage<T>(
    stage: &'static str,
    handle: ScopedJoinHandle<'_, Result<T, CaptureError>>,
) -> Result<T, CaptureError> {
    handle
        .join()
        .unwrap_or_else(|_| Err(CaptureError::stage(stage, "stage thread panicked")))
}
