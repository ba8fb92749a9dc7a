//! Headless cooperative driver
//!
//! One [`CaptureLoop::step`] per scheduler tick: sample, analyse, feed the
//! auto-capture controller. Analysis runs inline, so a new frame is never
//! dispatched while the previous one is still being analysed.

use super::{DetectionPipeline, PipelineStats};
use crate::auto_capture::{AutoCaptureConfig, AutoCaptureController};
use crate::config::DetectionConfig;
use crate::detect::FaceModelSession;
use crate::errors::CaptureError;
use crate::sampler::{Clock, FrameSampler, FrameSource, SamplerStats, TickScheduler};
use crate::types::{AutoCaptureState, CaptureEvent, DetectionResult, PixelBuffer};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What happened on one tick
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    /// Present when a frame was sampled and analysed
    pub result: Option<DetectionResult>,
    pub state: AutoCaptureState,
    /// Present on the tick that fired a capture
    pub capture: Option<CaptureEvent>,
}

/// Per-session counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub ticks: u64,
    pub frames_sampled: u64,
    pub frames_analyzed: u64,
    pub frames_skipped: u64,
    pub ready_frames: u64,
    pub stage_failures: u64,
    pub captures: u64,
}

impl SessionStats {
    fn collect(ticks: u64, captures: u64, sampler: SamplerStats, pipeline: PipelineStats) -> Self {
        Self {
            ticks,
            frames_sampled: sampler.sampled,
            frames_analyzed: pipeline.frames_analyzed,
            frames_skipped: sampler.throttled + sampler.not_ready + sampler.extraction_failures,
            ready_frames: pipeline.ready_frames,
            stage_failures: pipeline.stage_failures,
            captures,
        }
    }
}

pub struct CaptureLoop {
    source: Box<dyn FrameSource>,
    sampler: FrameSampler,
    pipeline: DetectionPipeline,
    controller: AutoCaptureController,
    clock: Arc<dyn Clock>,
    ticks: u64,
    captures: u64,
    stopped: bool,
}

impl std::fmt::Debug for CaptureLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureLoop")
            .field("pipeline", &self.pipeline)
            .field("controller", &self.controller)
            .field("ticks", &self.ticks)
            .field("stopped", &self.stopped)
            .finish()
    }
}

impl CaptureLoop {
    pub fn new(
        source: Box<dyn FrameSource>,
        config: DetectionConfig,
        faces: FaceModelSession,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CaptureError> {
        let sampler = FrameSampler::new(config.target_fps, config.downscale);
        let controller = AutoCaptureController::new(AutoCaptureConfig::from(&config));
        let pipeline = DetectionPipeline::new(config, faces)?;
        Ok(Self {
            source,
            sampler,
            pipeline,
            controller,
            clock,
            ticks: 0,
            captures: 0,
            stopped: false,
        })
    }

    /// Replace the controller's capture callback
    pub fn on_capture(mut self, callback: impl FnMut(&CaptureEvent) + Send + 'static) -> Self {
        let config = *self.controller.config();
        self.controller = AutoCaptureController::new(config).with_callback(callback);
        self
    }

    pub fn config(&self) -> &DetectionConfig {
        self.pipeline.config()
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn state(&self) -> AutoCaptureState {
        self.controller.state(self.clock.now_ms())
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats::collect(
            self.ticks,
            self.captures,
            self.sampler.stats(),
            self.pipeline.stats(),
        )
    }

    /// Run one tick
    pub fn step(&mut self) -> StepOutcome {
        let now = self.clock.now_ms();
        if self.stopped {
            return StepOutcome {
                result: None,
                state: self.controller.state(now),
                capture: None,
            };
        }
        self.ticks += 1;

        let result = self
            .sampler
            .sample(self.source.as_mut(), now)
            .map(|frame| self.pipeline.analyze(&frame.buffer, frame.timestamp_ms));

        let state = match &result {
            Some(result) => self.controller.on_result(result, now),
            None => self.controller.tick(now),
        };

        let capture = if state.should_capture {
            self.captures += 1;
            self.controller.last_event().cloned()
        } else {
            None
        };

        StepOutcome {
            result,
            state,
            capture,
        }
    }

    /// Step until a capture fires or the scheduler ends
    pub fn run(&mut self, scheduler: &mut dyn TickScheduler) -> Option<CaptureEvent> {
        while !self.stopped && scheduler.wait_next_tick() {
            if let Some(event) = self.step().capture {
                return Some(event);
            }
        }
        None
    }

    /// Capture now, bypassing stability
    pub fn manual_capture(&mut self) -> Option<CaptureEvent> {
        if self.stopped || !self.controller.manual_capture(self.clock.now_ms()) {
            return None;
        }
        self.captures += 1;
        self.controller.last_event().cloned()
    }

    pub fn cancel(&mut self) {
        self.controller.cancel();
    }

    /// Re-arm for another capture. Also resumes a stopped loop.
    pub fn reset(&mut self) {
        self.controller.reset();
        self.pipeline.reset();
        self.stopped = false;
    }

    /// Full-resolution frame for the caller to keep after a capture
    pub fn full_resolution_frame(&mut self) -> Result<PixelBuffer, CaptureError> {
        if !self.source.is_ready() {
            return Err(CaptureError::SourceUnavailable("source not ready".to_string()));
        }
        self.source.current_frame().cloned()
    }

    /// Stop detection. Safe from any state, repeatedly.
    pub fn stop(&mut self) {
        if !self.stopped {
            log::info!("Stopping capture loop after {} ticks", self.ticks);
        }
        self.stopped = true;
        self.sampler.release();
        self.controller.cancel();
        self.pipeline.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::{ManualClock, ManualScheduler, StillImageSource};
    use crate::testing::{gray_field, id_card_scene};
    use crate::types::{CapturePhase, CaptureTrigger};

    fn capture_loop(frame: PixelBuffer, clock: &ManualClock) -> CaptureLoop {
        CaptureLoop::new(
            Box::new(StillImageSource::new(frame)),
            DetectionConfig::default(),
            FaceModelSession::new(),
            Arc::new(clock.clone()),
        )
        .unwrap()
    }

    #[test]
    fn test_steady_card_auto_captures_once() {
        let clock = ManualClock::new(0);
        let mut lp = capture_loop(id_card_scene(640, 480), &clock);
        let mut scheduler = ManualScheduler::new(clock.clone(), 20, 500);

        let event = lp.run(&mut scheduler).expect("capture");
        assert_eq!(event.trigger, CaptureTrigger::Auto);
        // 3 stable frames 100ms apart, then the 1500ms countdown
        assert!(event.at_ms >= 200 + 1500, "captured at {}", event.at_ms);
        assert!(event.at_ms <= 200 + 1500 + 40, "captured at {}", event.at_ms);
        assert_eq!(lp.state().phase, CapturePhase::Captured);

        // Terminal until reset
        for _ in 0..50 {
            clock.advance(20);
            assert!(lp.step().capture.is_none());
        }
        assert_eq!(lp.stats().captures, 1);
    }

    #[test]
    fn test_empty_scene_never_captures() {
        let clock = ManualClock::new(0);
        let mut lp = capture_loop(gray_field(640, 480, 128), &clock);
        let mut scheduler = ManualScheduler::new(clock.clone(), 20, 300);
        assert!(lp.run(&mut scheduler).is_none());

        let stats = lp.stats();
        assert_eq!(stats.ticks, 300);
        assert_eq!(stats.ready_frames, 0);
        assert!(stats.frames_skipped > 0);
    }

    #[test]
    fn test_samples_respect_target_rate() {
        let clock = ManualClock::new(0);
        let mut lp = capture_loop(gray_field(64, 48, 128), &clock);
        for _ in 0..100 {
            clock.advance(10);
            lp.step();
        }
        // 1000ms at 10fps
        assert_eq!(lp.stats().frames_analyzed, 10);
    }

    #[test]
    fn test_manual_capture_and_stop_are_safe_anywhere() {
        let clock = ManualClock::new(0);
        let mut lp = capture_loop(gray_field(640, 480, 128), &clock);
        lp.stop();
        lp.stop();
        assert!(lp.manual_capture().is_none());
        assert!(lp.step().result.is_none());

        lp.reset();
        let event = lp.manual_capture().expect("manual capture");
        assert_eq!(event.trigger, CaptureTrigger::Manual);
        assert!(lp.manual_capture().is_none());
        lp.stop();
        assert_eq!(lp.state().phase, CapturePhase::Captured);
    }

    #[test]
    fn test_full_resolution_frame_is_native_size() {
        let clock = ManualClock::new(0);
        let mut lp = capture_loop(id_card_scene(640, 480), &clock);
        let frame = lp.full_resolution_frame().unwrap();
        assert_eq!((frame.width(), frame.height()), (640, 480));
    }
}
