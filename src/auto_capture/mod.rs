//! Auto-capture controller
//!
//! Debounced state machine over the stream of per-frame results:
//!
//! ```text
//! Idle -> Accumulating -> CountingDown -> Captured
//!   ^          |               |
//!   +----------+---------------+   (grace_period_frames consecutive bad frames)
//! ```
//!
//! Per-frame quality flickers even on a perfectly held document, so a few bad
//! frames do not abort a running countdown. All timing is measured from the
//! wall-clock time the countdown started, never from frame counts.

use crate::config::DetectionConfig;
use crate::types::{AutoCaptureState, CaptureEvent, CapturePhase, CaptureTrigger, DetectionResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoCaptureConfig {
    pub min_stable_frames: u32,
    pub grace_period_frames: u32,
    pub countdown_ms: u64,
}

impl Default for AutoCaptureConfig {
    fn default() -> Self {
        Self::from(&DetectionConfig::default())
    }
}

impl From<&DetectionConfig> for AutoCaptureConfig {
    fn from(config: &DetectionConfig) -> Self {
        Self {
            min_stable_frames: config.min_stable_frames.max(1),
            grace_period_frames: config.grace_period_frames.max(1),
            countdown_ms: config.auto_capture_delay_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Accumulating,
    CountingDown { started_at: u64 },
    /// Terminal until `reset()`
    Captured,
}

pub type CaptureCallback = Box<dyn FnMut(&CaptureEvent) + Send>;

pub struct AutoCaptureController {
    config: AutoCaptureConfig,
    phase: Phase,
    stable_frames: u32,
    unstable_frames: u32,
    on_capture: Option<CaptureCallback>,
    last_event: Option<CaptureEvent>,
}

impl std::fmt::Debug for AutoCaptureController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoCaptureController")
            .field("config", &self.config)
            .field("phase", &self.phase)
            .field("stable_frames", &self.stable_frames)
            .field("unstable_frames", &self.unstable_frames)
            .finish()
    }
}

impl AutoCaptureController {
    pub fn new(config: AutoCaptureConfig) -> Self {
        Self {
            config,
            phase: Phase::Idle,
            stable_frames: 0,
            unstable_frames: 0,
            on_capture: None,
            last_event: None,
        }
    }

    /// Invoke `callback` exactly once per capture
    pub fn with_callback(mut self, callback: impl FnMut(&CaptureEvent) + Send + 'static) -> Self {
        self.on_capture = Some(Box::new(callback));
        self
    }

    pub fn config(&self) -> &AutoCaptureConfig {
        &self.config
    }

    pub fn phase(&self) -> CapturePhase {
        match self.phase {
            Phase::Idle => CapturePhase::Idle,
            Phase::Accumulating => CapturePhase::Accumulating,
            Phase::CountingDown { .. } => CapturePhase::CountingDown,
            Phase::Captured => CapturePhase::Captured,
        }
    }

    pub fn is_captured(&self) -> bool {
        matches!(self.phase, Phase::Captured)
    }

    /// The event that ended this session, if any
    pub fn last_event(&self) -> Option<&CaptureEvent> {
        self.last_event.as_ref()
    }

    /// Feed one analysed frame
    pub fn on_result(&mut self, result: &DetectionResult, now_ms: u64) -> AutoCaptureState {
        if self.is_captured() {
            return self.snapshot(now_ms, false);
        }

        if result.ready_for_capture {
            self.stable_frames = self.stable_frames.saturating_add(1);
            self.unstable_frames = 0;
        } else {
            self.unstable_frames = self.unstable_frames.saturating_add(1);
            if self.unstable_frames >= self.config.grace_period_frames {
                if self.phase != Phase::Idle {
                    log::info!(
                        "Auto-capture reset after {} unstable frames",
                        self.unstable_frames
                    );
                }
                self.to_idle();
                return self.snapshot(now_ms, false);
            }
        }

        match self.phase {
            Phase::Idle | Phase::Accumulating if self.stable_frames > 0 => {
                if self.stable_frames >= self.config.min_stable_frames {
                    log::info!(
                        "Document stable for {} frames, starting {}ms countdown",
                        self.stable_frames,
                        self.config.countdown_ms
                    );
                    self.phase = Phase::CountingDown { started_at: now_ms };
                } else {
                    self.phase = Phase::Accumulating;
                }
            }
            _ => {}
        }

        self.tick(now_ms)
    }

    /// Advance timers without a new frame (animation tick)
    pub fn tick(&mut self, now_ms: u64) -> AutoCaptureState {
        if let Phase::CountingDown { started_at } = self.phase {
            if now_ms.saturating_sub(started_at) >= self.config.countdown_ms {
                self.fire(CaptureTrigger::Auto, now_ms);
                return self.snapshot(now_ms, true);
            }
        }
        self.snapshot(now_ms, false)
    }

    /// Capture immediately, bypassing stability. No-op once captured.
    pub fn manual_capture(&mut self, now_ms: u64) -> bool {
        if self.is_captured() {
            return false;
        }
        self.fire(CaptureTrigger::Manual, now_ms);
        true
    }

    /// Stop any countdown and clear counters. Keeps the one-shot guard.
    pub fn cancel(&mut self) {
        if !self.is_captured() {
            self.phase = Phase::Idle;
        }
        self.stable_frames = 0;
        self.unstable_frames = 0;
    }

    /// Re-arm for a new capture session
    pub fn reset(&mut self) {
        self.to_idle();
        self.last_event = None;
    }

    pub fn state(&self, now_ms: u64) -> AutoCaptureState {
        self.snapshot(now_ms, false)
    }

    fn to_idle(&mut self) {
        self.phase = Phase::Idle;
        self.stable_frames = 0;
        self.unstable_frames = 0;
    }

    fn fire(&mut self, trigger: CaptureTrigger, now_ms: u64) {
        self.phase = Phase::Captured;
        let event = CaptureEvent::new(trigger, now_ms);
        log::info!("Capture triggered ({:?}) at {}ms", trigger, now_ms);
        if let Some(callback) = self.on_capture.as_mut() {
            callback(&event);
        }
        self.last_event = Some(event);
    }

    fn snapshot(&self, now_ms: u64, should_capture: bool) -> AutoCaptureState {
        let countdown = self.config.countdown_ms;
        let (is_counting_down, countdown_progress, remaining_ms) = match self.phase {
            Phase::CountingDown { started_at } => {
                let elapsed = now_ms.saturating_sub(started_at).min(countdown);
                let progress = if countdown == 0 {
                    1.0
                } else {
                    elapsed as f32 / countdown as f32
                };
                (true, progress, countdown - elapsed)
            }
            Phase::Captured => (false, 1.0, 0),
            Phase::Idle | Phase::Accumulating => (false, 0.0, 0),
        };

        AutoCaptureState {
            phase: self.phase(),
            is_counting_down,
            countdown_progress,
            remaining_ms,
            should_capture,
            stable_frames: self.stable_frames,
            unstable_frames: self.unstable_frames,
        }
    }
}
