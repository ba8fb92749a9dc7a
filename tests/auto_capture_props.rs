//! Property-based tests for the auto-capture controller
//!
//! The controller sees only a stream of per-frame verdicts and timestamps,
//! so every property is stated over generated `(ready, dt)` sequences.

use idcapture::{
    AutoCaptureConfig, AutoCaptureController, AutoCaptureState, CapturePhase, CaptureTrigger,
    DetectionResult, QualityGrade,
};
use proptest::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

fn verdict(ready: bool, timestamp: u64) -> DetectionResult {
    DetectionResult {
        document_detected: ready,
        document_confidence: if ready { 0.9 } else { 0.0 },
        document_bounds: None,
        is_blurry: false,
        blur_score: 1.0,
        has_glare: false,
        glare_score: 0.0,
        face_detected: false,
        face_confidence: 0.0,
        face_bounds: None,
        face_weak_match: false,
        is_moving: false,
        ready_for_capture: ready,
        quality_score: if ready { 0.9 } else { 0.25 },
        overall_quality: if ready {
            QualityGrade::Excellent
        } else {
            QualityGrade::Poor
        },
        timestamp,
    }
}

fn config_strategy() -> impl Strategy<Value = AutoCaptureConfig> {
    (1u32..6, 1u32..6, 0u64..2000).prop_map(|(stable, grace, countdown)| AutoCaptureConfig {
        min_stable_frames: stable,
        grace_period_frames: grace,
        countdown_ms: countdown,
    })
}

/// Feed `frames` and collect every snapshot
fn replay(config: AutoCaptureConfig, frames: &[(bool, u64)]) -> Vec<AutoCaptureState> {
    let mut controller = AutoCaptureController::new(config);
    let mut now = 0u64;
    frames
        .iter()
        .map(|&(ready, dt)| {
            now += dt;
            controller.on_result(&verdict(ready, now), now)
        })
        .collect()
}

proptest! {
    /// INVARIANT: A session captures at most once, whatever the frame stream
    #[test]
    fn captures_at_most_once(
        config in config_strategy(),
        frames in prop::collection::vec((any::<bool>(), 0u64..400), 0..200),
    ) {
        let fired = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&fired);
        let mut controller = AutoCaptureController::new(config)
            .with_callback(move |_| { counter.fetch_add(1, Ordering::SeqCst); });

        let mut now = 0u64;
        let mut signalled = 0;
        for (ready, dt) in frames {
            now += dt;
            if controller.on_result(&verdict(ready, now), now).should_capture {
                signalled += 1;
            }
            if controller.tick(now).should_capture {
                signalled += 1;
            }
        }

        prop_assert!(signalled <= 1);
        prop_assert_eq!(fired.load(Ordering::SeqCst), signalled);
        prop_assert_eq!(controller.is_captured(), signalled == 1);
    }

    /// INVARIANT: Identical inputs produce identical snapshots
    #[test]
    fn replay_is_deterministic(
        config in config_strategy(),
        frames in prop::collection::vec((any::<bool>(), 0u64..400), 0..100),
    ) {
        prop_assert_eq!(replay(config, &frames), replay(config, &frames));
    }

    /// INVARIANT: With a steady ready stream, the capture fires on the first
    /// frame at least `countdown_ms` after the stable threshold was reached
    #[test]
    fn steady_stream_fires_after_countdown(
        config in config_strategy(),
        dt in 1u64..200,
    ) {
        let frames: Vec<(bool, u64)> =
            (0..200).map(|i| (true, if i == 0 { 0 } else { dt })).collect();
        let states = replay(config, &frames);

        let started = (config.min_stable_frames - 1) as u64;
        let expected = (started..)
            .find(|&i| (i - started) * dt >= config.countdown_ms)
            .unwrap() as usize;
        let fired = states.iter().position(|s| s.should_capture);

        if expected < frames.len() {
            prop_assert_eq!(fired, Some(expected));
            prop_assert!(states[expected..].iter().all(|s| s.phase == CapturePhase::Captured));
        } else {
            prop_assert_eq!(fired, None);
        }
    }

    /// INVARIANT: With no grace period, nothing fires unless some run of
    /// consecutive ready frames reaches `min_stable_frames`
    #[test]
    fn no_capture_without_a_long_enough_run(
        stable in 2u32..8,
        countdown in 0u64..500,
        pattern in prop::collection::vec(any::<bool>(), 1..100),
    ) {
        let config = AutoCaptureConfig {
            min_stable_frames: stable,
            grace_period_frames: 1,
            countdown_ms: countdown,
        };

        // Break every ready run one frame short of the threshold
        let mut frames = Vec::new();
        let mut run = 0u32;
        for ready in pattern {
            let ready = ready && run + 1 < stable;
            run = if ready { run + 1 } else { 0 };
            frames.push((ready, 50));
        }

        let states = replay(config, &frames);
        prop_assert!(states.iter().all(|s| !s.should_capture));
        prop_assert!(states.iter().all(|s| s.phase != CapturePhase::CountingDown));
        prop_assert!(states.iter().all(|s| s.stable_frames < stable));
    }

    /// INVARIANT: Fewer than `grace_period_frames` bad frames do not abort a
    /// countdown; one more does
    #[test]
    fn grace_period_bounds_countdown_abort(
        stable in 1u32..6,
        grace in 1u32..6,
    ) {
        let config = AutoCaptureConfig {
            min_stable_frames: stable,
            grace_period_frames: grace,
            countdown_ms: 60_000,
        };
        let mut controller = AutoCaptureController::new(config);
        for _ in 0..stable {
            controller.on_result(&verdict(true, 0), 0);
        }
        prop_assert_eq!(controller.phase(), CapturePhase::CountingDown);

        for i in 1..grace {
            let state = controller.on_result(&verdict(false, i as u64), i as u64);
            prop_assert_eq!(state.phase, CapturePhase::CountingDown);
            prop_assert_eq!(state.unstable_frames, i);
        }

        let state = controller.on_result(&verdict(false, grace as u64), grace as u64);
        prop_assert_eq!(state.phase, CapturePhase::Idle);
        prop_assert_eq!(state.stable_frames, 0);
        prop_assert_eq!(state.unstable_frames, 0);
    }

    /// INVARIANT: Countdown progress is monotonic and within [0, 1]
    #[test]
    fn countdown_progress_is_monotonic(
        countdown in 1u64..5000,
        sample_times in prop::collection::vec(0u64..6000, 1..50),
    ) {
        let config = AutoCaptureConfig {
            min_stable_frames: 1,
            grace_period_frames: 3,
            countdown_ms: countdown,
        };
        let mut controller = AutoCaptureController::new(config);
        controller.on_result(&verdict(true, 0), 0);

        let mut sample_times = sample_times;
        sample_times.sort_unstable();
        let mut last = 0.0f32;
        for now in sample_times {
            let state = controller.state(now);
            prop_assert!((0.0..=1.0).contains(&state.countdown_progress));
            prop_assert!(state.countdown_progress >= last);
            last = state.countdown_progress;
        }
    }

    /// INVARIANT: Under a rising clock, `remaining_ms` strictly decreases to
    /// 0 and exactly one snapshot signals the capture, no earlier than
    /// `countdown_ms` after the countdown started
    #[test]
    fn remaining_time_counts_down_to_a_single_capture(
        countdown in 1u64..5000,
        start in 0u64..1000,
        steps in prop::collection::vec(1u64..400, 0..60),
    ) {
        let config = AutoCaptureConfig {
            min_stable_frames: 1,
            grace_period_frames: 3,
            countdown_ms: countdown,
        };
        let mut controller = AutoCaptureController::new(config);
        let first = controller.on_result(&verdict(true, start), start);
        prop_assert!(first.is_counting_down);
        prop_assert_eq!(first.remaining_ms, countdown);

        // Always end past the deadline so the countdown completes
        let mut times: Vec<u64> = steps
            .iter()
            .scan(start, |now, dt| { *now += dt; Some(*now) })
            .collect();
        let last = times.last().copied().unwrap_or(start);
        times.push(last.max(start + countdown - 1) + 1);

        let mut remaining = first.remaining_ms;
        let mut fired_at = Vec::new();
        for now in times {
            let state = controller.tick(now);
            if state.should_capture {
                fired_at.push(now);
            }
            if state.is_counting_down {
                prop_assert!(fired_at.is_empty());
                prop_assert!(state.remaining_ms < remaining);
                prop_assert_eq!(state.remaining_ms, countdown - (now - start));
            } else {
                prop_assert_eq!(state.phase, CapturePhase::Captured);
                prop_assert_eq!(state.remaining_ms, 0);
            }
            remaining = state.remaining_ms;
        }

        prop_assert_eq!(fired_at.len(), 1);
        prop_assert!(fired_at[0] - start >= countdown);
        prop_assert_eq!(remaining, 0);
    }
}

#[test]
fn test_cancel_mid_countdown_needs_full_restabilisation() {
    let config = AutoCaptureConfig {
        min_stable_frames: 3,
        grace_period_frames: 5,
        countdown_ms: 1000,
    };
    let mut controller = AutoCaptureController::new(config);
    for t in [0, 100, 200] {
        controller.on_result(&verdict(true, t), t);
    }
    assert_eq!(controller.phase(), CapturePhase::CountingDown);

    controller.cancel();
    assert_eq!(controller.phase(), CapturePhase::Idle);

    // One good frame well past the old deadline must not capture
    let state = controller.on_result(&verdict(true, 5000), 5000);
    assert!(!state.should_capture);
    assert_eq!(state.phase, CapturePhase::Accumulating);
    assert_eq!(state.stable_frames, 1);
}

#[test]
fn test_manual_capture_then_reset_allows_retake() {
    let mut controller = AutoCaptureController::new(AutoCaptureConfig::default());

    assert!(controller.manual_capture(10));
    assert_eq!(controller.last_event().unwrap().trigger, CaptureTrigger::Manual);
    assert!(!controller.manual_capture(20));

    controller.reset();
    assert!(controller.last_event().is_none());
    assert_eq!(controller.phase(), CapturePhase::Idle);
    assert!(controller.manual_capture(30));
    assert_eq!(controller.last_event().unwrap().at_ms, 30);
}
