//! Frame sampling
//!
//! Pulls a downscaled RGB buffer from a [`FrameSource`] no faster than the
//! target rate. Ticks where the source is not ready or extraction fails
//! produce no frame; they never surface as errors.

pub mod clock;
pub mod source;

pub use clock::{
    Clock, FixedRateScheduler, ManualClock, ManualScheduler, MonotonicClock, TickScheduler,
};
pub use source::{decode_image, CameraSource, FrameSource, StillImageSource};

use crate::types::{PixelBuffer, PixelFormat};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One analysed-size frame and the time it was sampled
#[derive(Debug, Clone)]
pub struct SampledFrame {
    pub buffer: Arc<PixelBuffer>,
    pub timestamp_ms: u64,
}

/// Counters for tuning sample rate and downscale on a device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplerStats {
    pub sampled: u64,
    pub throttled: u64,
    pub not_ready: u64,
    pub extraction_failures: u64,
    pub allocations: u64,
}

pub struct FrameSampler {
    min_interval_ms: u64,
    downscale: u32,
    buffer: Option<Arc<PixelBuffer>>,
    native_dims: Option<(u32, u32)>,
    last_sample_ms: Option<u64>,
    stats: SamplerStats,
}

impl FrameSampler {
    pub fn new(target_fps: u32, downscale: u32) -> Self {
        Self {
            min_interval_ms: 1000 / target_fps.max(1) as u64,
            downscale: downscale.max(1),
            buffer: None,
            native_dims: None,
            last_sample_ms: None,
            stats: SamplerStats::default(),
        }
    }

    pub fn stats(&self) -> SamplerStats {
        self.stats
    }

    /// Sample the source if the rate limit allows and the source is readable
    pub fn sample(&mut self, source: &mut dyn FrameSource, now_ms: u64) -> Option<SampledFrame> {
        if let Some(last) = self.last_sample_ms {
            if now_ms.saturating_sub(last) < self.min_interval_ms {
                self.stats.throttled += 1;
                return None;
            }
        }

        if !source.is_ready() {
            self.stats.not_ready += 1;
            return None;
        }

        let frame = match source.current_frame() {
            Ok(frame) => frame,
            Err(e) => {
                log::debug!("No frame this tick: {}", e);
                self.stats.extraction_failures += 1;
                return None;
            }
        };

        let native = (frame.width(), frame.height());
        let target = (
            (native.0 / self.downscale).max(1),
            (native.1 / self.downscale).max(1),
        );

        if self.native_dims != Some(native) {
            log::debug!(
                "Source resolution {}x{}, analysis buffer {}x{}",
                native.0,
                native.1,
                target.0,
                target.1
            );
            self.native_dims = Some(native);
            self.buffer = None;
        }

        // Reuse the buffer unless a consumer still holds the previous frame
        let reusable = self.buffer.as_mut().and_then(Arc::get_mut).is_some();
        if !reusable {
            self.stats.allocations += 1;
            self.buffer = Some(Arc::new(PixelBuffer::blank(target.0, target.1, PixelFormat::Rgb)));
        }
        let buffer = self.buffer.as_mut().and_then(Arc::get_mut)?;
        downscale_into(frame, buffer, self.downscale);

        self.last_sample_ms = Some(now_ms);
        self.stats.sampled += 1;
        let buffer = Arc::clone(self.buffer.as_ref()?);
        Some(SampledFrame {
            buffer,
            timestamp_ms: now_ms,
        })
    }

    /// Drop the analysis buffer and forget the rate-limit window
    pub fn release(&mut self) {
        self.buffer = None;
        self.native_dims = None;
        self.last_sample_ms = None;
    }

    /// Lazy frame sequence that ends only when the scheduler does
    pub fn frames<'a>(
        &'a mut self,
        source: &'a mut dyn FrameSource,
        scheduler: &'a mut dyn TickScheduler,
        clock: &'a dyn Clock,
    ) -> FrameStream<'a> {
        FrameStream {
            sampler: self,
            source,
            scheduler,
            clock,
        }
    }
}

/// Box-average `src` into `dst`, dropping any alpha channel
fn downscale_into(src: &PixelBuffer, dst: &mut PixelBuffer, factor: u32) {
    let area = factor * factor;
    for y in 0..dst.height() {
        for x in 0..dst.width() {
            let mut sum = [0u32; 3];
            for dy in 0..factor {
                for dx in 0..factor {
                    let sx = (x * factor + dx).min(src.width() - 1);
                    let sy = (y * factor + dy).min(src.height() - 1);
                    let [r, g, b] = src.rgb(sx, sy);
                    sum[0] += r as u32;
                    sum[1] += g as u32;
                    sum[2] += b as u32;
                }
            }
            dst.set_rgb(
                x,
                y,
                [
                    (sum[0] / area) as u8,
                    (sum[1] / area) as u8,
                    (sum[2] / area) as u8,
                ],
            );
        }
    }
}

pub struct FrameStream<'a> {
    sampler: &'a mut FrameSampler,
    source: &'a mut dyn FrameSource,
    scheduler: &'a mut dyn TickScheduler,
    clock: &'a dyn Clock,
}

impl Iterator for FrameStream<'_> {
    type Item = SampledFrame;

    fn next(&mut self) -> Option<SampledFrame> {
        while self.scheduler.wait_next_tick() {
            if let Some(frame) = self.sampler.sample(&mut *self.source, self.clock.now_ms()) {
                return Some(frame);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CaptureError;

    struct FlakySource {
        frame: PixelBuffer,
        fail: bool,
    }

    impl FrameSource for FlakySource {
        fn is_ready(&self) -> bool {
            true
        }

        fn native_dimensions(&self) -> Option<(u32, u32)> {
            Some((self.frame.width(), self.frame.height()))
        }

        fn current_frame(&mut self) -> Result<&PixelBuffer, CaptureError> {
            if self.fail {
                return Err(CaptureError::FrameExtraction("torn down".to_string()));
            }
            Ok(&self.frame)
        }
    }

    fn gray(width: u32, height: u32, level: u8) -> PixelBuffer {
        let mut frame = PixelBuffer::blank(width, height, PixelFormat::Rgba);
        for y in 0..height {
            for x in 0..width {
                frame.set_rgb(x, y, [level, level, level]);
            }
        }
        frame
    }

    #[test]
    fn test_downscale_halves_dimensions_and_drops_alpha() {
        let mut source = StillImageSource::new(gray(64, 48, 90));
        let mut sampler = FrameSampler::new(10, 2);
        let frame = sampler.sample(&mut source, 0).unwrap();
        assert_eq!((frame.buffer.width(), frame.buffer.height()), (32, 24));
        assert_eq!(frame.buffer.format(), PixelFormat::Rgb);
        assert_eq!(frame.buffer.rgb(5, 5), [90, 90, 90]);
    }

    #[test]
    fn test_rate_limit() {
        let mut source = StillImageSource::new(gray(16, 16, 0));
        let mut sampler = FrameSampler::new(10, 1);
        assert!(sampler.sample(&mut source, 0).is_some());
        assert!(sampler.sample(&mut source, 50).is_none());
        assert!(sampler.sample(&mut source, 99).is_none());
        assert!(sampler.sample(&mut source, 100).is_some());
        assert_eq!(sampler.stats().throttled, 2);
    }

    #[test]
    fn test_extraction_failure_is_silent() {
        let mut source = FlakySource {
            frame: gray(8, 8, 0),
            fail: true,
        };
        let mut sampler = FrameSampler::new(30, 1);
        assert!(sampler.sample(&mut source, 0).is_none());
        assert_eq!(sampler.stats().extraction_failures, 1);

        source.fail = false;
        assert!(sampler.sample(&mut source, 1).is_some());
    }

    #[test]
    fn test_buffer_reused_when_consumer_released_it() {
        let mut source = StillImageSource::new(gray(16, 16, 0));
        let mut sampler = FrameSampler::new(60, 1);

        let first = sampler.sample(&mut source, 0).unwrap();
        let first_ptr = Arc::as_ptr(&first.buffer);
        drop(first);
        let second = sampler.sample(&mut source, 100).unwrap();
        assert_eq!(Arc::as_ptr(&second.buffer), first_ptr);
        assert_eq!(sampler.stats().allocations, 1);

        // Holding a frame forces a fresh buffer rather than mutating it
        let third = sampler.sample(&mut source, 200).unwrap();
        assert_eq!(sampler.stats().allocations, 2);
        drop((second, third));
    }

    #[test]
    fn test_resolution_change_reallocates() {
        let mut source = StillImageSource::new(gray(16, 16, 0));
        let mut sampler = FrameSampler::new(60, 2);
        assert_eq!(sampler.sample(&mut source, 0).unwrap().buffer.width(), 8);
        source.set_frame(gray(32, 16, 0));
        assert_eq!(sampler.sample(&mut source, 100).unwrap().buffer.width(), 16);
    }

    #[test]
    fn test_frame_stream_skips_unready_ticks() {
        let clock = ManualClock::new(0);
        let mut scheduler = ManualScheduler::new(clock.clone(), 50, 10);
        let mut source = StillImageSource::new(gray(8, 8, 0));
        let mut sampler = FrameSampler::new(10, 1);

        let timestamps: Vec<u64> = sampler
            .frames(&mut source, &mut scheduler, &clock)
            .map(|f| f.timestamp_ms)
            .collect();
        assert_eq!(timestamps, vec![50, 150, 250, 350, 450]);
    }
}
