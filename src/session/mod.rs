//! Live capture sessions
//!
//! A [`LiveSession`] runs a [`CaptureLoop`] on its own thread, ticked by a
//! [`TickScheduler`]. Status snapshots are published on a `watch` channel
//! (latest value only), capture events on an unbounded `mpsc` channel, and
//! control commands travel back over a std channel drained once per tick.

use crate::errors::CaptureError;
use crate::pipeline::{CaptureLoop, SessionStats};
use crate::sampler::TickScheduler;
use crate::types::{AutoCaptureState, CaptureEvent, DetectionResult};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self as std_mpsc, TryRecvError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionCommand {
    Cancel,
    Reset,
    ManualCapture,
    Stop,
}

/// Latest view of a running session, for live UI feedback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub session_id: String,
    pub running: bool,
    pub latest_result: Option<DetectionResult>,
    pub auto_capture: AutoCaptureState,
    pub last_capture: Option<CaptureEvent>,
    pub stats: SessionStats,
}

impl SessionStatus {
    fn initial(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            running: true,
            latest_result: None,
            auto_capture: AutoCaptureState::idle(),
            last_capture: None,
            stats: SessionStats::default(),
        }
    }
}

pub struct LiveSession;

impl LiveSession {
    /// Spawn the capture thread and return its handle. The session runs
    /// until stopped.
    pub fn start<S>(capture_loop: CaptureLoop, scheduler: S) -> Result<SessionHandle, CaptureError>
    where
        S: TickScheduler + 'static,
    {
        Self::start_with_linger(capture_loop, scheduler, None)
    }

    /// Like [`LiveSession::start`], but the session also ends on its own once
    /// a capture has sat for `linger` without a reset.
    pub fn start_with_linger<S>(
        capture_loop: CaptureLoop,
        scheduler: S,
        linger: Option<Duration>,
    ) -> Result<SessionHandle, CaptureError>
    where
        S: TickScheduler + 'static,
    {
        let id = Uuid::new_v4().to_string();
        let (status_tx, status_rx) = watch::channel(SessionStatus::initial(&id));
        let (capture_tx, capture_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = std_mpsc::channel();
        let stop_flag = Arc::new(AtomicBool::new(false));

        let worker = Worker {
            capture_loop,
            status: SessionStatus::initial(&id),
            status_tx,
            capture_tx,
            commands: command_rx,
            stop_flag: Arc::clone(&stop_flag),
            linger,
            captured_since: None,
        };
        let thread = std::thread::Builder::new()
            .name(format!("idcapture-session-{}", &id[..8]))
            .spawn(move || worker.run(scheduler))
            .map_err(|e| CaptureError::Session(format!("spawn failed: {e}")))?;

        log::info!("Capture session {} started", id);
        Ok(SessionHandle {
            id,
            commands: Mutex::new(command_tx),
            status: status_rx,
            captures: Mutex::new(Some(capture_rx)),
            stop_flag,
            thread: Mutex::new(Some(thread)),
        })
    }
}

struct Worker {
    capture_loop: CaptureLoop,
    status: SessionStatus,
    status_tx: watch::Sender<SessionStatus>,
    capture_tx: mpsc::UnboundedSender<CaptureEvent>,
    commands: std_mpsc::Receiver<SessionCommand>,
    stop_flag: Arc<AtomicBool>,
    linger: Option<Duration>,
    captured_since: Option<Instant>,
}

impl Worker {
    fn run<S: TickScheduler>(mut self, mut scheduler: S) {
        while !self.stop_flag.load(Ordering::Relaxed) && scheduler.wait_next_tick() {
            if !self.drain_commands() {
                break;
            }
            if self.lingered_too_long() {
                log::info!(
                    "Capture session {} ending, capture not collected",
                    self.status.session_id
                );
                break;
            }

            let outcome = self.capture_loop.step();
            let changed = outcome.result.is_some() || outcome.state != self.status.auto_capture;
            if let Some(result) = outcome.result {
                self.status.latest_result = Some(result);
            }
            self.status.auto_capture = outcome.state;
            if let Some(event) = outcome.capture {
                self.deliver(event);
            } else if changed {
                self.publish();
            }
        }

        self.capture_loop.stop();
        self.status.running = false;
        self.status.auto_capture = self.capture_loop.state();
        self.publish();
        log::info!(
            "Capture session {} finished: {:?}",
            self.status.session_id,
            self.status.stats
        );
    }

    /// Apply pending commands. Returns false once the session should end.
    fn drain_commands(&mut self) -> bool {
        loop {
            match self.commands.try_recv() {
                Ok(SessionCommand::Cancel) => self.capture_loop.cancel(),
                Ok(SessionCommand::Reset) => {
                    self.capture_loop.reset();
                    self.status.last_capture = None;
                    self.captured_since = None;
                }
                Ok(SessionCommand::ManualCapture) => {
                    if let Some(event) = self.capture_loop.manual_capture() {
                        self.status.auto_capture = self.capture_loop.state();
                        self.deliver(event);
                    }
                }
                Ok(SessionCommand::Stop) | Err(TryRecvError::Disconnected) => return false,
                Err(TryRecvError::Empty) => return true,
            }
        }
    }

    fn lingered_too_long(&self) -> bool {
        match (self.linger, self.captured_since) {
            (Some(linger), Some(since)) => since.elapsed() >= linger,
            _ => false,
        }
    }

    fn deliver(&mut self, event: CaptureEvent) {
        self.captured_since = Some(Instant::now());
        self.status.last_capture = Some(event.clone());
        self.publish();
        if self.capture_tx.send(event).is_err() {
            log::debug!("Capture receiver for {} dropped", self.status.session_id);
        }
    }

    fn publish(&mut self) {
        self.status.stats = self.capture_loop.stats();
        self.status_tx.send_replace(self.status.clone());
    }
}

/// Control surface of a running [`LiveSession`]
pub struct SessionHandle {
    id: String,
    commands: Mutex<std_mpsc::Sender<SessionCommand>>,
    status: watch::Receiver<SessionStatus>,
    captures: Mutex<Option<mpsc::UnboundedReceiver<CaptureEvent>>>,
    stop_flag: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("running", &self.is_running())
            .finish()
    }
}

impl SessionHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// A receiver that wakes on every published status
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Capture events. Only the first caller gets the receiver.
    pub fn take_captures(&self) -> Option<mpsc::UnboundedReceiver<CaptureEvent>> {
        self.captures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn is_running(&self) -> bool {
        self.status.borrow().running
    }

    pub fn cancel(&self) -> Result<(), CaptureError> {
        self.send(SessionCommand::Cancel)
    }

    pub fn reset(&self) -> Result<(), CaptureError> {
        self.send(SessionCommand::Reset)
    }

    pub fn manual_capture(&self) -> Result<(), CaptureError> {
        self.send(SessionCommand::ManualCapture)
    }

    /// Stop the session and wait for its thread. Safe to call repeatedly and
    /// from any state.
    pub fn stop(&self, join_timeout: Duration) -> Result<SessionStats, CaptureError> {
        self.stop_flag.store(true, Ordering::Relaxed);
        // The worker may already be gone
        let _ = self.send(SessionCommand::Stop);

        let handle = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let start = Instant::now();
            while !handle.is_finished() {
                if start.elapsed() >= join_timeout {
                    // Keep the handle so a later stop can retry the join
                    *self.thread.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
                    return Err(CaptureError::Session(format!(
                        "session {} did not stop within {:?}",
                        self.id, join_timeout
                    )));
                }
                std::thread::sleep(Duration::from_millis(5));
            }
            if handle.join().is_err() {
                log::warn!("Capture session {} thread panicked", self.id);
            }
            log::info!("Capture session {} stopped", self.id);
        }
        Ok(self.status.borrow().stats)
    }

    fn send(&self, command: SessionCommand) -> Result<(), CaptureError> {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send(command)
            .map_err(|_| CaptureError::Session(format!("session {} is not running", self.id)))
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectionConfig;
    use crate::detect::FaceModelSession;
    use crate::sampler::{FixedRateScheduler, MonotonicClock, StillImageSource};
    use crate::testing::{gray_field, id_card_scene};
    use crate::types::{CapturePhase, CaptureTrigger, PixelBuffer};

    fn start(frame: PixelBuffer) -> SessionHandle {
        let config = DetectionConfig {
            target_fps: 50,
            auto_capture_delay_ms: 100,
            ..DetectionConfig::default()
        };
        let capture_loop = CaptureLoop::new(
            Box::new(StillImageSource::new(frame)),
            config,
            FaceModelSession::new(),
            Arc::new(MonotonicClock::new()),
        )
        .unwrap();
        LiveSession::start(capture_loop, FixedRateScheduler::new(Duration::from_millis(2))).unwrap()
    }

    fn start_lingering(frame: PixelBuffer, linger: Duration) -> SessionHandle {
        let config = DetectionConfig {
            target_fps: 50,
            auto_capture_delay_ms: 100,
            ..DetectionConfig::default()
        };
        let capture_loop = CaptureLoop::new(
            Box::new(StillImageSource::new(frame)),
            config,
            FaceModelSession::new(),
            Arc::new(MonotonicClock::new()),
        )
        .unwrap();
        let scheduler = FixedRateScheduler::new(Duration::from_millis(2));
        LiveSession::start_with_linger(capture_loop, scheduler, Some(linger)).unwrap()
    }

    async fn wait_until_stopped(session: &SessionHandle) {
        let mut status = session.subscribe();
        tokio::time::timeout(Duration::from_secs(10), async {
            while status.borrow_and_update().running {
                if status.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
        .expect("session ended within timeout");
    }

    #[tokio::test]
    async fn test_auto_capture_is_delivered() {
        let session = start(id_card_scene(320, 240));
        let mut captures = session.take_captures().unwrap();
        assert!(session.take_captures().is_none());

        let event = tokio::time::timeout(Duration::from_secs(10), captures.recv())
            .await
            .expect("capture within timeout")
            .expect("channel open");
        assert_eq!(event.trigger, CaptureTrigger::Auto);

        let stats = session.stop(Duration::from_secs(5)).unwrap();
        assert_eq!(stats.captures, 1);
        let status = session.status();
        assert!(!status.running);
        assert_eq!(status.auto_capture.phase, CapturePhase::Captured);
        assert!(status.last_capture.is_some());
    }

    #[tokio::test]
    async fn test_manual_capture_command() {
        let session = start(gray_field(320, 240, 128));
        let mut captures = session.take_captures().unwrap();
        session.manual_capture().unwrap();

        let event = tokio::time::timeout(Duration::from_secs(10), captures.recv())
            .await
            .expect("capture within timeout")
            .expect("channel open");
        assert_eq!(event.trigger, CaptureTrigger::Manual);
        session.stop(Duration::from_secs(5)).unwrap();
    }

    #[tokio::test]
    async fn test_status_updates_are_published() {
        let session = start(gray_field(320, 240, 128));
        let mut status = session.subscribe();
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                status.changed().await.expect("session alive");
                if status.borrow_and_update().latest_result.is_some() {
                    break;
                }
            }
        })
        .await
        .expect("status within timeout");
        session.stop(Duration::from_secs(5)).unwrap();
    }

    #[tokio::test]
    async fn test_uncollected_capture_ends_the_session() {
        let session = start_lingering(id_card_scene(320, 240), Duration::from_millis(50));
        wait_until_stopped(&session).await;

        let status = session.status();
        assert!(!status.running);
        assert_eq!(status.stats.captures, 1);
        session.stop(Duration::from_secs(5)).unwrap();
        assert!(session.reset().is_err());
    }

    #[tokio::test]
    async fn test_session_without_capture_keeps_running() {
        let session = start_lingering(gray_field(320, 240, 128), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(session.is_running());
        session.stop(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn test_stop_is_safe_repeatedly() {
        let session = start(gray_field(320, 240, 128));
        session.stop(Duration::from_secs(5)).unwrap();
        session.stop(Duration::from_secs(5)).unwrap();
        assert!(!session.is_running());
        assert!(session.cancel().is_err());
    }
}
