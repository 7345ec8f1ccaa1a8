// SPDX-License-Identifier: GPL-3.0-only
//! Capture loop threads and the latest-frame slot
//!
//! A capture loop owns a device on its own thread and keeps dequeuing
//! buffers, publishing each one into a [`FrameSlot`]. Grabbing a frame then
//! only reads the newest published buffer, so it never waits on the driver
//! and never sees a frame that sat in the kernel queue.

use super::DeviceResult;
use crate::errors::DeviceError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Action returned by the capture loop callback to control loop behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Continue running the loop
    Continue,
    /// Stop the loop gracefully
    Stop,
}

/// Controller for a capture loop running in a separate thread
pub struct CaptureLoop {
    thread_handle: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
    name: String,
}

impl CaptureLoop {
    /// Start a capture loop with initialization
    ///
    /// `init_fn` runs once on the loop thread and returns the loop state plus
    /// a value handed back to the caller. This call blocks until
    /// initialization has finished, so a device that cannot be opened is
    /// reported here instead of surfacing later as a silent thread exit.
    pub fn start_with_init<S, R, I, F>(name: &str, init_fn: I, mut loop_fn: F) -> DeviceResult<(Self, R)>
    where
        R: Send + 'static,
        I: FnOnce() -> DeviceResult<(S, R)> + Send + 'static,
        F: FnMut(&mut S) -> LoopAction + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop_signal_clone = Arc::clone(&stop_signal);
        let name_clone = name.to_string();
        let (init_tx, init_rx) = mpsc::sync_channel(1);

        info!(name = %name, "Starting capture loop");

        let thread_handle = thread::spawn(move || {
            let mut state = match init_fn() {
                Ok((state, report)) => {
                    let _ = init_tx.send(Ok(report));
                    state
                }
                Err(e) => {
                    warn!(name = %name_clone, error = %e, "Initialization failed");
                    let _ = init_tx.send(Err(e));
                    return;
                }
            };

            loop {
                if stop_signal_clone.load(Ordering::SeqCst) {
                    debug!(name = %name_clone, "Stop signal received");
                    break;
                }

                match loop_fn(&mut state) {
                    LoopAction::Continue => {}
                    LoopAction::Stop => {
                        debug!(name = %name_clone, "Loop requested stop");
                        break;
                    }
                }
            }

            info!(name = %name_clone, "Capture loop thread exiting");
        });

        let report = match init_rx.recv() {
            Ok(result) => result?,
            Err(_) => {
                return Err(DeviceError::Stream(format!(
                    "{} exited during initialization",
                    name
                )));
            }
        };

        Ok((
            Self {
                thread_handle: Some(thread_handle),
                stop_signal,
                name: name.to_string(),
            },
            report,
        ))
    }

    /// Check if the loop is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Signal the loop to stop (non-blocking)
    ///
    /// The thread finishes its current iteration and drops its state, which
    /// releases the device shortly after this returns.
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting capture loop stop");
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Stop the loop and wait for the thread to finish
    pub fn stop_and_wait(mut self) {
        self.request_stop();
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                warn!(name = %self.name, "Capture loop thread panicked");
            }
        }
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        self.request_stop();
    }
}

// =============================================================================
// Latest frame slot
// =============================================================================

#[derive(Debug, Clone)]
struct TimedFrame {
    data: Arc<[u8]>,
    captured_at: Instant,
}

/// Writer half of a [`FrameSlot`], owned by the capture loop
pub struct FramePublisher {
    tx: watch::Sender<Option<TimedFrame>>,
}

impl FramePublisher {
    /// Replace the slot content with `data`
    pub fn publish(&self, data: &[u8]) {
        self.tx.send_replace(Some(TimedFrame {
            data: Arc::from(data),
            captured_at: Instant::now(),
        }));
    }
}

/// Reader half holding the newest frame of one capture loop
pub struct FrameSlot {
    rx: watch::Receiver<Option<TimedFrame>>,
}

/// Create a connected publisher and slot
pub fn frame_slot() -> (FramePublisher, FrameSlot) {
    let (tx, rx) = watch::channel(None);
    (FramePublisher { tx }, FrameSlot { rx })
}

impl FrameSlot {
    /// Newest frame, provided it is younger than `max_age`
    pub fn latest(&self, max_age: Duration) -> DeviceResult<Arc<[u8]>> {
        let frame = self.rx.borrow().clone();
        let Some(frame) = frame else {
            return Err(DeviceError::Stream(if self.loop_ended() {
                "capture loop ended before the first frame".into()
            } else {
                "no frame received yet".into()
            }));
        };

        let age = frame.captured_at.elapsed();
        if age > max_age {
            let reason = if self.loop_ended() {
                "capture loop ended"
            } else {
                "device stopped delivering"
            };
            return Err(DeviceError::Stream(format!(
                "last frame is {:.1}s old, {}",
                age.as_secs_f64(),
                reason
            )));
        }
        Ok(frame.data)
    }

    fn loop_ended(&self) -> bool {
        self.rx.has_changed().is_err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    const FRESH: Duration = Duration::from_secs(60);

    #[test]
    fn test_empty_slot_has_no_frame() {
        let (_publisher, slot) = frame_slot();
        let err = slot.latest(FRESH).unwrap_err();
        assert_eq!(err, DeviceError::Stream("no frame received yet".into()));
    }

    #[test]
    fn test_newest_frame_wins() {
        let (publisher, slot) = frame_slot();
        publisher.publish(&[1, 2, 3]);
        publisher.publish(&[4, 5]);
        assert_eq!(&*slot.latest(FRESH).unwrap(), &[4, 5]);
        // Reading does not consume the frame
        assert_eq!(&*slot.latest(FRESH).unwrap(), &[4, 5]);
    }

    #[test]
    fn test_old_frame_is_rejected() {
        let (publisher, slot) = frame_slot();
        publisher.publish(&[9]);
        thread::sleep(Duration::from_millis(20));
        let err = slot.latest(Duration::from_millis(5)).unwrap_err();
        assert!(matches!(err, DeviceError::Stream(msg) if msg.contains("stopped delivering")));
    }

    #[test]
    fn test_ended_loop_is_reported() {
        let (publisher, slot) = frame_slot();
        publisher.publish(&[9]);
        drop(publisher);
        thread::sleep(Duration::from_millis(20));
        let err = slot.latest(Duration::from_millis(5)).unwrap_err();
        assert!(matches!(err, DeviceError::Stream(msg) if msg.contains("capture loop ended")));
    }

    #[test]
    fn test_failed_initialization_is_returned() {
        let result = CaptureLoop::start_with_init(
            "test-capture",
            || Err::<((), ()), _>(DeviceError::InUse("/dev/video0".into())),
            |_: &mut ()| LoopAction::Continue,
        );
        assert!(matches!(result, Err(DeviceError::InUse(_))));
    }

    #[test]
    fn test_loop_publishes_until_stopped() {
        let (publisher, slot) = frame_slot();
        let iterations = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&iterations);

        let (capture, format) = CaptureLoop::start_with_init(
            "test-capture",
            || Ok((0u8, "MJPG")),
            move |n: &mut u8| {
                *n = n.wrapping_add(1);
                publisher.publish(&[*n]);
                counter.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(1));
                LoopAction::Continue
            },
        )
        .unwrap();
        assert_eq!(format, "MJPG");

        while iterations.load(Ordering::SeqCst) < 3 {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(capture.is_running());
        assert!(slot.latest(FRESH).is_ok());

        capture.stop_and_wait();
        let after_stop = iterations.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(10));
        assert_eq!(iterations.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn test_loop_stops_itself() {
        let (capture, ()) = CaptureLoop::start_with_init(
            "test-capture",
            || Ok(((), ())),
            |_: &mut ()| LoopAction::Stop,
        )
        .unwrap();
        while capture.is_running() {
            thread::sleep(Duration::from_millis(1));
        }
        capture.stop_and_wait();
    }
}
