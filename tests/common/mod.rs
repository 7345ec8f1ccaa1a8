// SPDX-License-Identifier: MPL-2.0

//! Scripted collaborators for inspector integration tests

#![allow(dead_code)]

use futures::future::BoxFuture;
use service_bay::Config;
use service_bay::backends::analysis::{AnalysisOutcome, AnalysisRequest, Analyzer, DefectCounts};
use service_bay::backends::camera::shared::SharedCamera;
use service_bay::backends::camera::{
    CameraBackend, CameraBackendType, CameraDevice, DeviceResult, Frame, MediaStream,
};
use service_bay::backends::remote_feed::{FeedSource, LatestDetection, StationFeedFrame};
use service_bay::errors::{AnalysisError, DeviceError, FeedError};
use service_bay::{Inspector, Services, StationId, StationMap};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

// =============================================================================
// Camera
// =============================================================================

/// Camera backend with a fixed set of devices that counts opens and stops
///
/// Like a real driver it refuses a second stream on a device that is still
/// open.
#[derive(Clone, Default)]
pub struct FakeCamera {
    pub devices: Vec<CameraDevice>,
    pub opened: Arc<AtomicUsize>,
    pub stopped: Arc<AtomicUsize>,
    /// Device ids with a live stream
    pub busy: Arc<Mutex<HashSet<String>>>,
    /// Device ids that fail to open, with the error they fail with
    pub failures: Arc<Mutex<HashMap<String, DeviceError>>>,
}

impl FakeCamera {
    pub fn with_devices(count: usize) -> Self {
        Self {
            devices: (0..count)
                .map(|i| CameraDevice {
                    id: format!("/dev/video{}", i * 2),
                    name: format!("Bay Camera {}", i),
                })
                .collect(),
            ..Default::default()
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Make opening the `index`th device fail with `error`
    pub fn fail_device(&self, index: usize, error: DeviceError) {
        let id = self.devices[index].id.clone();
        self.failures.lock().unwrap().insert(id, error);
    }
}

impl CameraBackend for FakeCamera {
    fn probe_permission(&self) -> DeviceResult<()> {
        Ok(())
    }

    fn enumerate_devices(&self) -> DeviceResult<Vec<CameraDevice>> {
        Ok(self.devices.clone())
    }

    fn open_stream(&self, device: &CameraDevice) -> DeviceResult<Box<dyn MediaStream>> {
        if let Some(err) = self.failures.lock().unwrap().get(&device.id) {
            return Err(err.clone());
        }
        if !self.busy.lock().unwrap().insert(device.id.clone()) {
            return Err(DeviceError::InUse(device.id.clone()));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeStream {
            device: device.clone(),
            grabs: 0,
            stopped: false,
            stop_counter: Arc::clone(&self.stopped),
            busy: Arc::clone(&self.busy),
        }))
    }

    fn backend_type(&self) -> CameraBackendType {
        CameraBackendType::Files
    }
}

/// Stream whose frames differ on every grab
pub struct FakeStream {
    device: CameraDevice,
    grabs: u8,
    stopped: bool,
    stop_counter: Arc<AtomicUsize>,
    busy: Arc<Mutex<HashSet<String>>>,
}

impl MediaStream for FakeStream {
    fn device(&self) -> &CameraDevice {
        &self.device
    }

    fn grab_frame(&mut self) -> DeviceResult<Frame> {
        self.grabs = self.grabs.wrapping_add(1);
        Ok(Frame::from(vec![0xFF, 0xD8, 0xFF, self.grabs]))
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.stop_counter.fetch_add(1, Ordering::SeqCst);
            self.busy.lock().unwrap().remove(&self.device.id);
        }
    }
}

// =============================================================================
// Analyzer
// =============================================================================

/// How the scripted analyzer answers for one station
#[derive(Clone)]
pub enum Reply {
    Succeed(DefectCounts),
    Fail(AnalysisError),
    Delay(Duration, DefectCounts),
    /// Answer once the notify is triggered
    Gate(Arc<Notify>, DefectCounts),
}

/// Request as seen by the analyzer
#[derive(Debug, Clone)]
pub struct Submitted {
    pub station: StationId,
    pub image: Frame,
    pub manual: bool,
    pub persist: bool,
    pub session_id: Option<String>,
    pub at: Instant,
}

pub struct ScriptedAnalyzer {
    pub replies: Mutex<StationMap<Reply>>,
    pub submitted: Mutex<Vec<Submitted>>,
}

impl Default for ScriptedAnalyzer {
    fn default() -> Self {
        Self {
            replies: Mutex::new(StationMap::from_fn(|_| Reply::Succeed(DefectCounts::default()))),
            submitted: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedAnalyzer {
    pub fn reply(&self, station: StationId, reply: Reply) {
        self.replies.lock().unwrap()[station] = reply;
    }

    pub fn submitted(&self) -> Vec<Submitted> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn stations(&self) -> Vec<StationId> {
        self.submitted().iter().map(|s| s.station).collect()
    }
}

pub fn annotated() -> Frame {
    Frame::from(vec![0x89, b'P', b'N', b'G', 1, 2, 3])
}

fn outcome(counts: DefectCounts) -> AnalysisOutcome {
    AnalysisOutcome {
        annotated: annotated(),
        counts,
        image_url: None,
        annotated_image_url: None,
    }
}

impl Analyzer for ScriptedAnalyzer {
    fn analyze(&self, request: AnalysisRequest) -> BoxFuture<'static, Result<AnalysisOutcome, AnalysisError>> {
        self.submitted.lock().unwrap().push(Submitted {
            station: request.station,
            image: request.image.clone(),
            manual: request.manual,
            persist: request.persist,
            session_id: request.session_id.clone(),
            at: Instant::now(),
        });
        let reply = self.replies.lock().unwrap()[request.station].clone();
        Box::pin(async move {
            match reply {
                Reply::Succeed(counts) => Ok(outcome(counts)),
                Reply::Fail(err) => Err(err),
                Reply::Delay(delay, counts) => {
                    tokio::time::sleep(delay).await;
                    Ok(outcome(counts))
                }
                Reply::Gate(gate, counts) => {
                    gate.notified().await;
                    Ok(outcome(counts))
                }
            }
        })
    }
}

// =============================================================================
// Remote feed
// =============================================================================

/// Feed that answers every poll with the same scripted frames
pub struct ScriptedFeed {
    pub frames: Mutex<StationMap<Result<StationFeedFrame, FeedError>>>,
}

impl Default for ScriptedFeed {
    fn default() -> Self {
        Self {
            frames: Mutex::new(StationMap::from_fn(|_| Ok(StationFeedFrame::default()))),
        }
    }
}

impl FeedSource for ScriptedFeed {
    fn fetch_station(&self, station: StationId) -> BoxFuture<'static, Result<StationFeedFrame, FeedError>> {
        let frame = self.frames.lock().unwrap()[station].clone();
        Box::pin(async move { frame })
    }

    fn fetch_latest(&self) -> BoxFuture<'static, Result<Option<LatestDetection>, FeedError>> {
        Box::pin(async { Ok(None) })
    }

    fn health(&self) -> BoxFuture<'static, Result<bool, FeedError>> {
        Box::pin(async { Ok(true) })
    }
}

// =============================================================================
// Harness
// =============================================================================

pub struct Bay {
    pub inspector: Inspector,
    pub camera: FakeCamera,
    pub analyzer: Arc<ScriptedAnalyzer>,
    pub feed: Arc<ScriptedFeed>,
}

pub fn counts(scratches: u32, dents: u32, cracks: u32) -> DefectCounts {
    DefectCounts {
        scratches,
        dents,
        cracks,
    }
}

pub fn test_config() -> Config {
    Config {
        device_settle_ms: 0,
        ..Config::default()
    }
}

pub fn bay_with(config: Config, cameras: usize) -> Bay {
    let camera = FakeCamera::with_devices(cameras);
    let analyzer = Arc::new(ScriptedAnalyzer::default());
    let feed = Arc::new(ScriptedFeed::default());
    let services = Services {
        camera: Arc::new(SharedCamera::new(Arc::new(camera.clone()))),
        feed: feed.clone(),
        analyzer: analyzer.clone(),
        sensors: None,
    };
    Bay {
        inspector: Inspector::new(config, services),
        camera,
        analyzer,
        feed,
    }
}

pub fn bay(cameras: usize) -> Bay {
    bay_with(test_config(), cameras)
}

/// Process messages until nothing is running or in flight
pub async fn run_until_idle(inspector: &mut Inspector) {
    while inspector.state().auto_capture.is_running() || inspector.in_flight_count() > 0 {
        if inspector.next_message().await.is_none() {
            break;
        }
    }
}
