// SPDX-License-Identifier: GPL-3.0-only

//! Inspection state
//!
//! All mutable state of the bay lives in [`InspectionState`] and is only
//! changed by the handlers behind [`Inspector::update`](super::Inspector::update).
//! Background tasks never touch it directly; they report back with a
//! [`Message`].

use crate::backends::analysis::{AnalysisOutcome, DefectCounts};
use crate::backends::camera::{CameraDevice, Frame, MediaStream};
use crate::backends::remote_feed::{LatestDetection, StationFeedFrame};
use crate::billing::Bill;
use crate::errors::{AnalysisError, DeviceError, FeedError};
use crate::sensors::{SensorUpdate, ServiceSession};
use crate::station::{StationId, StationMap};
use std::fmt;
use tokio_util::sync::CancellationToken;

/// Which kind of video source is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoSourceKind {
    #[default]
    None,
    LocalCamera,
    RemoteFeed,
}

impl fmt::Display for VideoSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoSourceKind::None => write!(f, "none"),
            VideoSourceKind::LocalCamera => write!(f, "local camera"),
            VideoSourceKind::RemoteFeed => write!(f, "remote feed"),
        }
    }
}

/// Per-station binding to a local capture device
#[derive(Default)]
pub struct LocalCameraBinding {
    pub device: Option<CameraDevice>,
    pub stream: Option<Box<dyn MediaStream>>,
    /// Why this station has no stream
    pub error: Option<DeviceError>,
    /// Bumped on every device switch; late opens with an older value are discarded
    pub switch_seq: u64,
    /// A device open is pending
    pub opening: bool,
}

impl LocalCameraBinding {
    /// Stop and release the stream, if any
    pub fn stop_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
        }
    }
}

impl fmt::Debug for LocalCameraBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalCameraBinding")
            .field("device", &self.device)
            .field("streaming", &self.stream.is_some())
            .field("error", &self.error)
            .field("switch_seq", &self.switch_seq)
            .field("opening", &self.opening)
            .finish()
    }
}

/// State of the local camera source
#[derive(Debug, Default)]
pub struct LocalCameraState {
    /// Enumerated devices (empty until setup finishes)
    pub devices: Vec<CameraDevice>,
    pub bindings: StationMap<LocalCameraBinding>,
    /// Initial enumeration and opening finished
    pub ready: bool,
}

impl LocalCameraState {
    /// Number of stations with a live stream
    pub fn active_streams(&self) -> usize {
        self.bindings.values().filter(|b| b.stream.is_some()).count()
    }
}

/// Last known frame of one remote station
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StationFeed {
    pub last_frame: Option<Frame>,
    /// Unix seconds of `last_frame`
    pub last_timestamp: Option<f64>,
    /// Recomputed from `last_timestamp` on every poll
    pub connected: bool,
}

/// State of the remote feed source
#[derive(Debug)]
pub struct RemoteFeedState {
    pub stations: StationMap<StationFeed>,
    /// Aggregate status line
    pub status: String,
    pub latest_detection: Option<LatestDetection>,
    /// Stops the poll loop
    pub poller: CancellationToken,
}

impl RemoteFeedState {
    pub fn new(poller: CancellationToken) -> Self {
        Self {
            stations: StationMap::default(),
            status: "Connecting...".to_string(),
            latest_detection: None,
            poller,
        }
    }
}

/// The active video source and the resources it owns
#[derive(Debug, Default)]
pub enum VideoSource {
    #[default]
    None,
    LocalCamera(LocalCameraState),
    RemoteFeed(RemoteFeedState),
}

impl VideoSource {
    pub fn kind(&self) -> VideoSourceKind {
        match self {
            VideoSource::None => VideoSourceKind::None,
            VideoSource::LocalCamera(_) => VideoSourceKind::LocalCamera,
            VideoSource::RemoteFeed(_) => VideoSourceKind::RemoteFeed,
        }
    }

    /// Release everything the source owns
    ///
    /// Stops every station stream exactly once and cancels the feed poller.
    pub fn teardown(&mut self) {
        match self {
            VideoSource::None => {}
            VideoSource::LocalCamera(local) => {
                for (_, binding) in local.bindings.iter_mut() {
                    binding.stop_stream();
                }
            }
            VideoSource::RemoteFeed(remote) => remote.poller.cancel(),
        }
    }
}

/// Brake verdict derived from the defect total
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrakeStatus {
    Good,
    Bad,
}

impl fmt::Display for BrakeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrakeStatus::Good => write!(f, "Good"),
            BrakeStatus::Bad => write!(f, "Bad"),
        }
    }
}

/// Analysis result stored in a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InspectionResult {
    pub counts: DefectCounts,
    /// Only set for the brake station
    pub brake_status: Option<BrakeStatus>,
}

impl InspectionResult {
    pub fn new(station: StationId, counts: DefectCounts) -> Self {
        let brake_status = (station == StationId::Brake).then(|| {
            if counts.total() > 0 {
                BrakeStatus::Bad
            } else {
                BrakeStatus::Good
            }
        });
        Self {
            counts,
            brake_status,
        }
    }
}

/// Capture and analysis state of one station
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureSlot {
    /// Still submitted for analysis
    pub before: Option<Frame>,
    /// Annotated image returned by the analysis
    pub after: Option<Frame>,
    /// An analysis is outstanding
    pub busy: bool,
    pub result: Option<InspectionResult>,
    /// Last analysis failure, cleared by the next attempt
    pub last_error: Option<AnalysisError>,
}

/// Auto-capture sequencer state
#[derive(Debug, Default)]
pub enum AutoCaptureState {
    #[default]
    Idle,
    Running {
        /// Index into [`StationId::ALL`] of the last station captured
        station_index: usize,
        /// Identifies the ticker so ticks of a cancelled run are ignored
        run_id: u64,
        /// Stops the ticker
        cancel: CancellationToken,
    },
}

impl AutoCaptureState {
    pub fn is_running(&self) -> bool {
        matches!(self, AutoCaptureState::Running { .. })
    }

    /// Station currently being visited
    pub fn current_station(&self) -> Option<StationId> {
        match self {
            AutoCaptureState::Idle => None,
            AutoCaptureState::Running { station_index, .. } => StationId::from_index(*station_index),
        }
    }
}

/// Everything the inspector knows
#[derive(Debug, Default)]
pub struct InspectionState {
    pub source: VideoSource,
    /// Incremented on every source change
    pub source_epoch: u64,
    pub slots: StationMap<CaptureSlot>,
    pub auto_capture: AutoCaptureState,
    pub session: ServiceSession,
    /// Derived from `slots` and `session`
    pub bill: Bill,
    /// Last rejected request, for display
    pub notice: Option<String>,
}

impl InspectionState {
    pub fn results(&self) -> StationMap<Option<DefectCounts>> {
        StationMap::from_fn(|station| self.slots[station].result.map(|r| r.counts))
    }
}

/// Outcome of opening one station during local camera setup
pub struct StationOpen {
    pub device: Option<CameraDevice>,
    pub result: Result<Box<dyn MediaStream>, DeviceError>,
}

impl fmt::Debug for StationOpen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StationOpen")
            .field("device", &self.device)
            .field("result", &self.result.as_ref().map(|_| "stream"))
            .finish()
    }
}

/// Messages handled by the inspector
///
/// The first group is sent by the operator (dashboard, CLI, tests); the
/// second by the inspector's own background tasks.
pub enum Message {
    // ===== Operator =====
    SetSource(VideoSourceKind),
    SelectDevice { station: StationId, device: CameraDevice },
    NextDevice(StationId),
    Capture(StationId),
    UploadImage { station: StationId, image: Frame },
    Reset(StationId),
    StartAutoCapture,
    StopAutoCapture,
    ApplySensorUpdate(SensorUpdate),
    SensorRecordReceived(ServiceSession),

    // ===== Background results =====
    LocalCamerasOpened {
        epoch: u64,
        devices: Vec<CameraDevice>,
        stations: StationMap<StationOpen>,
    },
    StationDeviceOpened {
        epoch: u64,
        station: StationId,
        seq: u64,
        result: Result<Box<dyn MediaStream>, DeviceError>,
    },
    FeedPolled {
        epoch: u64,
        /// Unix seconds when the poll completed
        now: f64,
        stations: StationMap<Result<StationFeedFrame, FeedError>>,
        latest: Result<Option<LatestDetection>, FeedError>,
    },
    AnalysisFinished {
        station: StationId,
        ticket: u64,
        result: Result<AnalysisOutcome, AnalysisError>,
    },
    AutoCaptureTick { run_id: u64 },
}

impl Message {
    /// Sent by the operator rather than a background task
    pub fn is_operator(&self) -> bool {
        !matches!(
            self,
            Message::LocalCamerasOpened { .. }
                | Message::StationDeviceOpened { .. }
                | Message::FeedPolled { .. }
                | Message::AnalysisFinished { .. }
                | Message::AutoCaptureTick { .. }
                | Message::SensorRecordReceived(_)
        )
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::SetSource(kind) => write!(f, "SetSource({})", kind),
            Message::SelectDevice { station, device } => {
                write!(f, "SelectDevice({}, {})", station, device)
            }
            Message::NextDevice(station) => write!(f, "NextDevice({})", station),
            Message::Capture(station) => write!(f, "Capture({})", station),
            Message::UploadImage { station, image } => {
                write!(f, "UploadImage({}, {:?})", station, image)
            }
            Message::Reset(station) => write!(f, "Reset({})", station),
            Message::StartAutoCapture => write!(f, "StartAutoCapture"),
            Message::StopAutoCapture => write!(f, "StopAutoCapture"),
            Message::ApplySensorUpdate(update) => write!(f, "ApplySensorUpdate({:?})", update),
            Message::SensorRecordReceived(_) => write!(f, "SensorRecordReceived"),
            Message::LocalCamerasOpened { epoch, devices, .. } => {
                write!(f, "LocalCamerasOpened(epoch={}, devices={})", epoch, devices.len())
            }
            Message::StationDeviceOpened {
                epoch, station, seq, ..
            } => write!(
                f,
                "StationDeviceOpened(epoch={}, {}, seq={})",
                epoch, station, seq
            ),
            Message::FeedPolled { epoch, now, .. } => {
                write!(f, "FeedPolled(epoch={}, now={:.3})", epoch, now)
            }
            Message::AnalysisFinished {
                station, ticket, result,
            } => write!(
                f,
                "AnalysisFinished({}, ticket={}, ok={})",
                station,
                ticket,
                result.is_ok()
            ),
            Message::AutoCaptureTick { run_id } => write!(f, "AutoCaptureTick(run={})", run_id),
        }
    }
}

/// Display view of one station
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StationView {
    pub slot: CaptureSlot,
    pub device: Option<CameraDevice>,
    pub device_error: Option<DeviceError>,
    pub streaming: bool,
    /// Remote feed connectivity
    pub connected: bool,
    /// Latest remote frame
    pub live_frame: Option<Frame>,
}

/// Read-only copy of the state published after every update
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub source: VideoSourceKind,
    pub stations: StationMap<StationView>,
    pub devices: Vec<CameraDevice>,
    pub feed_status: Option<String>,
    pub latest_detection: Option<LatestDetection>,
    pub auto_capture: Option<StationId>,
    pub session: ServiceSession,
    pub bill: Bill,
    pub notice: Option<String>,
}

impl Snapshot {
    pub fn from_state(state: &InspectionState) -> Self {
        let mut stations = StationMap::from_fn(|station| StationView {
            slot: state.slots[station].clone(),
            ..Default::default()
        });
        let mut devices = Vec::new();
        let mut feed_status = None;
        let mut latest_detection = None;

        match &state.source {
            VideoSource::None => {}
            VideoSource::LocalCamera(local) => {
                devices = local.devices.clone();
                for (station, view) in stations.iter_mut() {
                    let binding = &local.bindings[station];
                    view.device = binding.device.clone();
                    view.device_error = binding.error.clone();
                    view.streaming = binding.stream.is_some();
                }
            }
            VideoSource::RemoteFeed(remote) => {
                feed_status = Some(remote.status.clone());
                latest_detection = remote.latest_detection.clone();
                for (station, view) in stations.iter_mut() {
                    let feed = &remote.stations[station];
                    view.connected = feed.connected;
                    view.live_frame = feed.last_frame.clone();
                }
            }
        }

        Self {
            source: state.source.kind(),
            stations,
            devices,
            feed_status,
            latest_detection,
            auto_capture: state.auto_capture.current_station(),
            session: state.session.clone(),
            bill: state.bill.clone(),
            notice: state.notice.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brake_status_only_for_brake() {
        let counts = DefectCounts {
            scratches: 1,
            dents: 0,
            cracks: 0,
        };
        assert_eq!(InspectionResult::new(StationId::Front, counts).brake_status, None);
        assert_eq!(
            InspectionResult::new(StationId::Brake, counts).brake_status,
            Some(BrakeStatus::Bad)
        );
        assert_eq!(
            InspectionResult::new(StationId::Brake, DefectCounts::default()).brake_status,
            Some(BrakeStatus::Good)
        );
    }

    #[test]
    fn test_auto_capture_idle_has_no_station() {
        let state = AutoCaptureState::default();
        assert!(!state.is_running());
        assert_eq!(state.current_station(), None);
    }
}
