// SPDX-License-Identifier: GPL-3.0-only

//! Video source selection handlers
//!
//! Only one source is live at a time. Changing the source tears down the old
//! one (all station streams stopped, feed poller cancelled) before the new
//! one is started. Results of background work started for a previous source
//! carry its epoch and are discarded when they arrive late; streams in such
//! results are stopped right away.

use crate::app::state::{
    LocalCameraState, Message, RemoteFeedState, StationOpen, VideoSource, VideoSourceKind,
};
use crate::app::{Inspector, unix_now};
use crate::backends::camera::{CameraDevice, MediaStream, assign_devices};
use crate::backends::remote_feed::{FeedSource, LatestDetection, StationFeedFrame, is_fresh};
use crate::errors::{AppError, AppResult, DeviceError, FeedError};
use crate::station::{StationId, StationMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

impl Inspector {
    // =========================================================================
    // Source Selection
    // =========================================================================

    pub(crate) fn handle_set_source(&mut self, kind: VideoSourceKind) -> AppResult<()> {
        if kind == self.state.source.kind() {
            debug!(source = %kind, "Source already active");
            return Ok(());
        }

        info!(from = %self.state.source.kind(), to = %kind, "Switching video source");
        self.state.source.teardown();
        self.state.source_epoch += 1;

        if kind == VideoSourceKind::None {
            self.stop_auto_capture();
        }

        self.state.source = match kind {
            VideoSourceKind::None => VideoSource::None,
            VideoSourceKind::LocalCamera => {
                self.spawn_local_camera_setup();
                VideoSource::LocalCamera(LocalCameraState::default())
            }
            VideoSourceKind::RemoteFeed => {
                let poller = CancellationToken::new();
                self.spawn_feed_poller(poller.clone());
                VideoSource::RemoteFeed(RemoteFeedState::new(poller))
            }
        };
        Ok(())
    }

    // =========================================================================
    // Local Cameras
    // =========================================================================

    fn spawn_local_camera_setup(&mut self) {
        let camera = Arc::clone(&self.services.camera);
        let tx = self.tx.clone();
        let epoch = self.state.source_epoch;
        self.pending_opens += 1;

        tokio::spawn(async move {
            let setup = tokio::task::spawn_blocking(move || {
                if let Err(e) = camera.probe_permission() {
                    warn!(error = %e, "Camera permission probe failed");
                }
                open_all_stations(camera.as_ref())
            })
            .await;

            let (devices, stations) = match setup {
                Ok(setup) => setup,
                Err(e) => {
                    let err = DeviceError::Stream(format!("camera setup task failed: {}", e));
                    (Vec::new(), failed_stations(&err))
                }
            };
            let _ = tx.send(Message::LocalCamerasOpened {
                epoch,
                devices,
                stations,
            });
        });
    }

    pub(crate) fn handle_local_cameras_opened(
        &mut self,
        epoch: u64,
        devices: Vec<CameraDevice>,
        stations: StationMap<StationOpen>,
    ) -> AppResult<()> {
        self.pending_opens = self.pending_opens.saturating_sub(1);
        let current_epoch = self.state.source_epoch;

        let local = match &mut self.state.source {
            VideoSource::LocalCamera(local) if epoch == current_epoch => local,
            _ => {
                debug!(epoch, "Discarding camera setup for a superseded source");
                for (_, open) in stations {
                    if let Ok(stream) = open.result {
                        stop_stream(stream);
                    }
                }
                return Ok(());
            }
        };

        local.devices = devices;
        local.ready = true;
        for (station, open) in stations {
            let binding = &mut local.bindings[station];
            binding.device = open.device;
            match open.result {
                Ok(stream) => {
                    info!(station = %station, device = %stream.device(), "Station streaming");
                    binding.stream = Some(stream);
                    binding.error = None;
                }
                Err(e) => {
                    warn!(station = %station, error = %e, "Station camera unavailable");
                    binding.error = Some(e);
                }
            }
        }
        Ok(())
    }

    pub(crate) fn handle_select_device(
        &mut self,
        station: StationId,
        device: CameraDevice,
    ) -> AppResult<()> {
        let epoch = self.state.source_epoch;
        let local = match &mut self.state.source {
            VideoSource::LocalCamera(local) if local.ready => local,
            VideoSource::LocalCamera(_) => {
                return Err(AppError::Other("cameras are still opening".into()));
            }
            _ => {
                return Err(AppError::Other(
                    "device selection requires the local camera source".into(),
                ));
            }
        };

        let binding = &mut local.bindings[station];
        // The old stream is released before the new device is touched
        binding.stop_stream();
        binding.switch_seq += 1;
        binding.device = Some(device.clone());
        binding.error = None;
        binding.opening = true;
        let seq = binding.switch_seq;

        info!(station = %station, device = %device, "Switching station device");

        let camera = Arc::clone(&self.services.camera);
        let tx = self.tx.clone();
        let settle = self.config.device_settle_delay();
        self.pending_opens += 1;

        tokio::spawn(async move {
            tokio::time::sleep(settle).await;
            let result = tokio::task::spawn_blocking(move || camera.open_stream(&device))
                .await
                .unwrap_or_else(|e| Err(DeviceError::Stream(format!("open task failed: {}", e))));
            let _ = tx.send(Message::StationDeviceOpened {
                epoch,
                station,
                seq,
                result,
            });
        });
        Ok(())
    }

    pub(crate) fn handle_next_device(&mut self, station: StationId) -> AppResult<()> {
        let VideoSource::LocalCamera(local) = &self.state.source else {
            return Err(AppError::Other(
                "device selection requires the local camera source".into(),
            ));
        };
        if local.devices.is_empty() {
            return Err(DeviceError::NoDevices.into());
        }

        let current = local.bindings[station]
            .device
            .as_ref()
            .and_then(|d| local.devices.iter().position(|candidate| candidate == d));
        let next = current.map(|i| (i + 1) % local.devices.len()).unwrap_or(0);
        let device = local.devices[next].clone();
        self.handle_select_device(station, device)
    }

    pub(crate) fn handle_station_device_opened(
        &mut self,
        epoch: u64,
        station: StationId,
        seq: u64,
        result: Result<Box<dyn MediaStream>, DeviceError>,
    ) -> AppResult<()> {
        self.pending_opens = self.pending_opens.saturating_sub(1);
        let current_epoch = self.state.source_epoch;

        let binding = match &mut self.state.source {
            VideoSource::LocalCamera(local)
                if epoch == current_epoch && local.bindings[station].switch_seq == seq =>
            {
                &mut local.bindings[station]
            }
            _ => {
                debug!(station = %station, seq, "Discarding superseded device open");
                if let Ok(stream) = result {
                    stop_stream(stream);
                }
                return Ok(());
            }
        };

        binding.opening = false;
        match result {
            Ok(stream) => {
                info!(station = %station, device = %stream.device(), "Station switched device");
                binding.stream = Some(stream);
            }
            Err(e) => {
                warn!(station = %station, error = %e, "Failed to open station device");
                binding.error = Some(e);
            }
        }
        Ok(())
    }

    // =========================================================================
    // Remote Feed
    // =========================================================================

    fn spawn_feed_poller(&self, cancel: CancellationToken) {
        let feed = Arc::clone(&self.services.feed);
        let tx = self.tx.clone();
        let epoch = self.state.source_epoch;
        let period = self.config.feed_poll_interval();
        tokio::spawn(run_feed_poller(feed, tx, epoch, period, cancel));
    }

    pub(crate) fn handle_feed_polled(
        &mut self,
        epoch: u64,
        now: f64,
        stations: StationMap<Result<StationFeedFrame, FeedError>>,
        latest: Result<Option<LatestDetection>, FeedError>,
    ) -> AppResult<()> {
        let freshness = self.config.feed_freshness_secs;
        let current_epoch = self.state.source_epoch;
        let remote = match &mut self.state.source {
            VideoSource::RemoteFeed(remote) if epoch == current_epoch => remote,
            _ => {
                debug!(epoch, "Discarding poll for a superseded source");
                return Ok(());
            }
        };

        let mut failures = 0;
        for (station, result) in stations {
            let feed = &mut remote.stations[station];
            match result {
                Ok(frame) => {
                    if let Some(image) = frame.image {
                        feed.last_frame = Some(image);
                    }
                    if frame.timestamp.is_some() {
                        feed.last_timestamp = frame.timestamp;
                    }
                }
                Err(e) => {
                    failures += 1;
                    debug!(station = %station, error = %e, "Station poll failed");
                }
            }
            // Recomputed on every tick, including failed ones
            feed.connected = is_fresh(feed.last_timestamp, now, freshness);
        }

        match latest {
            Ok(Some(detection)) => remote.latest_detection = Some(detection),
            Ok(None) => {}
            Err(e) => debug!(error = %e, "Latest detection poll failed"),
        }

        let status = if failures == StationId::ALL.len() {
            "Remote feed offline, retrying".to_string()
        } else {
            let live = remote.stations.values().filter(|f| f.connected).count();
            format!("{}/{} stations live", live, StationId::ALL.len())
        };
        if status != remote.status {
            if failures == StationId::ALL.len() {
                warn!("Remote feed unreachable");
            } else {
                info!(status = %status, "Remote feed status");
            }
            remote.status = status;
        }
        Ok(())
    }
}

fn stop_stream(mut stream: Box<dyn MediaStream>) {
    stream.stop();
}

fn failed_stations(err: &DeviceError) -> StationMap<StationOpen> {
    StationMap::from_fn(|_| StationOpen {
        device: None,
        result: Err(err.clone()),
    })
}

/// Enumerate, assign and open one stream per station
///
/// Errors are kept per station; one failing device never prevents the
/// others from opening.
fn open_all_stations(
    camera: &dyn crate::backends::camera::CameraBackend,
) -> (Vec<CameraDevice>, StationMap<StationOpen>) {
    let devices = match camera.enumerate_devices() {
        Ok(devices) if devices.is_empty() => {
            return (devices, failed_stations(&DeviceError::NoDevices));
        }
        Ok(devices) => devices,
        Err(e) => {
            warn!(error = %e, "Camera enumeration failed");
            return (Vec::new(), failed_stations(&e));
        }
    };

    let stations = assign_devices(&devices).map(|station, device| {
        let result = match &device {
            Some(device) => camera.open_stream(device),
            None => Err(DeviceError::NoDevices),
        };
        if let Err(e) = &result {
            debug!(station = %station, error = %e, "Station open failed");
        }
        StationOpen { device, result }
    });
    (devices, stations)
}

/// Poll every station in parallel once per period until cancelled
///
/// Failures are reported per station inside the message; the loop itself
/// never stops on errors.
async fn run_feed_poller(
    feed: Arc<dyn FeedSource>,
    tx: mpsc::UnboundedSender<Message>,
    epoch: u64,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    debug!(epoch, ?period, "Feed poller started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let poll = async {
            tokio::join!(
                feed.fetch_station(StationId::Front),
                feed.fetch_station(StationId::Left),
                feed.fetch_station(StationId::Right),
                feed.fetch_station(StationId::Brake),
                feed.fetch_latest(),
            )
        };
        let (front, left, right, brake, latest) = tokio::select! {
            _ = cancel.cancelled() => break,
            polled = poll => polled,
        };

        let message = Message::FeedPolled {
            epoch,
            now: unix_now(),
            stations: StationMap::from([front, left, right, brake]),
            latest,
        };
        if tx.send(message).is_err() {
            break;
        }
    }
    debug!(epoch, "Feed poller stopped");
}
