// SPDX-License-Identifier: MPL-2.0

//! Service bay inspector
//!
//! The [`Inspector`] owns the [`InspectionState`] and is the only place it is
//! mutated. Operator requests and background results both arrive as
//! [`Message`]s and go through [`Inspector::update`].
//!
//! # Architecture
//!
//! - `state`: state types (VideoSource, CaptureSlot, AutoCaptureState, Message, Snapshot)
//! - `update`: message dispatcher
//! - `handlers::source`: video source selection and device switching
//! - `handlers::capture`: capture, upload, analysis reconciliation, reset
//! - `handlers::auto_capture`: timed walk across the stations
//! - `handlers::sensors`: telemetry updates and the sensor poller
//!
//! Background work (device opening, feed polling, analysis requests, timers)
//! runs in tokio tasks that report back over an unbounded channel. Every
//! spawned analysis is tracked per station, so [`Inspector::settle`] can wait
//! until nothing is in flight.

mod handlers;
mod state;
mod update;

pub use state::{
    AutoCaptureState, BrakeStatus, CaptureSlot, InspectionResult, InspectionState,
    LocalCameraBinding, LocalCameraState, Message, RemoteFeedState, Snapshot, StationFeed,
    StationOpen, StationView, VideoSource, VideoSourceKind,
};

use crate::backends::analysis::{Analyzer, HttpAnalyzer};
use crate::backends::camera::{self, CameraBackend, Frame};
use crate::backends::remote_feed::{FeedSource, HttpFeedSource};
use crate::config::Config;
use crate::sensors::{HttpSensorSource, SensorSource};
use crate::station::{StationId, StationMap};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// External collaborators of the inspector
#[derive(Clone)]
pub struct Services {
    pub camera: Arc<dyn CameraBackend>,
    pub feed: Arc<dyn FeedSource>,
    pub analyzer: Arc<dyn Analyzer>,
    pub sensors: Option<Arc<dyn SensorSource>>,
}

impl Services {
    /// Production services for `config`
    pub fn from_config(config: &Config) -> Self {
        Self {
            camera: camera::backend_from_config(config),
            feed: Arc::new(HttpFeedSource::new(config.backend_url.clone())),
            analyzer: Arc::new(HttpAnalyzer::new(config.backend_url.clone())),
            sensors: config
                .database
                .clone()
                .map(|db| Arc::new(HttpSensorSource::new(db)) as Arc<dyn SensorSource>),
        }
    }
}

/// An analysis request that has not been reconciled yet
pub(crate) struct InFlightCapture {
    pub ticket: u64,
    pub token: CancellationToken,
    pub handle: JoinHandle<()>,
    /// `before` image of the slot prior to this capture, restored on failure
    pub previous_before: Option<Frame>,
}

/// Cloneable sender for operator messages
#[derive(Clone)]
pub struct InspectorHandle {
    tx: mpsc::UnboundedSender<Message>,
}

impl InspectorHandle {
    /// Queue a message; returns false once the inspector is gone
    pub fn send(&self, message: Message) -> bool {
        self.tx.send(message).is_ok()
    }
}

/// Orchestrator of the service bay
pub struct Inspector {
    config: Config,
    services: Services,
    state: InspectionState,
    in_flight: StationMap<Option<InFlightCapture>>,
    /// Device opens whose result message has not been processed
    pending_opens: usize,
    next_ticket: u64,
    next_run_id: u64,
    sensor_poller: Option<CancellationToken>,
    tx: mpsc::UnboundedSender<Message>,
    rx: mpsc::UnboundedReceiver<Message>,
    snapshot_tx: watch::Sender<Snapshot>,
}

impl Inspector {
    pub fn new(config: Config, services: Services) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = InspectionState::default();
        let (snapshot_tx, _) = watch::channel(Snapshot::from_state(&state));
        Self {
            config,
            services,
            state,
            in_flight: StationMap::default(),
            pending_opens: 0,
            next_ticket: 0,
            next_run_id: 0,
            sensor_poller: None,
            tx,
            rx,
            snapshot_tx,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> &InspectionState {
        &self.state
    }

    pub fn handle(&self) -> InspectorHandle {
        InspectorHandle {
            tx: self.tx.clone(),
        }
    }

    /// Receive a snapshot after every processed message
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Number of stations with an outstanding analysis
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.values().filter(|f| f.is_some()).count()
    }

    fn has_pending_work(&self) -> bool {
        self.pending_opens > 0 || self.in_flight_count() > 0
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(Snapshot::from_state(&self.state));
    }

    /// Apply a message and record a rejection for display
    fn dispatch(&mut self, message: Message) {
        debug!(?message, "Dispatching");
        if let Err(err) = self.update(message) {
            warn!(error = %err, "Request rejected");
            self.state.notice = Some(err.to_string());
            self.publish();
        }
    }

    /// Wait for the next queued message and apply it
    pub async fn next_message(&mut self) -> Option<crate::errors::AppResult<()>> {
        let message = self.rx.recv().await?;
        Some(self.update(message))
    }

    /// Apply queued messages until no analysis or device open is outstanding
    ///
    /// Periodic sources (feed poller, auto-capture ticker) keep running;
    /// their messages are applied while waiting.
    pub async fn settle(&mut self) {
        loop {
            while let Ok(message) = self.rx.try_recv() {
                self.dispatch(message);
            }
            if !self.has_pending_work() {
                return;
            }
            match self.rx.recv().await {
                Some(message) => self.dispatch(message),
                None => return,
            }
        }
    }

    /// Event loop; returns after `shutdown` is cancelled
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("Inspector started");
        self.start_sensor_polling();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                message = self.rx.recv() => match message {
                    Some(message) => self.dispatch(message),
                    None => break,
                },
            }
        }
        self.shutdown();
    }

    /// Release every resource and stop every background task
    pub fn shutdown(&mut self) {
        self.stop_auto_capture();
        self.state.source.teardown();
        self.state.source = VideoSource::None;
        if let Some(poller) = self.sensor_poller.take() {
            poller.cancel();
        }
        for station in StationId::ALL {
            if let Some(in_flight) = self.in_flight[station].take() {
                in_flight.token.cancel();
                in_flight.handle.abort();
                self.state.slots[station].busy = false;
            }
        }
        self.publish();
        info!("Inspector stopped");
    }
}

/// Current time as unix seconds
pub(crate) fn unix_now() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
