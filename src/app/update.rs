// SPDX-License-Identifier: GPL-3.0-only

//! Message update handling
//!
//! `update()` is the single transition function of the inspector. It routes
//! each message to a focused handler in the `handlers` submodules and
//! publishes a fresh snapshot afterwards.
//!
//! # Handler Modules
//!
//! - `handlers::source`: source changes, device setup and switching, feed polls
//! - `handlers::capture`: capture, upload, reconciliation, reset
//! - `handlers::auto_capture`: sequencer start, stop and ticks
//! - `handlers::sensors`: telemetry updates

use super::{Inspector, Message};
use crate::errors::AppResult;

impl Inspector {
    /// Main message handler - routes messages to handler methods
    pub fn update(&mut self, message: Message) -> AppResult<()> {
        if message.is_operator() {
            self.state.notice = None;
        }

        let result = match message {
            // ===== Video source =====
            Message::SetSource(kind) => self.handle_set_source(kind),
            Message::SelectDevice { station, device } => self.handle_select_device(station, device),
            Message::NextDevice(station) => self.handle_next_device(station),
            Message::LocalCamerasOpened {
                epoch,
                devices,
                stations,
            } => self.handle_local_cameras_opened(epoch, devices, stations),
            Message::StationDeviceOpened {
                epoch,
                station,
                seq,
                result,
            } => self.handle_station_device_opened(epoch, station, seq, result),
            Message::FeedPolled {
                epoch,
                now,
                stations,
                latest,
            } => self.handle_feed_polled(epoch, now, stations, latest),

            // ===== Capture =====
            Message::Capture(station) => self.handle_capture(station),
            Message::UploadImage { station, image } => self.handle_upload(station, image),
            Message::AnalysisFinished {
                station,
                ticket,
                result,
            } => self.handle_analysis_finished(station, ticket, result),
            Message::Reset(station) => self.handle_reset(station),

            // ===== Auto-capture =====
            Message::StartAutoCapture => self.handle_start_auto_capture(),
            Message::StopAutoCapture => self.handle_stop_auto_capture(),
            Message::AutoCaptureTick { run_id } => self.handle_auto_capture_tick(run_id),

            // ===== Sensors =====
            Message::ApplySensorUpdate(update) => self.handle_apply_sensor_update(update),
            Message::SensorRecordReceived(session) => self.handle_sensor_record(session),
        };

        self.publish();
        result
    }
}
