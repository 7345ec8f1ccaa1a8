// SPDX-License-Identifier: GPL-3.0-only

//! Auto-capture sequencer
//!
//! Walks the stations in capture order, one capture per interval. Captures
//! are fire-and-forget: the ticker never waits for an analysis to finish,
//! so several analyses can be in flight when the walk ends.

use crate::app::Inspector;
use crate::app::state::{AutoCaptureState, Message, VideoSource};
use crate::errors::{AppResult, CaptureError};
use crate::station::StationId;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

impl Inspector {
    pub(crate) fn handle_start_auto_capture(&mut self) -> AppResult<()> {
        if matches!(self.state.source, VideoSource::None) {
            return Err(CaptureError::NoSourceSelected.into());
        }
        if self.state.auto_capture.is_running() {
            return Err(CaptureError::AutoCaptureRunning.into());
        }

        self.next_run_id += 1;
        let run_id = self.next_run_id;
        let cancel = CancellationToken::new();
        self.spawn_auto_capture_ticker(run_id, cancel.clone());

        self.state.auto_capture = AutoCaptureState::Running {
            station_index: 0,
            run_id,
            cancel,
        };
        info!(run_id, "Auto-capture started");
        self.auto_capture_step(StationId::ALL[0]);
        Ok(())
    }

    pub(crate) fn handle_stop_auto_capture(&mut self) -> AppResult<()> {
        if self.state.auto_capture.is_running() {
            self.stop_auto_capture();
            info!("Auto-capture stopped by operator");
        }
        Ok(())
    }

    pub(crate) fn handle_auto_capture_tick(&mut self, run_id: u64) -> AppResult<()> {
        let AutoCaptureState::Running {
            station_index,
            run_id: active,
            ..
        } = &mut self.state.auto_capture
        else {
            return Ok(());
        };
        if *active != run_id {
            debug!(run_id, "Ignoring tick of a cancelled run");
            return Ok(());
        }

        if *station_index + 1 < StationId::ALL.len() {
            *station_index += 1;
            let station = StationId::ALL[*station_index];
            self.auto_capture_step(station);
        } else {
            self.stop_auto_capture();
            info!(run_id, "Auto-capture sequence complete");
        }
        Ok(())
    }

    /// Cancel the ticker and return to idle
    pub(crate) fn stop_auto_capture(&mut self) {
        if let AutoCaptureState::Running { cancel, run_id, .. } =
            std::mem::take(&mut self.state.auto_capture)
        {
            cancel.cancel();
            debug!(run_id, "Auto-capture ticker cancelled");
        }
    }

    fn auto_capture_step(&mut self, station: StationId) {
        debug!(station = %station, "Auto-capture step");
        if let Err(e) = self.start_capture(station, false) {
            warn!(station = %station, error = %e, "Auto-capture step failed");
        }
    }

    /// Send one tick per interval, starting one interval from now
    fn spawn_auto_capture_ticker(&self, run_id: u64, cancel: CancellationToken) {
        let tx = self.tx.clone();
        let period = self.config.auto_capture_interval();
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        if tx.send(Message::AutoCaptureTick { run_id }).is_err() {
                            break;
                        }
                    }
                }
            }
        });
    }
}
