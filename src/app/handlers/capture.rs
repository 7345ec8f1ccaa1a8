// SPDX-License-Identifier: GPL-3.0-only

//! Capture operations handlers
//!
//! A capture takes a still from the active source, marks the station busy
//! and submits the still for analysis in a spawned task. The task reports
//! back with `AnalysisFinished`, tagged with the ticket of its capture, so
//! out-of-order completions only ever touch their own station.

use crate::app::state::{CaptureSlot, InspectionResult, Message, VideoSource};
use crate::app::{InFlightCapture, Inspector};
use crate::backends::analysis::{AnalysisOutcome, AnalysisRequest};
use crate::backends::camera::Frame;
use crate::billing::Bill;
use crate::errors::{AnalysisError, AppResult, CaptureError};
use crate::station::StationId;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

impl Inspector {
    // =========================================================================
    // Capture Operations Handlers
    // =========================================================================

    pub(crate) fn handle_capture(&mut self, station: StationId) -> AppResult<()> {
        self.start_capture(station, true)
    }

    /// Take a still from the active source and submit it
    pub(crate) fn start_capture(&mut self, station: StationId, manual: bool) -> AppResult<()> {
        if self.in_flight[station].is_some() {
            return Err(CaptureError::Busy(station).into());
        }

        let still = match &mut self.state.source {
            VideoSource::None => return Err(CaptureError::NoSourceSelected.into()),
            VideoSource::LocalCamera(local) => {
                let stream = local.bindings[station]
                    .stream
                    .as_mut()
                    .ok_or(CaptureError::NotStreaming(station))?;
                stream.grab_frame().map_err(CaptureError::from)?
            }
            VideoSource::RemoteFeed(remote) => remote.stations[station]
                .last_frame
                .clone()
                .ok_or(CaptureError::NoFrameAvailable)?,
        };

        self.submit_for_analysis(station, still, manual);
        Ok(())
    }

    /// Analyze an operator-supplied image; works with any source
    pub(crate) fn handle_upload(&mut self, station: StationId, image: Frame) -> AppResult<()> {
        if self.in_flight[station].is_some() {
            return Err(CaptureError::Busy(station).into());
        }
        if image.is_empty() {
            return Err(CaptureError::NoFrameAvailable.into());
        }
        self.submit_for_analysis(station, image, true);
        Ok(())
    }

    fn submit_for_analysis(&mut self, station: StationId, image: Frame, manual: bool) {
        self.next_ticket += 1;
        let ticket = self.next_ticket;

        let slot = &mut self.state.slots[station];
        let previous_before = slot.before.replace(image.clone());
        slot.busy = true;
        slot.last_error = None;

        let request = AnalysisRequest {
            station,
            image,
            manual,
            persist: self.config.persist_captures,
            session_id: self.config.session_id.clone(),
        };
        let analysis = self.services.analyzer.analyze(request);
        let timeout = self.config.analysis_timeout();
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let tx = self.tx.clone();

        let handle = tokio::spawn(async move {
            let result = tokio::select! {
                _ = cancelled.cancelled() => return,
                result = tokio::time::timeout(timeout, analysis) => {
                    result.unwrap_or(Err(AnalysisError::Timeout(timeout)))
                }
            };
            let _ = tx.send(Message::AnalysisFinished {
                station,
                ticket,
                result,
            });
        });

        info!(station = %station, ticket, manual, "Capture submitted for analysis");
        self.in_flight[station] = Some(InFlightCapture {
            ticket,
            token,
            handle,
            previous_before,
        });
    }

    pub(crate) fn handle_analysis_finished(
        &mut self,
        station: StationId,
        ticket: u64,
        result: Result<AnalysisOutcome, AnalysisError>,
    ) -> AppResult<()> {
        let Some(in_flight) = self.in_flight[station].take_if(|f| f.ticket == ticket) else {
            debug!(station = %station, ticket, "Ignoring result of a discarded capture");
            return Ok(());
        };

        let slot = &mut self.state.slots[station];
        slot.busy = false;
        match result {
            Ok(outcome) => {
                let result = InspectionResult::new(station, outcome.counts);
                info!(
                    station = %station,
                    scratches = result.counts.scratches,
                    dents = result.counts.dents,
                    cracks = result.counts.cracks,
                    "Analysis complete"
                );
                slot.after = Some(outcome.annotated);
                slot.result = Some(result);
                self.recompute_bill();
            }
            Err(e) => {
                // Result fields are untouched; the slot looks as before the capture
                warn!(station = %station, error = %e, "Analysis failed");
                slot.before = in_flight.previous_before;
                slot.last_error = Some(e);
            }
        }
        Ok(())
    }

    pub(crate) fn handle_reset(&mut self, station: StationId) -> AppResult<()> {
        if let Some(in_flight) = self.in_flight[station].take() {
            debug!(station = %station, ticket = in_flight.ticket, "Cancelling analysis on reset");
            in_flight.token.cancel();
        }
        self.state.slots[station] = CaptureSlot::default();
        self.recompute_bill();
        info!(station = %station, "Station reset");
        Ok(())
    }

    /// Replace the bill with one computed from the current results
    pub(crate) fn recompute_bill(&mut self) {
        self.state.bill = Bill::compute(&self.state.results(), self.state.session.brake_wear_rate());
        debug!(total = self.state.bill.total, "Bill recomputed");
    }
}
