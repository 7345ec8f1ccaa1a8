// SPDX-License-Identifier: GPL-3.0-only

//! Sensor telemetry handlers
//!
//! The service record is fetched once and then re-fetched on a fixed period
//! as a fallback for missed push notifications. Pushed records and serial
//! updates arrive as messages. The brake wear rate feeds the bill.

use crate::app::Inspector;
use crate::app::state::Message;
use crate::errors::AppResult;
use crate::sensors::{SensorUpdate, ServiceSession};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

impl Inspector {
    pub(crate) fn handle_apply_sensor_update(&mut self, update: SensorUpdate) -> AppResult<()> {
        if update.is_empty() {
            return Ok(());
        }
        debug!(?update, "Applying sensor update");
        self.state.session.apply(&update);
        self.recompute_bill();
        Ok(())
    }

    pub(crate) fn handle_sensor_record(&mut self, session: ServiceSession) -> AppResult<()> {
        self.state.session = session;
        self.recompute_bill();
        Ok(())
    }

    /// Start the fallback poller when a sensor source and session are configured
    pub fn start_sensor_polling(&mut self) {
        if self.sensor_poller.is_some() {
            return;
        }
        let (Some(source), Some(session_id)) =
            (self.services.sensors.clone(), self.config.session_id.clone())
        else {
            debug!("Sensor polling disabled");
            return;
        };

        let cancel = CancellationToken::new();
        self.sensor_poller = Some(cancel.clone());
        let tx = self.tx.clone();
        let period = self.config.sensor_poll_interval();
        info!(session = %session_id, "Sensor polling started");

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut failing = false;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }
                let fetched = tokio::select! {
                    _ = cancel.cancelled() => break,
                    fetched = source.fetch(&session_id) => fetched,
                };
                match fetched {
                    Ok(session) => {
                        failing = false;
                        if tx.send(Message::SensorRecordReceived(session)).is_err() {
                            break;
                        }
                    }
                    Err(e) if !failing => {
                        failing = true;
                        warn!(error = %e, "Sensor record fetch failed");
                    }
                    Err(e) => debug!(error = %e, "Sensor record fetch still failing"),
                }
            }
        });
    }
}
