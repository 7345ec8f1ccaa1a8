// SPDX-License-Identifier: GPL-3.0-only

//! Service session endpoints
//!
//! A service starts by registering the vehicle with the backend, which
//! answers with the service record id that captures and telemetry are filed
//! under. Telemetry read at the bay can be saved to that record by hand.

use crate::constants::endpoints;
use crate::errors::SessionError;
use crate::sensors::SensorUpdate;
use futures::future::BoxFuture;
use reqwest::multipart::Form;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

/// Vehicle being brought into the bay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleInfo {
    pub number_plate: String,
    pub owner_name: String,
    pub car_id: String,
}

/// Identifiers of a freshly started service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedService {
    pub service_record_id: String,
    pub vehicle_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EndpointReply {
    #[serde(default)]
    success: bool,
    service_record_id: Option<Value>,
    vehicle_id: Option<Value>,
    error: Option<String>,
}

/// Ids come back as numbers or strings depending on the database
fn id_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn reply(body: &str) -> Result<EndpointReply, SessionError> {
    let reply: EndpointReply =
        serde_json::from_str(body).map_err(|e| SessionError::Decode(e.to_string()))?;
    if !reply.success {
        return Err(SessionError::Rejected(
            reply.error.unwrap_or_else(|| "no reason given".into()),
        ));
    }
    Ok(reply)
}

/// Parse the start-service reply
pub fn parse_start_response(body: &str) -> Result<StartedService, SessionError> {
    let reply = reply(body)?;
    let service_record_id = reply
        .service_record_id
        .and_then(id_string)
        .ok_or_else(|| SessionError::Decode("missing service_record_id".into()))?;
    Ok(StartedService {
        service_record_id,
        vehicle_id: reply.vehicle_id.and_then(id_string),
    })
}

/// Parse the save-sensor-data reply
pub fn parse_save_response(body: &str) -> Result<(), SessionError> {
    reply(body).map(|_| ())
}

fn start_fields(vehicle: &VehicleInfo) -> Vec<(&'static str, String)> {
    vec![
        ("car_number_plate", vehicle.number_plate.clone()),
        ("car_owner_name", vehicle.owner_name.clone()),
        ("car_id", vehicle.car_id.clone()),
    ]
}

/// Form fields for saving `update` to a service record
///
/// Fields absent from the update are left out, so the record keeps its
/// stored values for them.
pub fn sensor_fields(service_record_id: &str, update: &SensorUpdate) -> Vec<(&'static str, String)> {
    let mut fields = vec![("service_record_id", service_record_id.to_string())];
    if let Some(battery) = update.battery {
        fields.push(("battery_level", battery.to_string()));
    }
    if let Some(range) = update.drivable_range_km {
        fields.push(("drivable_range_km", range.to_string()));
    }
    if let Some(vibration) = &update.vibration_level {
        fields.push(("vibration_level", vibration.clone()));
    }
    if let Some(wear) = update.brake_wear_rate {
        fields.push(("brake_wear_rate", wear.to_string()));
    }
    // The endpoint takes whole revolutions
    if let Some(rpm) = update.rpm {
        fields.push(("rpm", (rpm.round() as i64).to_string()));
    }
    if let Some(voltage) = update.voltage {
        fields.push(("voltage", voltage.to_string()));
    }
    fields
}

fn form(fields: Vec<(&'static str, String)>) -> Form {
    fields
        .into_iter()
        .fold(Form::new(), |form, (name, value)| form.text(name, value))
}

/// Client for the session endpoints of the inspection backend
#[derive(Debug, Clone)]
pub struct HttpSessionClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSessionClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn post(client: reqwest::Client, url: String, form: Form) -> Result<String, SessionError> {
        let response = client.post(&url).multipart(form).send().await?;
        if !response.status().is_success() {
            return Err(SessionError::Status(response.status().as_u16()));
        }
        Ok(response.text().await?)
    }

    /// Register the vehicle and open a service record
    pub fn start_service(&self, vehicle: &VehicleInfo) -> BoxFuture<'static, Result<StartedService, SessionError>> {
        let client = self.client.clone();
        let url = format!("{}{}", self.base_url, endpoints::START_SERVICE);
        let fields = start_fields(vehicle);
        let plate = vehicle.number_plate.clone();

        Box::pin(async move {
            let body = Self::post(client, url, form(fields)).await?;
            let started = parse_start_response(&body)?;
            info!(
                plate = %plate,
                service_record_id = %started.service_record_id,
                "Service started"
            );
            Ok(started)
        })
    }

    /// Save telemetry to the service record
    pub fn save_sensor_data(
        &self,
        service_record_id: &str,
        update: &SensorUpdate,
    ) -> BoxFuture<'static, Result<(), SessionError>> {
        let client = self.client.clone();
        let url = format!("{}{}", self.base_url, endpoints::SAVE_SENSOR_DATA);
        let fields = sensor_fields(service_record_id, update);
        let record = service_record_id.to_string();

        Box::pin(async move {
            let body = Self::post(client, url, form(fields)).await?;
            parse_save_response(&body)?;
            debug!(service_record_id = %record, "Saved sensor data");
            Ok(())
        })
    }
}
