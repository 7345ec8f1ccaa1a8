// SPDX-License-Identifier: GPL-3.0-only

//! Vehicle telemetry
//!
//! The service session record in the hosted database carries the latest
//! sensor values. Microcontrollers report over serial either as JSON objects
//! or as loose `key=value` / `key: value` pairs; [`parse_serial_line`] turns
//! both into a [`SensorUpdate`] that is merged into the record.

use crate::config::DatabaseConfig;
use crate::constants::endpoints;
use crate::errors::SensorError;
use futures::future::BoxFuture;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

/// Service session record with the latest telemetry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSession {
    pub id: Option<String>,
    pub battery_level: Option<f64>,
    pub battery_percent: Option<f64>,
    pub rpm: Option<f64>,
    pub voltage: Option<f64>,
    pub temperature: Option<f64>,
    pub drivable_range_km: Option<f64>,
    pub vibration_level: Option<String>,
    pub brake_wear_rate: Option<f64>,
    pub brake_lifetime_days: Option<f64>,
    pub scratches_count: Option<u32>,
    pub dents_count: Option<u32>,
    pub crack_count: Option<u32>,
    pub service_status: Option<String>,
    pub payment_status: Option<String>,
    pub total_cost: Option<f64>,
}

impl ServiceSession {
    /// Brake wear rate used for billing (0 when not reported)
    pub fn brake_wear_rate(&self) -> f64 {
        self.brake_wear_rate.unwrap_or(0.0)
    }

    /// Merge the fields present in `update`
    pub fn apply(&mut self, update: &SensorUpdate) {
        if let Some(rpm) = update.rpm {
            self.rpm = Some(rpm);
        }
        if let Some(battery) = update.battery {
            self.battery_level = Some(battery);
            self.battery_percent = Some(battery);
        }
        if let Some(voltage) = update.voltage {
            self.voltage = Some(voltage);
        }
        if let Some(vibration) = &update.vibration_level {
            self.vibration_level = Some(vibration.clone());
        }
        if let Some(range) = update.drivable_range_km {
            self.drivable_range_km = Some(range);
        }
        if let Some(wear) = update.brake_wear_rate {
            self.brake_wear_rate = Some(wear);
        }
    }
}

/// Partial telemetry from one serial line
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpm: Option<f64>,
    /// Battery charge, stored as both level and percent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voltage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vibration_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drivable_range_km: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brake_wear_rate: Option<f64>,
}

impl SensorUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

static PAIR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w+)[:=]\s*([\w\.]+)").expect("Pair pattern should compile"));

fn value_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse one line of microcontroller output
///
/// Lines that are neither JSON nor contain recognised pairs yield an empty
/// update.
pub fn parse_serial_line(line: &str) -> SensorUpdate {
    let line = line.trim();

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(line) {
        return SensorUpdate {
            rpm: map.get("rpm").and_then(value_f64),
            battery: map.get("battery").and_then(value_f64),
            voltage: map.get("voltage").and_then(value_f64),
            vibration_level: map.get("vibration").map(value_string),
            drivable_range_km: map.get("range").and_then(value_f64),
            brake_wear_rate: None,
        };
    }

    let mut update = SensorUpdate::default();
    for caps in PAIR_RE.captures_iter(line) {
        let key = caps[1].to_lowercase();
        let raw = &caps[2];
        let number = raw.parse::<f64>().ok();

        if key.contains("rpm") {
            update.rpm = number.or(update.rpm);
        }
        if key.contains("batt") {
            update.battery = number.or(update.battery);
        }
        if key.contains("volt") {
            update.voltage = number.or(update.voltage);
        }
        if key.contains("vib") {
            update.vibration_level = Some(raw.to_string());
        }
        if key.contains("range") {
            update.drivable_range_km = number.or(update.drivable_range_km);
        }
        if key.contains("wear") {
            update.brake_wear_rate = number.or(update.brake_wear_rate);
        }
    }
    update
}

/// Source of the service session record
pub trait SensorSource: Send + Sync {
    fn fetch(&self, session_id: &str) -> BoxFuture<'static, Result<ServiceSession, SensorError>>;
}

/// Reads the service record table over the database's REST interface
#[derive(Debug, Clone)]
pub struct HttpSensorSource {
    client: reqwest::Client,
    database: DatabaseConfig,
}

impl HttpSensorSource {
    pub fn new(database: DatabaseConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            database,
        }
    }
}

impl SensorSource for HttpSensorSource {
    fn fetch(&self, session_id: &str) -> BoxFuture<'static, Result<ServiceSession, SensorError>> {
        let client = self.client.clone();
        let url = format!(
            "{}{}",
            self.database.url.trim_end_matches('/'),
            endpoints::SERVICE_RECORDS
        );
        let api_key = self.database.api_key.clone();
        let session_id = session_id.to_string();

        Box::pin(async move {
            let response = client
                .get(&url)
                .query(&[("id", format!("eq.{}", session_id)), ("select", "*".to_string())])
                .header("apikey", &api_key)
                .bearer_auth(&api_key)
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(SensorError::Status(response.status().as_u16()));
            }
            let body = response.text().await?;
            let mut records: Vec<ServiceSession> =
                serde_json::from_str(&body).map_err(|e| SensorError::Decode(e.to_string()))?;
            debug!(session = %session_id, rows = records.len(), "Fetched service record");
            if records.is_empty() {
                return Err(SensorError::NotFound(session_id));
            }
            Ok(records.swap_remove(0))
        })
    }
}
