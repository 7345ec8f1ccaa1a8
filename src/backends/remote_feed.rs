// SPDX-License-Identifier: GPL-3.0-only

//! Remote multi-camera feed
//!
//! Camera agents push annotated frames to the backend, which keeps the most
//! recent one per station. The inspector polls those frames; a station with
//! no frame yet answers with an empty object.

use crate::backends::analysis::{DefectCounts, decode_image};
use crate::backends::camera::Frame;
use crate::constants::{endpoints, timing};
use crate::errors::FeedError;
use crate::station::StationId;
use futures::future::BoxFuture;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::warn;

/// Latest frame the feed holds for one station
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StationFeedFrame {
    pub image: Option<Frame>,
    /// Unix seconds when the backend received the frame
    pub timestamp: Option<f64>,
}

/// Latest result of the legacy single-camera detection feed
#[derive(Debug, Clone, PartialEq)]
pub struct LatestDetection {
    pub image: Frame,
    pub counts: DefectCounts,
    pub timestamp: Option<f64>,
}

/// Source of remote station frames
pub trait FeedSource: Send + Sync {
    /// Fetch the most recent frame for one station
    fn fetch_station(&self, station: StationId) -> BoxFuture<'static, Result<StationFeedFrame, FeedError>>;

    /// Fetch the legacy single-camera detection, if any
    fn fetch_latest(&self) -> BoxFuture<'static, Result<Option<LatestDetection>, FeedError>>;

    /// Check whether the backend is online
    fn health(&self) -> BoxFuture<'static, Result<bool, FeedError>>;
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedBody {
    annotated_image: Option<String>,
    timestamp: Option<f64>,
    scratch_count: Option<u32>,
    dent_count: Option<u32>,
    crack_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct HealthBody {
    status: Option<String>,
}

/// Parse a per-station feed body
pub fn parse_station_frame(body: &str) -> Result<StationFeedFrame, FeedError> {
    let body: FeedBody = serde_json::from_str(body).map_err(|e| FeedError::Decode(e.to_string()))?;
    let image = body
        .annotated_image
        .as_deref()
        .map(decode_image)
        .transpose()
        .map_err(FeedError::Decode)?;
    Ok(StationFeedFrame {
        image,
        timestamp: body.timestamp,
    })
}

/// Parse the legacy detection body; an empty object means no detection yet
pub fn parse_latest_detection(body: &str) -> Result<Option<LatestDetection>, FeedError> {
    let body: FeedBody = serde_json::from_str(body).map_err(|e| FeedError::Decode(e.to_string()))?;
    let Some(encoded) = body.annotated_image else {
        return Ok(None);
    };
    Ok(Some(LatestDetection {
        image: decode_image(&encoded).map_err(FeedError::Decode)?,
        counts: DefectCounts {
            scratches: body.scratch_count.unwrap_or(0),
            dents: body.dent_count.unwrap_or(0),
            cracks: body.crack_count.unwrap_or(0),
        },
        timestamp: body.timestamp,
    }))
}

/// Connectivity derived from frame age
///
/// Connected iff a frame timestamp exists and `now - timestamp` is strictly
/// below the freshness window.
pub fn is_fresh(timestamp: Option<f64>, now: f64, freshness_secs: f64) -> bool {
    timestamp.is_some_and(|ts| now - ts < freshness_secs)
}

/// Feed source backed by the inspection HTTP API
#[derive(Debug, Clone)]
pub struct HttpFeedSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFeedSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timing::FEED_REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to build feed HTTP client, using defaults");
                reqwest::Client::new()
            });
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn get<T, F>(&self, path: &str, parse: F) -> BoxFuture<'static, Result<T, FeedError>>
    where
        T: Send + 'static,
        F: FnOnce(&str) -> Result<T, FeedError> + Send + 'static,
    {
        let client = self.client.clone();
        let url = format!("{}{}", self.base_url, path);
        Box::pin(async move {
            let response = client.get(&url).send().await?;
            if !response.status().is_success() {
                return Err(FeedError::Status(response.status().as_u16()));
            }
            let body = response.text().await?;
            parse(&body)
        })
    }
}

fn parse_json<T: DeserializeOwned>(body: &str) -> Result<T, FeedError> {
    serde_json::from_str(body).map_err(|e| FeedError::Decode(e.to_string()))
}

impl FeedSource for HttpFeedSource {
    fn fetch_station(&self, station: StationId) -> BoxFuture<'static, Result<StationFeedFrame, FeedError>> {
        self.get(&endpoints::station_feed(station.as_str()), parse_station_frame)
    }

    fn fetch_latest(&self) -> BoxFuture<'static, Result<Option<LatestDetection>, FeedError>> {
        self.get(endpoints::LATEST_DETECTION, parse_latest_detection)
    }

    fn health(&self) -> BoxFuture<'static, Result<bool, FeedError>> {
        self.get(endpoints::HEALTH, |body| {
            let health: HealthBody = parse_json(body)?;
            Ok(health.status.as_deref() == Some("online"))
        })
    }
}
