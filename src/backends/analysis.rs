// SPDX-License-Identifier: GPL-3.0-only

//! Defect-detection endpoint client
//!
//! A still image is posted as multipart form data together with the
//! station's canonical index; the endpoint answers with an annotated image
//! (base64) and scratch/dent/crack counts.

use crate::backends::camera::Frame;
use crate::constants::endpoints;
use crate::errors::AnalysisError;
use crate::station::StationId;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use futures::future::BoxFuture;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

/// Defect counts returned for one image
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DefectCounts {
    pub scratches: u32,
    pub dents: u32,
    pub cracks: u32,
}

impl DefectCounts {
    pub fn total(&self) -> u32 {
        self.scratches
            .saturating_add(self.dents)
            .saturating_add(self.cracks)
    }
}

/// One capture submitted for analysis
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub station: StationId,
    pub image: Frame,
    /// Operator-initiated capture or upload (false for auto-capture)
    pub manual: bool,
    /// Ask the endpoint to persist the images
    pub persist: bool,
    /// Service session the capture belongs to
    pub session_id: Option<String>,
}

/// Successful analysis
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutcome {
    pub annotated: Frame,
    pub counts: DefectCounts,
    pub image_url: Option<String>,
    pub annotated_image_url: Option<String>,
}

/// Something that turns a still image into defect counts
pub trait Analyzer: Send + Sync {
    fn analyze(&self, request: AnalysisRequest) -> BoxFuture<'static, Result<AnalysisOutcome, AnalysisError>>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalysisResponse {
    annotated_image: Option<String>,
    scratch_count: Option<u32>,
    dent_count: Option<u32>,
    crack_count: Option<u32>,
    image_url: Option<String>,
    annotated_image_url: Option<String>,
}

/// Decode a base64 image, accepting an optional `data:` URL prefix
pub fn decode_image(encoded: &str) -> Result<Frame, String> {
    let payload = match encoded.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => encoded,
    };
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| format!("invalid base64 image: {}", e))?;
    if bytes.is_empty() {
        return Err("empty image".into());
    }
    Ok(Frame::from(bytes))
}

/// Parse an analysis response body
///
/// Bodies without `annotatedImage` (including the endpoint's
/// `{"success": false}` error shape) or without counts are malformed.
pub fn parse_response(body: &str) -> Result<AnalysisOutcome, AnalysisError> {
    let response: AnalysisResponse =
        serde_json::from_str(body).map_err(|e| AnalysisError::Malformed(e.to_string()))?;

    let encoded = response
        .annotated_image
        .ok_or_else(|| AnalysisError::Malformed("missing annotatedImage".into()))?;
    let annotated = decode_image(&encoded).map_err(AnalysisError::Malformed)?;

    let (Some(scratches), Some(dents), Some(cracks)) =
        (response.scratch_count, response.dent_count, response.crack_count)
    else {
        return Err(AnalysisError::Malformed("missing defect counts".into()));
    };

    Ok(AnalysisOutcome {
        annotated,
        counts: DefectCounts {
            scratches,
            dents,
            cracks,
        },
        image_url: response.image_url,
        annotated_image_url: response.annotated_image_url,
    })
}

/// Analyzer backed by the inspection HTTP API
#[derive(Debug, Clone)]
pub struct HttpAnalyzer {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAnalyzer {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn form(request: &AnalysisRequest) -> Result<Form, AnalysisError> {
        let file = Part::bytes(request.image.data.to_vec())
            .file_name(
                request
                    .image
                    .file_name(&format!("{}_{}", request.station.as_str(), Uuid::new_v4())),
            )
            .mime_str(request.image.mime_type())?;

        Ok(Self::form_fields(request)
            .into_iter()
            .fold(Form::new().part("file", file), |form, (name, value)| {
                form.text(name, value)
            }))
    }

    /// Text fields sent next to the image
    fn form_fields(request: &AnalysisRequest) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("camera_id", request.station.index().to_string()),
            ("is_manual", request.manual.to_string()),
            ("should_upload", request.persist.to_string()),
        ];
        if let Some(session) = &request.session_id {
            fields.push(("service_record_id", session.clone()));
        }
        fields
    }
}

impl Analyzer for HttpAnalyzer {
    fn analyze(&self, request: AnalysisRequest) -> BoxFuture<'static, Result<AnalysisOutcome, AnalysisError>> {
        let client = self.client.clone();
        let url = format!("{}{}", self.base_url, endpoints::ANALYZE_IMAGE);

        Box::pin(async move {
            let form = Self::form(&request)?;
            debug!(
                station = %request.station,
                bytes = request.image.len(),
                manual = request.manual,
                "Submitting capture for analysis"
            );

            let response = client.post(&url).multipart(form).send().await?;
            if !response.status().is_success() {
                return Err(AnalysisError::Status(response.status().as_u16()));
            }
            let body = response.text().await?;
            parse_response(&body)
        })
    }
}
