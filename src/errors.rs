// SPDX-License-Identifier: MPL-2.0

//! Error types for the service bay

use crate::station::StationId;
use std::fmt;
use std::time::Duration;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Main application error type
#[derive(Debug, Clone)]
pub enum AppError {
    /// Camera device errors
    Device(DeviceError),
    /// Capture request rejected or failed before analysis
    Capture(CaptureError),
    /// Analysis endpoint errors
    Analysis(AnalysisError),
    /// Sensor record errors
    Sensor(SensorError),
    /// Service session endpoint errors
    Session(SessionError),
    /// Remote feed errors
    Feed(FeedError),
    /// Configuration errors
    Config(String),
    /// Storage/filesystem errors
    Storage(String),
    /// Generic error with message
    Other(String),
}

/// Camera device errors
///
/// These are attached to the station that owns the device and never abort
/// the setup of the other stations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// Access to the device was denied
    PermissionDenied(String),
    /// Device is held by another process or another station
    InUse(String),
    /// Device path does not exist
    NotFound(String),
    /// No camera devices are available at all
    NoDevices,
    /// Streaming or frame grabbing failed
    Stream(String),
}

/// Capture request errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// Video source is `none`
    NoSourceSelected,
    /// Remote feed has not delivered a frame for this station yet
    NoFrameAvailable,
    /// Station already has an analysis in flight
    Busy(StationId),
    /// Local camera source is active but this station has no open stream
    NotStreaming(StationId),
    /// Auto-capture sequence is already running
    AutoCaptureRunning,
    /// Frame grab failed on the device
    Device(DeviceError),
}

/// Analysis endpoint errors
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// Network failure before a response was received
    RequestFailed(String),
    /// Non-2xx HTTP status
    Status(u16),
    /// Response body did not carry the expected fields
    Malformed(String),
    /// No response within the configured timeout
    Timeout(Duration),
}

/// Remote feed polling errors
///
/// Swallowed per station by the poller; surfaced only by one-shot calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// Network failure or request timeout
    Request(String),
    /// Non-2xx HTTP status
    Status(u16),
    /// Body or embedded image could not be decoded
    Decode(String),
}

/// Sensor record errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorError {
    /// Network failure
    Request(String),
    /// Non-2xx HTTP status
    Status(u16),
    /// No record for the session identifier
    NotFound(String),
    /// Body could not be decoded
    Decode(String),
}

/// Service session endpoint errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Network failure
    Request(String),
    /// Non-2xx HTTP status
    Status(u16),
    /// Backend answered but refused the request
    Rejected(String),
    /// Body could not be decoded
    Decode(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Device(e) => write!(f, "Device error: {}", e),
            AppError::Capture(e) => write!(f, "Capture error: {}", e),
            AppError::Analysis(e) => write!(f, "Analysis error: {}", e),
            AppError::Sensor(e) => write!(f, "Sensor error: {}", e),
            AppError::Session(e) => write!(f, "Session error: {}", e),
            AppError::Feed(e) => write!(f, "Feed error: {}", e),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Storage(msg) => write!(f, "Storage error: {}", msg),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::PermissionDenied(msg) => write!(f, "Camera permission denied: {}", msg),
            DeviceError::InUse(msg) => write!(f, "Camera is in use: {}", msg),
            DeviceError::NotFound(msg) => write!(f, "Camera not found: {}", msg),
            DeviceError::NoDevices => write!(f, "No camera devices found"),
            DeviceError::Stream(msg) => write!(f, "Stream error: {}", msg),
        }
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::NoSourceSelected => write!(f, "No video source selected"),
            CaptureError::NoFrameAvailable => write!(f, "No frame available for capture"),
            CaptureError::Busy(station) => write!(f, "{} station is still analyzing", station),
            CaptureError::NotStreaming(station) => {
                write!(f, "{} station has no active camera stream", station)
            }
            CaptureError::AutoCaptureRunning => write!(f, "Auto-capture already running"),
            CaptureError::Device(e) => write!(f, "{}", e),
        }
    }
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisError::RequestFailed(msg) => write!(f, "Analysis request failed: {}", msg),
            AnalysisError::Status(code) => write!(f, "Analysis endpoint returned HTTP {}", code),
            AnalysisError::Malformed(msg) => write!(f, "Malformed analysis response: {}", msg),
            AnalysisError::Timeout(after) => {
                write!(f, "Analysis timed out after {}s", after.as_secs())
            }
        }
    }
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorError::Request(msg) => write!(f, "Sensor request failed: {}", msg),
            SensorError::Status(code) => write!(f, "Sensor database returned HTTP {}", code),
            SensorError::NotFound(id) => write!(f, "No service record for session {}", id),
            SensorError::Decode(msg) => write!(f, "Could not decode sensor record: {}", msg),
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Request(msg) => write!(f, "Session request failed: {}", msg),
            SessionError::Status(code) => write!(f, "Session endpoint returned HTTP {}", code),
            SessionError::Rejected(reason) => write!(f, "Backend refused: {}", reason),
            SessionError::Decode(msg) => write!(f, "Could not decode session reply: {}", msg),
        }
    }
}

impl fmt::Display for FeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedError::Request(msg) => write!(f, "Feed request failed: {}", msg),
            FeedError::Status(code) => write!(f, "Feed endpoint returned HTTP {}", code),
            FeedError::Decode(msg) => write!(f, "Could not decode feed frame: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for FeedError {}
impl std::error::Error for DeviceError {}
impl std::error::Error for CaptureError {}
impl std::error::Error for AnalysisError {}
impl std::error::Error for SensorError {}
impl std::error::Error for SessionError {}

// Conversions from sub-errors to AppError
impl From<DeviceError> for AppError {
    fn from(err: DeviceError) -> Self {
        AppError::Device(err)
    }
}

impl From<CaptureError> for AppError {
    fn from(err: CaptureError) -> Self {
        AppError::Capture(err)
    }
}

impl From<AnalysisError> for AppError {
    fn from(err: AnalysisError) -> Self {
        AppError::Analysis(err)
    }
}

impl From<SensorError> for AppError {
    fn from(err: SensorError) -> Self {
        AppError::Sensor(err)
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        AppError::Session(err)
    }
}

impl From<FeedError> for AppError {
    fn from(err: FeedError) -> Self {
        AppError::Feed(err)
    }
}

impl From<DeviceError> for CaptureError {
    fn from(err: DeviceError) -> Self {
        CaptureError::Device(err)
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

/// EBUSY on Linux
const EBUSY: i32 = 16;

impl From<std::io::Error> for DeviceError {
    fn from(err: std::io::Error) -> Self {
        if err.raw_os_error() == Some(EBUSY) {
            return DeviceError::InUse(err.to_string());
        }
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => DeviceError::PermissionDenied(err.to_string()),
            std::io::ErrorKind::NotFound => DeviceError::NotFound(err.to_string()),
            _ => DeviceError::Stream(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for AnalysisError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            AnalysisError::Status(status.as_u16())
        } else if err.is_decode() {
            AnalysisError::Malformed(err.to_string())
        } else {
            AnalysisError::RequestFailed(err.to_string())
        }
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            FeedError::Status(status.as_u16())
        } else if err.is_decode() {
            FeedError::Decode(err.to_string())
        } else {
            FeedError::Request(err.to_string())
        }
    }
}

impl From<reqwest::Error> for SensorError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            SensorError::Status(status.as_u16())
        } else if err.is_decode() {
            SensorError::Decode(err.to_string())
        } else {
            SensorError::Request(err.to_string())
        }
    }
}

impl From<reqwest::Error> for SessionError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            SessionError::Status(status.as_u16())
        } else if err.is_decode() {
            SessionError::Decode(err.to_string())
        } else {
            SessionError::Request(err.to_string())
        }
    }
}
