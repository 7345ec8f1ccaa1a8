// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Repair pricing
///
/// Amounts are in the bay's billing unit; the currency is not modelled.
pub mod pricing {
    /// Charge per detected scratch
    pub const SCRATCH_RATE: f64 = 300.0;

    /// Charge per detected dent
    pub const DENT_RATE: f64 = 500.0;

    /// Multiplier applied to the brake wear rate
    pub const BRAKE_WEAR_MULTIPLIER: f64 = 20.0;

    /// Flat diagnostic fee added to every bill
    pub const DIAGNOSTIC_FEE: f64 = 500.0;
}

/// Timing constants
pub mod timing {
    use super::Duration;

    /// Remote feed poll period
    pub const FEED_POLL_INTERVAL: Duration = Duration::from_millis(500);

    /// Interval between auto-capture steps
    pub const AUTO_CAPTURE_INTERVAL: Duration = Duration::from_secs(2);

    /// Sensor record fallback poll period
    pub const SENSOR_POLL_INTERVAL: Duration = Duration::from_secs(2);

    /// A remote frame younger than this marks the station as connected
    pub const FEED_FRESHNESS_SECS: f64 = 3.0;

    /// Wait between stopping a station's stream and opening its new device
    pub const DEVICE_SETTLE_DELAY: Duration = Duration::from_millis(300);

    /// Upper bound for one analysis request
    pub const ANALYSIS_TIMEOUT: Duration = Duration::from_secs(30);

    /// Per-request timeout for feed and health polling
    pub const FEED_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

    /// Terminal redraw / input poll period
    pub const UI_TICK: Duration = Duration::from_millis(50);
}

/// HTTP endpoints of the inspection backend
pub mod endpoints {
    /// Multipart analysis submission
    pub const ANALYZE_IMAGE: &str = "/api/analyze-image";

    /// Legacy single-camera detection feed
    pub const LATEST_DETECTION: &str = "/api/latest-detection";

    /// Backend liveness probe
    pub const HEALTH: &str = "/api/health";

    /// Vehicle registration, answers with the service record id
    pub const START_SERVICE: &str = "/api/start-service";

    /// Manual save of telemetry to a service record
    pub const SAVE_SENSOR_DATA: &str = "/api/save-sensor-data";

    /// Per-station feed path (`/api/station-feed/{station}`)
    pub fn station_feed(station: &str) -> String {
        format!("/api/station-feed/{}", station)
    }

    /// Service record table of the hosted database
    pub const SERVICE_RECORDS: &str = "/rest/v1/service_records";
}

/// Local camera capture settings
pub mod capture {
    use super::Duration;

    /// Requested capture width
    pub const FRAME_WIDTH: u32 = 640;

    /// Requested capture height
    pub const FRAME_HEIGHT: u32 = 480;

    /// Number of mmap buffers per stream
    pub const BUFFER_COUNT: u32 = 4;

    /// A grabbed frame must be younger than this
    pub const MAX_FRAME_AGE: Duration = Duration::from_secs(2);

    /// Consecutive dequeue failures after which a capture loop gives up
    pub const MAX_DEQUEUE_FAILURES: u32 = 30;

    /// Open attempts while a just-stopped loop is still releasing the device
    pub const OPEN_ATTEMPTS: u32 = 5;

    /// Wait between open attempts on a busy device
    pub const OPEN_RETRY_DELAY: Duration = Duration::from_millis(100);

    /// JPEG quality for raw frames encoded before analysis
    pub const JPEG_QUALITY: u8 = 90;
}

/// Supported file formats for the image directory camera backend
pub mod file_formats {
    /// Supported image file extensions
    pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "webp"];

    /// Check if a file extension is a supported image format
    pub fn is_image_extension(ext: &str) -> bool {
        IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str())
    }
}

/// Application information utilities
pub mod app_info {
    /// Get the application version from build-time environment
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }
}
