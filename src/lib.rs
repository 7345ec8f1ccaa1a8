// SPDX-License-Identifier: MPL-2.0

//! Service Bay - inspection station orchestrator for a vehicle service bay
//!
//! Four inspection stations (front, left, right, brake) are fed either by
//! local cameras or by a polled remote multi-camera feed. Captured stills are
//! sent to a defect-detection endpoint and the results are priced into a
//! repair bill alongside live vehicle telemetry.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`app`]: the [`Inspector`] orchestrator, its state and message handlers
//! - [`backends`]: camera devices, remote feed and analysis endpoint clients
//! - [`billing`]: repair cost aggregation and receipts
//! - [`sensors`]: service session telemetry and serial line parsing
//! - [`config`]: user configuration handling
//! - [`terminal`]: terminal dashboard
//!
//! # Example
//!
//! ```ignore
//! let config = Config::load()?;
//! let inspector = Inspector::new(config.clone(), Services::from_config(&config));
//! let handle = inspector.handle();
//! handle.send(Message::SetSource(VideoSourceKind::RemoteFeed));
//! ```

pub mod app;
pub mod backends;
pub mod billing;
pub mod config;
pub mod constants;
pub mod errors;
pub mod sensors;
pub mod station;
pub mod terminal;

// Re-export commonly used types
pub use app::{Inspector, InspectorHandle, Message, Services, Snapshot, VideoSourceKind};
pub use config::Config;
pub use errors::{AppError, AppResult};
pub use station::{StationId, StationMap};
