// SPDX-License-Identifier: MPL-2.0

//! Backend abstraction layer
//!
//! Everything the inspector talks to outside the process sits behind a
//! trait here, so the orchestrator can be driven by in-memory fakes.
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                 Inspector                   │
//! └──────┬──────────────┬──────────────┬────────┘
//!        │              │              │
//! ┌──────┴──────┐ ┌─────┴──────┐ ┌─────┴──────┐
//! │   Camera    │ │ Remote     │ │ Analysis   │
//! │ (V4L2/Files)│ │ feed (HTTP)│ │ (HTTP)     │
//! └─────────────┘ └────────────┘ └────────────┘
//! ```
//!
//! # Modules
//!
//! - [`camera`]: local capture devices, one stream per station
//! - [`remote_feed`]: polled multi-camera feed and legacy detection feed
//! - [`analysis`]: defect-detection endpoint
//! - [`session`]: service start and manual telemetry save

pub mod analysis;
pub mod camera;
pub mod remote_feed;
pub mod session;
