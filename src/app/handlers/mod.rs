// SPDX-License-Identifier: GPL-3.0-only

//! Message handler modules
//!
//! Handlers are grouped by the part of the bay they drive.

pub mod auto_capture;
pub mod capture;
pub mod sensors;
pub mod source;
