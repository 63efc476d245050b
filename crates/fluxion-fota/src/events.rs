// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of FluxION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! OTA lifecycle events
//!
//! Events are serialized to JSON and written to the log. Reporting is
//! fire-and-forget and never blocks the update flow.

use crate::error::Result;
use crate::installer::SessionOutcome;
use crate::version::Version;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum FotaEvent {
    UpdateAvailable {
        firmware_type: String,
        current_version: Version,
        available_version: Version,
        url: String,
    },
    InstallStarted {
        firmware_type: String,
        from_version: Version,
        to_version: Version,
    },
    InstallFailed {
        firmware_type: String,
        to_version: Version,
        outcome: Option<SessionOutcome>,
        error: String,
    },
    InstallCommitted {
        firmware_type: String,
        from_version: Version,
        to_version: Version,
        bytes_written: u64,
    },
}

#[derive(Debug, Serialize)]
struct EventRecord<'a> {
    at: DateTime<Utc>,
    #[serde(flatten)]
    event: &'a FotaEvent,
}

pub fn event_json(event: &FotaEvent) -> Result<String> {
    let record = EventRecord {
        at: Utc::now(),
        event,
    };
    Ok(serde_json::to_string(&record)?)
}

/// Report an OTA event; serialization problems are logged and swallowed
pub fn report_event(event: &FotaEvent) {
    match event_json(event) {
        Ok(json) => tracing::info!("OTA event: {json}"),
        Err(e) => tracing::warn!("Failed to serialize OTA event: {e}"),
    }
}
