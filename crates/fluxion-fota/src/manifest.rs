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

//! Manifest entry interpretation
//!
//! A manifest is a JSON object, or an array of objects, each describing one
//! published firmware build:
//!
//! ```json
//! [
//!   { "type": "sensor", "version": 2, "url": "http://fw.local/sensor.bin" },
//!   { "type": "relay", "version": 9, "host": "fw.local", "port": 443, "bin": "/relay.bin" }
//! ]
//! ```

use crate::error::{FotaError, Result};
use crate::identity::{FirmwareIdentity, VersionScheme};
use crate::version::{Version, is_newer, parse_version};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Ports that imply a TLS download when the entry uses `host`/`port`/`bin`
const SECURE_PORTS: [u16; 2] = [443, 4433];

/// Where the firmware binary for an entry can be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Url(String),
    HostPortBin { host: String, port: u16, bin: String },
}

impl Location {
    pub fn to_url(&self) -> String {
        match self {
            Self::Url(url) => url.clone(),
            Self::HostPortBin { host, port, bin } => {
                let scheme = if SECURE_PORTS.contains(port) {
                    "https"
                } else {
                    "http"
                };
                let separator = if bin.starts_with('/') { "" } else { "/" };
                format!("{scheme}://{host}:{port}{separator}{bin}")
            }
        }
    }
}

/// One manifest entry after its fields have been read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub firmware_type: String,
    pub version: Version,
    pub location: Location,
}

impl ManifestEntry {
    /// Read version and location from a JSON entry. The version degrades to
    /// `0.0.0`; a missing location is an error.
    pub fn read(value: &Value, firmware_type: &str, scheme: VersionScheme) -> Result<Self> {
        Ok(Self {
            firmware_type: firmware_type.to_owned(),
            version: read_version(value, scheme),
            location: read_location(value)?,
        })
    }
}

/// Firmware chosen for installation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedTarget {
    pub url: String,
    pub version: Version,
}

fn read_version(value: &Value, scheme: VersionScheme) -> Version {
    let field = value.get("version");

    if let Some(build) = field
        .and_then(Value::as_u64)
        .and_then(|n| u16::try_from(n).ok())
    {
        debug!("Manifest version: {build} (int)");
        return Version::from_build(u32::from(build));
    }

    if let Some(text) = field.and_then(Value::as_str)
        && scheme == VersionScheme::Semantic
    {
        let parsed = parse_version(text);
        if parsed.lossy {
            warn!("Manifest version '{text}' is not a clean semver, using {}", parsed.version);
        }
        return parsed.version;
    }

    warn!("Invalid version format received in manifest, defaulting to 0");
    Version::default()
}

fn read_location(value: &Value) -> Result<Location> {
    if let Some(url) = value.get("url").and_then(Value::as_str) {
        if value.get("host").is_some_and(Value::is_string) {
            warn!("Manifest provides both url and host, using url");
        }
        return Ok(Location::Url(url.to_owned()));
    }

    let host = value.get("host").and_then(Value::as_str);
    let port = value
        .get("port")
        .and_then(Value::as_u64)
        .and_then(|p| u16::try_from(p).ok());
    let bin = value.get("bin").and_then(Value::as_str);

    match (host, port, bin) {
        (Some(host), Some(port), Some(bin)) => Ok(Location::HostPortBin {
            host: host.to_owned(),
            port,
            bin: bin.to_owned(),
        }),
        _ => Err(FotaError::ManifestMalformed(
            "entry is missing both 'url' and 'host'/'port'/'bin'".to_owned(),
        )),
    }
}

/// Decide whether a manifest entry is a newer build of this device's firmware.
///
/// `Ok(None)` covers a type mismatch and a valid entry that is not newer.
pub fn evaluate(value: &Value, identity: &FirmwareIdentity) -> Result<Option<ResolvedTarget>> {
    let Some(entry_type) = value.get("type").and_then(Value::as_str) else {
        info!("Manifest entry has no type, skipping");
        return Ok(None);
    };

    if entry_type != identity.firmware_type() {
        info!(
            "Payload type in manifest {entry_type} doesn't match current firmware {}",
            identity.firmware_type()
        );
        return Ok(None);
    }
    debug!("Payload type in manifest {entry_type} matches current firmware");

    let entry = ManifestEntry::read(value, entry_type, identity.scheme())?;
    let current = identity.current_version();

    if !is_newer(&current, &entry.version) {
        info!(
            "Manifest version {} is not newer than current {current}",
            entry.version
        );
        return Ok(None);
    }

    Ok(Some(ResolvedTarget {
        url: entry.location.to_url(),
        version: entry.version,
    }))
}

/// Split a decoded manifest into candidate entries, in document order
pub fn entries(root: Value) -> Vec<Value> {
    match root {
        Value::Array(items) => items,
        Value::Object(_) => vec![root],
        other => {
            warn!("Manifest root is neither an object nor an array: {other}");
            Vec::new()
        }
    }
}
