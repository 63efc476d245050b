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

//! Firmware identity declared by the device

use crate::version::{Version, parse_version};
use std::fmt;

/// How the device declared its current version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionScheme {
    /// Single integer build number
    Build,
    /// Dotted `major.minor.patch` string
    Semantic,
}

/// Firmware channel plus the version currently running
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareIdentity {
    firmware_type: String,
    current_version: Version,
    scheme: VersionScheme,
}

impl FirmwareIdentity {
    pub fn from_build(firmware_type: impl Into<String>, build: u32) -> Self {
        Self {
            firmware_type: firmware_type.into(),
            current_version: Version::from_build(build),
            scheme: VersionScheme::Build,
        }
    }

    pub fn from_semver(firmware_type: impl Into<String>, version: &str) -> Self {
        let firmware_type = firmware_type.into();
        let parsed = parse_version(version);
        if parsed.lossy {
            tracing::warn!(
                "Current version '{version}' for {firmware_type} is not a clean semver, using {}",
                parsed.version
            );
        }

        Self {
            firmware_type,
            current_version: parsed.version,
            scheme: VersionScheme::Semantic,
        }
    }

    /// Build from a config value: a bare integer is a build number, anything
    /// else is treated as a dotted version
    pub fn from_declared(firmware_type: impl Into<String>, version: &str) -> Self {
        match version.trim().parse::<u32>() {
            Ok(build) => Self::from_build(firmware_type, build),
            Err(_) => Self::from_semver(firmware_type, version),
        }
    }

    pub fn firmware_type(&self) -> &str {
        &self.firmware_type
    }

    pub fn current_version(&self) -> Version {
        self.current_version
    }

    pub fn scheme(&self) -> VersionScheme {
        self.scheme
    }
}

impl fmt::Display for FirmwareIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.firmware_type, self.current_version)
    }
}
