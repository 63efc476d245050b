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

//! Version parsing and comparison module
//!
//! Versions are plain `major.minor.patch` triples with no pre-release or build
//! metadata. Parsing never fails: segments that are not numbers fall back to 0
//! and the result is flagged as lossy, so callers can tell a declared `0` from a
//! value that could not be read.

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Single integer build number, stored as `0.0.n`
    pub const fn from_build(build: u32) -> Self {
        Self::new(0, 0, build)
    }
}

impl From<u32> for Version {
    fn from(build: u32) -> Self {
        Self::from_build(build)
    }
}

impl FromStr for Version {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(parse_version(s).version)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Outcome of a best-effort version parse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedVersion {
    pub version: Version,
    /// At least one segment was unreadable and replaced by 0, or extra
    /// leading segments were dropped
    pub lossy: bool,
}

/// Parse a dotted version string, right-aligned: `"5"` is `0.0.5`, `"1.2"` is
/// `0.1.2`. A leading `v`/`V` is accepted.
pub fn parse_version(s: &str) -> ParsedVersion {
    let s = s.trim();
    let s = s
        .strip_prefix('v')
        .or_else(|| s.strip_prefix('V'))
        .unwrap_or(s);

    if s.is_empty() {
        return ParsedVersion {
            version: Version::default(),
            lossy: true,
        };
    }

    let segments: Vec<&str> = s.split('.').collect();
    let mut lossy = segments.len() > 3;
    let mut parts = [0_u32; 3];

    for (slot, segment) in parts.iter_mut().rev().zip(segments.iter().rev()) {
        match segment.parse::<u32>() {
            Ok(value) => *slot = value,
            Err(_) => lossy = true,
        }
    }

    ParsedVersion {
        version: Version::new(parts[0], parts[1], parts[2]),
        lossy,
    }
}

/// Returns true if `candidate` is strictly newer than `current`
pub fn is_newer(current: &Version, candidate: &Version) -> bool {
    candidate > current
}
