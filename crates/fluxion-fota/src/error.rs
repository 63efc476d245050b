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

//! Error types for the FOTA crate

use crate::installer::SessionOutcome;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FotaError {
    #[error("network not connected")]
    NetworkUnavailable,

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("manifest parse error: {0}")]
    ManifestParse(String),

    #[error("manifest entry malformed: {0}")]
    ManifestMalformed(String),

    #[error("invalid firmware response: {0}")]
    InvalidResponse(String),

    #[error("not enough space to begin OTA ({requested} bytes requested)")]
    InsufficientSpace { requested: u64 },

    #[error("incomplete write: {written}/{expected} bytes")]
    IncompleteWrite { written: u64, expected: u64 },

    #[error("flash commit failed with error #{code}")]
    FlashCommitFailed { code: i32 },

    #[error("flash commit acknowledged but update is not finished")]
    UpdateNotFinished,

    #[error("no resolved firmware target, run a check first")]
    NoTarget,

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FotaError {
    /// Session outcome an installer failure maps to, `None` for errors that
    /// happen outside an install session.
    pub fn outcome(&self) -> Option<SessionOutcome> {
        match self {
            Self::InvalidResponse(_) | Self::ConnectionFailed(_) => {
                Some(SessionOutcome::InvalidResponse)
            }
            Self::InsufficientSpace { .. } => Some(SessionOutcome::InsufficientSpace),
            Self::IncompleteWrite { .. } => Some(SessionOutcome::IncompleteWrite),
            Self::FlashCommitFailed { .. } | Self::UpdateNotFinished => {
                Some(SessionOutcome::FlashCommitFailed)
            }
            Self::NetworkUnavailable
            | Self::ManifestParse(_)
            | Self::ManifestMalformed(_)
            | Self::NoTarget
            | Self::Config(_)
            | Self::Io(_)
            | Self::Json(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, FotaError>;
