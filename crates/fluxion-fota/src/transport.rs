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

//! HTTP transport setup shared by the checker and the installer

use crate::config::FotaConfig;
use crate::error::{FotaError, Result};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

pub const USER_AGENT: &str = concat!("fluxion-fota/", env!("CARGO_PKG_VERSION"));

/// Accept header asking a source-hosting API for the raw file body
pub const RAW_CONTENT_ACCEPT: &str = "application/vnd.github.v3.raw";

/// Statuses treated as a successful fetch
pub fn is_accepted(status: StatusCode) -> bool {
    status == StatusCode::OK || status == StatusCode::MOVED_PERMANENTLY
}

/// Optional request headers for an authenticated or raw-content source
#[derive(Clone, Default)]
pub struct SourceAuth {
    pub token: Option<String>,
    pub raw_content: bool,
}

impl SourceAuth {
    /// Token-protected raw-content source; sets both headers
    pub fn authenticated(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            raw_content: true,
        }
    }

    pub fn from_config(config: &FotaConfig) -> Self {
        Self {
            token: config.auth_token.clone().filter(|t| !t.is_empty()),
            raw_content: config.raw_content_accept,
        }
    }

    pub fn apply(&self, mut request: RequestBuilder) -> RequestBuilder {
        if self.raw_content {
            request = request.header(ACCEPT, RAW_CONTENT_ACCEPT);
            debug!("Added to header [Accept]: {RAW_CONTENT_ACCEPT}");
        }
        if let Some(token) = self.token.as_deref().filter(|t| !t.is_empty()) {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
            debug!("Added to header [authorization]: Bearer <redacted>");
        }
        request
    }
}

impl std::fmt::Debug for SourceAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceAuth")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("raw_content", &self.raw_content)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub connect_timeout: Duration,
    /// Bound on a whole request, body included
    pub request_timeout: Duration,
    pub accept_invalid_certs: bool,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(300),
            accept_invalid_certs: false,
        }
    }
}

impl From<&FotaConfig> for TransportOptions {
    fn from(config: &FotaConfig) -> Self {
        Self {
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            request_timeout: Duration::from_secs(config.download_timeout_secs),
            accept_invalid_certs: config.accept_invalid_certs,
        }
    }
}

pub fn build_client(options: &TransportOptions) -> Result<Client> {
    if options.accept_invalid_certs {
        warn!("TLS certificate validation is disabled for https sources");
    }

    Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(options.connect_timeout)
        .timeout(options.request_timeout)
        .danger_accept_invalid_certs(options.accept_invalid_certs)
        .build()
        .map_err(|e| FotaError::Config(format!("Failed to build HTTP client: {e}")))
}
