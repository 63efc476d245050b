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

//! Manifest fetch and evaluation

use crate::error::{FotaError, Result};
use crate::identity::FirmwareIdentity;
use crate::manifest::{self, ResolvedTarget};
use crate::network::{AlwaysConnected, Connectivity};
use crate::transport::{SourceAuth, is_accepted};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, error, info, warn};

/// Looks up a newer firmware build for one device identity.
///
/// Each check replaces the previously resolved target. The first manifest
/// entry that matches the firmware type and is newer wins; later entries are
/// not compared against it.
pub struct UpdateChecker {
    identity: FirmwareIdentity,
    auth: SourceAuth,
    client: Client,
    connectivity: Box<dyn Connectivity>,
    resolved: Option<ResolvedTarget>,
}

impl UpdateChecker {
    pub fn new(identity: FirmwareIdentity, client: Client) -> Self {
        Self {
            identity,
            auth: SourceAuth::default(),
            client,
            connectivity: Box::new(AlwaysConnected),
            resolved: None,
        }
    }

    #[must_use]
    pub fn with_auth(mut self, auth: SourceAuth) -> Self {
        self.auth = auth;
        self
    }

    #[must_use]
    pub fn with_connectivity(mut self, connectivity: impl Connectivity + 'static) -> Self {
        self.connectivity = Box::new(connectivity);
        self
    }

    pub fn set_auth(&mut self, auth: SourceAuth) {
        self.auth = auth;
    }

    pub fn auth(&self) -> &SourceAuth {
        &self.auth
    }

    pub fn identity(&self) -> &FirmwareIdentity {
        &self.identity
    }

    pub fn resolved_target(&self) -> Option<&ResolvedTarget> {
        self.resolved.as_ref()
    }

    /// Fetch the manifest and look for a newer matching build.
    ///
    /// Returns `Ok(false)` when the manifest was read but nothing applies.
    pub async fn check(&mut self, manifest_url: &str) -> Result<bool> {
        self.resolved = None;

        if !self.connectivity.is_connected() {
            warn!("Network not connected, skipping manifest check");
            return Err(FotaError::NetworkUnavailable);
        }

        info!("Getting manifest: {manifest_url}");

        let response = self
            .auth
            .apply(self.client.get(manifest_url))
            .send()
            .await
            .map_err(|e| FotaError::ConnectionFailed(format!("Request failed: {e}")))?;

        let status = response.status();
        if !is_accepted(status) {
            error!("Manifest request to {manifest_url} returned {status}");
            return Err(FotaError::ConnectionFailed(format!(
                "Manifest request returned {status}"
            )));
        }

        // Reading the body consumes the response and releases the connection
        let body = response
            .text()
            .await
            .map_err(|e| FotaError::ConnectionFailed(format!("Failed to read manifest: {e}")))?;

        debug!("Manifest body: {} bytes", body.len());

        let root: Value = serde_json::from_str(&body).map_err(|e| {
            error!("Manifest parsing failed: {e}");
            FotaError::ManifestParse(e.to_string())
        })?;

        for entry in manifest::entries(root) {
            match manifest::evaluate(&entry, &self.identity) {
                Ok(Some(target)) => {
                    info!(
                        "Newer firmware {} available at {} (current {})",
                        target.version,
                        target.url,
                        self.identity.current_version()
                    );
                    self.resolved = Some(target);
                    return Ok(true);
                }
                Ok(None) => {}
                Err(e) => warn!("Skipping manifest entry: {e}"),
            }
        }

        info!("No newer firmware for {}", self.identity);
        Ok(false)
    }
}

impl std::fmt::Debug for UpdateChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateChecker")
            .field("identity", &self.identity)
            .field("auth", &self.auth)
            .field("resolved", &self.resolved)
            .finish_non_exhaustive()
    }
}
