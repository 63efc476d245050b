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

//! Caller-facing OTA client
//!
//! Ties the checker and the installer to one device identity:
//!
//! ```no_run
//! # use fluxion_fota::{FotaClient, FileFlash, ExecRestart};
//! # async fn example() -> fluxion_fota::Result<()> {
//! let mut fota = FotaClient::new("esp32-fota-http", 2)?;
//! if fota.check_for_update("http://fw.local/fota.json").await? {
//!     let mut flash = FileFlash::new("/data/firmware.bin", 0x1C_0000);
//!     fota.perform_update(&mut flash, &ExecRestart).await?;
//! }
//! # Ok(())
//! # }
//! ```

use crate::checker::UpdateChecker;
use crate::config::FotaConfig;
use crate::error::{FotaError, Result};
use crate::events::{FotaEvent, report_event};
use crate::flash::FlashUpdater;
use crate::identity::FirmwareIdentity;
use crate::installer::{FirmwareInstaller, UpdateSession};
use crate::manifest::ResolvedTarget;
use crate::network::Connectivity;
use crate::restart::Restart;
use crate::transport::{SourceAuth, TransportOptions, build_client};
use crate::version::Version;

#[derive(Debug)]
pub struct FotaClient {
    checker: UpdateChecker,
    installer: FirmwareInstaller,
}

impl FotaClient {
    /// Device that declares its version as a single build number
    pub fn new(firmware_type: impl Into<String>, build: u32) -> Result<Self> {
        Self::from_identity(
            FirmwareIdentity::from_build(firmware_type, build),
            &TransportOptions::default(),
        )
    }

    /// Device that declares a dotted `major.minor.patch` version
    pub fn with_semver(firmware_type: impl Into<String>, version: &str) -> Result<Self> {
        Self::from_identity(
            FirmwareIdentity::from_semver(firmware_type, version),
            &TransportOptions::default(),
        )
    }

    pub fn from_identity(identity: FirmwareIdentity, options: &TransportOptions) -> Result<Self> {
        let client = build_client(options)?;
        Ok(Self {
            checker: UpdateChecker::new(identity, client.clone()),
            installer: FirmwareInstaller::new(client, SourceAuth::default()),
        })
    }

    pub fn from_config(config: &FotaConfig) -> Result<Self> {
        let identity = FirmwareIdentity::from_declared(&config.firmware_type, &config.current_version);
        let mut fota = Self::from_identity(identity, &TransportOptions::from(config))?;
        fota.set_source_auth(SourceAuth::from_config(config));
        Ok(fota)
    }

    #[must_use]
    pub fn with_connectivity(mut self, connectivity: impl Connectivity + 'static) -> Self {
        self.checker = self.checker.with_connectivity(connectivity);
        self
    }

    /// Use a token-protected raw-content source for manifest and firmware
    pub fn set_authenticated_source(&mut self, token: impl Into<String>) {
        self.set_source_auth(SourceAuth::authenticated(token));
    }

    pub fn set_source_auth(&mut self, auth: SourceAuth) {
        self.installer.set_auth(auth.clone());
        self.checker.set_auth(auth);
    }

    pub fn identity(&self) -> &FirmwareIdentity {
        self.checker.identity()
    }

    pub async fn check_for_update(&mut self, manifest_url: &str) -> Result<bool> {
        let found = self.checker.check(manifest_url).await?;

        if let Some(target) = self.checker.resolved_target() {
            let identity = self.checker.identity();
            report_event(&FotaEvent::UpdateAvailable {
                firmware_type: identity.firmware_type().to_owned(),
                current_version: identity.current_version(),
                available_version: target.version,
                url: target.url.clone(),
            });
        }

        Ok(found)
    }

    pub fn resolved_target(&self) -> Option<&ResolvedTarget> {
        self.checker.resolved_target()
    }

    pub fn resolved_version(&self) -> Option<Version> {
        self.resolved_target().map(|t| t.version)
    }

    /// Install the target found by the last successful check.
    ///
    /// Blocks the caller until the image is committed and the device restarts,
    /// or the attempt fails and the current firmware keeps running. The commit
    /// event is reported before the restart collaborator runs.
    pub async fn perform_update<F, R>(&self, flash: &mut F, device: &R) -> Result<UpdateSession>
    where
        F: FlashUpdater + ?Sized,
        R: Restart + ?Sized,
    {
        let target = self.resolved_target().ok_or(FotaError::NoTarget)?;
        let identity = self.checker.identity();

        report_event(&FotaEvent::InstallStarted {
            firmware_type: identity.firmware_type().to_owned(),
            from_version: identity.current_version(),
            to_version: target.version,
        });

        match self.installer.download(&target.url, flash).await {
            Ok(mut session) => {
                report_event(&FotaEvent::InstallCommitted {
                    firmware_type: identity.firmware_type().to_owned(),
                    from_version: identity.current_version(),
                    to_version: target.version,
                    bytes_written: session.bytes_written,
                });
                session.restart(device);
                Ok(session)
            }
            Err(e) => {
                report_event(&FotaEvent::InstallFailed {
                    firmware_type: identity.firmware_type().to_owned(),
                    to_version: target.version,
                    outcome: e.outcome(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }
}
