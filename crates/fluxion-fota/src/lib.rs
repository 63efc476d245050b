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

//! FluxION FOTA - firmware-over-the-air updates for network-connected devices
//!
//! A device publishes its firmware type and running version, fetches a JSON
//! manifest, picks the first newer build for its type and streams that image
//! straight into its flash update slot before restarting.

pub mod checker;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod flash;
pub mod identity;
pub mod installer;
pub mod manifest;
pub mod network;
pub mod restart;
pub mod transport;
pub mod version;

pub use checker::UpdateChecker;
pub use client::FotaClient;
pub use config::{FotaConfig, load_config, save_config};
pub use error::{FotaError, Result};
pub use flash::{FileFlash, FlashSession, FlashUpdater};
pub use identity::{FirmwareIdentity, VersionScheme};
pub use installer::{FirmwareInstaller, InstallStage, SessionOutcome, UpdateSession};
pub use manifest::{ManifestEntry, ResolvedTarget};
pub use network::{AlwaysConnected, Connectivity};
pub use restart::{ExecRestart, Restart};
pub use transport::{SourceAuth, TransportOptions};
pub use version::{ParsedVersion, Version, is_newer, parse_version};
