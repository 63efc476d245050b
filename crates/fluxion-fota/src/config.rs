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

//! Configuration module for the FOTA agent

use crate::error::{FotaError, Result};
use crate::flash::file::DEFAULT_PARTITION_SIZE;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "/data/fota_config.json";

/// Environment variable consulted when the config has no token
pub const TOKEN_ENV: &str = "FOTA_TOKEN";

fn default_firmware_type() -> String {
    "esp32-fota-http".to_owned()
}

fn default_current_version() -> String {
    "0".to_owned()
}

fn default_3600() -> u64 {
    3600
}

fn default_10() -> u64 {
    10
}

fn default_300() -> u64 {
    300
}

fn default_image_path() -> PathBuf {
    PathBuf::from("/data/firmware.bin")
}

fn default_partition_size() -> u64 {
    DEFAULT_PARTITION_SIZE
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FotaConfig {
    /// Firmware channel this device accepts from the manifest
    #[serde(default = "default_firmware_type")]
    pub firmware_type: String,

    /// Running version: a build number ("7") or a dotted version ("1.2.3")
    #[serde(default = "default_current_version")]
    pub current_version: String,

    /// Where the manifest JSON is published
    #[serde(default)]
    pub manifest_url: String,

    /// How often to check for updates (seconds)
    #[serde(default = "default_3600")]
    pub check_interval_secs: u64,

    /// Bearer token for an authenticated manifest source (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,

    /// Ask the source for raw file content (`application/vnd.github.v3.raw`)
    #[serde(default)]
    pub raw_content_accept: bool,

    /// Skip TLS certificate validation on https URLs
    #[serde(default)]
    pub accept_invalid_certs: bool,

    #[serde(default = "default_10")]
    pub connect_timeout_secs: u64,

    /// Upper bound for a whole request, including the firmware transfer
    #[serde(default = "default_300")]
    pub download_timeout_secs: u64,

    /// Where the file-backed flash writes the new image
    #[serde(default = "default_image_path")]
    pub image_path: PathBuf,

    /// Capacity of the update slot (bytes)
    #[serde(default = "default_partition_size")]
    pub partition_size: u64,
}

impl Default for FotaConfig {
    fn default() -> Self {
        Self {
            firmware_type: default_firmware_type(),
            current_version: default_current_version(),
            manifest_url: String::new(),
            check_interval_secs: 3600,
            auth_token: None,
            raw_content_accept: false,
            accept_invalid_certs: false,
            connect_timeout_secs: 10,
            download_timeout_secs: 300,
            image_path: default_image_path(),
            partition_size: DEFAULT_PARTITION_SIZE,
        }
    }
}

impl FotaConfig {
    pub fn validate(&self) -> Result<()> {
        if self.firmware_type.trim().is_empty() {
            return Err(FotaError::Config("firmware_type must not be empty".to_owned()));
        }
        if self.manifest_url.trim().is_empty() {
            return Err(FotaError::Config("manifest_url must not be empty".to_owned()));
        }
        if self.download_timeout_secs == 0 {
            return Err(FotaError::Config(
                "download_timeout_secs must be greater than 0".to_owned(),
            ));
        }
        Ok(())
    }

    /// Fill the token from `FOTA_TOKEN` if the file left it unset. Kept out of
    /// `load_config` so a saved config never picks up the secret.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if self.auth_token.is_none()
            && let Ok(token) = std::env::var(TOKEN_ENV)
            && !token.is_empty()
        {
            self.auth_token = Some(token);
        }
        self
    }
}

pub fn load_config(path: &Path) -> Result<FotaConfig> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| FotaError::Config(format!("Failed to parse config: {e}")))
    } else {
        // Create with defaults
        let config = FotaConfig::default();
        save_config(path, &config)?;
        Ok(config)
    }
}

pub fn save_config(path: &Path, config: &FotaConfig) -> Result<()> {
    let temp_path = path.with_extension("tmp");
    let content = serde_json::to_string_pretty(config)?;

    // Atomic write
    std::fs::write(&temp_path, content)?;
    std::fs::rename(&temp_path, path)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = FotaConfig::default();
        assert_eq!(config.firmware_type, "esp32-fota-http");
        assert_eq!(config.current_version, "0");
        assert_eq!(config.check_interval_secs, 3600);
        assert_eq!(config.download_timeout_secs, 300);
        assert_eq!(config.partition_size, DEFAULT_PARTITION_SIZE);
        assert!(!config.accept_invalid_certs);
        assert!(!config.raw_content_accept);
        assert!(config.auth_token.is_none());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: FotaConfig = serde_json::from_str(
            r#"{"firmware_type": "sensor", "manifest_url": "http://fw/manifest.json"}"#,
        )
        .unwrap();
        assert_eq!(config.firmware_type, "sensor");
        assert_eq!(config.current_version, "0");
        assert_eq!(config.connect_timeout_secs, 10);
        assert_eq!(config.image_path, PathBuf::from("/data/firmware.bin"));
    }

    #[test]
    fn test_validate() {
        let mut config = FotaConfig {
            manifest_url: "http://fw/manifest.json".to_owned(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        config.download_timeout_secs = 0;
        assert!(matches!(config.validate(), Err(FotaError::Config(_))));

        let config = FotaConfig::default();
        assert!(matches!(config.validate(), Err(FotaError::Config(_))));

        let config = FotaConfig {
            firmware_type: " ".to_owned(),
            manifest_url: "http://fw/manifest.json".to_owned(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(FotaError::Config(_))));
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fota_config.json");
        let config = FotaConfig {
            firmware_type: "relay".to_owned(),
            current_version: "1.0.4".to_owned(),
            manifest_url: "https://fw.local/manifest.json".to_owned(),
            check_interval_secs: 600,
            auth_token: Some("test-token".to_owned()),
            raw_content_accept: true,
            accept_invalid_certs: true,
            connect_timeout_secs: 5,
            download_timeout_secs: 120,
            image_path: dir.path().join("fw.bin"),
            partition_size: 4096,
        };

        save_config(&path, &config).unwrap();
        assert!(!path.with_extension("tmp").exists());

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.firmware_type, config.firmware_type);
        assert_eq!(loaded.current_version, config.current_version);
        assert_eq!(loaded.auth_token, config.auth_token);
        assert!(loaded.raw_content_accept);
        assert!(loaded.accept_invalid_certs);
        assert_eq!(loaded.partition_size, 4096);
    }

    #[test]
    fn test_missing_file_is_created_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fota_config.json");

        let config = load_config(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.check_interval_secs, 3600);
    }

    #[test]
    fn test_env_token_does_not_override_file_token() {
        let config = FotaConfig {
            auth_token: Some("from-file".to_owned()),
            ..Default::default()
        }
        .with_env_overrides();
        assert_eq!(config.auth_token.as_deref(), Some("from-file"));
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fota_config.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(load_config(&path), Err(FotaError::Config(_))));
    }
}
