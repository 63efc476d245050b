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

//! FluxION FOTA agent - periodic firmware check and install
//!
//! Fetches the configured manifest on an interval, installs a newer build into
//! the file-backed update slot and restarts itself into it.

use clap::Parser;
use fluxion_fota::config::DEFAULT_CONFIG_PATH;
use fluxion_fota::{
    ExecRestart, FileFlash, FotaClient, FotaConfig, FotaError, Restart, Version, VersionScheme,
    load_config, save_config,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "fluxion-fota", version, about = "Firmware-over-the-air update agent")]
struct Cli {
    /// Path to the agent configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Run a single update cycle and exit
    #[arg(long)]
    once: bool,

    /// Only report available updates, never install
    #[arg(long)]
    check_only: bool,
}

/// Records the installed version in the config before re-executing, so the
/// restarted agent reports the new firmware
struct PersistingRestart<'a> {
    config_path: &'a Path,
    image_path: &'a Path,
    config: FotaConfig,
}

impl Restart for PersistingRestart<'_> {
    fn restart(&self) {
        info!(
            "Installed firmware {} into {}",
            self.config.current_version,
            self.image_path.display()
        );
        if let Err(e) = save_config(self.config_path, &self.config) {
            warn!("Failed to record installed version: {e}");
        }
        ExecRestart.restart();
    }
}

fn declared_version(version: Version, scheme: VersionScheme) -> String {
    match scheme {
        VersionScheme::Build if version.major == 0 && version.minor == 0 => {
            version.patch.to_string()
        }
        VersionScheme::Build | VersionScheme::Semantic => version.to_string(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fluxion_fota=debug".parse()?),
        )
        .init();

    let cli = Cli::parse();
    info!("Starting FluxION FOTA agent");

    let file_config = load_config(&cli.config)?;
    let config = file_config.clone().with_env_overrides();
    config.validate()?;
    info!(
        "Loaded config: firmware_type={}, current_version={}, manifest_url={}",
        config.firmware_type, config.current_version, config.manifest_url
    );

    let mut fota = FotaClient::from_config(&config)?;
    let mut flash = FileFlash::new(&config.image_path, config.partition_size);

    if cli.once {
        run_update_cycle(&mut fota, &file_config, &cli, &mut flash).await?;
        return Ok(());
    }

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut check_interval =
        tokio::time::interval(Duration::from_secs(config.check_interval_secs.max(1)));

    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupt received");
                break;
            }
            _ = check_interval.tick() => {
                if let Err(e) = run_update_cycle(&mut fota, &file_config, &cli, &mut flash).await {
                    error!("Update cycle error: {e}");
                }
            }
        }
    }

    info!("Shutting down");
    Ok(())
}

async fn run_update_cycle(
    fota: &mut FotaClient,
    file_config: &FotaConfig,
    cli: &Cli,
    flash: &mut FileFlash,
) -> Result<(), FotaError> {
    info!("Running update cycle");

    if !fota.check_for_update(&file_config.manifest_url).await? {
        info!("Firmware is up to date");
        return Ok(());
    }

    let Some(version) = fota.resolved_version() else {
        return Ok(());
    };

    if cli.check_only {
        info!("Firmware {version} available, not installing (--check-only)");
        return Ok(());
    }

    let image_path = flash.image_path().to_path_buf();
    let device = PersistingRestart {
        config_path: &cli.config,
        image_path: &image_path,
        config: FotaConfig {
            current_version: declared_version(version, fota.identity().scheme()),
            ..file_config.clone()
        },
    };

    // Returns only if the restart collaborator does
    fota.perform_update(flash, &device).await?;
    Ok(())
}
