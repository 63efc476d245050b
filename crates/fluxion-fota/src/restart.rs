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

//! Device restart collaborator

use nix::unistd::execv;
use std::ffi::CString;
use tracing::{error, info};

/// Reboots into the freshly committed firmware.
///
/// Real implementations do not return; test doubles may record the call and
/// return normally.
pub trait Restart {
    fn restart(&self);
}

/// Restart for host agents: replaces the running process with a fresh copy of
/// its own executable, falling back to exiting so a supervisor can restart it
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecRestart;

impl Restart for ExecRestart {
    fn restart(&self) {
        if let Err(e) = exec_self() {
            error!("Re-exec failed: {e}");
        }
        info!("Exiting for supervisor restart");
        std::process::exit(0);
    }
}

fn exec_self() -> Result<(), String> {
    let exe = std::env::current_exe().map_err(|e| e.to_string())?;
    let path = CString::new(exe.as_os_str().as_encoded_bytes()).map_err(|e| e.to_string())?;
    let args = std::env::args()
        .map(CString::new)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| e.to_string())?;

    info!("Restarting {}", exe.display());
    // Only returns on failure
    execv(&path, &args)
        .map(|_| ())
        .map_err(|e| e.to_string())
}
