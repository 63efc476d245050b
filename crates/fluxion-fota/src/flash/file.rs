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

//! File-backed flash collaborator
//!
//! Stages the image in `<image>.partial` and renames it over the image path
//! once exactly the announced number of bytes has been written.

use super::{ERROR_ABORT, ERROR_ACTIVATE, ERROR_OK, ERROR_SIZE, ERROR_SPACE, ERROR_WRITE, FlashUpdater};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// Default slot size, matching a standard ESP32 OTA partition (1.75 MiB)
pub const DEFAULT_PARTITION_SIZE: u64 = 0x1C_0000;

#[derive(Debug)]
pub struct FileFlash {
    image_path: PathBuf,
    capacity: u64,
    file: Option<File>,
    expected: u64,
    written: u64,
    finished: bool,
    error: i32,
}

impl FileFlash {
    pub fn new(image_path: impl Into<PathBuf>, capacity: u64) -> Self {
        Self {
            image_path: image_path.into(),
            capacity,
            file: None,
            expected: 0,
            written: 0,
            finished: false,
            error: ERROR_OK,
        }
    }

    pub fn image_path(&self) -> &Path {
        &self.image_path
    }

    fn partial_path(&self) -> PathBuf {
        self.image_path.with_extension("partial")
    }

    /// Drop the staged image after a failed commit and record `code`
    fn discard_partial(&mut self, code: i32) -> bool {
        if let Err(e) = std::fs::remove_file(self.partial_path()) {
            warn!("Failed to remove staging file: {e}");
        }
        self.error = code;
        false
    }
}

impl FlashUpdater for FileFlash {
    fn begin(&mut self, size: u64) -> bool {
        if self.file.is_some() {
            warn!("Previous flash session still open, aborting it");
            self.abort();
        }

        self.finished = false;
        self.written = 0;
        self.expected = size;

        if size == 0 || size > self.capacity {
            error!(
                "Image of {size} bytes does not fit partition of {} bytes",
                self.capacity
            );
            self.error = ERROR_SPACE;
            return false;
        }

        if let Some(parent) = self.image_path.parent()
            && !parent.as_os_str().is_empty()
            && let Err(e) = std::fs::create_dir_all(parent)
        {
            error!("Failed to create {}: {e}", parent.display());
            self.error = ERROR_WRITE;
            return false;
        }

        match File::create(self.partial_path()) {
            Ok(file) => {
                self.file = Some(file);
                self.error = ERROR_OK;
                true
            }
            Err(e) => {
                error!("Failed to open staging file: {e}");
                self.error = ERROR_WRITE;
                false
            }
        }
    }

    fn write(&mut self, chunk: &[u8]) -> usize {
        let Some(file) = self.file.as_mut() else {
            self.error = ERROR_WRITE;
            return 0;
        };

        match file.write_all(chunk) {
            Ok(()) => {
                self.written += chunk.len() as u64;
                chunk.len()
            }
            Err(e) => {
                error!("Flash write failed: {e}");
                self.error = ERROR_WRITE;
                0
            }
        }
    }

    fn end(&mut self) -> bool {
        let Some(file) = self.file.take() else {
            self.error = ERROR_WRITE;
            return false;
        };

        if self.written != self.expected {
            error!(
                "Image size mismatch: {}/{} bytes",
                self.written, self.expected
            );
            drop(file);
            return self.discard_partial(ERROR_SIZE);
        }

        if let Err(e) = file.sync_all() {
            error!("Failed to sync staging file: {e}");
            drop(file);
            return self.discard_partial(ERROR_WRITE);
        }
        drop(file);

        if let Err(e) = std::fs::rename(self.partial_path(), &self.image_path) {
            error!("Failed to activate image: {e}");
            return self.discard_partial(ERROR_ACTIVATE);
        }

        debug!("Image activated at {}", self.image_path.display());
        self.finished = true;
        true
    }

    fn is_finished(&self) -> bool {
        self.finished
    }

    fn error_code(&self) -> i32 {
        self.error
    }

    fn abort(&mut self) {
        if self.file.take().is_some() {
            let _ = std::fs::remove_file(self.partial_path());
            self.error = ERROR_ABORT;
        }
    }
}
