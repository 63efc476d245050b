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

//! Flash-update collaborator and the exclusive write session over it

pub mod file;

pub use file::FileFlash;

use crate::error::{FotaError, Result};
use std::fmt;

pub const ERROR_OK: i32 = 0;
pub const ERROR_WRITE: i32 = 1;
pub const ERROR_SPACE: i32 = 4;
pub const ERROR_SIZE: i32 = 5;
pub const ERROR_ACTIVATE: i32 = 9;
pub const ERROR_ABORT: i32 = 12;

/// Platform subsystem that stores a new firmware image and makes it bootable.
///
/// Call order is `begin`, any number of `write`, then `end` or `abort`.
pub trait FlashUpdater {
    /// Reserve room for an image of `size` bytes; false if it does not fit
    fn begin(&mut self, size: u64) -> bool;

    /// Write the next chunk, returning how many bytes were stored. A short
    /// count means the write failed.
    fn write(&mut self, chunk: &[u8]) -> usize;

    /// Finalize the image and mark it bootable
    fn end(&mut self) -> bool;

    /// Whether the last `end` left a complete image in place
    fn is_finished(&self) -> bool;

    /// Last error code, `ERROR_OK` if none
    fn error_code(&self) -> i32;

    /// Drop whatever was written since `begin`
    fn abort(&mut self);
}

/// Exclusive handle on the flash update region.
///
/// Holding a session borrows the collaborator mutably, so a second install
/// cannot start while one is in flight. Dropping an uncommitted session aborts
/// the update.
pub struct FlashSession<'a, F: FlashUpdater + ?Sized> {
    flash: &'a mut F,
    expected: u64,
    written: u64,
    closed: bool,
}

impl<'a, F: FlashUpdater + ?Sized> FlashSession<'a, F> {
    pub fn open(flash: &'a mut F, size: u64) -> Result<Self> {
        if !flash.begin(size) {
            return Err(FotaError::InsufficientSpace { requested: size });
        }

        Ok(Self {
            flash,
            expected: size,
            written: 0,
            closed: false,
        })
    }

    pub fn write(&mut self, chunk: &[u8]) -> usize {
        let stored = self.flash.write(chunk);
        self.written += stored as u64;
        stored
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn expected(&self) -> u64 {
        self.expected
    }

    /// Finalize the image. Both the commit acknowledgment and the finished
    /// flag are required.
    pub fn commit(mut self) -> Result<()> {
        self.closed = true;

        if !self.flash.end() {
            return Err(FotaError::FlashCommitFailed {
                code: self.flash.error_code(),
            });
        }

        if !self.flash.is_finished() {
            return Err(FotaError::UpdateNotFinished);
        }

        Ok(())
    }
}

impl<F: FlashUpdater + ?Sized> Drop for FlashSession<'_, F> {
    fn drop(&mut self) {
        if !self.closed {
            tracing::debug!(
                "Aborting flash session after {}/{} bytes",
                self.written,
                self.expected
            );
            self.flash.abort();
        }
    }
}

impl<F: FlashUpdater + ?Sized> fmt::Debug for FlashSession<'_, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlashSession")
            .field("expected", &self.expected)
            .field("written", &self.written)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// In-memory flash that records every call
    #[derive(Debug, Default)]
    pub struct MemoryFlash {
        pub capacity: u64,
        pub data: Vec<u8>,
        pub begin_calls: usize,
        pub write_calls: usize,
        pub end_calls: usize,
        pub abort_calls: usize,
        /// Stop accepting bytes after this many
        pub write_limit: Option<usize>,
        pub fail_end: bool,
        pub unfinished: bool,
        finished: bool,
        error: i32,
    }

    impl MemoryFlash {
        pub fn with_capacity(capacity: u64) -> Self {
            Self {
                capacity,
                ..Default::default()
            }
        }
    }

    impl FlashUpdater for MemoryFlash {
        fn begin(&mut self, size: u64) -> bool {
            self.begin_calls += 1;
            if size == 0 || size > self.capacity {
                self.error = ERROR_SPACE;
                return false;
            }
            self.data.clear();
            true
        }

        fn write(&mut self, chunk: &[u8]) -> usize {
            self.write_calls += 1;
            let room = self
                .write_limit
                .map_or(chunk.len(), |limit| limit.saturating_sub(self.data.len()));
            let stored = chunk.len().min(room);
            self.data.extend_from_slice(&chunk[..stored]);
            if stored < chunk.len() {
                self.error = ERROR_WRITE;
            }
            stored
        }

        fn end(&mut self) -> bool {
            self.end_calls += 1;
            if self.fail_end {
                self.error = ERROR_ACTIVATE;
                return false;
            }
            self.finished = !self.unfinished;
            true
        }

        fn is_finished(&self) -> bool {
            self.finished
        }

        fn error_code(&self) -> i32 {
            self.error
        }

        fn abort(&mut self) {
            self.abort_calls += 1;
            self.data.clear();
        }
    }
}
