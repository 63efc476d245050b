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

//! Staged firmware download into flash
//!
//! One linear attempt per call:
//! `Start -> Connected -> HeadersValidated -> Writing -> Completed -> Committed -> Restarted`.
//! Every failure is terminal for the attempt and leaves the running firmware
//! untouched. Callers must not run two installs at once; the flash borrow
//! enforces this for a single collaborator.
//!
//! [`FirmwareInstaller::download`] stops at `Committed` so callers can record
//! the new image before [`UpdateSession::restart`] hands control to the device.

use crate::error::{FotaError, Result};
use crate::flash::{FlashSession, FlashUpdater};
use crate::restart::Restart;
use crate::transport::{SourceAuth, is_accepted};
use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderMap};
use serde::Serialize;
use std::fmt;
use tracing::{debug, error, info, warn};

pub const OCTET_STREAM: &str = "application/octet-stream";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionOutcome {
    InProgress,
    Completed,
    InsufficientSpace,
    IncompleteWrite,
    FlashCommitFailed,
    InvalidResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStage {
    Start,
    Connected,
    HeadersValidated,
    Writing,
    Completed,
    Committed,
    Restarted,
}

impl fmt::Display for InstallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::Connected => "connected",
            Self::HeadersValidated => "headers-validated",
            Self::Writing => "writing",
            Self::Completed => "completed",
            Self::Committed => "committed",
            Self::Restarted => "restarted",
        };
        f.write_str(name)
    }
}

/// State of one install attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateSession {
    pub content_length: u64,
    pub content_type: String,
    pub bytes_written: u64,
    pub outcome: SessionOutcome,
    pub stage: InstallStage,
}

impl UpdateSession {
    fn new() -> Self {
        Self {
            content_length: 0,
            content_type: String::new(),
            bytes_written: 0,
            outcome: SessionOutcome::InProgress,
            stage: InstallStage::Start,
        }
    }

    fn advance(&mut self, stage: InstallStage) {
        debug!("OTA stage {} -> {stage}", self.stage);
        self.stage = stage;
    }

    fn fail(&mut self, error: FotaError) -> FotaError {
        if let Some(outcome) = error.outcome() {
            self.outcome = outcome;
        }
        error!(
            "OTA failed at stage {} ({:?}): {error}",
            self.stage, self.outcome
        );
        error
    }

    /// Restart into the committed image. Real devices do not return from this.
    pub fn restart<R: Restart + ?Sized>(&mut self, device: &R) {
        info!("Update successfully completed. Rebooting.");
        device.restart();
        self.advance(InstallStage::Restarted);
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: reqwest::header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

/// Downloads a firmware image and streams it into flash
#[derive(Debug, Clone)]
pub struct FirmwareInstaller {
    client: Client,
    auth: SourceAuth,
}

impl FirmwareInstaller {
    pub fn new(client: Client, auth: SourceAuth) -> Self {
        Self { client, auth }
    }

    pub fn set_auth(&mut self, auth: SourceAuth) {
        self.auth = auth;
    }

    /// Download `url` into `flash`, commit it and restart the device.
    ///
    /// On success the restart collaborator has been invoked; on a real device
    /// that call does not come back.
    pub async fn install<F, R>(&self, url: &str, flash: &mut F, device: &R) -> Result<UpdateSession>
    where
        F: FlashUpdater + ?Sized,
        R: Restart + ?Sized,
    {
        let mut session = self.download(url, flash).await?;
        session.restart(device);
        Ok(session)
    }

    /// Download `url` into `flash` and commit it without restarting
    pub async fn download<F>(&self, url: &str, flash: &mut F) -> Result<UpdateSession>
    where
        F: FlashUpdater + ?Sized,
    {
        let mut session = UpdateSession::new();

        info!("Connecting to: {url}");

        let response = match self.auth.apply(self.client.get(url)).send().await {
            Ok(response) => response,
            Err(e) => {
                return Err(session.fail(FotaError::ConnectionFailed(format!(
                    "Connection to {url} failed: {e}"
                ))));
            }
        };
        session.advance(InstallStage::Connected);

        let status = response.status();
        if !is_accepted(status) {
            return Err(session.fail(FotaError::InvalidResponse(format!(
                "Connection to {url} returned {status}"
            ))));
        }

        let headers = response.headers();
        let content_length = header_str(headers, CONTENT_LENGTH)
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        let content_type = header_str(headers, CONTENT_TYPE)
            .unwrap_or_default()
            .to_owned();
        let valid_content_type = content_type == OCTET_STREAM;

        session.content_length = content_length;
        session.content_type.clone_from(&content_type);
        info!("contentLength: {content_length}, isValidContentType: {valid_content_type}");

        if content_length == 0 {
            return Err(session.fail(FotaError::InvalidResponse(
                "missing or empty Content-Length".to_owned(),
            )));
        }
        if !valid_content_type {
            return Err(session.fail(FotaError::InvalidResponse(format!(
                "unexpected Content-Type '{content_type}'"
            ))));
        }
        session.advance(InstallStage::HeadersValidated);

        let mut target = match FlashSession::open(flash, content_length) {
            Ok(target) => target,
            Err(e) => {
                warn!("Not enough space to begin OTA");
                return Err(session.fail(e));
            }
        };
        session.advance(InstallStage::Writing);
        info!("Begin OTA, this may take a few minutes");

        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    error!("Firmware transfer interrupted: {e}");
                    break;
                }
            };

            let stored = target.write(&chunk);
            if stored < chunk.len() {
                error!(
                    "Flash accepted {stored}/{} bytes of chunk, stopping",
                    chunk.len()
                );
                break;
            }
        }
        // Release the HTTP connection before touching the update state
        drop(body);

        session.bytes_written = target.written();
        if session.bytes_written != content_length {
            error!(
                "Written only: {}/{content_length}. Retry?",
                session.bytes_written
            );
            return Err(session.fail(FotaError::IncompleteWrite {
                written: session.bytes_written,
                expected: content_length,
            }));
        }
        info!("Written: {} bytes successfully", session.bytes_written);
        session.outcome = SessionOutcome::Completed;
        session.advance(InstallStage::Completed);

        if let Err(e) = target.commit() {
            return Err(session.fail(e));
        }
        session.advance(InstallStage::Committed);
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flash::testing::MemoryFlash;
    use mockito::{Server, ServerGuard};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const IMAGE: &[u8] = b"\xe9\x06\x02\x20firmware-image-payload";

    #[derive(Default)]
    struct RecordingRestart {
        calls: AtomicUsize,
    }

    impl Restart for RecordingRestart {
        fn restart(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl RecordingRestart {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn installer() -> FirmwareInstaller {
        FirmwareInstaller::new(Client::new(), SourceAuth::default())
    }

    async fn serve_image(server: &mut ServerGuard, content_type: &str) -> mockito::Mock {
        server
            .mock("GET", "/fw.bin")
            .with_status(200)
            .with_header("content-type", content_type)
            .with_body(IMAGE)
            .create_async()
            .await
    }

    #[tokio::test]
    async fn test_install_success_restarts() {
        let mut server = Server::new_async().await;
        let mock = serve_image(&mut server, OCTET_STREAM).await;
        let mut flash = MemoryFlash::with_capacity(1024);
        let device = RecordingRestart::default();

        let session = installer()
            .install(&format!("{}/fw.bin", server.url()), &mut flash, &device)
            .await
            .unwrap();

        assert_eq!(session.outcome, SessionOutcome::Completed);
        assert_eq!(session.stage, InstallStage::Restarted);
        assert_eq!(session.content_length, IMAGE.len() as u64);
        assert_eq!(session.bytes_written, IMAGE.len() as u64);
        assert_eq!(session.content_type, OCTET_STREAM);
        assert_eq!(flash.data, IMAGE);
        assert_eq!(flash.end_calls, 1);
        assert_eq!(device.calls(), 1);

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_insufficient_space_writes_nothing() {
        let mut server = Server::new_async().await;
        let _mock = serve_image(&mut server, OCTET_STREAM).await;
        let mut flash = MemoryFlash::with_capacity(4);
        let device = RecordingRestart::default();

        let result = installer()
            .install(&format!("{}/fw.bin", server.url()), &mut flash, &device)
            .await;

        assert!(matches!(result, Err(FotaError::InsufficientSpace { .. })));
        assert_eq!(flash.begin_calls, 1);
        assert_eq!(flash.write_calls, 0);
        assert_eq!(flash.end_calls, 0);
        assert_eq!(device.calls(), 0);
    }

    #[tokio::test]
    async fn test_incomplete_write_skips_commit() {
        let mut server = Server::new_async().await;
        let _mock = serve_image(&mut server, OCTET_STREAM).await;
        let mut flash = MemoryFlash::with_capacity(1024);
        flash.write_limit = Some(8);
        let device = RecordingRestart::default();

        let result = installer()
            .install(&format!("{}/fw.bin", server.url()), &mut flash, &device)
            .await;

        match result {
            Err(FotaError::IncompleteWrite { written, expected }) => {
                assert_eq!(written, 8);
                assert_eq!(expected, IMAGE.len() as u64);
            }
            other => panic!("expected IncompleteWrite, got {other:?}"),
        }
        assert_eq!(flash.end_calls, 0);
        assert_eq!(flash.abort_calls, 1);
        assert_eq!(device.calls(), 0);
    }

    /// Serve one response that announces `announced` bytes but sends `body`
    async fn serve_truncated(announced: usize, body: &'static [u8]) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0_u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    return;
                }
                request.extend_from_slice(&buf[..n]);
            }

            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: {OCTET_STREAM}\r\nContent-Length: {announced}\r\n\r\n"
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(body).await.unwrap();
            socket.shutdown().await.unwrap();
        });

        format!("http://127.0.0.1:{port}/fw.bin")
    }

    #[tokio::test]
    async fn test_truncated_body_is_incomplete_write() {
        let url = serve_truncated(100, b"0123456789").await;
        let mut flash = MemoryFlash::with_capacity(1024);
        let device = RecordingRestart::default();

        let result = installer().install(&url, &mut flash, &device).await;

        match result {
            Err(FotaError::IncompleteWrite { written, expected }) => {
                assert_eq!(written, 10);
                assert_eq!(expected, 100);
            }
            other => panic!("expected IncompleteWrite, got {other:?}"),
        }
        assert_eq!(flash.end_calls, 0);
        assert_eq!(flash.abort_calls, 1);
        assert_eq!(device.calls(), 0);
    }

    #[tokio::test]
    async fn test_download_stops_at_commit() {
        let mut server = Server::new_async().await;
        let _mock = serve_image(&mut server, OCTET_STREAM).await;
        let mut flash = MemoryFlash::with_capacity(1024);
        let device = RecordingRestart::default();

        let mut session = installer()
            .download(&format!("{}/fw.bin", server.url()), &mut flash)
            .await
            .unwrap();
        assert_eq!(session.stage, InstallStage::Committed);
        assert_eq!(flash.end_calls, 1);
        assert_eq!(device.calls(), 0);

        session.restart(&device);
        assert_eq!(session.stage, InstallStage::Restarted);
        assert_eq!(device.calls(), 1);
    }

    #[tokio::test]
    async fn test_wrong_content_type_is_invalid_response() {
        let mut server = Server::new_async().await;
        let _mock = serve_image(&mut server, "text/html").await;
        let mut flash = MemoryFlash::with_capacity(1024);
        let device = RecordingRestart::default();

        let result = installer()
            .install(&format!("{}/fw.bin", server.url()), &mut flash, &device)
            .await;

        assert!(matches!(result, Err(FotaError::InvalidResponse(_))));
        assert_eq!(flash.begin_calls, 0);
        assert_eq!(device.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_content_type_is_invalid_response() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/fw.bin")
            .with_status(200)
            .with_body(IMAGE)
            .create_async()
            .await;
        let mut flash = MemoryFlash::with_capacity(1024);
        let device = RecordingRestart::default();

        let result = installer()
            .install(&format!("{}/fw.bin", server.url()), &mut flash, &device)
            .await;

        assert!(matches!(result, Err(FotaError::InvalidResponse(_))));
        assert_eq!(flash.begin_calls, 0);
    }

    #[tokio::test]
    async fn test_bad_status_is_invalid_response() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/fw.bin")
            .with_status(404)
            .create_async()
            .await;
        let mut flash = MemoryFlash::with_capacity(1024);
        let device = RecordingRestart::default();

        let result = installer()
            .install(&format!("{}/fw.bin", server.url()), &mut flash, &device)
            .await;

        assert!(matches!(result, Err(FotaError::InvalidResponse(_))));
        assert_eq!(flash.begin_calls, 0);
    }

    #[tokio::test]
    async fn test_commit_failure_keeps_running() {
        let mut server = Server::new_async().await;
        let _mock = serve_image(&mut server, OCTET_STREAM).await;
        let mut flash = MemoryFlash::with_capacity(1024);
        flash.fail_end = true;
        let device = RecordingRestart::default();

        let result = installer()
            .install(&format!("{}/fw.bin", server.url()), &mut flash, &device)
            .await;

        assert!(matches!(result, Err(FotaError::FlashCommitFailed { .. })));
        assert_eq!(flash.end_calls, 1);
        assert_eq!(device.calls(), 0);
    }

    #[tokio::test]
    async fn test_commit_not_finished_is_reported() {
        let mut server = Server::new_async().await;
        let _mock = serve_image(&mut server, OCTET_STREAM).await;
        let mut flash = MemoryFlash::with_capacity(1024);
        flash.unfinished = true;
        let device = RecordingRestart::default();

        let result = installer()
            .install(&format!("{}/fw.bin", server.url()), &mut flash, &device)
            .await;

        assert!(matches!(result, Err(FotaError::UpdateNotFinished)));
        assert_eq!(device.calls(), 0);
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let mut flash = MemoryFlash::with_capacity(1024);
        let device = RecordingRestart::default();

        let result = installer()
            .install(&format!("http://127.0.0.1:{port}/fw.bin"), &mut flash, &device)
            .await;

        assert!(matches!(result, Err(FotaError::ConnectionFailed(_))));
        assert_eq!(flash.begin_calls, 0);
    }

    #[tokio::test]
    async fn test_download_sends_source_headers() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/fw.bin")
            .match_header("authorization", "Bearer test-token")
            .match_header("accept", "application/vnd.github.v3.raw")
            .with_status(200)
            .with_header("content-type", OCTET_STREAM)
            .with_body(IMAGE)
            .create_async()
            .await;
        let mut flash = MemoryFlash::with_capacity(1024);
        let device = RecordingRestart::default();

        let installer =
            FirmwareInstaller::new(Client::new(), SourceAuth::authenticated("test-token"));
        installer
            .install(&format!("{}/fw.bin", server.url()), &mut flash, &device)
            .await
            .unwrap();

        mock.assert_async().await;
    }
}
