//! Background export worker.
//!
//! The worker owns one export at a time and talks to its caller purely
//! through messages, so the caller's event loop never blocks on encoding:
//!
//! ```text
//! caller ── ExportCommand ──►  worker task  ── ExportResponse ──► caller
//!           StartExport                        Started
//!           AbortExport                        Progress*
//!                                              Complete | Error | Aborted
//! ```
//!
//! Every accepted `StartExport` ends with exactly one terminal response.
//! A `StartExport` that arrives while an export is running is rejected
//! with a recoverable `Error` and does not disturb the running export.
//! That rejection is not terminal; see [`ExportResponse::is_rejected_start`].

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use reelcut_common::error::{ReelcutError, ReelcutResult};
use reelcut_media_model::ExportProgress;

use crate::backend::MediaBackend;
use crate::pipeline::{run_export, ExportEvent, ExportOutcome, ExportRequest, ExportSettings};

/// Messages accepted by the worker.
#[derive(Debug, Clone)]
pub enum ExportCommand {
    StartExport(ExportRequest),
    AbortExport,
}

/// Messages emitted by the worker.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportResponse {
    Started {
        estimated_frames: usize,
        has_audio: bool,
    },
    Progress(ExportProgress),
    Complete {
        container_bytes: Bytes,
        filename: String,
        duration_ms: u64,
    },
    Error {
        message: String,
        recoverable: bool,
    },
    Aborted,
}

impl ExportResponse {
    /// Whether this response ends the export it belongs to.
    ///
    /// A rejected concurrent start is not terminal: the running export
    /// continues and still ends with its own terminal response.
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Complete { .. } | Self::Aborted => true,
            Self::Error { .. } => !self.is_rejected_start(),
            Self::Started { .. } | Self::Progress(_) => false,
        }
    }

    /// Whether this is the `Error` sent for a `StartExport` that arrived
    /// while another export was running.
    pub fn is_rejected_start(&self) -> bool {
        match self {
            Self::Error { message, .. } => *message == ReelcutError::ExportInProgress.to_string(),
            _ => false,
        }
    }

    fn from_error(err: ReelcutError) -> Self {
        let err = err.classify();
        Self::Error {
            message: err.to_string(),
            recoverable: err.is_recoverable(),
        }
    }
}

impl From<ExportEvent> for ExportResponse {
    fn from(event: ExportEvent) -> Self {
        match event {
            ExportEvent::Started {
                estimated_frames,
                has_audio,
            } => Self::Started {
                estimated_frames,
                has_audio,
            },
            ExportEvent::Progress(progress) => Self::Progress(progress),
        }
    }
}

/// Caller's side of a running worker.
pub struct ExportWorkerHandle {
    commands: mpsc::UnboundedSender<ExportCommand>,
    responses: mpsc::UnboundedReceiver<ExportResponse>,
    task: JoinHandle<()>,
}

impl ExportWorkerHandle {
    pub fn send(&self, command: ExportCommand) -> ReelcutResult<()> {
        self.commands
            .send(command)
            .map_err(|_| ReelcutError::Other(anyhow::anyhow!("export worker has stopped")))
    }

    pub fn start(&self, request: ExportRequest) -> ReelcutResult<()> {
        self.send(ExportCommand::StartExport(request))
    }

    pub fn abort(&self) -> ReelcutResult<()> {
        self.send(ExportCommand::AbortExport)
    }

    /// Next response, or `None` once the worker has stopped.
    pub async fn recv(&mut self) -> Option<ExportResponse> {
        self.responses.recv().await
    }

    /// Stop accepting commands and wait for the worker to exit.
    pub async fn shutdown(self) {
        let Self {
            commands,
            responses,
            task,
        } = self;
        drop(commands);
        drop(responses);
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "Export worker panicked");
        }
    }
}

/// Spawn a worker on the current Tokio runtime.
pub fn spawn_export_worker(
    backend: Arc<dyn MediaBackend>,
    settings: ExportSettings,
) -> ExportWorkerHandle {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (response_tx, response_rx) = mpsc::unbounded_channel();

    let worker = ExportWorker {
        backend,
        settings,
        responses: response_tx,
    };
    let task = tokio::spawn(worker.run(command_rx));

    ExportWorkerHandle {
        commands: command_tx,
        responses: response_rx,
        task,
    }
}

struct ExportWorker {
    backend: Arc<dyn MediaBackend>,
    settings: ExportSettings,
    responses: mpsc::UnboundedSender<ExportResponse>,
}

impl ExportWorker {
    async fn run(self, mut commands: mpsc::UnboundedReceiver<ExportCommand>) {
        tracing::debug!(backend = self.backend.name(), "export worker started");

        while let Some(command) = commands.recv().await {
            match command {
                ExportCommand::StartExport(request) => self.export(request, &mut commands).await,
                ExportCommand::AbortExport => {
                    tracing::debug!("Abort received with no export running");
                }
            }
        }

        tracing::debug!("export worker stopped");
    }

    fn respond(&self, response: ExportResponse) {
        // The caller may have dropped its receiver; the export still runs
        // to its end so codecs get closed.
        let _ = self.responses.send(response);
    }

    /// Run one export while still serving commands.
    async fn export(
        &self,
        request: ExportRequest,
        commands: &mut mpsc::UnboundedReceiver<ExportCommand>,
    ) {
        let cancel = CancellationToken::new();
        let responses = self.responses.clone();
        let on_event = move |event: ExportEvent| {
            let _ = responses.send(ExportResponse::from(event));
        };

        let export = run_export(
            self.backend.as_ref(),
            request,
            &self.settings,
            &cancel,
            &on_event,
        );
        tokio::pin!(export);

        let result = loop {
            tokio::select! {
                result = &mut export => break result,
                Some(command) = commands.recv() => match command {
                    ExportCommand::StartExport(_) => {
                        tracing::warn!("Rejected export request while another is running");
                        self.respond(ExportResponse::from_error(ReelcutError::ExportInProgress));
                    }
                    ExportCommand::AbortExport => {
                        tracing::info!("Abort requested");
                        cancel.cancel();
                    }
                },
            }
        };

        let response = match result {
            Ok(ExportOutcome::Complete(artifact)) => ExportResponse::Complete {
                container_bytes: artifact.container_bytes,
                filename: artifact.filename,
                duration_ms: artifact.duration_ms,
            },
            Ok(ExportOutcome::Aborted) => ExportResponse::Aborted,
            Err(e) => ExportResponse::from_error(e),
        };
        self.respond(response);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_responses() {
        assert!(ExportResponse::Aborted.is_terminal());
        assert!(ExportResponse::Error {
            message: "x".to_string(),
            recoverable: false
        }
        .is_terminal());
        assert!(ExportResponse::Error {
            message: "Decode error: bitstream corrupted".to_string(),
            recoverable: true
        }
        .is_terminal());
        assert!(!ExportResponse::Started {
            estimated_frames: 1,
            has_audio: false
        }
        .is_terminal());
    }

    #[test]
    fn test_rejected_start_is_not_terminal() {
        let rejection = ExportResponse::from_error(ReelcutError::ExportInProgress);
        assert!(rejection.is_rejected_start());
        assert!(!rejection.is_terminal());

        let decode = ExportResponse::from_error(ReelcutError::decode("bad slice"));
        assert!(!decode.is_rejected_start());
        assert!(decode.is_terminal());
    }

    #[test]
    fn test_error_response_carries_recoverability() {
        let response = ExportResponse::from_error(ReelcutError::ExportInProgress);
        assert_eq!(
            response,
            ExportResponse::Error {
                message: "An export is already in progress".to_string(),
                recoverable: true
            }
        );

        let oom = ReelcutError::Other(anyhow::anyhow!("memory allocation of 8 GiB failed"));
        let ExportResponse::Error {
            message,
            recoverable,
        } = ExportResponse::from_error(oom)
        else {
            panic!("expected an error response");
        };
        assert!(message.starts_with("Resource exhausted"));
        assert!(!recoverable);
    }
}
