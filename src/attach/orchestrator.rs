//! Upload state machine.
//!
//! One orchestrator drives at most one upload at a time:
//!
//! ```text
//! Idle --submit--> Uploading --ok--------> Succeeded --> Idle  (notifier fires)
//!                            --not ok----> Failed    --> Idle
//!                            --transport-> Failed    --> Idle
//! ```
//!
//! `Uploading` is the only busy state. A `submit` while `Uploading` fails
//! with [`UploadError::Busy`] on its first poll and never reaches the
//! transport; a `submit` from `Succeeded` or `Failed` (e.g. from inside the
//! notifier) starts a new attempt, and the older attempt's cleanup leaves it
//! alone. Failures are terminal for the batch: there is no retry and no
//! cancellation, the user re-selects to try again.

use super::error::UploadError;
use super::notifier::UploadNotifier;
use super::schema::{UploadContext, UploadReceipt, UploadState, ValidatedBatch};
use super::transport::{CredentialsPolicy, FormPart, ServerReply, Transport, UploadRequest};
use parking_lot::Mutex;
use reqwest::Method;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Terminal result of one upload attempt.
#[derive(Debug)]
pub enum Outcome {
    Succeeded { receipt: UploadReceipt },
    Failed { error: UploadError },
    /// The batch was empty. Nothing was sent and the state did not move.
    Skipped,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    pub fn error(&self) -> Option<&UploadError> {
        match self {
            Self::Failed { error } => Some(error),
            Self::Succeeded { .. } | Self::Skipped => None,
        }
    }
}

/// Summary of the last terminal outcome, kept for observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LastOutcome {
    Succeeded,
    Failed(super::error::ErrorKind),
}

/// Where and how uploads are sent.
#[derive(Debug, Clone)]
pub struct UploadTarget {
    pub endpoint: String,
    /// Shared field name for every file of a batch.
    pub file_field: String,
    /// Field carrying the conversation id.
    pub context_field: String,
    pub credentials: CredentialsPolicy,
}

impl UploadTarget {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            file_field: "file".into(),
            context_field: "chat_id".into(),
            credentials: CredentialsPolicy::Include,
        }
    }

    /// Assemble the whole batch into one request, files first in selection
    /// order, then the context fields.
    fn request_for(&self, batch: ValidatedBatch, context: &UploadContext) -> UploadRequest {
        let mut parts: Vec<FormPart> = batch
            .into_inner()
            .into_files()
            .into_iter()
            .map(|file| FormPart::File {
                field: self.file_field.clone(),
                content: file.content().clone(),
                filename: file.name,
                media_type: file.media_type,
            })
            .collect();
        parts.push(FormPart::Text {
            field: self.context_field.clone(),
            value: context.conversation_id.clone(),
        });
        parts.extend(context.extra.iter().map(|(field, value)| FormPart::Text {
            field: field.clone(),
            value: value.clone(),
        }));
        UploadRequest {
            endpoint: self.endpoint.clone(),
            method: Method::POST,
            parts,
            credentials: self.credentials,
        }
    }
}

/// Puts the state back to `Idle` when an attempt ends, including when the
/// submitting future is dropped mid-flight. A newer attempt is left alone.
struct InFlight<'a> {
    orchestrator: &'a UploadOrchestrator,
    attempt: u64,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let attempt = self.attempt;
        let current = &self.orchestrator.attempt;
        self.orchestrator.state.send_if_modified(|state| {
            if current.load(Ordering::SeqCst) == attempt && *state != UploadState::Idle {
                *state = UploadState::Idle;
                true
            } else {
                false
            }
        });
    }
}

pub struct UploadOrchestrator {
    transport: Arc<dyn Transport>,
    notifier: Arc<dyn UploadNotifier>,
    target: UploadTarget,
    state: watch::Sender<UploadState>,
    /// Bumped on every claim, only while the state lock is held.
    attempt: AtomicU64,
    last: Mutex<Option<LastOutcome>>,
}

impl UploadOrchestrator {
    pub fn new(
        transport: Arc<dyn Transport>,
        notifier: Arc<dyn UploadNotifier>,
        target: UploadTarget,
    ) -> Self {
        let (state, _) = watch::channel(UploadState::Idle);
        Self {
            transport,
            notifier,
            target,
            state,
            attempt: AtomicU64::new(0),
            last: Mutex::new(None),
        }
    }

    pub fn state(&self) -> UploadState {
        *self.state.borrow()
    }

    /// True only while an upload is in flight.
    pub fn is_busy(&self) -> bool {
        self.state().is_busy()
    }

    /// Observe state transitions. Receivers see the latest value, so short
    /// lived `Succeeded`/`Failed` states may be coalesced into `Idle`.
    pub fn subscribe(&self) -> watch::Receiver<UploadState> {
        self.state.subscribe()
    }

    pub fn last_outcome(&self) -> Option<LastOutcome> {
        self.last.lock().clone()
    }

    /// Upload a validated batch in a single request.
    ///
    /// The batch is taken by value and encoded before the first await, so a
    /// later selection cannot change what is sent. An empty batch returns
    /// [`Outcome::Skipped`] without touching the state or the transport.
    pub async fn submit(&self, batch: ValidatedBatch, context: &UploadContext) -> Outcome {
        let batch_id = batch.batch().id();
        if batch.batch().is_empty() {
            debug!(batch = %batch_id, "empty batch, nothing to upload");
            return Outcome::Skipped;
        }

        let mut attempt = None;
        self.state.send_if_modified(|state| {
            if state.is_busy() {
                return false;
            }
            *state = UploadState::Uploading;
            attempt = Some(self.attempt.fetch_add(1, Ordering::SeqCst) + 1);
            true
        });
        let Some(attempt) = attempt else {
            debug!(batch = %batch_id, "submit refused: upload already in flight");
            return Outcome::Failed {
                error: UploadError::Busy,
            };
        };
        let _guard = InFlight {
            orchestrator: self,
            attempt,
        };

        let files = batch.batch().len();
        let request = self.target.request_for(batch, context);
        info!(batch = %batch_id, files, endpoint = %request.endpoint, "upload started");

        let outcome = match self.transport.perform_request(request).await {
            Ok(response) => match ServerReply::parse(&response) {
                ServerReply::Accepted { receipt } => Outcome::Succeeded { receipt },
                ServerReply::Rejected { status, reason } => Outcome::Failed {
                    error: UploadError::ServerRejected { status, reason },
                },
            },
            Err(err) => Outcome::Failed { error: err.into() },
        };

        match &outcome {
            Outcome::Succeeded { .. } => {
                self.finish(attempt, UploadState::Succeeded, LastOutcome::Succeeded);
                info!(batch = %batch_id, "upload succeeded");
                self.notifier.upload_succeeded();
            }
            Outcome::Failed { error } => {
                self.finish(attempt, UploadState::Failed, LastOutcome::Failed(error.kind()));
                warn!(batch = %batch_id, kind = %error.kind(), error = %error, "upload failed");
            }
            Outcome::Skipped => {}
        }
        outcome
    }

    fn finish(&self, attempt: u64, terminal: UploadState, last: LastOutcome) {
        *self.last.lock() = Some(last);
        self.state.send_if_modified(|state| {
            if self.attempt.load(Ordering::SeqCst) == attempt {
                *state = terminal;
                true
            } else {
                false
            }
        });
    }
}
