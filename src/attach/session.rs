use super::error::ValidationError;
use super::orchestrator::{Outcome, UploadOrchestrator};
use super::preview::PreviewCoordinator;
use super::schema::{SelectionBatch, UploadContext};
use super::validate::{validate, ValidationRules};
use std::sync::Arc;
use tracing::debug;

const UPLOAD_FAILED_NOTICE: &str = "Error uploading files. Please try again.";

/// What happened to one selection.
#[derive(Debug)]
pub enum AttachResult {
    /// Validation failed; nothing was sent.
    Rejected(ValidationError),
    /// Nothing was selected; nothing was sent.
    Empty,
    Uploaded(Outcome),
}

impl AttachResult {
    /// Text to show the user, if any. Upload failures of every kind collapse
    /// into one retryable notice.
    pub fn notice(&self) -> Option<String> {
        match self {
            Self::Rejected(ValidationError::FileTooLarge { limit, .. }) => Some(format!(
                "File is too large. Please upload a file smaller than {}.",
                human_size(*limit)
            )),
            Self::Uploaded(Outcome::Failed { .. }) => Some(UPLOAD_FAILED_NOTICE.to_string()),
            Self::Empty | Self::Uploaded(Outcome::Succeeded { .. } | Outcome::Skipped) => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Uploaded(outcome) if outcome.is_success())
    }
}

fn human_size(bytes: u64) -> String {
    const MIB: u64 = 1024 * 1024;
    const KIB: u64 = 1024;
    if bytes >= MIB && bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else if bytes >= KIB && bytes % KIB == 0 {
        format!("{}KB", bytes / KIB)
    } else {
        format!("{bytes} bytes")
    }
}

/// One attachment surface: a preview pane and an upload button sharing the
/// same selection.
pub struct AttachSession {
    rules: ValidationRules,
    orchestrator: Arc<UploadOrchestrator>,
    preview: PreviewCoordinator,
}

impl AttachSession {
    pub fn new(
        rules: ValidationRules,
        orchestrator: Arc<UploadOrchestrator>,
        preview: PreviewCoordinator,
    ) -> Self {
        Self {
            rules,
            orchestrator,
            preview,
        }
    }

    pub fn orchestrator(&self) -> &UploadOrchestrator {
        &self.orchestrator
    }

    pub fn preview(&self) -> &PreviewCoordinator {
        &self.preview
    }

    /// Handle a fresh selection: show it in the preview, validate it, and
    /// upload it if anything is left to send.
    pub async fn select(&self, batch: SelectionBatch, context: &UploadContext) -> AttachResult {
        self.preview.load_batch(&batch);

        let validated = match validate(batch, &self.rules) {
            Ok(validated) => validated,
            Err(err) => return AttachResult::Rejected(err),
        };
        if validated.batch().is_empty() {
            debug!(batch = %validated.batch().id(), "empty selection, nothing to upload");
            return AttachResult::Empty;
        }
        AttachResult::Uploaded(self.orchestrator.submit(validated, context).await)
    }
}
