//! Attachments: selecting, previewing and uploading files for a conversation.
//!
//! A selection flows selection → validate → orchestrator → notifier. The
//! preview coordinator watches the same selection but never gates an upload.

pub mod engine;
pub mod error;
pub mod notifier;
pub mod orchestrator;
pub mod preview;
pub mod schema;
pub mod selection;
pub mod session;
pub mod transport;
pub mod validate;

pub use engine::{BuiltinEngine, DocumentEngine};
pub use error::{
    ErrorKind, PreviewError, SelectionError, TransportError, UploadError, ValidationError,
};
pub use notifier::{LogNotifier, UploadNotifier};
pub use orchestrator::{LastOutcome, Outcome, UploadOrchestrator, UploadTarget};
pub use preview::{PreviewCoordinator, PreviewEntry, PreviewIndex};
pub use schema::{
    BatchId, FileContent, FileId, FileItem, RenderableUnit, SelectionBatch, UploadContext,
    UploadReceipt, UploadState, ValidatedBatch,
};
pub use selection::{AcceptList, FileSelection};
pub use session::{AttachResult, AttachSession};
pub use transport::{
    CredentialsPolicy, FormPart, HttpTransport, ServerReply, Transport, TransportResponse,
    UploadRequest,
};
pub use validate::{validate, ValidationRules, DEFAULT_MAX_FILE_SIZE};
