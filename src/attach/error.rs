use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Failures while turning picked paths into a selection batch.
#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The picker filter would never have offered this file.
    #[error("{path} is not an accepted file type")]
    NotAccepted { path: PathBuf },
}

/// A batch failed the acceptance rules and was discarded as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("file #{index} ({name}) is {size} bytes, over the {limit}-byte limit")]
    FileTooLarge {
        index: usize,
        name: String,
        size: u64,
        limit: u64,
    },
}

impl ValidationError {
    /// Stable machine-readable reason code.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::FileTooLarge { .. } => "file_too_large",
        }
    }

    /// Position of the first offending file in the batch.
    pub fn index(&self) -> usize {
        match self {
            Self::FileTooLarge { index, .. } => *index,
        }
    }
}

/// Errors raised by a [`Transport`](super::transport::Transport).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("request failed: {0}")]
    Request(String),

    #[error("invalid multipart part: {0}")]
    Encode(String),

    /// A picked file could not be read while the body was assembled.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Request(err.to_string())
        }
    }
}

/// Why an upload attempt ended without success.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("an upload is already in flight")]
    Busy,

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("server rejected the upload: {reason}")]
    ServerRejected { status: u16, reason: String },
}

impl UploadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Busy => ErrorKind::Busy,
            Self::Transport(_) => ErrorKind::TransportError,
            Self::ServerRejected { .. } => ErrorKind::ServerRejected,
        }
    }
}

/// Coarse failure category of an upload, preserved for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Busy,
    TransportError,
    ServerRejected,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Busy => "busy",
            Self::TransportError => "transport_error",
            Self::ServerRejected => "server_rejected",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Preview failures. Resolution errors are scoped to a single file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreviewError {
    #[error("could not open file #{index} for preview: {reason}")]
    Resolution { index: usize, reason: String },

    #[error("page {page} of file #{index} is out of range (resolved pages: {available:?})")]
    PageOutOfRange {
        index: usize,
        page: u32,
        available: Option<u32>,
    },

    #[error("{media_type} has no paginated preview")]
    Unsupported { media_type: String },

    /// The position is empty, or holds a different file, in the current selection.
    #[error("file #{index} is not part of the current selection")]
    NotInSelection { index: usize },

    /// The selection was replaced while this resolution was running.
    #[error("selection was replaced")]
    Stale,
}

impl PreviewError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Resolution { .. } => "preview_resolution",
            Self::PageOutOfRange { .. } => "page_out_of_range",
            Self::Unsupported { .. } => "unsupported",
            Self::NotInSelection { .. } => "not_in_selection",
            Self::Stale => "stale",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_use_stable_codes() {
        assert_eq!(UploadError::Busy.kind().as_str(), "busy");
        assert_eq!(
            UploadError::Transport(TransportError::Timeout).kind().to_string(),
            "transport_error"
        );
        let rejected = UploadError::ServerRejected {
            status: 500,
            reason: "boom".into(),
        };
        assert_eq!(rejected.kind(), ErrorKind::ServerRejected);
    }

    #[test]
    fn validation_error_reports_reason_and_index() {
        let err = ValidationError::FileTooLarge {
            index: 2,
            name: "scan.pdf".into(),
            size: 10,
            limit: 5,
        };
        assert_eq!(err.reason(), "file_too_large");
        assert_eq!(err.index(), 2);
        assert!(err.to_string().contains("scan.pdf"));
    }

    #[test]
    fn out_of_range_has_kind_code() {
        let err = PreviewError::PageOutOfRange {
            index: 0,
            page: 9,
            available: Some(3),
        };
        assert_eq!(err.kind(), "page_out_of_range");
    }
}
