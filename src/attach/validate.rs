use super::error::ValidationError;
use super::schema::{SelectionBatch, ValidatedBatch};
use super::selection::AcceptList;
use tracing::warn;

/// Default per-file ceiling: 5 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 5 * 1024 * 1024;

/// Acceptance rules applied before anything is queued for upload.
#[derive(Debug, Clone)]
pub struct ValidationRules {
    pub max_file_size_bytes: u64,
    /// Restricts the picker only. Not checked by [`validate`].
    pub accepted_media_types: AcceptList,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE,
            accepted_media_types: AcceptList::default(),
        }
    }
}

/// Check every file against the size ceiling. The first oversized file
/// rejects the whole batch; there is no partial acceptance.
pub fn validate(
    batch: SelectionBatch,
    rules: &ValidationRules,
) -> Result<ValidatedBatch, ValidationError> {
    let limit = rules.max_file_size_bytes;
    if let Some((index, file)) = batch
        .files()
        .iter()
        .enumerate()
        .find(|(_, f)| f.size_bytes > limit)
    {
        warn!(
            batch = %batch.id(),
            index,
            file = %file.name,
            size = file.size_bytes,
            limit,
            "selection rejected: file too large"
        );
        return Err(ValidationError::FileTooLarge {
            index,
            name: file.name.clone(),
            size: file.size_bytes,
            limit,
        });
    }
    Ok(ValidatedBatch::new(batch))
}
