use serde::Deserialize;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use uuid::Uuid;

/// Where a picked file's bytes live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
    Memory(Arc<[u8]>),
    /// Read on demand, so oversized picks are rejected before they are loaded.
    Disk(PathBuf),
}

impl FileContent {
    /// Load the bytes. In-memory content is shared, not copied.
    pub async fn bytes(&self) -> io::Result<Arc<[u8]>> {
        match self {
            Self::Memory(data) => Ok(Arc::clone(data)),
            Self::Disk(path) => Ok(Arc::from(fs::read(path).await?)),
        }
    }
}

/// Identity of one picked file. Clones of a [`FileItem`] share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(Uuid);

impl FileId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// A single picked file. Immutable once selected, so two items are equal
/// exactly when one is a clone of the other.
#[derive(Debug, Clone)]
pub struct FileItem {
    pub name: String,
    pub media_type: String,
    pub size_bytes: u64,
    id: FileId,
    content: FileContent,
}

impl FileItem {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, data: Vec<u8>) -> Self {
        let size_bytes = data.len() as u64;
        Self {
            name: name.into(),
            media_type: media_type.into(),
            size_bytes,
            id: FileId::new(),
            content: FileContent::Memory(Arc::from(data)),
        }
    }

    /// A file whose size is known from metadata and whose bytes stay on disk
    /// until something needs them.
    pub fn on_disk(
        name: impl Into<String>,
        media_type: impl Into<String>,
        path: impl Into<PathBuf>,
        size_bytes: u64,
    ) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            size_bytes,
            id: FileId::new(),
            content: FileContent::Disk(path.into()),
        }
    }

    pub fn id(&self) -> FileId {
        self.id
    }

    pub fn content(&self) -> &FileContent {
        &self.content
    }

    pub async fn bytes(&self) -> io::Result<Arc<[u8]>> {
        self.content.bytes().await
    }
}

impl PartialEq for FileItem {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for FileItem {}

/// Identifies one selection event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchId(Uuid);

impl BatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Files from one selection event, in display order.
#[derive(Debug, Clone)]
pub struct SelectionBatch {
    id: BatchId,
    files: Vec<FileItem>,
}

impl SelectionBatch {
    pub fn new(files: Vec<FileItem>) -> Self {
        Self {
            id: BatchId::new(),
            files,
        }
    }

    pub fn id(&self) -> BatchId {
        self.id
    }

    pub fn files(&self) -> &[FileItem] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn into_files(self) -> Vec<FileItem> {
        self.files
    }
}

/// A batch that passed validation. Only the validator can construct one.
#[derive(Debug, Clone)]
pub struct ValidatedBatch(SelectionBatch);

impl ValidatedBatch {
    pub(crate) fn new(batch: SelectionBatch) -> Self {
        Self(batch)
    }

    pub fn batch(&self) -> &SelectionBatch {
        &self.0
    }

    pub fn into_inner(self) -> SelectionBatch {
        self.0
    }
}

/// Metadata sent with an upload request (not the file bytes themselves).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadContext {
    pub conversation_id: String,
    /// Extra form fields, appended after the conversation id.
    pub extra: Vec<(String, String)>,
}

impl UploadContext {
    pub fn for_conversation(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            extra: Vec::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.push((name.into(), value.into()));
        self
    }
}

/// Orchestrator state. `Uploading` is the only busy state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadState {
    #[default]
    Idle,
    Uploading,
    Succeeded,
    Failed,
}

impl UploadState {
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Uploading)
    }
}

/// What the server said about a successful upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UploadReceipt {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub processed_text: Option<String>,
}

/// One rendered preview page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderableUnit {
    Text { page: u32, body: String },
    Image { data_uri: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_item_size_follows_data() {
        let item = FileItem::new("a.txt", "text/plain", vec![0; 42]);
        assert_eq!(item.size_bytes, 42);
        assert_eq!(item.bytes().await.unwrap().len(), 42);
    }

    #[tokio::test]
    async fn disk_content_is_read_on_demand() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late.txt");
        let item = FileItem::on_disk("late.txt", "text/plain", &path, 5);
        assert!(item.bytes().await.is_err());

        std::fs::write(&path, "hello").unwrap();
        assert_eq!(&*item.bytes().await.unwrap(), b"hello");
    }

    #[test]
    fn clones_share_identity() {
        let item = FileItem::new("a.txt", "text/plain", b"a".to_vec());
        let same_bytes = FileItem::new("a.txt", "text/plain", b"a".to_vec());
        assert_eq!(item.clone(), item);
        assert_ne!(same_bytes, item);
    }

    #[test]
    fn batches_get_distinct_ids() {
        let a = SelectionBatch::new(Vec::new());
        let b = SelectionBatch::new(Vec::new());
        assert_ne!(a.id(), b.id());
        assert!(a.is_empty());
    }

    #[test]
    fn only_uploading_is_busy() {
        assert!(UploadState::Uploading.is_busy());
        assert!(!UploadState::Idle.is_busy());
        assert!(!UploadState::Succeeded.is_busy());
        assert!(!UploadState::Failed.is_busy());
    }
}
