//! Picker side of attaching files: the accept filter and batch construction.
//!
//! The accept list only shapes what the picker offers. It is not a security
//! boundary and the validator never re-checks it.

use super::error::SelectionError;
use super::schema::{FileItem, SelectionBatch};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
enum AcceptEntry {
    Extension(String),
    MediaType(String),
    Wildcard(String),
}

/// Parsed picker allow-list, e.g. `".pdf, .txt, image/*"`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcceptList {
    entries: Vec<AcceptEntry>,
}

impl AcceptList {
    pub fn parse(list: &str) -> Self {
        let entries = list
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .map(|s| {
                if let Some(ext) = s.strip_prefix('.') {
                    AcceptEntry::Extension(ext.to_string())
                } else if let Some(major) = s.strip_suffix("/*") {
                    AcceptEntry::Wildcard(format!("{major}/"))
                } else {
                    AcceptEntry::MediaType(s)
                }
            })
            .collect();
        Self { entries }
    }

    /// An empty list accepts everything.
    pub fn permits(&self, filename: &str, media_type: &str) -> bool {
        if self.entries.is_empty() {
            return true;
        }
        let ext = extension_of(filename);
        let media_type = media_type.to_lowercase();
        self.entries.iter().any(|entry| match entry {
            AcceptEntry::Extension(e) => ext.as_deref() == Some(e.as_str()),
            AcceptEntry::MediaType(m) => *m == media_type,
            AcceptEntry::Wildcard(prefix) => media_type.starts_with(prefix.as_str()),
        })
    }
}

/// Builds selection batches from picked files.
#[derive(Debug, Clone, Default)]
pub struct FileSelection {
    accept: AcceptList,
}

impl FileSelection {
    pub fn new(accept: AcceptList) -> Self {
        Self { accept }
    }

    /// Stat every path in order. Any missing or filtered path fails the
    /// whole selection. Only sizes are read here; the bytes stay on disk
    /// until a preview or an upload needs them.
    pub async fn from_paths<P: AsRef<Path>>(
        &self,
        paths: &[P],
    ) -> Result<SelectionBatch, SelectionError> {
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            let media_type = guess_mime_type(&name);
            if !self.accept.permits(&name, &media_type) {
                return Err(SelectionError::NotAccepted {
                    path: path.to_path_buf(),
                });
            }
            let metadata = fs::metadata(path).await.map_err(|source| SelectionError::Read {
                path: PathBuf::from(path),
                source,
            })?;
            if !metadata.is_file() {
                return Err(SelectionError::Read {
                    path: PathBuf::from(path),
                    source: io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
                });
            }
            files.push(FileItem::on_disk(name, media_type, path, metadata.len()));
        }
        let batch = SelectionBatch::new(files);
        debug!(batch = %batch.id(), files = batch.len(), "files selected");
        Ok(batch)
    }

    /// Wrap already-loaded items. Like [`from_paths`](Self::from_paths), an
    /// item the picker would not offer fails the whole selection.
    pub fn from_items(&self, items: Vec<FileItem>) -> Result<SelectionBatch, SelectionError> {
        if let Some(item) = items
            .iter()
            .find(|f| !self.accept.permits(&f.name, &f.media_type))
        {
            return Err(SelectionError::NotAccepted {
                path: PathBuf::from(&item.name),
            });
        }
        Ok(SelectionBatch::new(items))
    }
}

fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
}

/// Guess MIME type from filename extension.
pub fn guess_mime_type(filename: &str) -> String {
    let ext = extension_of(filename).unwrap_or_default();
    match ext.as_str() {
        "txt" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "csv" => "text/csv",
        "json" => "application/json",
        "xml" => "application/xml",
        "html" | "htm" => "text/html",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "m4a" => "audio/mp4",
        "mp4" => "video/mp4",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        _ => "application/octet-stream",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attach::schema::FileContent;

    const PICKER: &str =
        ".pdf, .docx, .doc, .txt, .csv, .jpg, .jpeg, .png,  .mp4, .avi, .mov, .wav, .mp3, .m4a";

    #[test]
    fn accept_list_matches_extensions_case_insensitively() {
        let accept = AcceptList::parse(PICKER);
        assert!(accept.permits("Report.PDF", "application/pdf"));
        assert!(accept.permits("notes.txt", "text/plain"));
        assert!(!accept.permits("setup.exe", "application/octet-stream"));
        assert!(!accept.permits("noext", "application/octet-stream"));
    }

    #[test]
    fn accept_list_supports_media_types_and_wildcards() {
        let accept = AcceptList::parse("image/*, application/json");
        assert!(accept.permits("x.bin", "image/png"));
        assert!(accept.permits("x.bin", "application/json"));
        assert!(!accept.permits("x.bin", "text/plain"));
    }

    #[test]
    fn empty_accept_list_permits_everything() {
        let accept = AcceptList::parse("  ,  ");
        assert!(accept.permits("anything.xyz", "application/octet-stream"));
    }

    #[test]
    fn guesses_common_types() {
        assert_eq!(guess_mime_type("a.pdf"), "application/pdf");
        assert_eq!(guess_mime_type("b.JPG"), "image/jpeg");
        assert_eq!(guess_mime_type("c.unknown"), "application/octet-stream");
    }

    #[tokio::test]
    async fn from_paths_preserves_order_and_defers_reading() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("b.txt");
        let b = dir.path().join("a.csv");
        std::fs::write(&a, "hello").unwrap();
        std::fs::write(&b, "x,y\n1,2\n").unwrap();

        let selection = FileSelection::new(AcceptList::parse(PICKER));
        let batch = selection.from_paths(&[&a, &b]).await.unwrap();

        let names: Vec<_> = batch.files().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["b.txt", "a.csv"]);
        assert_eq!(batch.files()[0].size_bytes, 5);
        assert!(matches!(batch.files()[0].content(), FileContent::Disk(p) if *p == a));
        assert_eq!(&*batch.files()[0].bytes().await.unwrap(), b"hello");
        assert_eq!(batch.files()[1].media_type, "text/csv");
    }

    #[tokio::test]
    async fn from_paths_refuses_filtered_types() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tool.exe");
        std::fs::write(&path, [0u8; 4]).unwrap();

        let selection = FileSelection::new(AcceptList::parse(PICKER));
        let err = selection.from_paths(&[&path]).await.unwrap_err();
        assert!(matches!(err, SelectionError::NotAccepted { .. }));
    }

    #[tokio::test]
    async fn from_paths_reports_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.txt");

        let err = FileSelection::default()
            .from_paths(&[&path])
            .await
            .unwrap_err();
        assert!(matches!(err, SelectionError::Read { .. }));
    }

    #[tokio::test]
    async fn from_paths_refuses_directories() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("folder.txt");
        std::fs::create_dir(&sub).unwrap();

        let err = FileSelection::default().from_paths(&[&sub]).await.unwrap_err();
        assert!(matches!(err, SelectionError::Read { .. }));
    }

    #[test]
    fn from_items_refuses_unoffered_files() {
        let selection = FileSelection::new(AcceptList::parse(".txt"));
        let err = selection
            .from_items(vec![
                FileItem::new("a.txt", "text/plain", b"a".to_vec()),
                FileItem::new("b.pdf", "application/pdf", b"b".to_vec()),
            ])
            .unwrap_err();
        assert!(matches!(
            err,
            SelectionError::NotAccepted { ref path } if path.as_os_str() == "b.pdf"
        ));
    }

    #[test]
    fn from_items_keeps_every_offered_file() {
        let selection = FileSelection::new(AcceptList::parse(".txt, .pdf"));
        let batch = selection
            .from_items(vec![
                FileItem::new("a.txt", "text/plain", b"a".to_vec()),
                FileItem::new("b.pdf", "application/pdf", b"b".to_vec()),
            ])
            .unwrap();
        let names: Vec<_> = batch.files().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["a.txt", "b.pdf"]);
    }
}
