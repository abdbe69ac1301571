//! Paginated previews for the current selection.
//!
//! Each file's page count is resolved by its own task and lands in the
//! [`PreviewIndex`] as soon as it finishes, in whatever order that happens.
//! One file failing only marks that file. Loading a new batch cancels every
//! resolution of the previous one, and a late completion is dropped instead
//! of being written into the new index.
//!
//! Previews never gate uploads; the two only share the selection.

use super::engine::DocumentEngine;
use super::error::PreviewError;
use super::schema::{BatchId, FileItem, RenderableUnit, SelectionBatch};
use futures_util::stream::{self, Stream, StreamExt};
use futures_util::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Resolution result for one file position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewEntry {
    Resolved(u32),
    Failed(PreviewError),
}

/// File position → resolved page count. Absent positions are still pending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreviewIndex {
    batch: Option<BatchId>,
    entries: BTreeMap<usize, PreviewEntry>,
}

impl PreviewIndex {
    fn for_batch(batch: BatchId) -> Self {
        Self {
            batch: Some(batch),
            entries: BTreeMap::new(),
        }
    }

    pub fn batch_id(&self) -> Option<BatchId> {
        self.batch
    }

    pub fn get(&self, index: usize) -> Option<&PreviewEntry> {
        self.entries.get(&index)
    }

    pub fn page_count(&self, index: usize) -> Option<u32> {
        match self.entries.get(&index) {
            Some(PreviewEntry::Resolved(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = (usize, &PreviewEntry)> {
        self.entries.iter().map(|(i, e)| (*i, e))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

struct Current {
    batch: BatchId,
    files: Arc<[FileItem]>,
    index: PreviewIndex,
    cancel: CancellationToken,
}

type Shared = Arc<Mutex<Option<Current>>>;

pub struct PreviewCoordinator {
    engine: Arc<dyn DocumentEngine>,
    current: Shared,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl PreviewCoordinator {
    pub fn new(engine: Arc<dyn DocumentEngine>) -> Self {
        Self {
            engine,
            current: Arc::new(Mutex::new(None)),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Replace the previewed selection and start resolving every file.
    /// Must be called from within a Tokio runtime.
    pub fn load_batch(&self, batch: &SelectionBatch) {
        let files: Arc<[FileItem]> = batch.files().to_vec().into();
        let cancel = CancellationToken::new();
        {
            let mut current = self.current.lock();
            if let Some(old) = current.take() {
                debug!(old = %old.batch, new = %batch.id(), "preview batch replaced");
                old.cancel.cancel();
            }
            *current = Some(Current {
                batch: batch.id(),
                files: Arc::clone(&files),
                index: PreviewIndex::for_batch(batch.id()),
                cancel: cancel.clone(),
            });
        }

        let mut tasks = self.tasks.lock();
        tasks.retain(|t| !t.is_finished());
        for (i, file) in files.iter().enumerate() {
            let engine = Arc::clone(&self.engine);
            let current = Arc::clone(&self.current);
            let cancel = cancel.clone();
            let file = file.clone();
            let batch_id = batch.id();
            tasks.push(tokio::spawn(async move {
                let _ = resolve(engine, current, batch_id, cancel, i, file).await;
            }));
        }
    }

    /// Forget the current selection and cancel its resolutions.
    pub fn clear(&self) {
        if let Some(old) = self.current.lock().take() {
            old.cancel.cancel();
        }
    }

    /// Resolve one file's page count. With a batch loaded, `file` must be the
    /// file at `file_index` in that batch and the result is recorded there;
    /// anything else is refused without touching the index.
    pub async fn resolve_page_count(
        &self,
        file_index: usize,
        file: &FileItem,
    ) -> Result<u32, PreviewError> {
        let target = self.current.lock().as_ref().map(|c| {
            let member = c.files.get(file_index) == Some(file);
            (c.batch, c.cancel.clone(), member)
        });
        match target {
            Some((batch, cancel, true)) => {
                resolve(
                    Arc::clone(&self.engine),
                    Arc::clone(&self.current),
                    batch,
                    cancel,
                    file_index,
                    file.clone(),
                )
                .await
            }
            Some((batch, _, false)) => {
                debug!(
                    batch = %batch,
                    file_index,
                    file = %file.name,
                    "file not in current selection"
                );
                Err(PreviewError::NotInSelection { index: file_index })
            }
            None => count_pages(self.engine.as_ref(), file_index, file).await,
        }
    }

    /// Render one page. Only pages in `1..=resolved_page_count` exist; asking
    /// for anything else, or for a file that has not resolved, is an error.
    pub async fn get_page(
        &self,
        file_index: usize,
        page: u32,
    ) -> Result<RenderableUnit, PreviewError> {
        let file = {
            let current = self.current.lock();
            let current = current.as_ref();
            let available = current.and_then(|c| c.index.page_count(file_index));
            let file = current.and_then(|c| c.files.get(file_index).cloned());
            match (file, available) {
                (Some(file), Some(n)) if (1..=n).contains(&page) => file,
                _ => {
                    return Err(PreviewError::PageOutOfRange {
                        index: file_index,
                        page,
                        available,
                    })
                }
            }
        };
        self.engine
            .render_page(&file, page)
            .await
            .map_err(|e| at_index(e, file_index))
    }

    /// Every page of a resolved file, rendered lazily in order. Calling this
    /// again starts over from page 1.
    pub fn pages(
        &self,
        file_index: usize,
    ) -> Result<impl Stream<Item = Result<RenderableUnit, PreviewError>> + '_, PreviewError> {
        let count = self
            .page_count(file_index)
            .ok_or(PreviewError::PageOutOfRange {
                index: file_index,
                page: 1,
                available: None,
            })?;
        Ok(stream::iter(1..=count).then(move |page| self.get_page(file_index, page)))
    }

    pub fn page_count(&self, file_index: usize) -> Option<u32> {
        self.current
            .lock()
            .as_ref()
            .and_then(|c| c.index.page_count(file_index))
    }

    /// Snapshot of the current index.
    pub fn index(&self) -> PreviewIndex {
        self.current
            .lock()
            .as_ref()
            .map(|c| c.index.clone())
            .unwrap_or_default()
    }

    /// Wait for every resolution started so far to finish or be cancelled.
    pub async fn settle(&self) {
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            let _ = task.await;
        }
    }
}

impl Drop for PreviewCoordinator {
    fn drop(&mut self) {
        self.clear();
    }
}

async fn resolve(
    engine: Arc<dyn DocumentEngine>,
    current: Shared,
    batch: BatchId,
    cancel: CancellationToken,
    file_index: usize,
    file: FileItem,
) -> Result<u32, PreviewError> {
    let result = tokio::select! {
        _ = cancel.cancelled() => return Err(PreviewError::Stale),
        result = count_pages(engine.as_ref(), file_index, &file) => result,
    };

    let mut guard = current.lock();
    match guard.as_mut() {
        Some(c) if c.batch == batch && !cancel.is_cancelled() => {
            let entry = match &result {
                Ok(n) => {
                    debug!(batch = %batch, file_index, pages = n, "preview resolved");
                    PreviewEntry::Resolved(*n)
                }
                Err(e) => {
                    warn!(batch = %batch, file_index, file = %file.name, error = %e, "preview failed");
                    PreviewEntry::Failed(e.clone())
                }
            };
            c.index.entries.insert(file_index, entry);
            result
        }
        _ => {
            debug!(batch = %batch, file_index, "discarding preview for replaced selection");
            Err(PreviewError::Stale)
        }
    }
}

/// Ask the engine for a page count. An engine panic fails this file only.
async fn count_pages(
    engine: &dyn DocumentEngine,
    file_index: usize,
    file: &FileItem,
) -> Result<u32, PreviewError> {
    match AssertUnwindSafe(engine.page_count(file)).catch_unwind().await {
        Ok(result) => result.map_err(|e| at_index(e, file_index)),
        Err(panic) => Err(PreviewError::Resolution {
            index: file_index,
            reason: format!("document engine panicked: {}", panic_message(&*panic)),
        }),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown cause")
}

fn at_index(err: PreviewError, index: usize) -> PreviewError {
    match err {
        PreviewError::Resolution { reason, .. } => PreviewError::Resolution { index, reason },
        PreviewError::PageOutOfRange { page, available, .. } => PreviewError::PageOutOfRange {
            index,
            page,
            available,
        },
        other => other,
    }
}
