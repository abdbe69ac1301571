//! Document capability behind previews: page counts and page rendering.

use super::error::PreviewError;
use super::schema::{FileId, FileItem, RenderableUnit};
use async_trait::async_trait;
use base64::Engine;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// External document engine. Given a file it yields a page count and can
/// render any page in `1..=page_count`.
#[async_trait]
pub trait DocumentEngine: Send + Sync {
    async fn page_count(&self, file: &FileItem) -> Result<u32, PreviewError>;

    async fn render_page(&self, file: &FileItem, page: u32)
        -> Result<RenderableUnit, PreviewError>;
}

/// Default lines per text page.
pub const DEFAULT_LINES_PER_PAGE: usize = 40;

/// Paginated files kept around for rendering.
const PAGE_CACHE_CAPACITY: usize = 16;

/// Page texts per file, oldest evicted first.
#[derive(Debug, Default)]
struct PageCache {
    order: VecDeque<FileId>,
    pages: HashMap<FileId, Arc<[String]>>,
}

impl PageCache {
    fn get(&self, id: FileId) -> Option<Arc<[String]>> {
        self.pages.get(&id).cloned()
    }

    fn insert(&mut self, id: FileId, pages: Arc<[String]>) {
        if self.pages.insert(id, pages).is_none() {
            self.order.push_back(id);
        }
        while self.order.len() > PAGE_CACHE_CAPACITY {
            if let Some(evicted) = self.order.pop_front() {
                self.pages.remove(&evicted);
            }
        }
    }
}

/// Engine for the formats the crate can paginate on its own: text-like
/// files, single-page images, and PDFs with the `pdf-preview` feature.
///
/// A file is paginated once; later page renders reuse the cached texts.
#[derive(Debug)]
pub struct BuiltinEngine {
    lines_per_page: usize,
    cache: Mutex<PageCache>,
}

impl Default for BuiltinEngine {
    fn default() -> Self {
        Self::new(DEFAULT_LINES_PER_PAGE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Text,
    Image,
    Pdf,
    Other,
}

fn kind_of(media_type: &str) -> Kind {
    match media_type {
        "application/json" | "application/xml" => Kind::Text,
        "application/pdf" => Kind::Pdf,
        t if t.starts_with("text/") => Kind::Text,
        t if t.starts_with("image/") => Kind::Image,
        _ => Kind::Other,
    }
}

fn resolution(reason: impl Into<String>) -> PreviewError {
    // The engine does not know the file's position; the coordinator fills it in.
    PreviewError::Resolution {
        index: 0,
        reason: reason.into(),
    }
}

async fn read(file: &FileItem) -> Result<Arc<[u8]>, PreviewError> {
    file.bytes()
        .await
        .map_err(|e| resolution(format!("failed to read {}: {e}", file.name)))
}

fn text_pages(data: &[u8], lines_per_page: usize) -> Vec<String> {
    let text = String::from_utf8_lossy(data);
    let lines: Vec<&str> = text.lines().collect();
    lines
        .chunks(lines_per_page)
        .map(|chunk| chunk.join("\n"))
        .collect()
}

impl BuiltinEngine {
    pub fn new(lines_per_page: usize) -> Self {
        Self {
            lines_per_page: lines_per_page.max(1),
            cache: Mutex::new(PageCache::default()),
        }
    }

    /// Page texts of a text or PDF file, paginated at most once per file.
    async fn paged(&self, file: &FileItem, kind: Kind) -> Result<Arc<[String]>, PreviewError> {
        let cached = self.cache.lock().get(file.id());
        if let Some(pages) = cached {
            return Ok(pages);
        }
        let pages: Arc<[String]> = match kind {
            Kind::Pdf => pdf_pages(file).await?.into(),
            _ => text_pages(&read(file).await?, self.lines_per_page).into(),
        };
        self.cache.lock().insert(file.id(), Arc::clone(&pages));
        Ok(pages)
    }

    fn image_data_uri(file: &FileItem, data: &[u8]) -> String {
        let b64 = base64::engine::general_purpose::STANDARD.encode(data);
        format!("data:{};base64,{}", file.media_type, b64)
    }

    fn unsupported(file: &FileItem) -> PreviewError {
        PreviewError::Unsupported {
            media_type: file.media_type.clone(),
        }
    }

    fn out_of_range(page: u32, available: u32) -> PreviewError {
        PreviewError::PageOutOfRange {
            index: 0,
            page,
            available: Some(available),
        }
    }
}

#[async_trait]
impl DocumentEngine for BuiltinEngine {
    async fn page_count(&self, file: &FileItem) -> Result<u32, PreviewError> {
        match kind_of(&file.media_type) {
            kind @ (Kind::Text | Kind::Pdf) => Ok(self.paged(file, kind).await?.len() as u32),
            Kind::Image => Ok(1),
            Kind::Other => Err(Self::unsupported(file)),
        }
    }

    async fn render_page(
        &self,
        file: &FileItem,
        page: u32,
    ) -> Result<RenderableUnit, PreviewError> {
        let pages = match kind_of(&file.media_type) {
            kind @ (Kind::Text | Kind::Pdf) => self.paged(file, kind).await?,
            Kind::Image if page == 1 => {
                let data = read(file).await?;
                return Ok(RenderableUnit::Image {
                    data_uri: Self::image_data_uri(file, &data),
                });
            }
            Kind::Image => return Err(Self::out_of_range(page, 1)),
            Kind::Other => return Err(Self::unsupported(file)),
        };
        let available = pages.len() as u32;
        page.checked_sub(1)
            .and_then(|i| pages.get(i as usize))
            .map(|body| RenderableUnit::Text {
                page,
                body: body.clone(),
            })
            .ok_or_else(|| Self::out_of_range(page, available))
    }
}

/// Extraction is CPU-bound and may panic on malformed input, so it runs on
/// the blocking pool and a panic becomes a resolution error for this file.
#[cfg(feature = "pdf-preview")]
async fn pdf_pages(file: &FileItem) -> Result<Vec<String>, PreviewError> {
    let data = read(file).await?;
    tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem_by_pages(&data))
        .await
        .map_err(|e| resolution(format!("pdf extraction failed: {e}")))?
        .map_err(|e| resolution(e.to_string()))
}

#[cfg(not(feature = "pdf-preview"))]
async fn pdf_pages(file: &FileItem) -> Result<Vec<String>, PreviewError> {
    Err(BuiltinEngine::unsupported(file))
}
