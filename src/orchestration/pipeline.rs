// Page pipeline: ordered pages, cursor, speculative preloading

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::core::errors::{PipelineError, PipelineResult};
use crate::core::types::PageImage;
use crate::orchestration::page::{Page, PageLoader, PageSnapshot, PageStatus};

/// Render-side navigation state. Never touched by page loads.
struct Cursor {
    index: usize,
    selected_block: Option<usize>,
}

/// Text of the selected block, or the page status while it is not ready
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectedText {
    pub block: Option<usize>,
    pub original: String,
    pub translated: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageSummary {
    pub index: usize,
    pub source: String,
    pub status: PageStatus,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineView {
    pub current_index: usize,
    pub page_count: usize,
    /// "i/n", one-based
    pub counter: String,
    pub selected_block: Option<usize>,
    pub pages: Vec<PageSummary>,
}

/// Owns every page for the session and decides which ones load.
///
/// The current page and up to `preload_window` pages after it are loaded in
/// background tasks. Pages behind the cursor are never preloaded and a page
/// that left Idle is never loaded again.
pub struct PagePipeline {
    pages: Vec<Arc<Page>>,
    cursor: Mutex<Cursor>,
    loader: Arc<PageLoader>,
    preload_window: usize,
}

impl PagePipeline {
    pub fn new(
        images: Vec<PageImage>,
        loader: Arc<PageLoader>,
        preload_window: usize,
    ) -> PipelineResult<Self> {
        if images.is_empty() {
            return Err(PipelineError::NoPages);
        }

        let pages: Vec<Arc<Page>> = images
            .into_iter()
            .enumerate()
            .map(|(index, image)| Arc::new(Page::new(index, image)))
            .collect();
        info!("{} pages loaded", pages.len());

        Ok(Self {
            pages,
            cursor: Mutex::new(Cursor {
                index: 0,
                selected_block: None,
            }),
            loader,
            preload_window,
        })
    }

    /// Start loading the first page and its preload window
    pub fn open(&self) -> Vec<JoinHandle<()>> {
        let mut handles: Vec<_> = self.load_current().into_iter().collect();
        handles.extend(self.preload());
        handles
    }

    /// Load the current page in the background if it is still Idle
    pub fn load_current(&self) -> Option<JoinHandle<()>> {
        let index = self.current_index();
        self.spawn_load(&self.pages[index])
    }

    /// Load the Idle pages among the next `preload_window` pages
    pub fn preload(&self) -> Vec<JoinHandle<()>> {
        let current = self.current_index();
        self.pages
            .iter()
            .skip(current + 1)
            .take(self.preload_window)
            .filter_map(|page| self.spawn_load(page))
            .collect()
    }

    /// Move the cursor by `delta`. Moves past either end are ignored.
    ///
    /// A successful move clears the block selection and kicks off loading
    /// for the new position.
    pub fn navigate(&self, delta: isize) -> bool {
        let moved = {
            let mut cursor = self.cursor.lock();
            let target = cursor.index as isize + delta;
            if target < 0 || target >= self.pages.len() as isize {
                false
            } else {
                cursor.index = target as usize;
                cursor.selected_block = None;
                true
            }
        };

        if moved {
            debug!("Navigated to page {}", self.current_index() + 1);
            self.load_current();
            self.preload();
            self.loader.redraw.notify();
        }
        moved
    }

    pub fn next(&self) -> bool {
        self.navigate(1)
    }

    pub fn prev(&self) -> bool {
        self.navigate(-1)
    }

    /// Select a block of the current page. Only possible once it loaded.
    pub fn select_block(&self, ordinal: usize) -> bool {
        let mut cursor = self.cursor.lock();
        let page = &self.pages[cursor.index];

        let selectable = page.status() == (PageStatus::Done { ok: true })
            && page
                .blocks()
                .map(|blocks| blocks.iter().any(|b| b.ordinal == ordinal))
                .unwrap_or(false);

        if selectable {
            cursor.selected_block = Some(ordinal);
        }
        selectable
    }

    pub fn selected_block(&self) -> Option<usize> {
        self.cursor.lock().selected_block
    }

    /// Texts to copy for the selected block.
    ///
    /// While the current page is not done, or failed, both texts are the
    /// page's status message.
    pub fn selected_text(&self) -> SelectedText {
        let (index, selected) = {
            let cursor = self.cursor.lock();
            (cursor.index, cursor.selected_block)
        };
        let page = &self.pages[index];

        if page.status() != (PageStatus::Done { ok: true }) {
            let message = page.message();
            return SelectedText {
                block: None,
                original: message.clone(),
                translated: message,
            };
        }

        let block = selected.and_then(|ordinal| {
            page.blocks()
                .and_then(|blocks| blocks.into_iter().find(|b| b.ordinal == ordinal))
        });

        match block {
            Some(block) => SelectedText {
                block: Some(block.ordinal),
                original: block.text,
                translated: block.translated,
            },
            None => SelectedText {
                block: None,
                original: String::new(),
                translated: String::new(),
            },
        }
    }

    pub fn current_index(&self) -> usize {
        self.cursor.lock().index
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn page(&self, index: usize) -> Option<&Arc<Page>> {
        self.pages.get(index)
    }

    pub fn current_page(&self) -> &Arc<Page> {
        &self.pages[self.current_index()]
    }

    pub fn current_snapshot(&self) -> PageSnapshot {
        self.current_page().snapshot()
    }

    pub fn loader(&self) -> &Arc<PageLoader> {
        &self.loader
    }

    pub fn view(&self) -> PipelineView {
        let (current_index, selected_block) = {
            let cursor = self.cursor.lock();
            (cursor.index, cursor.selected_block)
        };

        PipelineView {
            current_index,
            page_count: self.pages.len(),
            counter: format!("{}/{}", current_index + 1, self.pages.len()),
            selected_block,
            pages: self
                .pages
                .iter()
                .map(|page| PageSummary {
                    index: page.index(),
                    source: page.image().source.clone(),
                    status: page.status(),
                    message: page.message(),
                })
                .collect(),
        }
    }

    fn spawn_load(&self, page: &Arc<Page>) -> Option<JoinHandle<()>> {
        // Claimed synchronously so a page is never loaded twice
        if !page.begin_load(&self.loader.redraw) {
            return None;
        }

        let page = Arc::clone(page);
        let loader = Arc::clone(&self.loader);
        Some(tokio::spawn(async move {
            page.run_load(&loader).await;
        }))
    }
}
