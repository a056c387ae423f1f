use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::cache::ChapterCache;
use crate::chapter::ChapterDocument;

#[derive(Debug, Clone, PartialEq)]
pub enum ChapterView {
    Idle,
    Loading { chapter_id: String },
    Ready { document: Arc<ChapterDocument> },
    Failed { chapter_id: String, message: String },
}

/// Identifies one navigation. Only the newest ticket may update the view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    generation: u64,
    chapter_id: String,
}

impl LoadTicket {
    pub fn chapter_id(&self) -> &str {
        &self.chapter_id
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Applied(ChapterView),
    /// A newer navigation started while this one was loading; its result was dropped.
    Superseded,
}

/// The chapter currently shown to the reader.
pub struct ChapterSession {
    cache: ChapterCache,
    generation: AtomicU64,
    view: Mutex<(Option<String>, ChapterView)>,
}

impl ChapterSession {
    pub fn new(cache: ChapterCache) -> Self {
        Self {
            cache,
            generation: AtomicU64::new(0),
            view: Mutex::new((None, ChapterView::Idle)),
        }
    }

    pub fn cache(&self) -> &ChapterCache {
        &self.cache
    }

    fn lock(&self) -> MutexGuard<'_, (Option<String>, ChapterView)> {
        self.view.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn view(&self) -> ChapterView {
        self.lock().1.clone()
    }

    pub fn current_chapter(&self) -> Option<String> {
        self.lock().0.clone()
    }

    /// Marks `chapter_id` as the navigation target and invalidates every
    /// earlier ticket.
    pub fn begin(&self, chapter_id: &str) -> LoadTicket {
        let mut view = self.lock();
        // Tickets are issued under the view lock.
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        view.0 = Some(chapter_id.to_string());
        view.1 = match self.cache.get(chapter_id) {
            Some(document) => ChapterView::Ready { document },
            None => ChapterView::Loading {
                chapter_id: chapter_id.to_string(),
            },
        };
        LoadTicket {
            generation,
            chapter_id: chapter_id.to_string(),
        }
    }

    pub fn is_current(&self, ticket: &LoadTicket) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket.generation
    }

    /// Navigates to `chapter_id` and applies the result unless a newer
    /// navigation has started in the meantime.
    pub async fn open(&self, chapter_id: &str) -> LoadOutcome {
        let ticket = self.begin(chapter_id);
        let result = self.cache.load(chapter_id).await;

        let mut view = self.lock();
        // Checked under the view lock so a concurrent `begin` cannot slip in
        // between the check and the write.
        if !self.is_current(&ticket) {
            debug!(chapter_id, "dropping stale chapter result");
            return LoadOutcome::Superseded;
        }
        view.1 = match result {
            Ok(document) => ChapterView::Ready { document },
            Err(err) => {
                warn!(chapter_id, error = %err, "chapter load failed");
                ChapterView::Failed {
                    chapter_id: chapter_id.to_string(),
                    message: err.to_string(),
                }
            }
        };
        LoadOutcome::Applied(view.1.clone())
    }

    /// Re-opens the current chapter. `None` when nothing has been opened.
    pub async fn retry(&self) -> Option<LoadOutcome> {
        let chapter_id = self.current_chapter()?;
        Some(self.open(&chapter_id).await)
    }
}
