//! Chapter cache with in-flight request coalescing and neighbor prefetch.
//!
//! Each chapter id moves through `Absent -> Pending -> Resolved | Failed`.
//! Resolved documents stay for the life of the cache; failures are not
//! remembered, so the next `load` starts a fresh fetch.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use serde::Serialize;
use tracing::{debug, warn};

use crate::chapter::{adjacent_chapter_ids, ChapterDocument};
use crate::config::ReaderConfig;
use crate::error::FetchError;
use crate::source::{ChapterSource, HttpChapterSource};

pub type LoadResult = Result<Arc<ChapterDocument>, FetchError>;
type PendingLoad = Shared<BoxFuture<'static, LoadResult>>;

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct CacheStatus {
    pub cached_chapters: Vec<String>,
    pub loading_chapters: Vec<String>,
    pub cache_size: usize,
}

#[derive(Default)]
struct CacheState {
    resolved: HashMap<String, Arc<ChapterDocument>>,
    in_flight: HashMap<String, PendingLoad>,
    // Bumped by `clear` so fetches started before it cannot repopulate.
    epoch: u64,
}

struct CacheInner {
    source: Arc<dyn ChapterSource>,
    total_chapters: u32,
    state: Mutex<CacheState>,
}

impl CacheInner {
    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn settle(&self, chapter_id: &str, epoch: u64, result: &LoadResult) {
        let mut state = self.lock();
        if state.epoch != epoch {
            debug!(chapter_id, "discarding fetch started before clear");
            return;
        }
        state.in_flight.remove(chapter_id);
        if let Ok(doc) = result {
            state
                .resolved
                .insert(chapter_id.to_string(), Arc::clone(doc));
        }
    }
}

enum Lookup {
    Ready(Arc<ChapterDocument>),
    Pending(PendingLoad),
}

/// Cheap to clone; clones share one cache.
#[derive(Clone)]
pub struct ChapterCache {
    inner: Arc<CacheInner>,
}

impl ChapterCache {
    pub fn new(source: Arc<dyn ChapterSource>, total_chapters: u32) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                source,
                total_chapters,
                state: Mutex::new(CacheState::default()),
            }),
        }
    }

    pub fn from_config(config: &ReaderConfig) -> Result<Self> {
        let source = HttpChapterSource::new(config.clone())?;
        Ok(Self::new(Arc::new(source), config.total_chapters))
    }

    pub fn total_chapters(&self) -> u32 {
        self.inner.total_chapters
    }

    /// Returns the chapter, fetching it at most once no matter how many
    /// callers ask concurrently. On success the neighbors are prefetched in
    /// the background.
    pub async fn load(&self, chapter_id: &str) -> LoadResult {
        let doc = match self.lookup(chapter_id) {
            Lookup::Ready(doc) => doc,
            Lookup::Pending(pending) => pending.await?,
        };
        self.spawn_prefetch(chapter_id);
        Ok(doc)
    }

    /// Cached document, without touching the source.
    pub fn get(&self, chapter_id: &str) -> Option<Arc<ChapterDocument>> {
        self.inner.lock().resolved.get(chapter_id).cloned()
    }

    pub fn is_loading(&self, chapter_id: &str) -> bool {
        self.inner.lock().in_flight.contains_key(chapter_id)
    }

    /// Loads the chapters on either side of `chapter_id`. Failures are
    /// logged and dropped. Prefetched chapters do not prefetch further.
    pub async fn prefetch_adjacent(&self, chapter_id: &str) {
        let neighbors = adjacent_chapter_ids(chapter_id, self.inner.total_chapters);
        let loads = neighbors.into_iter().map(|neighbor| async move {
            let pending = match self.lookup(&neighbor) {
                Lookup::Ready(_) => return,
                Lookup::Pending(pending) => pending,
            };
            match pending.await {
                Ok(_) => debug!(chapter_id = %neighbor, "prefetched"),
                Err(err) => warn!(chapter_id = %neighbor, error = %err, "prefetch failed"),
            }
        });
        futures::future::join_all(loads).await;
    }

    pub fn clear(&self) {
        let mut state = self.inner.lock();
        state.resolved.clear();
        state.in_flight.clear();
        state.epoch += 1;
    }

    pub fn status(&self) -> CacheStatus {
        let state = self.inner.lock();
        let mut cached_chapters: Vec<String> = state.resolved.keys().cloned().collect();
        let mut loading_chapters: Vec<String> = state.in_flight.keys().cloned().collect();
        cached_chapters.sort();
        loading_chapters.sort();
        CacheStatus {
            cache_size: cached_chapters.len(),
            cached_chapters,
            loading_chapters,
        }
    }

    fn spawn_prefetch(&self, chapter_id: &str) {
        let cache = self.clone();
        let chapter_id = chapter_id.to_string();
        tokio::spawn(async move { cache.prefetch_adjacent(&chapter_id).await });
    }

    // Check and registration happen under one lock, so two callers can never
    // both see the chapter as absent.
    fn lookup(&self, chapter_id: &str) -> Lookup {
        let mut state = self.inner.lock();
        if let Some(doc) = state.resolved.get(chapter_id) {
            return Lookup::Ready(Arc::clone(doc));
        }
        if let Some(pending) = state.in_flight.get(chapter_id) {
            debug!(chapter_id, "joining in-flight fetch");
            return Lookup::Pending(pending.clone());
        }

        debug!(chapter_id, "starting fetch");
        let epoch = state.epoch;
        let fetch = self.inner.source.fetch_chapter(chapter_id);
        let inner = Arc::clone(&self.inner);
        let key = chapter_id.to_string();
        // The fetch runs on its own task so it settles even if every caller
        // stops waiting.
        let task = tokio::spawn(async move {
            let result = fetch.await.map(Arc::new);
            inner.settle(&key, epoch, &result);
            result
        });
        let resource = format!("chapter {}", chapter_id);
        let pending = async move {
            task.await.unwrap_or_else(|err| {
                Err(FetchError::Aborted {
                    resource,
                    reason: err.to_string(),
                })
            })
        }
        .boxed()
        .shared();
        state
            .in_flight
            .insert(chapter_id.to_string(), pending.clone());
        Lookup::Pending(pending)
    }
}
