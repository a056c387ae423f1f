#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::Utc;
use folio_core::anchor::{Locator, TextAnchor};
use folio_core::chapter::ChapterDocument;
use folio_core::error::FetchError;
use folio_core::note::Note;
use folio_core::source::ChapterSource;
use futures::future::BoxFuture;
use futures::FutureExt;
use opendal::services::{Fs, Memory};
use opendal::Operator;
use tokio::sync::Semaphore;

pub fn setup_operator() -> Result<Operator> {
    let builder = Memory::default();
    let op = Operator::new(builder)?.finish();
    Ok(op)
}

/// A filesystem operator rooted at a regular file, so every write fails.
/// Returns the file so the caller can remove it.
pub fn unwritable_operator() -> Result<(Operator, PathBuf)> {
    let blocker = std::env::temp_dir().join(format!("folio-core-blocker-{}", uuid::Uuid::new_v4()));
    std::fs::write(&blocker, b"not a directory")?;
    let op = Operator::new(Fs::default().root(&blocker.to_string_lossy()))?.finish();
    Ok((op, blocker))
}

pub const TRAINING_PARAGRAPH: &str =
    "Training works because gradient descent converges under mild assumptions.";

pub fn chapter_json(chapter_id: &str) -> String {
    if chapter_id == "ch02" {
        return serde_json::json!({
            "id": "ch02",
            "title": "Training",
            "sections": [
                {"type": "chapter_title", "raw_html": "<h1 id=\"training\">Training</h1>"},
                {"type": "paragraph", "raw_html": format!("<p>{}</p>", TRAINING_PARAGRAPH)},
                {"type": "paragraph", "raw_html": "<p id=\"p-rate\">The learning rate controls <em>step size</em> at each update.</p>"},
                {"type": "code", "raw_html": "<pre><code>optimizer.step()</code></pre>"}
            ]
        })
        .to_string();
    }
    serde_json::json!({
        "id": chapter_id,
        "title": format!("Chapter {}", chapter_id),
        "sections": [
            {"type": "paragraph", "raw_html": format!("<p>Opening text of {}.</p>", chapter_id)}
        ]
    })
    .to_string()
}

pub fn chapter(chapter_id: &str) -> Result<ChapterDocument> {
    Ok(folio_core::chapter::parse_chapter_document(
        chapter_id,
        chapter_json(chapter_id).as_bytes(),
    )?)
}

/// Chapter source that records every fetch and can hold or fail chapters on
/// demand.
#[derive(Default)]
pub struct ScriptedSource {
    calls: Mutex<HashMap<String, usize>>,
    gates: Mutex<HashMap<String, Arc<Semaphore>>>,
    failing: Mutex<HashSet<String>>,
}

impl ScriptedSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Holds fetches of `chapter_id` until the returned semaphore gets a permit.
    pub fn gate(&self, chapter_id: &str) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.gates
            .lock()
            .unwrap()
            .insert(chapter_id.to_string(), Arc::clone(&gate));
        gate
    }

    pub fn fail(&self, chapter_id: &str) {
        self.failing.lock().unwrap().insert(chapter_id.to_string());
    }

    pub fn recover(&self, chapter_id: &str) {
        self.failing.lock().unwrap().remove(chapter_id);
    }

    pub fn calls(&self, chapter_id: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(chapter_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn fetched(&self) -> BTreeSet<String> {
        self.calls.lock().unwrap().keys().cloned().collect()
    }
}

impl ChapterSource for ScriptedSource {
    fn fetch_chapter(&self, chapter_id: &str) -> BoxFuture<'static, Result<ChapterDocument, FetchError>> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(chapter_id.to_string())
            .or_default() += 1;
        let gate = self.gates.lock().unwrap().get(chapter_id).cloned();
        let fails = self.failing.lock().unwrap().contains(chapter_id);
        let chapter_id = chapter_id.to_string();
        async move {
            let resource = format!("chapter {}", chapter_id);
            if let Some(gate) = gate {
                let _permit = gate.acquire().await.map_err(|e| FetchError::Aborted {
                    resource: resource.clone(),
                    reason: e.to_string(),
                })?;
            }
            if fails {
                return Err(FetchError::NotFoundOrServerError {
                    resource,
                    status: 404,
                });
            }
            folio_core::chapter::parse_chapter_document(&resource, chapter_json(&chapter_id).as_bytes())
        }
        .boxed()
    }
}

/// Polls `condition` until it holds, failing after two seconds.
pub async fn wait_until<F>(condition: F) -> Result<()>
where
    F: Fn() -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .map_err(|_| anyhow!("condition not met in time"))
}

/// Lets spawned background work run to a quiet point.
pub async fn settle<F: Future>(future: F) -> F::Output {
    let output = future.await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
    output
}

pub fn note(id: &str, chapter_id: &str, text: &str) -> Note {
    let now = Utc::now();
    Note {
        id: id.to_string(),
        chapter_id: chapter_id.to_string(),
        section_id: None,
        anchor: TextAnchor {
            start_offset: 0,
            end_offset: text.chars().count(),
            start_locator: Locator::Root,
            end_locator: Locator::Root,
        },
        highlighted_text: text.to_string(),
        body: String::new(),
        author: "Reader".to_string(),
        created_at: now,
        modified_at: now,
        tags: BTreeSet::new(),
        color: "#3182ce".to_string(),
    }
}
