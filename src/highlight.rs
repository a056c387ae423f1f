//! Re-marking notes inside freshly rendered content, and the hover/click
//! behavior of the marks.
//!
//! Relocation is a best-effort text search: each note's highlighted text is
//! looked up in the text nodes of the content root and the first occurrence
//! is wrapped. Passages that were edited away, or that now straddle an
//! element boundary, simply stay unmarked.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::anchor::MIN_SELECTION_CHARS;
use crate::config::ReaderConfig;
use crate::error::TreeError;
use crate::note::{Note, NotesSettings};
use crate::render::{HIGHLIGHT_CLASS, NOTE_ID_ATTR};
use crate::tree::{ContentTree, NodeId};

const NON_CONTENT_TAGS: &[&str] = &["script", "style", "noscript"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelocationReport {
    /// Indicators are switched off; the tree was left alone.
    pub skipped: bool,
    pub highlighted: Vec<String>,
    /// Notes whose text no longer appears in the render.
    pub missed: Vec<String>,
    pub failed: Vec<String>,
}

pub fn highlight_style(color: &str, hovered: bool) -> String {
    let alpha = if hovered { "40" } else { "20" };
    format!(
        "background-color: {color}{alpha}; border-bottom: 2px solid {color}; border-radius: 2px; cursor: pointer; padding: 1px 2px; transition: all 0.2s ease"
    )
}

/// The note's own color, or `fallback` when the note has none.
pub fn note_color<'a>(note: &'a Note, fallback: &'a str) -> &'a str {
    if note.color.is_empty() {
        fallback
    } else {
        note.color.as_str()
    }
}

fn is_non_content(tree: &ContentTree, id: NodeId) -> bool {
    tree.tag(id).is_some_and(|tag| NON_CONTENT_TAGS.contains(&tag)) || tree.has_class(id, HIGHLIGHT_CLASS)
}

/// Highlight wrappers under `content_root` with the id of their note.
pub fn highlight_spans(tree: &ContentTree, content_root: NodeId) -> Vec<(NodeId, String)> {
    tree.find_elements(content_root, |element| element.has_class(HIGHLIGHT_CLASS))
        .into_iter()
        .filter_map(|span| Some((span, tree.attr(span, NOTE_ID_ATTR)?.to_string())))
        .collect()
}

/// The highlight wrapper enclosing `node`, if any. Used to route pointer
/// events that land on text inside a mark.
pub fn highlight_at(tree: &ContentTree, node: NodeId) -> Option<NodeId> {
    let mut current = Some(node);
    while let Some(id) = current {
        if tree.has_class(id, HIGHLIGHT_CLASS) {
            return Some(id);
        }
        current = tree.parent(id);
    }
    None
}

/// Removes every highlight wrapper, merging its text back into the
/// surrounding text nodes.
pub fn strip_highlights(tree: &mut ContentTree, content_root: NodeId) -> Result<usize, TreeError> {
    let spans = tree.find_elements(content_root, |element| element.has_class(HIGHLIGHT_CLASS));
    let mut stripped = 0;
    for span in spans {
        let Some(parent) = tree.parent(span) else {
            continue;
        };
        tree.unwrap_element(span)?;
        tree.discard(span)?;
        tree.normalize(parent)?;
        stripped += 1;
    }
    Ok(stripped)
}

/// Strips old marks and re-marks each note's first occurrence.
pub fn relocate<'a, I>(
    tree: &mut ContentTree,
    content_root: NodeId,
    notes: I,
    settings: &NotesSettings,
) -> RelocationReport
where
    I: IntoIterator<Item = &'a Note>,
{
    let mut report = RelocationReport::default();
    if !settings.show_indicators {
        debug!("indicators disabled, skipping relocation");
        report.skipped = true;
        return report;
    }

    if let Err(err) = strip_highlights(tree, content_root) {
        warn!(error = %err, "failed to strip previous highlights");
    }

    for note in notes {
        match highlight_note(tree, content_root, note, &settings.default_color) {
            Ok(Some(_)) => report.highlighted.push(note.id.clone()),
            Ok(None) => {
                debug!(note_id = %note.id, "note text not found in current render");
                report.missed.push(note.id.clone());
            }
            Err(err) => {
                warn!(note_id = %note.id, error = %err, "failed to highlight note");
                report.failed.push(note.id.clone());
            }
        }
    }
    info!(
        highlighted = report.highlighted.len(),
        missed = report.missed.len(),
        failed = report.failed.len(),
        "relocated notes"
    );
    report
}

fn highlight_note(
    tree: &mut ContentTree,
    content_root: NodeId,
    note: &Note,
    fallback_color: &str,
) -> Result<Option<NodeId>, TreeError> {
    let needle = note.highlighted_text.trim();
    let needle_len = needle.chars().count();
    if needle_len < MIN_SELECTION_CHARS {
        return Ok(None);
    }

    let found = tree
        .text_nodes(content_root, is_non_content)
        .into_iter()
        .find_map(|node| {
            let content = tree.text(node)?;
            let byte = content.find(needle)?;
            Some((node, content[..byte].chars().count(), content.chars().count()))
        });
    let Some((node, start, total)) = found else {
        return Ok(None);
    };
    let parent = tree.parent(node).ok_or(TreeError::NotAChild {
        parent: content_root,
        child: node,
    })?;

    let matched = if start == 0 {
        node
    } else {
        tree.split_text(node, start)?
    };
    if start + needle_len < total {
        tree.split_text(matched, needle_len)?;
    }

    let color = note_color(note, fallback_color);
    let span = tree.create_element("span");
    tree.set_attr(span, "class", HIGHLIGHT_CLASS)?;
    tree.set_attr(span, NOTE_ID_ATTR, &note.id)?;
    tree.set_attr(span, "style", &highlight_style(color, false))?;
    tree.insert_before(parent, span, matched)?;
    tree.remove(matched)?;
    tree.append_child(span, matched)?;
    Ok(Some(span))
}

/// Receives the user-facing effects of interacting with a highlight.
pub trait HighlightHandler: Send + Sync + 'static {
    fn preview(&self, note: &Note);
    fn dismiss_preview(&self);
    fn activate(&self, note_id: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventDisposition {
    pub prevent_default: bool,
    pub stop_propagation: bool,
}

/// Hover and click behavior for highlight wrappers. Hovering darkens the
/// mark at once and asks for a preview after `hover_delay`; leaving before
/// then cancels the preview.
pub struct HighlightController {
    handler: Arc<dyn HighlightHandler>,
    hover_delay: Duration,
    preview_on_hover: AtomicBool,
    default_color: Mutex<String>,
    timers: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl HighlightController {
    pub fn new(handler: Arc<dyn HighlightHandler>, hover_delay: Duration, settings: &NotesSettings) -> Self {
        Self {
            handler,
            hover_delay,
            preview_on_hover: AtomicBool::new(settings.show_preview_on_hover),
            default_color: Mutex::new(settings.default_color.clone()),
            timers: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(handler: Arc<dyn HighlightHandler>, config: &ReaderConfig, settings: &NotesSettings) -> Self {
        Self::new(handler, config.hover_preview_delay(), settings)
    }

    /// Picks up changed notes settings without dropping pending previews.
    pub fn apply_settings(&self, settings: &NotesSettings) {
        self.preview_on_hover
            .store(settings.show_preview_on_hover, Ordering::Relaxed);
        *self.default_color.lock().unwrap_or_else(PoisonError::into_inner) = settings.default_color.clone();
    }

    fn style_for(&self, note: &Note, hovered: bool) -> String {
        let fallback = self.default_color.lock().unwrap_or_else(PoisonError::into_inner);
        highlight_style(note_color(note, &fallback), hovered)
    }

    fn timers(&self) -> MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn has_pending_preview(&self, note_id: &str) -> bool {
        self.timers()
            .get(note_id)
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Must be called from within a tokio runtime.
    pub fn hover_enter(&self, tree: &mut ContentTree, span: NodeId, note: &Note) -> Result<(), TreeError> {
        tree.set_attr(span, "style", &self.style_for(note, true))?;
        let mut timers = self.timers();
        if let Some(previous) = timers.remove(&note.id) {
            previous.abort();
        }
        if !self.preview_on_hover.load(Ordering::Relaxed) {
            return Ok(());
        }
        let handler = Arc::clone(&self.handler);
        let delay = self.hover_delay;
        let note = note.clone();
        let note_id = note.id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            handler.preview(&note);
        });
        timers.insert(note_id, handle);
        Ok(())
    }

    pub fn hover_leave(&self, tree: &mut ContentTree, span: NodeId, note: &Note) -> Result<(), TreeError> {
        if let Some(pending) = self.timers().remove(&note.id) {
            pending.abort();
        }
        tree.set_attr(span, "style", &self.style_for(note, false))?;
        self.handler.dismiss_preview();
        Ok(())
    }

    pub fn click(&self, note_id: &str) -> EventDisposition {
        debug!(note_id, "highlight activated");
        self.handler.activate(note_id);
        EventDisposition {
            prevent_default: true,
            stop_propagation: true,
        }
    }

    /// Drops every pending preview, e.g. before the marks are rebuilt.
    pub fn cancel_all(&self) {
        for (_, handle) in self.timers().drain() {
            handle.abort();
        }
    }
}

impl Drop for HighlightController {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

/// Collapses bursts of relocation requests into one pass: each request
/// cancels the one before it, and only a request left alone for the full
/// delay runs.
pub struct RelocationScheduler {
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl RelocationScheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    pub fn from_config(config: &ReaderConfig) -> Self {
        Self::new(config.relocation_debounce())
    }

    fn pending(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Must be called from within a tokio runtime.
    pub fn schedule<F>(&self, run: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let delay = self.delay;
        let mut pending = self.pending();
        if let Some(previous) = pending.take() {
            previous.abort();
        }
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            run();
        }));
    }

    pub fn is_pending(&self) -> bool {
        self.pending()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn cancel(&self) {
        if let Some(pending) = self.pending().take() {
            pending.abort();
        }
    }
}

impl Drop for RelocationScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}
