//! Notes attached to passages of a chapter, and the store that owns them.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use opendal::Operator;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::anchor::{is_valid_anchor, SelectedText, TextAnchor};
use crate::error::{ImportParseError, InvalidSelection};
use crate::storage::{KeyValueStore, NOTES_NAMESPACE};

const STATE_KEY: &str = "state";
pub const DEFAULT_NOTE_COLOR: &str = "#3182ce";
pub const MIN_SIDEBAR_WIDTH: u32 = 300;
pub const MAX_SIDEBAR_WIDTH: u32 = 600;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub chapter_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_id: Option<String>,
    #[serde(alias = "textRange")]
    pub anchor: TextAnchor,
    pub highlighted_text: String,
    #[serde(alias = "content", default)]
    pub body: String,
    #[serde(default)]
    pub author: String,
    #[serde(alias = "created")]
    pub created_at: DateTime<Utc>,
    #[serde(alias = "modified")]
    pub modified_at: DateTime<Utc>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default = "default_color")]
    pub color: String,
}

fn default_color() -> String {
    DEFAULT_NOTE_COLOR.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorStyle {
    #[default]
    Underline,
    Highlight,
    Both,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotesSettings {
    pub show_indicators: bool,
    pub indicator_style: IndicatorStyle,
    pub default_color: String,
    pub sidebar_width: u32,
    pub auto_open_sidebar: bool,
    pub show_preview_on_hover: bool,
}

impl Default for NotesSettings {
    fn default() -> Self {
        Self {
            show_indicators: true,
            indicator_style: IndicatorStyle::Underline,
            default_color: default_color(),
            sidebar_width: 400,
            auto_open_sidebar: true,
            show_preview_on_hover: true,
        }
    }
}

impl NotesSettings {
    fn sanitize(&mut self) {
        self.sidebar_width = self.sidebar_width.clamp(MIN_SIDEBAR_WIDTH, MAX_SIDEBAR_WIDTH);
    }
}

/// Everything the notes feature persists, as one document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotesState {
    pub notes: HashMap<String, Note>,
    pub settings: NotesSettings,
    pub sidebar_open: bool,
    pub active_note_id: Option<String>,
    pub selected_text: Option<SelectedText>,
}

/// Fields supplied by the caller when creating a note. Id, author and
/// timestamps are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteDraft {
    pub chapter_id: String,
    pub section_id: Option<String>,
    pub anchor: TextAnchor,
    pub highlighted_text: String,
    pub body: String,
    pub tags: BTreeSet<String>,
    pub color: Option<String>,
}

impl NoteDraft {
    /// Starts a draft from a captured selection.
    pub fn from_selection(selection: &SelectedText, body: &str) -> Self {
        Self {
            chapter_id: selection.chapter_id.clone(),
            section_id: None,
            anchor: selection.anchor.clone(),
            highlighted_text: selection.text.clone(),
            body: body.to_string(),
            tags: BTreeSet::new(),
            color: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteUpdate {
    pub body: Option<String>,
    pub tags: Option<BTreeSet<String>>,
    pub color: Option<String>,
}

pub fn parse_notes_state(raw: &str) -> Result<NotesState, ImportParseError> {
    let mut state: NotesState = serde_json::from_str(raw)?;
    state.settings.sanitize();
    Ok(state)
}

/// Process-wide note store. Loaded once, written through on every mutation;
/// write failures are logged and the in-memory state stays authoritative.
pub struct NoteStore {
    kv: KeyValueStore,
    state: NotesState,
    author: String,
}

impl NoteStore {
    pub async fn load(op: Operator, author: &str) -> Self {
        let kv = KeyValueStore::new(op, NOTES_NAMESPACE);
        let state = match kv.get::<NotesState>(STATE_KEY).await {
            Ok(Some(mut state)) => {
                state.settings.sanitize();
                info!(notes = state.notes.len(), "loaded notes");
                state
            }
            Ok(None) => NotesState::default(),
            Err(err) => {
                warn!(error = %err, "failed to load notes, starting empty");
                NotesState::default()
            }
        };
        Self {
            kv,
            state,
            author: author.to_string(),
        }
    }

    pub fn state(&self) -> &NotesState {
        &self.state
    }

    pub fn settings(&self) -> &NotesSettings {
        &self.state.settings
    }

    pub fn note(&self, id: &str) -> Option<&Note> {
        self.state.notes.get(id)
    }

    /// Creates a note from `draft`, makes it the active note and clears the
    /// pending selection.
    pub async fn add_note(&mut self, draft: NoteDraft) -> Result<Note, InvalidSelection> {
        let length = draft.highlighted_text.trim().chars().count();
        if !is_valid_anchor(&draft.anchor, &draft.highlighted_text) {
            return Err(if draft.anchor.end_offset <= draft.anchor.start_offset {
                InvalidSelection::InvalidRange {
                    start: draft.anchor.start_offset,
                    end: draft.anchor.end_offset,
                }
            } else {
                InvalidSelection::TooShort { length }
            });
        }

        let now = Utc::now();
        let note = Note {
            id: uuid::Uuid::new_v4().to_string(),
            chapter_id: draft.chapter_id,
            section_id: draft.section_id,
            anchor: draft.anchor,
            highlighted_text: draft.highlighted_text,
            body: draft.body,
            author: self.author.clone(),
            created_at: now,
            modified_at: now,
            tags: draft.tags,
            color: draft
                .color
                .unwrap_or_else(|| self.state.settings.default_color.clone()),
        };
        debug!(note_id = %note.id, chapter_id = %note.chapter_id, "added note");
        self.state.notes.insert(note.id.clone(), note.clone());
        self.state.active_note_id = Some(note.id.clone());
        self.state.selected_text = None;
        self.persist().await;
        Ok(note)
    }

    /// Applies `update` and bumps `modified_at`. Unknown ids are ignored.
    pub async fn update_note(&mut self, id: &str, update: NoteUpdate) -> Option<Note> {
        let note = self.state.notes.get_mut(id)?;
        if let Some(body) = update.body {
            note.body = body;
        }
        if let Some(tags) = update.tags {
            note.tags = tags;
        }
        if let Some(color) = update.color {
            note.color = color;
        }
        note.modified_at = Utc::now();
        let updated = note.clone();
        self.persist().await;
        Some(updated)
    }

    pub async fn delete_note(&mut self, id: &str) -> Option<Note> {
        let removed = self.state.notes.remove(id)?;
        if self.state.active_note_id.as_deref() == Some(id) {
            self.state.active_note_id = None;
        }
        self.persist().await;
        Some(removed)
    }

    pub async fn set_selected_text(&mut self, selection: Option<SelectedText>) {
        if selection.is_some() {
            self.state.sidebar_open = self.state.settings.auto_open_sidebar;
        }
        self.state.selected_text = selection;
        self.persist().await;
    }

    pub async fn set_active_note(&mut self, id: Option<String>) {
        if id.is_some() {
            self.state.sidebar_open = true;
        }
        self.state.active_note_id = id;
        self.persist().await;
    }

    /// Opens or closes the sidebar; `None` flips it.
    pub async fn toggle_sidebar(&mut self, open: Option<bool>) {
        self.state.sidebar_open = open.unwrap_or(!self.state.sidebar_open);
        self.persist().await;
    }

    pub async fn update_settings<F>(&mut self, apply: F)
    where
        F: FnOnce(&mut NotesSettings),
    {
        apply(&mut self.state.settings);
        self.state.settings.sanitize();
        self.persist().await;
    }

    /// Notes for a chapter, oldest first.
    pub fn notes_for_chapter(&self, chapter_id: &str) -> Vec<&Note> {
        let mut notes: Vec<&Note> = self
            .state
            .notes
            .values()
            .filter(|note| note.chapter_id == chapter_id)
            .collect();
        notes.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        notes
    }

    pub fn notes_for_section(&self, chapter_id: &str, section_id: &str) -> Vec<&Note> {
        self.notes_for_chapter(chapter_id)
            .into_iter()
            .filter(|note| note.section_id.as_deref() == Some(section_id))
            .collect()
    }

    pub fn export_notes(&self) -> String {
        match serde_json::to_string_pretty(&self.state) {
            Ok(json) => json,
            Err(err) => {
                warn!(error = %err, "failed to export notes");
                String::new()
            }
        }
    }

    /// Replaces the whole state with `raw`. Returns false, leaving the state
    /// untouched, when the text does not parse.
    pub async fn import_notes(&mut self, raw: &str) -> bool {
        match parse_notes_state(raw) {
            Ok(state) => {
                info!(notes = state.notes.len(), "imported notes");
                self.state = state;
                self.persist().await;
                true
            }
            Err(err) => {
                warn!(error = %err, "rejected notes import");
                false
            }
        }
    }

    pub async fn clear_all_notes(&mut self) {
        self.state.notes.clear();
        self.state.active_note_id = None;
        self.state.selected_text = None;
        self.persist().await;
    }

    async fn persist(&self) {
        self.kv.put_logged(STATE_KEY, &self.state).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_note_fields_are_accepted() {
        let note: Note = serde_json::from_str(
            r##"{
                "id": "k1",
                "chapterId": "ch02",
                "textRange": {"startOffset": 0, "endOffset": 8, "startContainer": "#p1", "endContainer": "#p1"},
                "highlightedText": "gradient",
                "content": "remember this",
                "author": "Reader",
                "created": "2024-05-01T10:00:00.000Z",
                "modified": "2024-05-02T10:00:00.000Z",
                "tags": ["ml", "ml"],
                "color": "#ff0000"
            }"##,
        )
        .unwrap();
        assert_eq!(note.body, "remember this");
        assert_eq!(note.tags.len(), 1);
        assert!(note.modified_at > note.created_at);
    }

    #[test]
    fn missing_settings_fields_take_defaults() {
        let state = parse_notes_state(r#"{"settings": {"showIndicators": false, "sidebarWidth": 900}}"#)
            .unwrap();
        assert!(!state.settings.show_indicators);
        assert_eq!(state.settings.sidebar_width, MAX_SIDEBAR_WIDTH);
        assert_eq!(state.settings.default_color, DEFAULT_NOTE_COLOR);
        assert!(state.notes.is_empty());
    }
}
