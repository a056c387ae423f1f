#![warn(warnings)]
#![deny(clippy::all)]

pub mod anchor;
pub mod cache;
pub mod chapter;
pub mod config;
pub mod error;
pub mod highlight;
pub mod note;
pub mod progress;
pub mod render;
pub mod session;
pub mod settings;
pub mod source;
pub mod storage;
pub mod tree;

pub use anchor::{capture, is_valid_anchor, restore_anchor, Locator, SelectedText, Selection, TextAnchor};
pub use cache::{CacheStatus, ChapterCache};
pub use chapter::{BookMetadata, ChapterDocument, Section, SectionKind};
pub use config::ReaderConfig;
pub use error::{FetchError, ImportParseError, InvalidSelection, PersistenceError, TreeError};
pub use highlight::{relocate, EventDisposition, HighlightController, HighlightHandler, RelocationScheduler};
pub use note::{Note, NoteDraft, NoteStore, NoteUpdate, NotesSettings, NotesState};
pub use progress::{ProgressStore, ReadingProgress};
pub use render::{render_chapter, RenderOptions};
pub use session::{ChapterSession, ChapterView, LoadOutcome};
pub use settings::{CustomizationSettings, SettingsStore};
pub use source::{ChapterSource, HttpChapterSource};
pub use tree::{ContentTree, NodeId};
