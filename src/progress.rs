use chrono::Utc;
use opendal::Operator;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::PersistenceError;
use crate::storage::{KeyValueStore, PROGRESS_NAMESPACE};

/// Where the reader left off in one chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingProgress {
    pub section_id: String,
    /// Percentage scrolled, 0 to 100.
    #[serde(default)]
    pub progress: f64,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

pub fn progress_key(chapter_id: &str) -> String {
    format!("reading-progress-{}", chapter_id)
}

/// Scroll position as a percentage, clamped to 0..=100. An unscrollable page
/// reports 0.
pub fn scroll_percentage(scroll_top: f64, scroll_height: f64, viewport_height: f64) -> f64 {
    let scrollable = scroll_height - viewport_height;
    if scrollable <= 0.0 {
        return 0.0;
    }
    (scroll_top / scrollable * 100.0).clamp(0.0, 100.0)
}

pub struct ProgressStore {
    kv: KeyValueStore,
}

impl ProgressStore {
    pub fn new(op: Operator) -> Self {
        Self {
            kv: KeyValueStore::new(op, PROGRESS_NAMESPACE),
        }
    }

    /// Records the section being read. Failures are logged only.
    pub async fn save(&self, chapter_id: &str, section_id: &str, progress: f64) -> ReadingProgress {
        let entry = ReadingProgress {
            section_id: section_id.to_string(),
            progress: progress.clamp(0.0, 100.0),
            timestamp: Utc::now().timestamp_millis(),
        };
        self.kv.put_logged(&progress_key(chapter_id), &entry).await;
        entry
    }

    /// Saved progress for `chapter_id`. Unreadable entries count as absent.
    pub async fn load(&self, chapter_id: &str) -> Option<ReadingProgress> {
        match self.kv.get::<ReadingProgress>(&progress_key(chapter_id)).await {
            Ok(entry) => entry,
            Err(err) => {
                warn!(chapter_id, error = %err, "failed to parse saved reading progress");
                None
            }
        }
    }

    pub async fn forget(&self, chapter_id: &str) -> Result<(), PersistenceError> {
        self.kv.delete(&progress_key(chapter_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_is_clamped() {
        assert_eq!(scroll_percentage(0.0, 500.0, 800.0), 0.0);
        assert_eq!(scroll_percentage(600.0, 1400.0, 800.0), 100.0);
        assert_eq!(scroll_percentage(900.0, 1400.0, 800.0), 100.0);
        assert_eq!(scroll_percentage(150.0, 1400.0, 800.0), 25.0);
    }

    #[test]
    fn keys_are_per_chapter() {
        assert_eq!(progress_key("ch03"), "reading-progress-ch03");
    }
}
