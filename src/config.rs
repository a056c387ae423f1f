use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_TOTAL_CHAPTERS: u32 = 10;
pub const CHAPTERS_PATH: &str = "extracted-content/chapters/structured";
pub const METADATA_PATH: &str = "extracted-content/chapters/metadata/book-metadata.json";
pub const IMAGES_PATH: &str = "/extracted-content/images";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ReaderConfig {
    pub content_base_url: String,
    pub storage_uri: String,
    pub total_chapters: u32,
    pub relocation_debounce_ms: u64,
    pub hover_preview_delay_ms: u64,
    pub default_author: String,
    pub request_timeout_secs: Option<u64>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            content_base_url: "http://localhost/".to_string(),
            storage_uri: "memory://".to_string(),
            total_chapters: DEFAULT_TOTAL_CHAPTERS,
            relocation_debounce_ms: 200,
            hover_preview_delay_ms: 500,
            default_author: "Reader".to_string(),
            request_timeout_secs: None,
        }
    }
}

impl ReaderConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: ReaderConfig =
            serde_json::from_str(raw).map_err(|e| anyhow!("Invalid reader config: {}", e))?;
        if config.total_chapters == 0 {
            return Err(anyhow!("total_chapters must be at least 1"));
        }
        config.base_url()?;
        Ok(config)
    }

    pub fn base_url(&self) -> Result<Url> {
        let mut raw = self.content_base_url.clone();
        // Url::join drops the last path segment unless it ends with a slash
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Url::parse(&raw).map_err(|e| anyhow!("Invalid content base URL: {}", e))
    }

    pub fn chapter_url(&self, chapter_id: &str) -> Result<Url> {
        Ok(self
            .base_url()?
            .join(&format!("{}/{}.json", CHAPTERS_PATH, chapter_id))?)
    }

    pub fn metadata_url(&self) -> Result<Url> {
        Ok(self.base_url()?.join(METADATA_PATH)?)
    }

    pub fn relocation_debounce(&self) -> Duration {
        Duration::from_millis(self.relocation_debounce_ms)
    }

    pub fn hover_preview_delay(&self) -> Duration {
        Duration::from_millis(self.hover_preview_delay_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

pub fn image_path(filename: &str) -> String {
    format!("{}/{}", IMAGES_PATH, filename)
}
