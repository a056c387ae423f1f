use std::sync::Arc;

use anyhow::Result;
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::chapter::{parse_book_metadata, parse_chapter_document, BookMetadata, ChapterDocument};
use crate::config::ReaderConfig;
use crate::error::FetchError;

/// Where chapter documents come from. The cache only ever talks to this
/// trait, so tests can substitute scripted sources.
pub trait ChapterSource: Send + Sync + 'static {
    fn fetch_chapter(&self, chapter_id: &str) -> BoxFuture<'static, Result<ChapterDocument, FetchError>>;
}

impl<F> ChapterSource for F
where
    F: Fn(&str) -> BoxFuture<'static, Result<ChapterDocument, FetchError>> + Send + Sync + 'static,
{
    fn fetch_chapter(&self, chapter_id: &str) -> BoxFuture<'static, Result<ChapterDocument, FetchError>> {
        self(chapter_id)
    }
}

/// Fetches the static JSON files over HTTP.
#[derive(Clone)]
pub struct HttpChapterSource {
    client: Client,
    config: Arc<ReaderConfig>,
}

impl HttpChapterSource {
    pub fn new(config: ReaderConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        // Validate the base URL up front so fetches only fail on transport
        config.base_url()?;
        Ok(Self {
            client: builder.build()?,
            config: Arc::new(config),
        })
    }

    pub async fn fetch_metadata(&self) -> Result<BookMetadata, FetchError> {
        let resource = "book metadata";
        let url = self.config.metadata_url().map_err(|e| FetchError::Transport {
            resource: resource.to_string(),
            message: e.to_string(),
        })?;
        let bytes = get_bytes(&self.client, url, resource).await?;
        parse_book_metadata(resource, &bytes)
    }
}

impl ChapterSource for HttpChapterSource {
    fn fetch_chapter(&self, chapter_id: &str) -> BoxFuture<'static, Result<ChapterDocument, FetchError>> {
        let client = self.client.clone();
        let resource = format!("chapter {}", chapter_id);
        let url = self.config.chapter_url(chapter_id);
        async move {
            let url = url.map_err(|e| FetchError::Transport {
                resource: resource.clone(),
                message: e.to_string(),
            })?;
            let bytes = get_bytes(&client, url, &resource).await?;
            parse_chapter_document(&resource, &bytes)
        }
        .boxed()
    }
}

async fn get_bytes(client: &Client, url: Url, resource: &str) -> Result<Vec<u8>, FetchError> {
    debug!(%url, resource, "fetching");
    let transport = |err: reqwest::Error| FetchError::Transport {
        resource: resource.to_string(),
        message: err.to_string(),
    };
    let response = client.get(url).send().await.map_err(transport)?;
    if !response.status().is_success() {
        return Err(FetchError::NotFoundOrServerError {
            resource: resource.to_string(),
            status: response.status().as_u16(),
        });
    }
    let bytes = response.bytes().await.map_err(transport)?;
    Ok(bytes.to_vec())
}
