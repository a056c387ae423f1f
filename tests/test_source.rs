mod common;

use std::net::SocketAddr;

use common::chapter_json;
use folio_core::cache::ChapterCache;
use folio_core::config::ReaderConfig;
use folio_core::error::FetchError;
use folio_core::source::{ChapterSource, HttpChapterSource};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn route(path: &str) -> (u16, String) {
    match path {
        "/book/extracted-content/chapters/structured/ch01.json" => (200, chapter_json("ch01")),
        "/book/extracted-content/chapters/structured/ch02.json" => (
            200,
            r#"{"id": "ch02", "title": "Training", "sections": {}}"#.to_string(),
        ),
        "/book/extracted-content/chapters/metadata/book-metadata.json" => (
            200,
            r#"{"title": "AI Engineering", "total_chapters": 10, "table_of_contents": [{"id": "ch01", "title": "Introduction"}]}"#
                .to_string(),
        ),
        _ => (404, "not found".to_string()),
    }
}

/// Serves the fixture routes over plain HTTP/1.1, one request per connection.
async fn serve() -> anyhow::Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let head = String::from_utf8_lossy(&request);
                let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();
                let (status, body) = route(&path);
                let response = format!(
                    "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });
    Ok(addr)
}

fn config_for(addr: SocketAddr) -> ReaderConfig {
    ReaderConfig {
        content_base_url: format!("http://{}/book", addr),
        ..ReaderConfig::default()
    }
}

#[tokio::test]
async fn test_http_source_fetches_and_validates_chapters() -> anyhow::Result<()> {
    let addr = serve().await?;
    let source = HttpChapterSource::new(config_for(addr))?;

    let doc = source.fetch_chapter("ch01").await?;
    assert_eq!(doc.id, "ch01");
    assert_eq!(doc.sections.len(), 1);

    let malformed = source.fetch_chapter("ch02").await.unwrap_err();
    assert!(matches!(malformed, FetchError::MalformedPayload { .. }));

    let missing = source.fetch_chapter("ch09").await.unwrap_err();
    assert_eq!(
        missing,
        FetchError::NotFoundOrServerError {
            resource: "chapter ch09".to_string(),
            status: 404
        }
    );
    Ok(())
}

#[tokio::test]
async fn test_http_source_fetches_book_metadata() -> anyhow::Result<()> {
    let addr = serve().await?;
    let source = HttpChapterSource::new(config_for(addr))?;
    let metadata = source.fetch_metadata().await?;
    assert_eq!(metadata.title, "AI Engineering");
    assert_eq!(metadata.total_chapters, Some(10));
    assert_eq!(metadata.table_of_contents[0].title, "Introduction");
    Ok(())
}

#[tokio::test]
async fn test_cache_from_config_uses_http_source() -> anyhow::Result<()> {
    let addr = serve().await?;
    let cache = ChapterCache::from_config(&config_for(addr))?;
    let doc = cache.load("ch01").await?;
    assert_eq!(doc.title, "Chapter ch01");
    assert!(cache.get("ch01").is_some());
    Ok(())
}

#[tokio::test]
async fn test_unreachable_server_is_a_transport_error() -> anyhow::Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    let source = HttpChapterSource::new(config_for(addr))?;
    let err = source.fetch_chapter("ch01").await.unwrap_err();
    assert!(matches!(err, FetchError::Transport { .. }));
    Ok(())
}
