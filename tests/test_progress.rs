mod common;

use common::setup_operator;
use folio_core::progress::ProgressStore;

#[tokio::test]
async fn test_progress_is_saved_per_chapter() -> anyhow::Result<()> {
    let op = setup_operator()?;
    let store = ProgressStore::new(op.clone());
    assert!(store.load("ch03").await.is_none());

    let saved = store.save("ch03", "sec-3-2", 140.0).await;
    assert_eq!(saved.progress, 100.0);

    let reopened = ProgressStore::new(op);
    let loaded = reopened.load("ch03").await.expect("saved progress");
    assert_eq!(loaded, saved);
    assert!(reopened.load("ch04").await.is_none());

    reopened.forget("ch03").await?;
    assert!(reopened.load("ch03").await.is_none());
    Ok(())
}

#[tokio::test]
async fn test_unreadable_progress_counts_as_absent() -> anyhow::Result<()> {
    let op = setup_operator()?;
    op.write("progress/reading-progress-ch05.json", "not json".to_string()).await?;
    let store = ProgressStore::new(op);
    assert!(store.load("ch05").await.is_none());
    Ok(())
}

#[tokio::test]
async fn test_legacy_progress_without_percentage_loads() -> anyhow::Result<()> {
    let op = setup_operator()?;
    op.write(
        "progress/reading-progress-ch01.json",
        r#"{"sectionId": "intro", "timestamp": 1717171717171}"#.to_string(),
    )
    .await?;
    let loaded = ProgressStore::new(op).load("ch01").await.expect("progress");
    assert_eq!(loaded.section_id, "intro");
    assert_eq!(loaded.progress, 0.0);
    Ok(())
}
