mod common;

use common::{chapter, setup_operator, unwritable_operator};
use folio_core::render::{render_chapter, RenderOptions};
use folio_core::settings::{preset, CustomizationSettings, SettingsStore};

#[tokio::test]
async fn test_settings_start_from_defaults() -> anyhow::Result<()> {
    let store = SettingsStore::load(setup_operator()?).await;
    assert_eq!(store.settings(), &CustomizationSettings::default());
    Ok(())
}

#[tokio::test]
async fn test_preset_is_persisted() -> anyhow::Result<()> {
    let op = setup_operator()?;
    let mut store = SettingsStore::load(op.clone()).await;
    assert!(store.apply_preset("sepia-classic").await);
    assert!(!store.apply_preset("neon").await);

    let reloaded = SettingsStore::load(op).await;
    assert_eq!(reloaded.settings(), &preset("sepia-classic").expect("preset"));
    Ok(())
}

#[tokio::test]
async fn test_update_clamps_and_persists() -> anyhow::Result<()> {
    let op = setup_operator()?;
    let mut store = SettingsStore::load(op.clone()).await;
    store
        .update(|settings| {
            settings.typography.font_size = 30;
            settings.visual_effects.show_code_blocks = false;
        })
        .await;
    assert_eq!(store.settings().typography.font_size, 24);

    let reloaded = SettingsStore::load(op).await;
    assert_eq!(reloaded.settings().typography.font_size, 24);
    assert!(!reloaded.settings().visual_effects.show_code_blocks);

    let options = RenderOptions::from(&reloaded.settings().visual_effects);
    let tree = render_chapter(&chapter("ch02")?, options)?;
    assert!(!tree.to_html(tree.root()).contains("<pre>"));
    Ok(())
}

#[tokio::test]
async fn test_export_import_and_reset() -> anyhow::Result<()> {
    let mut source = SettingsStore::load(setup_operator()?).await;
    source.apply_preset("dark-reader").await;
    let exported = source.export_settings();

    let mut target = SettingsStore::load(setup_operator()?).await;
    assert!(target.import_settings(&exported).await);
    assert_eq!(target.settings(), source.settings());

    assert!(!target.import_settings("[1, 2").await);
    assert_eq!(target.settings(), source.settings());

    target.reset_to_default().await;
    assert_eq!(target.settings(), &CustomizationSettings::default());
    Ok(())
}

#[tokio::test]
async fn test_write_failures_keep_in_memory_settings() -> anyhow::Result<()> {
    let (op, blocker) = unwritable_operator()?;
    let mut store = SettingsStore::load(op.clone()).await;
    store
        .update(|settings| settings.typography.font_size = 20)
        .await;
    assert_eq!(store.settings().typography.font_size, 20);
    assert!(store.apply_preset("sepia-classic").await);
    assert_eq!(store.settings(), &preset("sepia-classic").expect("preset"));

    let reloaded = SettingsStore::load(op).await;
    assert_eq!(reloaded.settings(), &CustomizationSettings::default());
    std::fs::remove_file(blocker)?;
    Ok(())
}
