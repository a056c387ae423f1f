use opendal::Operator;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ImportParseError;
use crate::storage::{KeyValueStore, SETTINGS_NAMESPACE};

const SETTINGS_KEY: &str = "settings";

pub const PRESET_NAMES: &[&str] = &[
    "default",
    "comfortable",
    "compact",
    "focus",
    "dark-reader",
    "high-contrast",
    "sepia-classic",
    "modern-minimal",
];

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FontFamily {
    Inter,
    Georgia,
    Times,
    SystemUi,
    JetbrainsMono,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParagraphIndent {
    None,
    Small,
    Large,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TextRendering {
    Auto,
    OptimizeSpeed,
    OptimizeLegibility,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct TypographySettings {
    pub font_family: FontFamily,
    pub font_size: u8,
    pub font_weight: String,
    pub line_height: f32,
    pub letter_spacing: f32,
    pub heading_letter_spacing: f32,
    pub paragraph_indent: ParagraphIndent,
    pub drop_caps: bool,
    pub text_rendering: TextRendering,
    pub hyphenation: bool,
}

impl Default for TypographySettings {
    fn default() -> Self {
        Self {
            font_family: FontFamily::Inter,
            font_size: 18,
            font_weight: "400".to_string(),
            line_height: 1.6,
            letter_spacing: 0.0,
            heading_letter_spacing: -0.02,
            paragraph_indent: ParagraphIndent::None,
            drop_caps: false,
            text_rendering: TextRendering::OptimizeLegibility,
            hyphenation: false,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContentWidth {
    Narrow,
    Medium,
    Wide,
    Full,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParagraphSpacing {
    Compact,
    Normal,
    Relaxed,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TextAlignment {
    Left,
    Justify,
    Center,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ReadingLayoutSettings {
    pub content_width: ContentWidth,
    pub content_width_px: u32,
    pub paragraph_spacing: ParagraphSpacing,
    pub text_alignment: TextAlignment,
    pub margin_horizontal: u32,
}

impl Default for ReadingLayoutSettings {
    fn default() -> Self {
        Self {
            content_width: ContentWidth::Medium,
            content_width_px: 800,
            paragraph_spacing: ParagraphSpacing::Normal,
            text_alignment: TextAlignment::Left,
            margin_horizontal: 0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ThemeMode {
    Light,
    Dark,
    TrueDark,
    Sepia,
    HighContrast,
    BlueLightFilter,
    Custom,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ThemeSettings {
    pub mode: ThemeMode,
    pub background_color: String,
    pub text_color: String,
    pub accent_color: String,
    pub sidebar_background_color: String,
    pub border_color: String,
    pub auto_theme: bool,
    pub schedule_theme: bool,
}

impl Default for ThemeSettings {
    fn default() -> Self {
        Self {
            mode: ThemeMode::Light,
            background_color: "#ffffff".to_string(),
            text_color: "#2d3748".to_string(),
            accent_color: "#3182ce".to_string(),
            sidebar_background_color: "#f7fafc".to_string(),
            border_color: "#e2e8f0".to_string(),
            auto_theme: false,
            schedule_theme: false,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum CodeBlockTheme {
    Default,
    Github,
    Monokai,
    SolarizedLight,
    SolarizedDark,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct BackgroundColors {
    pub primary: String,
    pub secondary: String,
    pub sidebar: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct TextColors {
    pub primary: String,
    pub secondary: String,
    pub muted: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct AccentColors {
    pub primary: String,
    pub hover: String,
    pub active: String,
}

impl Default for BackgroundColors {
    fn default() -> Self {
        Self {
            primary: "#ffffff".to_string(),
            secondary: "#f7fafc".to_string(),
            sidebar: "#f7fafc".to_string(),
        }
    }
}

impl Default for TextColors {
    fn default() -> Self {
        Self {
            primary: "#2d3748".to_string(),
            secondary: "#4a5568".to_string(),
            muted: "#718096".to_string(),
        }
    }
}

impl Default for AccentColors {
    fn default() -> Self {
        Self {
            primary: "#3182ce".to_string(),
            hover: "#2c5aa0".to_string(),
            active: "#2a69ac".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ColorSettings {
    pub background_colors: BackgroundColors,
    pub text_colors: TextColors,
    pub accent_colors: AccentColors,
    pub code_block_theme: CodeBlockTheme,
}

impl Default for ColorSettings {
    fn default() -> Self {
        Self {
            background_colors: BackgroundColors::default(),
            text_colors: TextColors::default(),
            accent_colors: AccentColors::default(),
            code_block_theme: CodeBlockTheme::Default,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundTexture {
    None,
    Paper,
    Linen,
    Canvas,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundGradient {
    None,
    Subtle,
    Warm,
    Cool,
    Vibrant,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TextShadow {
    None,
    Subtle,
    Soft,
    Crisp,
    Strong,
    Glow,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BorderStyle {
    None,
    Subtle,
    Bold,
    Rounded,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct VisualEffectsSettings {
    pub background_texture: BackgroundTexture,
    pub background_gradient: BackgroundGradient,
    pub text_shadow: TextShadow,
    pub border_style: BorderStyle,
    pub sidebar_opacity: f32,
    pub overlay_opacity: f32,
    pub focus_mode: bool,
    pub show_progress: bool,
    pub highlight_current_section: bool,
    pub show_figures: bool,
    pub show_tables: bool,
    pub show_code_blocks: bool,
    pub show_footnotes: bool,
}

impl Default for VisualEffectsSettings {
    fn default() -> Self {
        Self {
            background_texture: BackgroundTexture::None,
            background_gradient: BackgroundGradient::None,
            text_shadow: TextShadow::None,
            border_style: BorderStyle::Subtle,
            sidebar_opacity: 1.0,
            overlay_opacity: 0.3,
            focus_mode: false,
            show_progress: true,
            highlight_current_section: false,
            show_figures: true,
            show_tables: true,
            show_code_blocks: true,
            show_footnotes: true,
        }
    }
}

/// Everything the reader can customize. Fields missing from stored or
/// imported data fall back to their defaults.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct CustomizationSettings {
    pub typography: TypographySettings,
    pub reading_layout: ReadingLayoutSettings,
    pub theme: ThemeSettings,
    pub colors: ColorSettings,
    pub visual_effects: VisualEffectsSettings,
}

impl CustomizationSettings {
    /// Pulls numeric values back into the ranges the controls allow.
    pub fn sanitize(&mut self) {
        let typography = &mut self.typography;
        typography.font_size = typography.font_size.clamp(14, 24);
        typography.line_height = typography.line_height.clamp(1.0, 2.5);
        typography.letter_spacing = typography.letter_spacing.clamp(-0.05, 0.1);
        typography.heading_letter_spacing = typography.heading_letter_spacing.clamp(-0.1, 0.2);
        self.reading_layout.margin_horizontal = self.reading_layout.margin_horizontal.min(100);
        let effects = &mut self.visual_effects;
        effects.sidebar_opacity = effects.sidebar_opacity.clamp(0.3, 1.0);
        effects.overlay_opacity = effects.overlay_opacity.clamp(0.1, 0.9);
    }
}

pub fn preset(name: &str) -> Option<CustomizationSettings> {
    let mut settings = CustomizationSettings::default();
    match name {
        "default" => {}
        "comfortable" => {
            settings.typography.font_size = 19;
            settings.typography.line_height = 1.7;
            settings.reading_layout.paragraph_spacing = ParagraphSpacing::Relaxed;
        }
        "compact" => {
            settings.typography.font_size = 16;
            settings.typography.line_height = 1.5;
            settings.reading_layout.content_width = ContentWidth::Narrow;
            settings.reading_layout.paragraph_spacing = ParagraphSpacing::Compact;
            settings.visual_effects.show_progress = false;
            settings.visual_effects.sidebar_opacity = 0.8;
        }
        "focus" => {
            settings.reading_layout.text_alignment = TextAlignment::Center;
            settings.visual_effects.focus_mode = true;
            settings.visual_effects.highlight_current_section = true;
        }
        "dark-reader" => {
            settings.theme = theme(
                ThemeMode::Dark,
                ["#0f1419", "#f0f6fc", "#7dd3fc", "#1c2128", "#30363d"],
            );
        }
        "high-contrast" => {
            settings.typography.font_size = 20;
            settings.typography.line_height = 1.8;
            settings.typography.font_weight = "500".to_string();
            settings.reading_layout.content_width = ContentWidth::Wide;
            settings.theme = theme(
                ThemeMode::HighContrast,
                ["#ffffff", "#000000", "#0066cc", "#f5f5f5", "#333333"],
            );
            settings.visual_effects.border_style = BorderStyle::Bold;
        }
        "sepia-classic" => {
            settings.typography.font_size = 19;
            settings.typography.line_height = 1.7;
            settings.typography.font_family = FontFamily::Georgia;
            settings.theme = theme(
                ThemeMode::Sepia,
                ["#f7f3e9", "#5c4b37", "#8b4513", "#f0ead6", "#d4c4a8"],
            );
            settings.visual_effects.focus_mode = true;
        }
        "modern-minimal" => {
            settings.typography.font_size = 17;
            settings.typography.font_family = FontFamily::SystemUi;
            settings.typography.font_weight = "350".to_string();
            settings.theme = theme(
                ThemeMode::Light,
                ["#fafafa", "#1a1a1a", "#2563eb", "#f5f5f5", "#e5e5e5"],
            );
        }
        _ => return None,
    }
    Some(settings)
}

// [background, text, accent, sidebar background, border]
fn theme(mode: ThemeMode, colors: [&str; 5]) -> ThemeSettings {
    let [background, text, accent, sidebar, border] = colors;
    ThemeSettings {
        mode,
        background_color: background.to_string(),
        text_color: text.to_string(),
        accent_color: accent.to_string(),
        sidebar_background_color: sidebar.to_string(),
        border_color: border.to_string(),
        ..ThemeSettings::default()
    }
}

pub fn parse_settings(raw: &str) -> Result<CustomizationSettings, ImportParseError> {
    let mut settings: CustomizationSettings = serde_json::from_str(raw)?;
    settings.sanitize();
    Ok(settings)
}

/// Customization settings backed by the settings namespace of the store.
/// Every mutation is written through.
pub struct SettingsStore {
    kv: KeyValueStore,
    settings: CustomizationSettings,
}

impl SettingsStore {
    pub async fn load(op: Operator) -> Self {
        let kv = KeyValueStore::new(op, SETTINGS_NAMESPACE);
        let settings = match kv.get::<CustomizationSettings>(SETTINGS_KEY).await {
            Ok(Some(mut settings)) => {
                settings.sanitize();
                settings
            }
            Ok(None) => CustomizationSettings::default(),
            Err(err) => {
                warn!(error = %err, "failed to load settings, using defaults");
                CustomizationSettings::default()
            }
        };
        Self { kv, settings }
    }

    pub fn settings(&self) -> &CustomizationSettings {
        &self.settings
    }

    pub async fn update<F>(&mut self, apply: F)
    where
        F: FnOnce(&mut CustomizationSettings),
    {
        apply(&mut self.settings);
        self.settings.sanitize();
        self.persist().await;
    }

    pub async fn apply_preset(&mut self, name: &str) -> bool {
        let Some(settings) = preset(name) else {
            warn!(preset = name, "unknown preset");
            return false;
        };
        info!(preset = name, "applying preset");
        self.settings = settings;
        self.persist().await;
        true
    }

    pub async fn reset_to_default(&mut self) {
        self.settings = CustomizationSettings::default();
        self.persist().await;
    }

    pub fn export_settings(&self) -> String {
        serde_json::to_string_pretty(&self.settings).unwrap_or_default()
    }

    pub async fn import_settings(&mut self, raw: &str) -> bool {
        match parse_settings(raw) {
            Ok(settings) => {
                self.settings = settings;
                self.persist().await;
                true
            }
            Err(err) => {
                warn!(error = %err, "rejected settings import");
                false
            }
        }
    }

    async fn persist(&self) {
        self.kv.put_logged(SETTINGS_KEY, &self.settings).await;
    }
}
