use scraper::Html;
use tracing::debug;

use crate::chapter::{ChapterDocument, Section, SectionKind};
use crate::config::image_path;
use crate::error::TreeError;
use crate::settings::VisualEffectsSettings;
use crate::tree::{ContentTree, NodeId};

pub const CONTENT_AREA_ATTR: &str = "data-content-area";
pub const CONTENT_ROOT_SELECTOR: &str = "[data-content-area=\"true\"]";
pub const HIGHLIGHT_CLASS: &str = "note-highlight-span";
pub const NOTE_ID_ATTR: &str = "data-note-id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub show_figures: bool,
    pub show_tables: bool,
    pub show_code_blocks: bool,
    pub show_footnotes: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            show_figures: true,
            show_tables: true,
            show_code_blocks: true,
            show_footnotes: true,
        }
    }
}

impl From<&VisualEffectsSettings> for RenderOptions {
    fn from(effects: &VisualEffectsSettings) -> Self {
        Self {
            show_figures: effects.show_figures,
            show_tables: effects.show_tables,
            show_code_blocks: effects.show_code_blocks,
            show_footnotes: effects.show_footnotes,
        }
    }
}

/// Builds the content tree for a chapter. The tree root is the content root
/// that notes are anchored against.
pub fn render_chapter(doc: &ChapterDocument, options: RenderOptions) -> Result<ContentTree, TreeError> {
    let mut tree = ContentTree::new("div");
    let root = tree.root();
    tree.set_attr(root, "class", "text-highlighter-container")?;
    tree.set_attr(root, CONTENT_AREA_ATTR, "true")?;
    tree.set_attr(root, "data-chapter-id", &doc.id)?;

    for section in &doc.sections {
        if !is_visible(section.kind, options) {
            continue;
        }
        let wrapper = tree.create_element("div");
        tree.set_attr(wrapper, "class", "content-section")?;
        tree.set_attr(wrapper, "data-section-type", section_type_name(section.kind))?;
        match section.kind {
            SectionKind::Figure => render_figure(&mut tree, wrapper, section)?,
            _ => {
                let html = if section.raw_html.is_empty() {
                    section.content.clone().unwrap_or_default()
                } else {
                    section.raw_html.clone()
                };
                append_html(&mut tree, wrapper, &html, options)?;
            }
        }
        tree.append_child(root, wrapper)?;
    }
    tree.normalize(root)?;
    debug!(chapter_id = %doc.id, sections = doc.sections.len(), "rendered chapter");
    Ok(tree)
}

fn is_visible(kind: SectionKind, options: RenderOptions) -> bool {
    match kind {
        SectionKind::Figure => options.show_figures,
        SectionKind::Table => options.show_tables,
        SectionKind::Code => options.show_code_blocks,
        _ => true,
    }
}

fn section_type_name(kind: SectionKind) -> &'static str {
    match kind {
        SectionKind::ChapterTitle => "chapter_title",
        SectionKind::Heading => "heading",
        SectionKind::Paragraph => "paragraph",
        SectionKind::Figure => "figure",
        SectionKind::Table => "table",
        SectionKind::Code => "code",
        SectionKind::List => "list",
        SectionKind::DefinitionList => "definition_list",
        SectionKind::Aside => "aside",
        SectionKind::Callout => "callout",
        SectionKind::Other => "other",
    }
}

fn render_figure(tree: &mut ContentTree, parent: NodeId, section: &Section) -> Result<(), TreeError> {
    let figure = tree.create_element("figure");
    if let Some(id) = section.id.as_deref().filter(|id| !id.is_empty()) {
        tree.set_attr(figure, "id", id)?;
    }
    if let Some(image) = &section.image {
        let img = tree.create_element("img");
        tree.set_attr(img, "src", &image_path(image))?;
        tree.set_attr(img, "alt", section.alt.as_deref().unwrap_or(""))?;
        tree.set_attr(img, "loading", "lazy")?;
        tree.append_child(figure, img)?;
    }
    if let Some(caption) = &section.caption {
        let figcaption = tree.create_element("figcaption");
        for (class, value) in [("caption-label", &caption.label), ("caption-text", &caption.text)] {
            if let Some(value) = value {
                let span = tree.create_element("span");
                tree.set_attr(span, "class", class)?;
                let text = tree.create_text(value);
                tree.append_child(span, text)?;
                tree.append_child(figcaption, span)?;
            }
        }
        tree.append_child(figure, figcaption)?;
    }
    tree.append_child(parent, figure)
}

/// Parses an HTML fragment and appends its nodes under `parent`.
pub fn append_html(
    tree: &mut ContentTree,
    parent: NodeId,
    html: &str,
    options: RenderOptions,
) -> Result<(), TreeError> {
    let fragment = Html::parse_fragment(html);
    for child in fragment.root_element().children() {
        copy_node(tree, parent, child, options)?;
    }
    Ok(())
}

fn copy_node(
    tree: &mut ContentTree,
    parent: NodeId,
    source: ego_tree::NodeRef<'_, scraper::Node>,
    options: RenderOptions,
) -> Result<(), TreeError> {
    match source.value() {
        scraper::Node::Text(text) => {
            let content: &str = text;
            let node = tree.create_text(content);
            tree.append_child(parent, node)
        }
        scraper::Node::Element(element) => {
            let tag = element.name();
            if tag == "sup" && !options.show_footnotes {
                return Ok(());
            }
            let node = tree.create_element(tag);
            for (name, value) in element.attrs() {
                tree.set_attr(node, name, value)?;
            }
            if tag == "a" {
                open_external_links_in_new_tab(tree, node)?;
            }
            for child in source.children() {
                copy_node(tree, node, child, options)?;
            }
            tree.append_child(parent, node)
        }
        _ => Ok(()),
    }
}

fn open_external_links_in_new_tab(tree: &mut ContentTree, link: NodeId) -> Result<(), TreeError> {
    let Some(href) = tree.attr(link, "href") else {
        return Ok(());
    };
    if href.starts_with('#') {
        return Ok(());
    }
    if tree.attr(link, "target").is_none() {
        tree.set_attr(link, "target", "_blank")?;
    }
    if tree.attr(link, "rel").is_none() {
        tree.set_attr(link, "rel", "noopener noreferrer")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chapter::parse_chapter_document;

    fn chapter() -> ChapterDocument {
        parse_chapter_document(
            "ch02",
            br##"{
                "id": "ch02",
                "title": "Training",
                "sections": [
                    {"type": "heading", "level": 2, "id": "opt", "raw_html": "<h2 id=\"opt\">Optimization</h2>"},
                    {"type": "paragraph", "raw_html": "<p>See <a href=\"https://x.test\">this</a> and <a href=\"#opt\">that</a><sup>1</sup>.</p>"},
                    {"type": "figure", "id": "fig-2-1", "image": "loss.png", "alt": "Loss", "caption": {"label": "Figure 2-1.", "text": "Loss curve"}, "raw_html": ""},
                    {"type": "code", "raw_html": "<pre>x = 1</pre>"}
                ]
            }"##,
        )
        .unwrap()
    }

    #[test]
    fn renders_sections_under_content_root() {
        let tree = render_chapter(&chapter(), RenderOptions::default()).unwrap();
        let root = tree.root();
        assert_eq!(tree.attr(root, CONTENT_AREA_ATTR), Some("true"));
        assert_eq!(tree.attr(root, "data-chapter-id"), Some("ch02"));
        assert_eq!(tree.element_children(root).len(), 4);
        assert!(tree.find_by_id(root, "opt").is_some());

        let html = tree.to_html(root);
        assert!(html.contains(
            "<a href=\"https://x.test\" target=\"_blank\" rel=\"noopener noreferrer\">this</a>"
        ));
        assert!(html.contains("<a href=\"#opt\">that</a>"));
        assert!(html.contains("<img src=\"/extracted-content/images/loss.png\" alt=\"Loss\" loading=\"lazy\">"));
        assert!(html.contains("<sup>1</sup>"));
    }

    #[test]
    fn options_hide_sections_and_footnotes() {
        let options = RenderOptions {
            show_figures: false,
            show_code_blocks: false,
            show_footnotes: false,
            ..RenderOptions::default()
        };
        let tree = render_chapter(&chapter(), options).unwrap();
        let root = tree.root();
        assert_eq!(tree.element_children(root).len(), 2);
        let html = tree.to_html(root);
        assert!(!html.contains("<sup>"));
        assert!(!html.contains("<figure"));
    }
}
