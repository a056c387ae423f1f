//! Turning a live selection into a serializable anchor, and back.
//!
//! Offsets count characters of the concatenated text under the element a
//! locator points at. Locators are only meaningful against the rendering
//! they were captured from; a re-render that changes structure may leave
//! them pointing elsewhere or nowhere.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::InvalidSelection;
use crate::render::{CONTENT_ROOT_SELECTOR, HIGHLIGHT_CLASS};
use crate::tree::{ContentTree, NodeData, NodeId};

pub const MIN_SELECTION_CHARS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathStep {
    pub tag: String,
    /// 1-based position among the parent's element children.
    pub nth_child: usize,
}

/// Structural address of an element, relative to the content root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Locator {
    Id(String),
    Path(Vec<PathStep>),
    Root,
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Id(id) => write!(f, "#{}", id),
            Locator::Root => f.write_str(CONTENT_ROOT_SELECTOR),
            Locator::Path(steps) => {
                f.write_str(CONTENT_ROOT_SELECTOR)?;
                for (i, step) in steps.iter().enumerate() {
                    f.write_str(if i == 0 { " " } else { " > " })?;
                    write!(f, "{}:nth-child({})", step.tag, step.nth_child)?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized locator: {0}")]
pub struct LocatorParseError(String);

impl FromStr for Locator {
    type Err = LocatorParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if let Some(id) = raw.strip_prefix('#') {
            if id.is_empty() {
                return Err(LocatorParseError(raw.to_string()));
            }
            return Ok(Locator::Id(id.to_string()));
        }
        let rest = raw
            .strip_prefix(CONTENT_ROOT_SELECTOR)
            .ok_or_else(|| LocatorParseError(raw.to_string()))?
            .trim();
        if rest.is_empty() {
            return Ok(Locator::Root);
        }
        let steps = rest
            .split('>')
            .map(|step| parse_step(step.trim()))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| LocatorParseError(raw.to_string()))?;
        Ok(Locator::Path(steps))
    }
}

fn parse_step(step: &str) -> Option<PathStep> {
    let (tag, rest) = step.split_once(":nth-child(")?;
    let nth_child: usize = rest.strip_suffix(')')?.parse().ok()?;
    if tag.is_empty() || nth_child == 0 {
        return None;
    }
    Some(PathStep {
        tag: tag.to_string(),
        nth_child,
    })
}

impl TryFrom<String> for Locator {
    type Error = LocatorParseError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

impl From<Locator> for String {
    fn from(locator: Locator) -> Self {
        locator.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextAnchor {
    pub start_offset: usize,
    pub end_offset: usize,
    #[serde(alias = "startContainer")]
    pub start_locator: Locator,
    #[serde(alias = "endContainer")]
    pub end_locator: Locator,
}

/// `node` is a text node with a character offset, or an element with a
/// child index, as in a DOM range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundary {
    pub node: NodeId,
    pub offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub start: Boundary,
    pub end: Boundary,
}

/// A captured selection waiting to become a note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedText {
    pub text: String,
    #[serde(alias = "range")]
    pub anchor: TextAnchor,
    pub chapter_id: String,
}

pub fn is_valid_anchor(anchor: &TextAnchor, text: &str) -> bool {
    anchor.end_offset > anchor.start_offset && text.trim().chars().count() >= MIN_SELECTION_CHARS
}

// Character positions of every node boundary in document order.
struct TextIndex {
    text: String,
    before: HashMap<NodeId, usize>,
    after: HashMap<NodeId, usize>,
}

impl TextIndex {
    fn build(tree: &ContentTree) -> Self {
        let mut index = TextIndex {
            text: String::new(),
            before: HashMap::new(),
            after: HashMap::new(),
        };
        let mut position = 0;
        index.visit(tree, tree.root(), &mut position);
        index
    }

    fn visit(&mut self, tree: &ContentTree, id: NodeId, position: &mut usize) {
        self.before.insert(id, *position);
        match tree.data(id) {
            Some(NodeData::Text(text)) => {
                self.text.push_str(text);
                *position += text.chars().count();
            }
            Some(NodeData::Element(_)) => {
                for child in tree.children(id) {
                    self.visit(tree, child, position);
                }
            }
            None => {}
        }
        self.after.insert(id, *position);
    }

    fn position(&self, tree: &ContentTree, boundary: Boundary) -> Option<usize> {
        let start = *self.before.get(&boundary.node)?;
        match tree.data(boundary.node)? {
            NodeData::Text(text) => Some(start + boundary.offset.min(text.chars().count())),
            NodeData::Element(_) => match tree.children(boundary.node).get(boundary.offset) {
                Some(child) => self.before.get(child).copied(),
                None => self.after.get(&boundary.node).copied(),
            },
        }
    }

    fn slice(&self, start: usize, end: usize) -> String {
        self.text.chars().skip(start).take(end - start).collect()
    }
}

// Highlight wrappers come and go with every relocation pass, so locators
// look straight through them.
fn element_of(tree: &ContentTree, node: NodeId) -> Option<NodeId> {
    let mut element = match tree.data(node)? {
        NodeData::Element(_) => node,
        NodeData::Text(_) => tree.parent(node)?,
    };
    while tree.has_class(element, HIGHLIGHT_CLASS) {
        element = tree.parent(element)?;
    }
    Some(element)
}

fn structural_children(tree: &ContentTree, parent: NodeId) -> Vec<NodeId> {
    tree.element_children(parent)
        .into_iter()
        .filter(|child| !tree.has_class(*child, HIGHLIGHT_CLASS))
        .collect()
}

/// Finds the locator for the element enclosing `node`: the nearest ancestor
/// below `content_root` with an `id`, else a tag/index path from the root.
pub fn locator_for(tree: &ContentTree, content_root: NodeId, node: NodeId) -> Locator {
    let Some(element) = element_of(tree, node) else {
        return Locator::Root;
    };

    let mut current = Some(element);
    while let Some(id) = current {
        if id == content_root {
            break;
        }
        if let Some(stable) = tree.attr(id, "id").filter(|v| !v.is_empty()) {
            return Locator::Id(stable.to_string());
        }
        current = tree.parent(id);
    }

    if !tree.is_inclusive_ancestor(content_root, element) || element == content_root {
        return Locator::Root;
    }
    let mut steps = Vec::new();
    let mut current = element;
    while current != content_root {
        let (Some(tag), Some(parent)) = (tree.tag(current), tree.parent(current)) else {
            return Locator::Root;
        };
        let Some(index) = structural_children(tree, parent)
            .iter()
            .position(|sibling| *sibling == current)
        else {
            return Locator::Root;
        };
        steps.push(PathStep {
            tag: tag.to_string(),
            nth_child: index + 1,
        });
        current = parent;
    }
    steps.reverse();
    Locator::Path(steps)
}

pub fn resolve_locator(tree: &ContentTree, content_root: NodeId, locator: &Locator) -> Option<NodeId> {
    match locator {
        Locator::Root => Some(content_root),
        Locator::Id(id) => tree.find_by_id(content_root, id),
        Locator::Path(steps) => {
            let mut current = content_root;
            for step in steps {
                let next = *structural_children(tree, current).get(step.nth_child.checked_sub(1)?)?;
                if tree.tag(next) != Some(step.tag.as_str()) {
                    return None;
                }
                current = next;
            }
            Some(current)
        }
    }
}

/// Converts a live selection inside `content_root` into an anchor plus the
/// trimmed selected text.
pub fn capture(
    tree: &ContentTree,
    content_root: NodeId,
    chapter_id: &str,
    selection: Selection,
) -> Result<SelectedText, InvalidSelection> {
    if tree.data(selection.start.node).is_none() || tree.data(selection.end.node).is_none() {
        return Err(InvalidSelection::UnknownNode);
    }
    let index = TextIndex::build(tree);
    let start_pos = index
        .position(tree, selection.start)
        .ok_or(InvalidSelection::UnknownNode)?;
    let end_pos = index
        .position(tree, selection.end)
        .ok_or(InvalidSelection::UnknownNode)?;
    if start_pos == end_pos {
        return Err(InvalidSelection::Collapsed);
    }
    let (start, end, start_pos, end_pos) = if start_pos < end_pos {
        (selection.start, selection.end, start_pos, end_pos)
    } else {
        (selection.end, selection.start, end_pos, start_pos)
    };

    let raw = index.slice(start_pos, end_pos);
    let text = raw.trim();
    let length = text.chars().count();
    if length < MIN_SELECTION_CHARS {
        return Err(InvalidSelection::TooShort { length });
    }

    let common = tree
        .common_ancestor(start.node, end.node)
        .ok_or(InvalidSelection::OutsideContentRoot)?;
    if !tree.is_inclusive_ancestor(content_root, common) {
        return Err(InvalidSelection::OutsideContentRoot);
    }

    let start_locator = locator_for(tree, content_root, start.node);
    let end_locator = locator_for(tree, content_root, end.node);
    let relative = |locator: &Locator, position: usize| {
        resolve_locator(tree, content_root, locator)
            .and_then(|element| index.before.get(&element).copied())
            .map(|base| position.saturating_sub(base))
            .ok_or(InvalidSelection::UnknownNode)
    };
    let anchor = TextAnchor {
        start_offset: relative(&start_locator, start_pos)?,
        end_offset: relative(&end_locator, end_pos)?,
        start_locator,
        end_locator,
    };

    Ok(SelectedText {
        text: text.to_string(),
        anchor,
        chapter_id: chapter_id.to_string(),
    })
}

fn text_position(tree: &ContentTree, element: NodeId, offset: usize) -> Option<Boundary> {
    let mut consumed = 0;
    for node in tree.text_nodes(element, |_, _| false) {
        let length = tree.text(node)?.chars().count();
        if consumed + length >= offset {
            return Some(Boundary {
                node,
                offset: offset - consumed,
            });
        }
        consumed += length;
    }
    None
}

/// Maps an anchor back onto the current tree. `None` when either locator no
/// longer resolves or an offset runs past the element's text.
pub fn restore_anchor(tree: &ContentTree, content_root: NodeId, anchor: &TextAnchor) -> Option<Selection> {
    let start_element = resolve_locator(tree, content_root, &anchor.start_locator)?;
    let end_element = resolve_locator(tree, content_root, &anchor.end_locator)?;
    Some(Selection {
        start: text_position(tree, start_element, anchor.start_offset)?,
        end: text_position(tree, end_element, anchor.end_offset)?,
    })
}
