//! Element/text tree that rendered chapters live in, stored in an
//! `ego_tree::Tree`.
//!
//! Detached nodes stay in the arena and keep their ids, so they can be
//! re-inserted. Nodes given up through [`ContentTree::discard`] or merged
//! away by [`ContentTree::normalize`] are recycled for later allocations;
//! ids that referred to them must not be used afterwards.

use std::io;

use ego_tree::Tree;
use html5ever::serialize::{serialize, Serialize, SerializeOpts, Serializer, TraversalScope};
use html5ever::{LocalName, Namespace, QualName};

use crate::error::TreeError;

pub use ego_tree::NodeId;

const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|classes| classes.split_whitespace().any(|c| c == class))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    Element(Element),
    Text(String),
}

impl NodeData {
    fn element(tag: &str) -> Self {
        NodeData::Element(Element {
            tag: tag.to_string(),
            attrs: Vec::new(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ContentTree {
    tree: Tree<NodeData>,
    free: Vec<NodeId>,
}

impl ContentTree {
    pub fn new(root_tag: &str) -> Self {
        Self {
            tree: Tree::new(NodeData::element(root_tag)),
            free: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        self.tree.root().id()
    }

    /// Arena slots in use, attached or not.
    pub fn node_count(&self) -> usize {
        self.tree.nodes().len()
    }

    fn alloc(&mut self, data: NodeData) -> NodeId {
        while let Some(id) = self.free.pop() {
            if let Some(mut node) = self.tree.get_mut(id) {
                *node.value() = data;
                return id;
            }
        }
        self.tree.orphan(data).id()
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.alloc(NodeData::element(tag))
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.alloc(NodeData::Text(text.to_string()))
    }

    pub fn data(&self, id: NodeId) -> Option<&NodeData> {
        self.tree.get(id).map(|node| node.value())
    }

    fn with_data<R>(&mut self, id: NodeId, f: impl FnOnce(&mut NodeData) -> R) -> Result<R, TreeError> {
        let mut node = self.tree.get_mut(id).ok_or(TreeError::UnknownNode(id))?;
        Ok(f(node.value()))
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match self.data(id)? {
            NodeData::Element(element) => Some(element),
            NodeData::Text(_) => None,
        }
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|element| element.tag.as_str())
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?.attr(name)
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.element(id).is_some_and(|element| element.has_class(class))
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) -> Result<(), TreeError> {
        self.with_data(id, |data| {
            let NodeData::Element(element) = data else {
                return Err(TreeError::NotElement(id));
            };
            match element.attrs.iter_mut().find(|(key, _)| key == name) {
                Some((_, existing)) => *existing = value.to_string(),
                None => element.attrs.push((name.to_string(), value.to_string())),
            }
            Ok(())
        })?
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.data(id)? {
            NodeData::Text(text) => Some(text),
            NodeData::Element(_) => None,
        }
    }

    pub fn set_text(&mut self, id: NodeId, value: &str) -> Result<(), TreeError> {
        self.with_data(id, |data| match data {
            NodeData::Text(text) => {
                *text = value.to_string();
                Ok(())
            }
            NodeData::Element(_) => Err(TreeError::NotText(id)),
        })?
    }

    /// Splits text node `id` at character `offset`. `id` keeps the head; the
    /// tail becomes a new text node placed right after it.
    pub fn split_text(&mut self, id: NodeId, offset: usize) -> Result<NodeId, TreeError> {
        let text = self.text(id).ok_or(TreeError::NotText(id))?;
        let length = text.chars().count();
        if offset > length {
            return Err(TreeError::SplitOutOfRange { node: id, offset });
        }
        let at = text
            .char_indices()
            .nth(offset)
            .map_or(text.len(), |(byte, _)| byte);
        let (head, tail) = (text[..at].to_string(), text[at..].to_string());
        self.set_text(id, &head)?;
        let tail = self.create_text(&tail);
        if self.parent(id).is_some() {
            if let Some(mut node) = self.tree.get_mut(id) {
                node.insert_id_after(tail);
            }
        }
        Ok(tail)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.tree.get(id)?.parent().map(|parent| parent.id())
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.tree
            .get(id)
            .map(|node| node.children().map(|child| child.id()).collect())
            .unwrap_or_default()
    }

    pub fn element_children(&self, id: NodeId) -> Vec<NodeId> {
        self.children(id)
            .into_iter()
            .filter(|child| self.element(*child).is_some())
            .collect()
    }

    fn check_insertable(&self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        if self.element(parent).is_none() {
            return Err(TreeError::NotElement(parent));
        }
        if self.data(child).is_none() {
            return Err(TreeError::UnknownNode(child));
        }
        if child == self.root()
            || self.parent(child).is_some()
            || self.is_inclusive_ancestor(child, parent)
        {
            return Err(TreeError::AlreadyAttached(child));
        }
        Ok(())
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        self.check_insertable(parent, child)?;
        let mut node = self.tree.get_mut(parent).ok_or(TreeError::UnknownNode(parent))?;
        node.append_id(child);
        Ok(())
    }

    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: NodeId,
    ) -> Result<(), TreeError> {
        self.check_insertable(parent, child)?;
        if self.parent(reference) != Some(parent) {
            return Err(TreeError::NotAChild {
                parent,
                child: reference,
            });
        }
        let mut node = self
            .tree
            .get_mut(reference)
            .ok_or(TreeError::UnknownNode(reference))?;
        node.insert_id_before(child);
        Ok(())
    }

    /// Detaches `id` from its parent. The node and its subtree stay valid and
    /// can be re-inserted.
    pub fn remove(&mut self, id: NodeId) -> Result<(), TreeError> {
        let mut node = self.tree.get_mut(id).ok_or(TreeError::UnknownNode(id))?;
        node.detach();
        Ok(())
    }

    /// Detaches `id` and hands it and its whole subtree back for reuse.
    pub fn discard(&mut self, id: NodeId) -> Result<(), TreeError> {
        if id == self.root() {
            return Err(TreeError::AlreadyAttached(id));
        }
        let node = self.tree.get(id).ok_or(TreeError::UnknownNode(id))?;
        let subtree: Vec<NodeId> = node.descendants().map(|node| node.id()).collect();
        for node in subtree.into_iter().rev() {
            if let Some(mut node) = self.tree.get_mut(node) {
                node.detach();
            }
            self.free.push(node);
        }
        Ok(())
    }

    /// Replaces element `id` with its own children. `id` is left detached
    /// and empty.
    pub fn unwrap_element(&mut self, id: NodeId) -> Result<(), TreeError> {
        if self.element(id).is_none() {
            return Err(TreeError::NotElement(id));
        }
        if self.parent(id).is_none() {
            return Err(TreeError::NotAChild { parent: id, child: id });
        }
        let children = self.children(id);
        let mut node = self.tree.get_mut(id).ok_or(TreeError::UnknownNode(id))?;
        for child in children {
            node.insert_id_before(child);
        }
        node.detach();
        Ok(())
    }

    /// Merges adjacent text nodes and drops empty ones throughout the subtree.
    pub fn normalize(&mut self, id: NodeId) -> Result<(), TreeError> {
        if self.data(id).is_none() {
            return Err(TreeError::UnknownNode(id));
        }
        let mut previous_text: Option<NodeId> = None;
        for child in self.children(id) {
            let Some(text) = self.text(child).map(str::to_string) else {
                previous_text = None;
                self.normalize(child)?;
                continue;
            };
            match previous_text {
                _ if text.is_empty() => self.discard(child)?,
                Some(previous) => {
                    self.with_data(previous, |data| {
                        if let NodeData::Text(existing) = data {
                            existing.push_str(&text);
                        }
                    })?;
                    self.discard(child)?;
                }
                None => previous_text = Some(child),
            }
        }
        Ok(())
    }

    pub fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    pub fn common_ancestor(&self, a: NodeId, b: NodeId) -> Option<NodeId> {
        let mut current = Some(a);
        while let Some(id) = current {
            if self.is_inclusive_ancestor(id, b) {
                return Some(id);
            }
            current = self.parent(id);
        }
        None
    }

    /// Nodes under `id` in document order, not including `id`.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        self.tree
            .get(id)
            .map(|node| node.descendants().skip(1).map(|node| node.id()).collect())
            .unwrap_or_default()
    }

    /// Text nodes under `root` in document order. Elements for which
    /// `exclude` returns true are skipped along with their subtree.
    pub fn text_nodes<F>(&self, root: NodeId, exclude: F) -> Vec<NodeId>
    where
        F: Fn(&ContentTree, NodeId) -> bool,
    {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(root).into_iter().rev().collect();
        while let Some(next) = stack.pop() {
            match self.data(next) {
                Some(NodeData::Text(_)) => out.push(next),
                Some(NodeData::Element(_)) if !exclude(self, next) => {
                    stack.extend(self.children(next).into_iter().rev());
                }
                _ => {}
            }
        }
        out
    }

    pub fn text_content(&self, id: NodeId) -> String {
        if let Some(text) = self.text(id) {
            return text.to_string();
        }
        self.text_nodes(id, |_, _| false)
            .into_iter()
            .filter_map(|node| self.text(node))
            .collect()
    }

    pub fn find_elements<F>(&self, root: NodeId, predicate: F) -> Vec<NodeId>
    where
        F: Fn(&Element) -> bool,
    {
        self.descendants(root)
            .into_iter()
            .filter(|id| self.element(*id).is_some_and(&predicate))
            .collect()
    }

    pub fn find_by_id(&self, root: NodeId, id_value: &str) -> Option<NodeId> {
        if self.attr(root, "id") == Some(id_value) {
            return Some(root);
        }
        self.find_elements(root, |element| element.attr("id") == Some(id_value))
            .into_iter()
            .next()
    }

    /// Outer HTML of `id`, serialized by html5ever.
    pub fn to_html(&self, id: NodeId) -> String {
        let opts = SerializeOpts {
            traversal_scope: TraversalScope::IncludeNode,
            ..SerializeOpts::default()
        };
        let mut buf = Vec::new();
        if serialize(&mut buf, &HtmlNode { tree: self, id }, opts).is_err() {
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

struct HtmlNode<'a> {
    tree: &'a ContentTree,
    id: NodeId,
}

impl Serialize for HtmlNode<'_> {
    fn serialize<S: Serializer>(&self, serializer: &mut S, scope: TraversalScope) -> io::Result<()> {
        match self.tree.data(self.id) {
            Some(NodeData::Text(text)) => serializer.write_text(text),
            Some(NodeData::Element(element)) => {
                let name = QualName::new(
                    None,
                    Namespace::from(HTML_NAMESPACE),
                    LocalName::from(element.tag.as_str()),
                );
                let include_self = matches!(scope, TraversalScope::IncludeNode);
                if include_self {
                    let attrs: Vec<(QualName, &str)> = element
                        .attrs
                        .iter()
                        .map(|(key, value)| {
                            let key = QualName::new(None, Namespace::from(""), LocalName::from(key.as_str()));
                            (key, value.as_str())
                        })
                        .collect();
                    serializer.start_elem(name.clone(), attrs.iter().map(|(key, value)| (key, *value)))?;
                }
                for child in self.tree.children(self.id) {
                    HtmlNode {
                        tree: self.tree,
                        id: child,
                    }
                    .serialize(serializer, TraversalScope::IncludeNode)?;
                }
                if include_self {
                    serializer.end_elem(name)?;
                }
                Ok(())
            }
            None => Ok(()),
        }
    }
}
