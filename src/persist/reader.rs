//! Document reader
//!
//! Parses with roxmltree and rebuilds elements into an [`ElementTree`]. The
//! reader has a sticky error: the first problem is kept, the element that
//! caused it is skipped along with its subtree, and reading carries on with
//! its siblings. Callers inspect [`DocumentReader::error`] afterwards.

use super::{DOCUMENT_TAG, GROUP_TAG, REGION_TAG, SLOT_TAG};
use crate::error::{PersistError, TreeError};
use crate::models::{ElementHandle, ElementId, ElementKind, ElementTree, FormatRef, FormatTable, Placement};
use roxmltree::{Document as XmlDocument, Node};

/// Rebuilds element trees from the XML document format
pub struct DocumentReader<'a> {
    formats: &'a FormatTable,
    error: Option<PersistError>,
}

impl<'a> DocumentReader<'a> {
    pub fn new(formats: &'a FormatTable) -> Self {
        Self { formats, error: None }
    }

    /// First error raised so far
    pub fn error(&self) -> Option<&PersistError> {
        self.error.as_ref()
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn take_error(&mut self) -> Option<PersistError> {
        self.error.take()
    }

    /// Keep `error` unless an earlier one is already pending
    pub fn raise(&mut self, error: PersistError) {
        log::warn!("document read error: {}", error);
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Read every top-level element of `text` into `tree`, returning the roots
    /// that were read successfully
    pub fn read_document(&mut self, tree: &mut ElementTree, text: &str) -> Vec<ElementId> {
        let document = match XmlDocument::parse(text) {
            Ok(document) => document,
            Err(e) => {
                self.raise(PersistError::Xml(e.to_string()));
                return Vec::new();
            }
        };
        let root = document.root_element();
        if root.tag_name().name() != DOCUMENT_TAG {
            self.raise(PersistError::Structure(format!(
                "expected <{}>, found <{}>",
                DOCUMENT_TAG,
                root.tag_name().name()
            )));
            return Vec::new();
        }

        let roots: Vec<ElementId> = root
            .children()
            .filter(Node::is_element)
            .filter_map(|node| self.read_element(tree, node))
            .collect();
        log::debug!("read {} root elements", roots.len());
        roots
    }

    fn read_element(&mut self, tree: &mut ElementTree, node: Node<'_, '_>) -> Option<ElementId> {
        let tag = node.tag_name().name();
        let Some(kind) = ElementKind::from_tag(tag) else {
            self.raise(PersistError::UnknownTag(tag.to_string()));
            return None;
        };
        let (handle, format) = self.read_attributes(node)?;
        let id = match tree.create_with_handle(kind, handle) {
            Ok(id) => id,
            Err(_) => {
                self.raise(PersistError::DuplicateHandle(handle.to_string()));
                return None;
            }
        };
        if let Err(e) = tree.set_format(id, format) {
            self.raise(PersistError::Structure(e.to_string()));
        }

        self.read_regions(tree, id, node);
        for child in node.children().filter(Node::is_element) {
            if child.tag_name().name() != REGION_TAG {
                self.read_child(tree, id, child);
            }
        }
        Some(id)
    }

    /// `handle` (required) and `format` (optional, resolved through the table)
    fn read_attributes(&mut self, node: Node<'_, '_>) -> Option<(ElementHandle, Option<FormatRef>)> {
        let tag = node.tag_name().name();
        let Some(raw) = node.attribute("handle") else {
            self.raise(PersistError::MissingHandle(tag.to_string()));
            return None;
        };
        let handle = match raw.parse::<ElementHandle>() {
            Ok(handle) => handle,
            Err(e) => {
                self.raise(PersistError::Structure(format!("<{}> handle {:?}: {}", tag, raw, e)));
                return None;
            }
        };

        let format = match node.attribute("format") {
            None => None,
            Some(raw) => match raw.trim().parse::<u64>().ok().and_then(|id| self.formats.get(id)) {
                Some(format) => Some(format),
                None => {
                    self.raise(PersistError::UnresolvedFormat {
                        tag: tag.to_string(),
                        format: raw.to_string(),
                    });
                    return None;
                }
            },
        };
        Some((handle, format))
    }

    fn read_regions(&mut self, tree: &mut ElementTree, id: ElementId, node: Node<'_, '_>) {
        let regions = node
            .children()
            .filter(|child| child.is_element() && child.tag_name().name() == REGION_TAG);
        for (index, region) in regions.enumerate() {
            let text = region.text().unwrap_or_default();
            if let Err(e) = tree.set_text(id, index, text, None) {
                self.raise(PersistError::Structure(e.to_string()));
                return;
            }
        }
    }

    /// Read one child XML node into `parent` according to its placement
    fn read_child(&mut self, tree: &mut ElementTree, parent: ElementId, node: Node<'_, '_>) {
        let Some(kind) = tree.kind(parent) else {
            return;
        };
        let wrapper = node.tag_name().name();
        match kind.placement() {
            Placement::None => {
                self.raise(PersistError::Structure(format!(
                    "<{}> cannot hold <{}>",
                    kind.tag(),
                    wrapper
                )));
            }
            Placement::Fixed(count) => {
                if wrapper != SLOT_TAG {
                    self.raise(PersistError::Structure(format!("expected <{}>, found <{}>", SLOT_TAG, wrapper)));
                    return;
                }
                let index = node
                    .prev_siblings()
                    .skip(1)
                    .filter(|sibling| sibling.is_element() && sibling.tag_name().name() == SLOT_TAG)
                    .count();
                if index >= count {
                    self.raise(PersistError::Structure(format!("<{}> has more than {} slots", kind.tag(), count)));
                    return;
                }
                let Some(content) = node.children().find(Node::is_element) else {
                    return;
                };
                if let Some(child) = self.read_element(tree, content) {
                    let attached = tree.set_child(parent, index, Some(child), None);
                    self.discard_unattached(tree, child, attached);
                }
            }
            Placement::Positional => {
                if let Some(child) = self.read_element(tree, node) {
                    let attached = tree.append(parent, child, None);
                    self.discard_unattached(tree, child, attached);
                }
            }
            Placement::Grouped => {
                if wrapper != GROUP_TAG {
                    self.raise(PersistError::Structure(format!("expected <{}>, found <{}>", GROUP_TAG, wrapper)));
                    return;
                }
                let group = tree.number_groups(parent);
                if let Err(e) = tree.insert_group(parent, group) {
                    self.raise(PersistError::Structure(e.to_string()));
                    return;
                }
                for member in node.children().filter(Node::is_element) {
                    let Some(child) = self.read_element(tree, member) else {
                        continue;
                    };
                    let offset = tree.group_child_count(parent, group).unwrap_or(0);
                    let attached = tree.insert_into_group(parent, group, offset, child, None);
                    self.discard_unattached(tree, child, attached);
                }
            }
        }
    }

    /// Raise a failed attach and destroy the child that could not be placed
    fn discard_unattached(&mut self, tree: &mut ElementTree, child: ElementId, attached: Result<(), TreeError>) {
        if let Err(e) = attached {
            self.raise(PersistError::Structure(e.to_string()));
            if let Err(e) = tree.destroy(child, None) {
                log::warn!("could not discard unattached element: {}", e);
            }
        }
    }
}
