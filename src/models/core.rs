//! Core node storage for the element tree
//!
//! Nodes live in the [`ElementTree`](crate::models::tree::ElementTree) arena and
//! refer to each other through [`ElementId`]s. An id carries a generation, so an
//! id kept after its node was destroyed no longer resolves.

use crate::diagnostics::Diagnostic;
use crate::models::elements::{ElementKind, Placement};
use crate::models::format::FormatRef;
use crate::models::handle::ElementHandle;
use crate::models::visual::VisualEdge;
use crate::value::CalculatedValue;
use serde::{Deserialize, Serialize};

/// Generational index of a node in the arena
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

/// Children of a node, shaped by its placement
#[derive(Clone, Debug, PartialEq)]
pub enum Children {
    None,
    Fixed(Vec<Option<ElementId>>),
    Positional(Vec<ElementId>),
    Grouped(Vec<Vec<ElementId>>),
}

impl Children {
    /// Empty storage for a placement; fixed placements start with empty slots
    pub fn for_placement(placement: Placement) -> Self {
        match placement {
            Placement::None => Children::None,
            Placement::Fixed(count) => Children::Fixed(vec![None; count]),
            Placement::Positional => Children::Positional(Vec::new()),
            Placement::Grouped => Children::Grouped(Vec::new()),
        }
    }

    /// Number of child positions (empty fixed slots included)
    pub fn len(&self) -> usize {
        match self {
            Children::None => 0,
            Children::Fixed(slots) => slots.len(),
            Children::Positional(children) => children.len(),
            Children::Grouped(groups) => groups.iter().map(Vec::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Child at `index`; `None` when out of range, `Some(None)` for an empty slot
    pub fn get(&self, index: usize) -> Option<Option<ElementId>> {
        match self {
            Children::None => None,
            Children::Fixed(slots) => slots.get(index).copied(),
            Children::Positional(children) => children.get(index).copied().map(Some),
            Children::Grouped(groups) => {
                let (group, offset) = self.group_of(index)?;
                Some(Some(groups[group][offset]))
            }
        }
    }

    pub fn index_of(&self, child: ElementId) -> Option<usize> {
        self.slots().iter().position(|slot| *slot == Some(child))
    }

    /// Every position in order
    pub fn slots(&self) -> Vec<Option<ElementId>> {
        match self {
            Children::None => Vec::new(),
            Children::Fixed(slots) => slots.clone(),
            Children::Positional(children) => children.iter().copied().map(Some).collect(),
            Children::Grouped(groups) => groups.iter().flatten().copied().map(Some).collect(),
        }
    }

    /// Every child that is present, in order
    pub fn present(&self) -> Vec<ElementId> {
        self.slots().into_iter().flatten().collect()
    }

    /// (group, offset) of a flat child index
    pub fn group_of(&self, index: usize) -> Option<(usize, usize)> {
        let Children::Grouped(groups) = self else {
            return None;
        };
        let mut remaining = index;
        for (group, children) in groups.iter().enumerate() {
            if remaining < children.len() {
                return Some((group, remaining));
            }
            remaining -= children.len();
        }
        None
    }

    /// Flat index of `offset` within `group`; `offset` may equal the group length
    pub fn flat_index(&self, group: usize, offset: usize) -> Option<usize> {
        let Children::Grouped(groups) = self else {
            return None;
        };
        let children = groups.get(group)?;
        if offset > children.len() {
            return None;
        }
        Some(groups[..group].iter().map(Vec::len).sum::<usize>() + offset)
    }

    /// Replace the child at `index`, returning what was there
    pub(crate) fn replace_at(&mut self, index: usize, child: Option<ElementId>) -> Option<ElementId> {
        match (self, child) {
            (Children::Fixed(slots), _) => std::mem::replace(&mut slots[index], child),
            (Children::Positional(children), Some(child)) => {
                Some(std::mem::replace(&mut children[index], child))
            }
            (children @ Children::Grouped(_), Some(child)) => {
                let (group, offset) = children.group_of(index)?;
                let Children::Grouped(groups) = children else {
                    return None;
                };
                Some(std::mem::replace(&mut groups[group][offset], child))
            }
            _ => None,
        }
    }

    /// Remove the child at `index`; fixed slots are emptied rather than removed
    pub(crate) fn remove_at(&mut self, index: usize) -> Option<ElementId> {
        match self {
            Children::None => None,
            Children::Fixed(slots) => slots.get_mut(index).and_then(Option::take),
            Children::Positional(children) => {
                (index < children.len()).then(|| children.remove(index))
            }
            Children::Grouped(_) => {
                let (group, offset) = self.group_of(index)?;
                let Children::Grouped(groups) = self else {
                    return None;
                };
                Some(groups[group].remove(offset))
            }
        }
    }

    /// Insert before flat `index`. Grouped storage inserts into the group that
    /// holds `index`, or appends to the last group (creating one if needed).
    pub(crate) fn insert_at(&mut self, index: usize, child: ElementId) -> bool {
        let total = self.len();
        match self {
            Children::Positional(children) if index <= children.len() => {
                children.insert(index, child);
                true
            }
            Children::Grouped(_) if index < total => {
                let Some((group, offset)) = self.group_of(index) else {
                    return false;
                };
                let Children::Grouped(groups) = self else {
                    return false;
                };
                groups[group].insert(offset, child);
                true
            }
            Children::Grouped(groups) if index == total => {
                if groups.is_empty() {
                    groups.push(Vec::new());
                }
                if let Some(last) = groups.last_mut() {
                    last.push(child);
                }
                true
            }
            _ => false,
        }
    }
}

/// One element of the document tree
#[derive(Debug)]
pub struct ElementNode {
    pub(crate) handle: ElementHandle,
    pub(crate) kind: ElementKind,
    pub(crate) parent: Option<ElementId>,
    pub(crate) children: Children,
    pub(crate) regions: Vec<String>,
    pub(crate) format: Option<FormatRef>,
    pub(crate) visual: Option<VisualEdge>,
    pub(crate) diagnostic: Option<Diagnostic>,
    pub(crate) value: Option<CalculatedValue>,
}

impl ElementNode {
    pub(crate) fn new(kind: ElementKind, handle: ElementHandle) -> Self {
        Self {
            handle,
            kind,
            parent: None,
            children: Children::for_placement(kind.placement()),
            regions: vec![String::new(); kind.region_count()],
            format: None,
            visual: None,
            diagnostic: None,
            value: None,
        }
    }

    pub fn handle(&self) -> ElementHandle {
        self.handle
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn parent(&self) -> Option<ElementId> {
        self.parent
    }

    pub fn children(&self) -> &Children {
        &self.children
    }

    pub fn regions(&self) -> &[String] {
        &self.regions
    }

    pub fn format(&self) -> Option<&FormatRef> {
        self.format.as_ref()
    }

    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        self.diagnostic.as_ref()
    }

    pub fn calculated_value(&self) -> Option<&CalculatedValue> {
        self.value.as_ref()
    }

    pub fn has_visual(&self) -> bool {
        self.visual.as_ref().is_some_and(VisualEdge::is_live)
    }

    /// Number of characters in `region`
    pub fn region_length(&self, region: usize) -> Option<usize> {
        self.regions.get(region).map(|text| text.chars().count())
    }

    pub(crate) fn notify(&self, f: impl FnOnce(&dyn crate::models::visual::Visual)) {
        if let Some(visual) = &self.visual {
            visual.notify(f);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(index: u32) -> ElementId {
        ElementId { index, generation: 0 }
    }

    #[test]
    fn test_fixed_removal_keeps_slot() {
        let mut children = Children::for_placement(Placement::Fixed(2));
        children.replace_at(1, Some(id(7)));
        assert_eq!(children.remove_at(1), Some(id(7)));
        assert_eq!(children.len(), 2);
        assert_eq!(children.get(1), Some(None));
    }

    #[test]
    fn test_grouped_flat_indexing() {
        let mut children = Children::Grouped(vec![vec![id(1), id(2)], vec![], vec![id(3)]]);
        assert_eq!(children.len(), 3);
        assert_eq!(children.group_of(2), Some((2, 0)));
        assert_eq!(children.flat_index(1, 0), Some(2));
        assert_eq!(children.index_of(id(3)), Some(2));

        assert!(children.insert_at(3, id(4)));
        assert_eq!(children.group_of(3), Some((2, 1)));
        assert_eq!(children.remove_at(0), Some(id(1)));
        assert_eq!(children.present(), vec![id(2), id(3), id(4)]);
    }

    #[test]
    fn test_grouped_append_creates_first_group() {
        let mut children = Children::for_placement(Placement::Grouped);
        assert!(children.insert_at(0, id(1)));
        assert_eq!(children, Children::Grouped(vec![vec![id(1)]]));
        assert!(!children.insert_at(5, id(2)));
    }

    #[test]
    fn test_positional_replace_requires_child() {
        let mut children = Children::Positional(vec![id(1)]);
        assert_eq!(children.replace_at(0, None), None);
        assert_eq!(children.replace_at(0, Some(id(2))), Some(id(1)));
    }
}
