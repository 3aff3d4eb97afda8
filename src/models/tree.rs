//! The element tree arena and its structural mutations
//!
//! Every node is owned by the arena; parent/child links are ids into it. A
//! node's identity is its slot, so there is no separate "bind self" step after
//! creation. Mutations that can invalidate a logical position take an optional
//! [`CursorStateCollection`] and rewrite its entries before any node they point
//! into is destroyed.
//!
//! A failed mutation returns an error and leaves the tree, its observers and
//! the cursor entries untouched.

use crate::diagnostics::Diagnostic;
use crate::error::TreeError;
use crate::models::core::{Children, ElementId, ElementNode};
use crate::models::elements::ElementKind;
use crate::models::format::{same_format, FormatRef};
use crate::models::handle::ElementHandle;
use crate::models::visual::VisualEdge;
use crate::text::cursor::{CursorStateCollection, CursorStateEntry};
use crate::text::regions::RegionSpan;
use crate::value::CalculatedValue;
use std::collections::HashMap;
use std::ops::Range;

pub type Result<T> = std::result::Result<T, TreeError>;

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<ElementNode>,
}

/// Arena holding every element of one or more documents
#[derive(Debug, Default)]
pub struct ElementTree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    handles: HashMap<ElementHandle, ElementId>,
}

impl ElementTree {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Creation and lookup
    // ========================================================================

    /// Create a detached element with a fresh handle
    pub fn create(&mut self, kind: ElementKind) -> ElementId {
        let mut handle = ElementHandle::allocate();
        while self.handles.contains_key(&handle) {
            log::warn!("skipping handle {} already held by this tree", handle);
            handle = ElementHandle::allocate();
        }
        self.insert_node(ElementNode::new(kind, handle))
    }

    /// Create a detached element with a handle read from a document
    pub fn create_with_handle(&mut self, kind: ElementKind, handle: ElementHandle) -> Result<ElementId> {
        if self.handles.contains_key(&handle) {
            log::warn!("rejecting duplicate handle {}", handle);
            return Err(TreeError::DuplicateHandle(handle));
        }
        Ok(self.insert_node(ElementNode::new(kind, handle)))
    }

    fn insert_node(&mut self, node: ElementNode) -> ElementId {
        let handle = node.handle;
        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.node = Some(node);
                ElementId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                ElementId {
                    index: (self.slots.len() - 1) as u32,
                    generation: 0,
                }
            }
        };
        self.handles.insert(handle, id);
        id
    }

    /// True while `id` refers to a live element
    pub fn contains(&self, id: ElementId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: ElementId) -> Option<&ElementNode> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    pub(crate) fn node(&self, id: ElementId) -> Result<&ElementNode> {
        self.get(id).ok_or(TreeError::UnknownElement)
    }

    pub(crate) fn node_mut(&mut self, id: ElementId) -> Result<&mut ElementNode> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
            .ok_or(TreeError::UnknownElement)
    }

    pub fn element_by_handle(&self, handle: ElementHandle) -> Option<ElementId> {
        self.handles.get(&handle).copied()
    }

    /// Number of live elements
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn kind(&self, id: ElementId) -> Option<ElementKind> {
        self.get(id).map(ElementNode::kind)
    }

    pub fn parent(&self, id: ElementId) -> Option<ElementId> {
        self.get(id).and_then(ElementNode::parent)
    }

    /// Number of child positions (empty fixed slots included)
    pub fn number_children(&self, id: ElementId) -> usize {
        self.get(id).map_or(0, |node| node.children.len())
    }

    /// Child at `index`, `None` for an empty slot or a bad index
    pub fn child(&self, id: ElementId, index: usize) -> Option<ElementId> {
        self.get(id).and_then(|node| node.children.get(index)).flatten()
    }

    pub fn children(&self, id: ElementId) -> Vec<Option<ElementId>> {
        self.get(id).map(|node| node.children.slots()).unwrap_or_default()
    }

    pub fn index_of_child(&self, parent: ElementId, child: ElementId) -> Option<usize> {
        self.get(parent).and_then(|node| node.children.index_of(child))
    }

    /// Topmost ancestor of `id` (itself when detached)
    pub fn root_of(&self, id: ElementId) -> ElementId {
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            current = parent;
        }
        current
    }

    /// True when `id` is `root` or lies beneath it
    pub fn is_within(&self, id: ElementId, root: ElementId) -> bool {
        let mut current = Some(id);
        while let Some(element) = current {
            if element == root {
                return true;
            }
            current = self.parent(element);
        }
        false
    }

    /// `id` and every element beneath it, pre-order
    pub fn descendants(&self, id: ElementId) -> Vec<ElementId> {
        let mut found = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.get(current) else {
                continue;
            };
            found.push(current);
            stack.extend(node.children.present().into_iter().rev());
        }
        found
    }

    // ========================================================================
    // Fixed slots and removal
    // ========================================================================

    /// Replace the child at `index`. `None` clears a fixed slot. The element
    /// previously in the slot is destroyed; an incoming child owned elsewhere
    /// is moved out of its old position first.
    pub fn set_child(
        &mut self,
        parent: ElementId,
        index: usize,
        child: Option<ElementId>,
        mut cursors: Option<&mut CursorStateCollection>,
    ) -> Result<()> {
        let node = self.node(parent)?;
        let count = node.children.len();
        let fixed = matches!(node.children, Children::Fixed(_));
        if matches!(node.children, Children::None) {
            return Err(TreeError::NoChildren);
        }
        if index >= count {
            log::warn!("set_child: index {} out of range ({} children)", index, count);
            return Err(TreeError::IndexOutOfRange { index, count });
        }
        if child.is_none() && !fixed {
            return Err(TreeError::EmptySlotNotAllowed);
        }
        let old = node.children.get(index).flatten();
        if old == child {
            return Ok(());
        }
        if let Some(incoming) = child {
            self.node(incoming)?;
            if self.is_within(parent, incoming) {
                return Err(TreeError::WouldCreateCycle);
            }
        }

        if let Some(cursors) = cursors.as_deref_mut() {
            let target = match child {
                Some(incoming) => self.first_position(incoming),
                None => CursorStateEntry::at_slot(parent, index),
            };
            cursors.rewrite(|entry| {
                let survives = child.is_some_and(|incoming| self.entry_within(entry, incoming));
                if !survives && old.is_some_and(|old| self.entry_within(entry, old)) {
                    return Some(target);
                }
                let at_this_slot = matches!(*entry,
                    CursorStateEntry::Slot { parent: p, child_index } if p == parent && child_index == index);
                (at_this_slot && child.is_some()).then_some(target)
            });
        }

        // Detach the incoming child first so a descendant of `old` is not
        // ungrafted along with it
        let mut index = index;
        if let Some(incoming) = child {
            if let Some(previous_parent) = self.parent(incoming) {
                let previous_index = self
                    .index_of_child(previous_parent, incoming)
                    .ok_or(TreeError::NotAChild)?;
                self.detach_for_move(previous_parent, previous_index, cursors.as_deref_mut())?;
                if previous_parent == parent && !fixed && previous_index < index {
                    index -= 1;
                }
            }
        }

        if let Some(old) = old {
            self.notify_removal(parent, index, old);
            self.node_mut(old)?.parent = None;
        }

        self.node_mut(parent)?.children.replace_at(index, child);
        if let Some(incoming) = child {
            self.node_mut(incoming)?.parent = Some(parent);
            self.notify_grafted(incoming);
        }
        self.node(parent)?.notify(|visual| visual.child_set(parent, index, child));

        if let Some(old) = old {
            self.destroy_subtree(old);
        }
        log::debug!("set_child {:?}[{}] = {:?}", parent, index, child);
        Ok(())
    }

    /// Remove and destroy the child at `index`. Fixed slots become empty;
    /// positional and grouped containers shrink.
    pub fn remove_child(
        &mut self,
        parent: ElementId,
        index: usize,
        cursors: Option<&mut CursorStateCollection>,
    ) -> Result<()> {
        if let Some(removed) = self.release_child(parent, index, cursors)? {
            self.destroy_subtree(removed);
        }
        Ok(())
    }

    /// Remove and destroy `child`, which must currently be a child of `parent`
    pub fn remove_child_element(
        &mut self,
        parent: ElementId,
        child: ElementId,
        cursors: Option<&mut CursorStateCollection>,
    ) -> Result<()> {
        self.node(parent)?;
        let index = self.index_of_child(parent, child).ok_or(TreeError::NotAChild)?;
        self.remove_child(parent, index, cursors)
    }

    /// Detach the child at `index` without destroying it. Positions inside it
    /// are relocated since it leaves the document.
    pub fn take_child(
        &mut self,
        parent: ElementId,
        index: usize,
        cursors: Option<&mut CursorStateCollection>,
    ) -> Result<Option<ElementId>> {
        self.release_child(parent, index, cursors)
    }

    /// Destroy an element and everything beneath it. A child is removed from
    /// its parent first; positions inside a destroyed root become invalid.
    pub fn destroy(&mut self, id: ElementId, cursors: Option<&mut CursorStateCollection>) -> Result<()> {
        self.node(id)?;
        if let Some(parent) = self.parent(id) {
            return self.remove_child_element(parent, id, cursors);
        }
        if let Some(cursors) = cursors {
            cursors.rewrite(|entry| self.entry_within(entry, id).then_some(CursorStateEntry::Invalid));
        }
        self.destroy_subtree(id);
        Ok(())
    }

    fn release_child(
        &mut self,
        parent: ElementId,
        index: usize,
        cursors: Option<&mut CursorStateCollection>,
    ) -> Result<Option<ElementId>> {
        let node = self.node(parent)?;
        if matches!(node.children, Children::None) {
            return Err(TreeError::NoChildren);
        }
        let count = node.children.len();
        if index >= count {
            log::warn!("remove_child: index {} out of range ({} children)", index, count);
            return Err(TreeError::IndexOutOfRange { index, count });
        }
        let Some(removed) = node.children.get(index).flatten() else {
            return Ok(None);
        };

        if let Some(cursors) = cursors {
            self.relocate_removed(cursors, parent, &[removed], index..index + 1);
        }

        self.notify_removal(parent, index, removed);
        self.node_mut(parent)?.children.remove_at(index);
        self.node_mut(removed)?.parent = None;
        log::debug!("released {:?} from {:?}[{}]", removed, parent, index);
        Ok(Some(removed))
    }

    // ========================================================================
    // Positional and grouped insertion
    // ========================================================================

    /// Insert `child` before flat `index` of a positional or grouped container
    pub fn insert_before(
        &mut self,
        parent: ElementId,
        index: usize,
        child: ElementId,
        mut cursors: Option<&mut CursorStateCollection>,
    ) -> Result<()> {
        self.check_insertable(parent, child)?;
        let count = self.number_children(parent);
        if index > count {
            return Err(TreeError::IndexOutOfRange { index, count });
        }

        let mut index = index;
        if let Some(previous_parent) = self.parent(child) {
            let previous_index = self.index_of_child(previous_parent, child).ok_or(TreeError::NotAChild)?;
            self.detach_for_move(previous_parent, previous_index, cursors.as_deref_mut())?;
            if previous_parent == parent && previous_index < index {
                index -= 1;
            }
        }

        self.attach_inserted(parent, index, child, cursors, |children| children.insert_at(index, child))
    }

    /// Append `child` to a positional or grouped container
    pub fn append(
        &mut self,
        parent: ElementId,
        child: ElementId,
        cursors: Option<&mut CursorStateCollection>,
    ) -> Result<()> {
        let count = self.number_children(parent);
        self.insert_before(parent, count, child, cursors)
    }

    /// Insert `child` at `offset` within `group` of a grouped container
    pub fn insert_into_group(
        &mut self,
        parent: ElementId,
        group: usize,
        offset: usize,
        child: ElementId,
        mut cursors: Option<&mut CursorStateCollection>,
    ) -> Result<()> {
        self.check_insertable(parent, child)?;
        let groups = self.number_groups(parent);
        if group >= groups {
            return Err(TreeError::IndexOutOfRange { index: group, count: groups });
        }
        let group_len = self.group_child_count(parent, group).unwrap_or(0);
        if offset > group_len {
            return Err(TreeError::IndexOutOfRange { index: offset, count: group_len });
        }

        let mut offset = offset;
        if let Some(previous_parent) = self.parent(child) {
            let previous_index = self.index_of_child(previous_parent, child).ok_or(TreeError::NotAChild)?;
            let previous_location = self.group_of_child(previous_parent, previous_index);
            self.detach_for_move(previous_parent, previous_index, cursors.as_deref_mut())?;
            if previous_parent == parent {
                if let Some((previous_group, previous_offset)) = previous_location {
                    if previous_group == group && previous_offset < offset {
                        offset -= 1;
                    }
                }
            }
        }

        let flat = self
            .node(parent)?
            .children
            .flat_index(group, offset)
            .ok_or(TreeError::IndexOutOfRange { index: offset, count: group_len })?;
        self.attach_inserted(parent, flat, child, cursors, |children| match children {
            Children::Grouped(groups) => {
                groups[group].insert(offset, child);
                true
            }
            _ => false,
        })
    }

    fn check_insertable(&self, parent: ElementId, child: ElementId) -> Result<()> {
        match self.node(parent)?.children {
            Children::None => return Err(TreeError::NoChildren),
            Children::Fixed(_) => {
                return Err(TreeError::PlacementMismatch {
                    expected: "positional or grouped",
                })
            }
            _ => {}
        }
        self.node(child)?;
        if self.is_within(parent, child) {
            return Err(TreeError::WouldCreateCycle);
        }
        Ok(())
    }

    fn attach_inserted(
        &mut self,
        parent: ElementId,
        index: usize,
        child: ElementId,
        cursors: Option<&mut CursorStateCollection>,
        insert: impl FnOnce(&mut Children) -> bool,
    ) -> Result<()> {
        let was_empty = self.node(parent)?.children.is_empty();
        let count = self.number_children(parent);
        if !insert(&mut self.node_mut(parent)?.children) {
            return Err(TreeError::IndexOutOfRange { index, count });
        }
        self.node_mut(child)?.parent = Some(parent);
        self.notify_grafted(child);
        self.node(parent)?.notify(|visual| visual.child_inserted(parent, index, child));

        if let Some(cursors) = cursors {
            let first = self.first_position(child);
            cursors.rewrite(|entry| match *entry {
                CursorStateEntry::Slot { parent: p, .. } if p == parent && was_empty => Some(first),
                CursorStateEntry::Slot { parent: p, child_index } if p == parent && child_index >= index => {
                    Some(CursorStateEntry::at_slot(parent, child_index + 1))
                }
                _ => None,
            });
        }
        log::debug!("inserted {:?} at {:?}[{}]", child, parent, index);
        Ok(())
    }

    /// Take a child out of its current position for reattachment elsewhere.
    /// Positions inside the child stay with it.
    fn detach_for_move(
        &mut self,
        parent: ElementId,
        index: usize,
        cursors: Option<&mut CursorStateCollection>,
    ) -> Result<()> {
        let Some(moving) = self.child(parent, index) else {
            return Err(TreeError::NotAChild);
        };
        let shrinks = !matches!(self.node(parent)?.children, Children::Fixed(_));
        self.notify_removal(parent, index, moving);
        self.node_mut(parent)?.children.remove_at(index);
        self.node_mut(moving)?.parent = None;

        if let (Some(cursors), true) = (cursors, shrinks) {
            let now_empty = self.number_children(parent) == 0;
            cursors.rewrite(|entry| match *entry {
                CursorStateEntry::Slot { parent: p, .. } if p == parent && now_empty => {
                    Some(CursorStateEntry::at_slot(parent, 0))
                }
                CursorStateEntry::Slot { parent: p, child_index } if p == parent && child_index > index => {
                    Some(CursorStateEntry::at_slot(parent, child_index - 1))
                }
                _ => None,
            });
        }
        Ok(())
    }

    // ========================================================================
    // Fixed arity and groups
    // ========================================================================

    /// Grow or shrink a fixed container. Growing appends empty slots;
    /// shrinking destroys every element in a removed slot.
    pub fn set_number_children(
        &mut self,
        parent: ElementId,
        count: usize,
        cursors: Option<&mut CursorStateCollection>,
    ) -> Result<()> {
        let Children::Fixed(slots) = &self.node(parent)?.children else {
            return Err(TreeError::PlacementMismatch { expected: "fixed" });
        };
        let old_count = slots.len();
        if count >= old_count {
            if let Children::Fixed(slots) = &mut self.node_mut(parent)?.children {
                slots.resize(count, None);
            }
            return Ok(());
        }

        let removed: Vec<(usize, ElementId)> = slots[count..]
            .iter()
            .enumerate()
            .filter_map(|(offset, slot)| slot.map(|child| (count + offset, child)))
            .collect();
        let tail = if count == 0 { None } else { Some(slots[count - 1]) };

        if let Some(cursors) = cursors {
            let target = match tail {
                None => CursorStateEntry::Invalid,
                Some(Some(last)) => self.last_position(last),
                Some(None) => CursorStateEntry::at_slot(parent, count - 1),
            };
            cursors.rewrite(|entry| {
                let inside = removed.iter().any(|(_, child)| self.entry_within(entry, *child));
                let past_end = matches!(*entry,
                    CursorStateEntry::Slot { parent: p, child_index } if p == parent && child_index >= count);
                (inside || past_end).then_some(target)
            });
        }

        for (index, child) in removed.iter().rev() {
            self.notify_removal(parent, *index, *child);
            self.node_mut(*child)?.parent = None;
        }
        if let Children::Fixed(slots) = &mut self.node_mut(parent)?.children {
            slots.truncate(count);
        }
        for (_, child) in removed {
            self.destroy_subtree(child);
        }
        log::debug!("resized {:?} from {} to {} slots", parent, old_count, count);
        Ok(())
    }

    pub fn number_groups(&self, id: ElementId) -> usize {
        match self.get(id).map(|node| &node.children) {
            Some(Children::Grouped(groups)) => groups.len(),
            _ => 0,
        }
    }

    pub fn group_child_count(&self, id: ElementId, group: usize) -> Option<usize> {
        match self.get(id).map(|node| &node.children) {
            Some(Children::Grouped(groups)) => groups.get(group).map(Vec::len),
            _ => None,
        }
    }

    /// (group, offset) of flat child `index`
    pub fn group_of_child(&self, id: ElementId, index: usize) -> Option<(usize, usize)> {
        self.get(id).and_then(|node| node.children.group_of(index))
    }

    /// Insert an empty group before `group`
    pub fn insert_group(&mut self, parent: ElementId, group: usize) -> Result<()> {
        let Children::Grouped(groups) = &mut self.node_mut(parent)?.children else {
            return Err(TreeError::PlacementMismatch { expected: "grouped" });
        };
        if group > groups.len() {
            return Err(TreeError::IndexOutOfRange {
                index: group,
                count: groups.len(),
            });
        }
        groups.insert(group, Vec::new());
        self.node(parent)?.notify(|visual| visual.element_data_changed(parent));
        Ok(())
    }

    /// Remove `group`, destroying its children
    pub fn remove_group(
        &mut self,
        parent: ElementId,
        group: usize,
        cursors: Option<&mut CursorStateCollection>,
    ) -> Result<()> {
        let children = &self.node(parent)?.children;
        let Children::Grouped(groups) = children else {
            return Err(TreeError::PlacementMismatch { expected: "grouped" });
        };
        let Some(members) = groups.get(group).cloned() else {
            return Err(TreeError::IndexOutOfRange {
                index: group,
                count: groups.len(),
            });
        };
        let start = children.flat_index(group, 0).unwrap_or(0);
        let range = start..start + members.len();

        if let Some(cursors) = cursors {
            if !members.is_empty() {
                self.relocate_removed(cursors, parent, &members, range.clone());
            }
        }

        for (offset, child) in members.iter().enumerate().rev() {
            self.notify_removal(parent, range.start + offset, *child);
            self.node_mut(*child)?.parent = None;
        }
        if let Children::Grouped(groups) = &mut self.node_mut(parent)?.children {
            groups.remove(group);
        }
        for child in members {
            self.destroy_subtree(child);
        }
        self.node(parent)?.notify(|visual| visual.element_data_changed(parent));
        Ok(())
    }

    // ========================================================================
    // Positions and cursor relocation
    // ========================================================================

    /// First position a cursor can take inside `id`
    pub fn first_position(&self, id: ElementId) -> CursorStateEntry {
        let Some(node) = self.get(id) else {
            return CursorStateEntry::Invalid;
        };
        if !node.regions.is_empty() {
            return CursorStateEntry::at_text(id, 0, 0);
        }
        if node.kind.is_container() {
            return match node.children.present().first() {
                Some(child) => self.first_position(*child),
                None => CursorStateEntry::at_slot(id, 0),
            };
        }
        CursorStateEntry::on_element(id)
    }

    /// Last position a cursor can take inside `id`
    pub fn last_position(&self, id: ElementId) -> CursorStateEntry {
        let Some(node) = self.get(id) else {
            return CursorStateEntry::Invalid;
        };
        if let Some(last) = node.regions.len().checked_sub(1) {
            let length = node.region_length(last).unwrap_or(0);
            return CursorStateEntry::at_text(id, last, length);
        }
        if node.kind.is_container() {
            return match node.children.present().last() {
                Some(child) => self.last_position(*child),
                None => CursorStateEntry::at_slot(id, node.children.len().saturating_sub(1)),
            };
        }
        CursorStateEntry::on_element(id)
    }

    pub(crate) fn entry_within(&self, entry: &CursorStateEntry, root: ElementId) -> bool {
        entry.anchor_element().is_some_and(|element| self.is_within(element, root))
    }

    /// Rewrite entries for removing the flat range `range` (holding `removed`) from `parent`
    fn relocate_removed(
        &self,
        cursors: &mut CursorStateCollection,
        parent: ElementId,
        removed: &[ElementId],
        range: Range<usize>,
    ) {
        let Some(node) = self.get(parent) else {
            return;
        };
        let fixed = matches!(node.children, Children::Fixed(_));
        let count = node.children.len();
        let new_count = if fixed { count } else { count - range.len() };

        let target = if fixed {
            CursorStateEntry::at_slot(parent, range.start)
        } else if new_count == 0 {
            CursorStateEntry::at_slot(parent, new_count.saturating_sub(1))
        } else {
            let sibling = if range.start > 0 {
                self.child(parent, range.start - 1)
            } else {
                self.child(parent, range.end)
            };
            sibling.map_or(CursorStateEntry::at_slot(parent, 0), |sibling| self.last_position(sibling))
        };

        let rewritten = cursors.rewrite(|entry| {
            if removed.iter().any(|child| self.entry_within(entry, *child)) {
                return Some(target);
            }
            match *entry {
                CursorStateEntry::Slot { parent: p, child_index } if p == parent && !fixed => {
                    if new_count == 0 {
                        Some(CursorStateEntry::at_slot(parent, 0))
                    } else if child_index >= range.end {
                        Some(CursorStateEntry::at_slot(parent, child_index - range.len()))
                    } else if child_index >= range.start {
                        Some(target)
                    } else {
                        None
                    }
                }
                _ => None,
            }
        });
        log::trace!("removal from {:?} relocated {} cursor entries", parent, rewritten);
    }

    // ========================================================================
    // Precedence
    // ========================================================================

    pub fn precedence(&self, id: ElementId) -> Option<u8> {
        self.kind(id).map(ElementKind::precedence)
    }

    /// Precedence context `parent` imposes on its child at `index`
    pub fn child_precedence(&self, parent: ElementId, index: usize) -> Option<u8> {
        self.kind(parent).map(|kind| kind.child_precedence(index))
    }

    /// True when `id` binds more loosely than the slot it occupies requires
    pub fn requires_parenthesis(&self, id: ElementId) -> bool {
        let Some(parent) = self.parent(id) else {
            return false;
        };
        let Some(index) = self.index_of_child(parent, id) else {
            return false;
        };
        match (self.precedence(id), self.child_precedence(parent, index)) {
            (Some(own), Some(context)) => own < context,
            _ => false,
        }
    }

    // ========================================================================
    // Cloning
    // ========================================================================

    /// Deep copy of `id` as a new detached element. With `span`, regions
    /// outside it are emptied and boundary regions clipped. Children are
    /// always copied whole.
    pub fn clone_element(&mut self, id: ElementId, span: Option<&RegionSpan>) -> Option<ElementId> {
        let node = self.get(id)?;
        let kind = node.kind;
        let regions: Vec<String> = match span {
            Some(span) => node
                .regions
                .iter()
                .enumerate()
                .map(|(region, text)| span.clip(region, text, node.regions.len()))
                .collect(),
            None => node.regions.clone(),
        };
        let format = node.format.as_ref().map(|format| format.duplicate());
        let shape = node.children.clone();

        let copy = self.create(kind);
        let cloned_children = match self.clone_children(&shape) {
            Some(children) => children,
            None => {
                log::warn!("clone of {:?} failed, discarding partial copy", id);
                self.destroy_subtree(copy);
                return None;
            }
        };

        let present = cloned_children.present();
        let copy_node = self.node_mut(copy).ok()?;
        copy_node.regions = regions;
        copy_node.format = format;
        copy_node.children = cloned_children;
        for child in present {
            if let Ok(child_node) = self.node_mut(child) {
                child_node.parent = Some(copy);
            }
        }
        Some(copy)
    }

    fn clone_children(&mut self, shape: &Children) -> Option<Children> {
        let mut created = Vec::new();
        let mut clone_one = |tree: &mut Self, child: ElementId| -> Option<ElementId> {
            let copy = tree.clone_element(child, None)?;
            created.push(copy);
            Some(copy)
        };

        let result = (|| {
            Some(match shape {
                Children::None => Children::None,
                Children::Fixed(slots) => {
                    let mut copies = Vec::with_capacity(slots.len());
                    for slot in slots {
                        copies.push(match slot {
                            Some(child) => Some(clone_one(self, *child)?),
                            None => None,
                        });
                    }
                    Children::Fixed(copies)
                }
                Children::Positional(children) => {
                    let mut copies = Vec::with_capacity(children.len());
                    for child in children {
                        copies.push(clone_one(self, *child)?);
                    }
                    Children::Positional(copies)
                }
                Children::Grouped(groups) => {
                    let mut copies = Vec::with_capacity(groups.len());
                    for group in groups {
                        let mut group_copies = Vec::with_capacity(group.len());
                        for child in group {
                            group_copies.push(clone_one(self, *child)?);
                        }
                        copies.push(group_copies);
                    }
                    Children::Grouped(copies)
                }
            })
        })();

        if result.is_none() {
            for copy in created {
                self.destroy_subtree(copy);
            }
        }
        result
    }

    // ========================================================================
    // Format, visual, diagnostic and calculated value
    // ========================================================================

    pub fn set_format(&mut self, id: ElementId, format: Option<FormatRef>) -> Result<()> {
        let node = self.node_mut(id)?;
        node.format = format;
        self.node(id)?.notify(|visual| visual.format_changed(id));
        Ok(())
    }

    /// Every live element that references `format`
    pub fn elements_using_format(&self, format: &FormatRef) -> Vec<ElementId> {
        let mut users: Vec<ElementId> = self
            .handles
            .values()
            .copied()
            .filter(|id| {
                self.get(*id)
                    .and_then(ElementNode::format)
                    .is_some_and(|candidate| same_format(candidate, format))
            })
            .collect();
        users.sort();
        users
    }

    /// Tell every user of `format` that it changed; returns how many were notified
    pub fn notify_format_changed(&self, format: &FormatRef) -> usize {
        let users = self.elements_using_format(format);
        for id in &users {
            if let Some(node) = self.get(*id) {
                node.notify(|visual| visual.format_changed(*id));
            }
        }
        users.len()
    }

    /// Attach an observer, replacing (and dropping, if owned) any previous one
    pub fn attach_visual(&mut self, id: ElementId, visual: VisualEdge) -> Result<()> {
        self.node_mut(id)?.visual = Some(visual);
        Ok(())
    }

    pub fn detach_visual(&mut self, id: ElementId) -> Result<Option<VisualEdge>> {
        Ok(self.node_mut(id)?.visual.take())
    }

    pub fn report_diagnostic(&mut self, id: ElementId, diagnostic: Diagnostic) -> Result<()> {
        let node = self.node_mut(id)?;
        node.diagnostic = Some(diagnostic);
        let node = self.node(id)?;
        if let Some(diagnostic) = &node.diagnostic {
            node.notify(|visual| visual.diagnostic_reported(id, diagnostic));
        }
        Ok(())
    }

    pub fn clear_diagnostic(&mut self, id: ElementId) -> Result<()> {
        if self.node_mut(id)?.diagnostic.take().is_some() {
            self.node(id)?.notify(|visual| visual.diagnostic_cleared(id));
        }
        Ok(())
    }

    pub fn set_calculated_value(&mut self, id: ElementId, value: CalculatedValue) -> Result<()> {
        self.node_mut(id)?.value = Some(value.clone());
        self.node(id)?.notify(|visual| visual.calculated_value_updated(id, &value));
        Ok(())
    }

    pub fn clear_calculated_value(&mut self, id: ElementId) -> Result<()> {
        if self.node_mut(id)?.value.take().is_some() {
            self.node(id)?.notify(|visual| visual.calculated_value_cleared(id));
        }
        Ok(())
    }

    // ========================================================================
    // Lifecycle notifications and destruction
    // ========================================================================

    fn notify_removal(&self, parent: ElementId, index: usize, child: ElementId) {
        if let Some(node) = self.get(parent) {
            node.notify(|visual| visual.child_about_to_be_removed(parent, index));
        }
        for element in self.descendants(child) {
            if let Some(node) = self.get(element) {
                node.notify(|visual| visual.about_to_ungraft(element));
            }
        }
    }

    fn notify_grafted(&self, child: ElementId) {
        for element in self.descendants(child) {
            if let Some(node) = self.get(element) {
                node.notify(|visual| visual.grafted(element));
            }
        }
    }

    fn destroy_subtree(&mut self, id: ElementId) {
        for element in self.descendants(id) {
            let Some(slot) = self.slots.get_mut(element.index as usize) else {
                continue;
            };
            if let Some(node) = slot.node.take() {
                self.handles.remove(&node.handle);
            }
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(element.index);
        }
        log::trace!("destroyed subtree rooted at {:?}", id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::format::Format;
    use crate::models::visual::Visual;
    use crate::value::Value;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Recorder {
        events: RefCell<Vec<String>>,
    }

    impl Visual for Recorder {
        fn child_about_to_be_removed(&self, _element: ElementId, index: usize) {
            self.events.borrow_mut().push(format!("removing {}", index));
        }

        fn child_set(&self, _element: ElementId, index: usize, child: Option<ElementId>) {
            self.events.borrow_mut().push(format!("set {} {}", index, child.is_some()));
        }

        fn child_inserted(&self, _element: ElementId, index: usize, _child: ElementId) {
            self.events.borrow_mut().push(format!("inserted {}", index));
        }

        fn grafted(&self, _element: ElementId) {
            self.events.borrow_mut().push("grafted".to_string());
        }

        fn about_to_ungraft(&self, _element: ElementId) {
            self.events.borrow_mut().push("ungraft".to_string());
        }

        fn format_changed(&self, _element: ElementId) {
            self.events.borrow_mut().push("format".to_string());
        }

        fn calculated_value_updated(&self, _element: ElementId, value: &CalculatedValue) {
            self.events.borrow_mut().push(format!("value {:?}", value.value_type()));
        }

        fn calculated_value_cleared(&self, _element: ElementId) {
            self.events.borrow_mut().push("value cleared".to_string());
        }

        fn diagnostic_reported(&self, _element: ElementId, diagnostic: &Diagnostic) {
            self.events.borrow_mut().push(format!("diagnostic {}", diagnostic.kind));
        }

        fn diagnostic_cleared(&self, _element: ElementId) {
            self.events.borrow_mut().push("diagnostic cleared".to_string());
        }
    }

    #[derive(Debug)]
    struct Shade;

    impl Format for Shade {
        fn type_name(&self) -> &str {
            "shade"
        }

        fn duplicate(&self) -> FormatRef {
            Rc::new(Shade)
        }
    }

    fn literal(tree: &mut ElementTree, digits: &str) -> ElementId {
        let id = tree.create(ElementKind::IntegerLiteral);
        tree.set_text(id, 0, digits, None).unwrap();
        id
    }

    #[test]
    fn test_set_child_replaces_and_destroys_old() {
        let mut tree = ElementTree::new();
        let add = tree.create(ElementKind::Addition);
        let one = literal(&mut tree, "1");
        let two = literal(&mut tree, "2");

        tree.set_child(add, 0, Some(one), None).unwrap();
        tree.set_child(add, 0, Some(two), None).unwrap();

        assert!(!tree.contains(one));
        assert_eq!(tree.child(add, 0), Some(two));
        assert_eq!(tree.parent(two), Some(add));
    }

    #[test]
    fn test_set_child_bad_index_changes_nothing() {
        let mut tree = ElementTree::new();
        let add = tree.create(ElementKind::Addition);
        let one = literal(&mut tree, "1");

        let result = tree.set_child(add, 2, Some(one), None);
        assert_eq!(result, Err(TreeError::IndexOutOfRange { index: 2, count: 2 }));
        assert_eq!(tree.parent(one), None);
        assert_eq!(tree.number_children(add), 2);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let mut tree = ElementTree::new();
        let outer = tree.create(ElementKind::Parenthesis);
        let inner = tree.create(ElementKind::Parenthesis);
        tree.set_child(outer, 0, Some(inner), None).unwrap();

        assert_eq!(tree.set_child(inner, 0, Some(outer), None), Err(TreeError::WouldCreateCycle));
        assert_eq!(tree.set_child(outer, 0, Some(outer), None), Err(TreeError::WouldCreateCycle));
    }

    #[test]
    fn test_set_child_moves_from_previous_parent() {
        let mut tree = ElementTree::new();
        let frame = tree.create(ElementKind::Frame);
        let negate = tree.create(ElementKind::UnaryMinus);
        let one = literal(&mut tree, "1");
        tree.append(frame, one, None).unwrap();

        tree.set_child(negate, 0, Some(one), None).unwrap();
        assert_eq!(tree.number_children(frame), 0);
        assert_eq!(tree.parent(one), Some(negate));
        assert!(tree.contains(one));
    }

    #[test]
    fn test_move_within_positional_parent() {
        let mut tree = ElementTree::new();
        let frame = tree.create(ElementKind::Frame);
        let items: Vec<ElementId> = ["a", "b", "c"].iter().map(|text| literal(&mut tree, text)).collect();
        for item in &items {
            tree.append(frame, *item, None).unwrap();
        }

        tree.insert_before(frame, 3, items[0], None).unwrap();
        assert_eq!(tree.children(frame), vec![Some(items[1]), Some(items[2]), Some(items[0])]);

        tree.append(frame, items[1], None).unwrap();
        assert_eq!(tree.children(frame), vec![Some(items[2]), Some(items[0]), Some(items[1])]);
    }

    #[test]
    fn test_empty_slot_not_allowed_in_positional() {
        let mut tree = ElementTree::new();
        let frame = tree.create(ElementKind::Frame);
        let one = literal(&mut tree, "1");
        tree.append(frame, one, None).unwrap();
        assert_eq!(tree.set_child(frame, 0, None, None), Err(TreeError::EmptySlotNotAllowed));
    }

    #[test]
    fn test_shrink_relocates_to_new_tail() {
        let mut tree = ElementTree::new();
        let add = tree.create(ElementKind::Addition);
        let one = literal(&mut tree, "12");
        let two = literal(&mut tree, "3");
        tree.set_child(add, 0, Some(one), None).unwrap();
        tree.set_child(add, 1, Some(two), None).unwrap();

        let mut cursors = CursorStateCollection::new();
        let entry = cursors.push_entry(CursorStateEntry::at_text(two, 0, 1));
        tree.set_number_children(add, 1, Some(&mut cursors)).unwrap();

        assert!(!tree.contains(two));
        assert_eq!(cursors.entry(entry), Some(&CursorStateEntry::at_text(one, 0, 2)));

        tree.set_number_children(add, 0, Some(&mut cursors)).unwrap();
        assert_eq!(cursors.entry(entry), Some(&CursorStateEntry::Invalid));
    }

    #[test]
    fn test_grow_appends_empty_slots() {
        let mut tree = ElementTree::new();
        let add = tree.create(ElementKind::Addition);
        tree.set_number_children(add, 4, None).unwrap();
        assert_eq!(tree.children(add), vec![None; 4]);

        let frame = tree.create(ElementKind::Frame);
        assert_eq!(
            tree.set_number_children(frame, 1, None),
            Err(TreeError::PlacementMismatch { expected: "fixed" })
        );
    }

    #[test]
    fn test_remove_group_shifts_slot_entries() {
        let mut tree = ElementTree::new();
        let matrix = tree.create(ElementKind::Matrix);
        tree.insert_group(matrix, 0).unwrap();
        tree.insert_group(matrix, 1).unwrap();
        let a = literal(&mut tree, "1");
        let b = literal(&mut tree, "2");
        tree.insert_into_group(matrix, 0, 0, a, None).unwrap();
        tree.insert_into_group(matrix, 1, 0, b, None).unwrap();

        let mut cursors = CursorStateCollection::new();
        let inside = cursors.push_entry(CursorStateEntry::at_text(a, 0, 0));
        let slot = cursors.push_entry(CursorStateEntry::at_slot(matrix, 1));
        tree.remove_group(matrix, 0, Some(&mut cursors)).unwrap();

        assert_eq!(tree.number_groups(matrix), 1);
        assert!(!tree.contains(a));
        assert_eq!(cursors.entry(inside), Some(&CursorStateEntry::at_text(b, 0, 1)));
        assert_eq!(cursors.entry(slot), Some(&CursorStateEntry::at_slot(matrix, 0)));
    }

    #[test]
    fn test_slot_placeholder_moves_into_first_insert() {
        let mut tree = ElementTree::new();
        let frame = tree.create(ElementKind::Frame);
        let mut cursors = CursorStateCollection::new();
        let entry = cursors.push_entry(tree.first_position(frame));
        assert_eq!(cursors.entry(entry), Some(&CursorStateEntry::at_slot(frame, 0)));

        let one = literal(&mut tree, "1");
        tree.append(frame, one, Some(&mut cursors)).unwrap();
        assert_eq!(cursors.entry(entry), Some(&CursorStateEntry::at_text(one, 0, 0)));
    }

    #[test]
    fn test_visual_notifications_in_order() {
        let mut tree = ElementTree::new();
        let negate = tree.create(ElementKind::UnaryMinus);
        let recorder = Rc::new(Recorder::default());
        tree.attach_visual(negate, VisualEdge::borrowed(&recorder)).unwrap();

        let one = literal(&mut tree, "1");
        let two = literal(&mut tree, "2");
        tree.attach_visual(one, VisualEdge::borrowed(&recorder)).unwrap();
        tree.set_child(negate, 0, Some(one), None).unwrap();
        tree.set_child(negate, 0, Some(two), None).unwrap();

        assert_eq!(
            *recorder.events.borrow(),
            vec!["grafted", "set 0 true", "removing 0", "ungraft", "set 0 true"]
        );
    }

    #[test]
    fn test_dropped_borrowed_visual_is_ignored() {
        let mut tree = ElementTree::new();
        let frame = tree.create(ElementKind::Frame);
        let recorder = Rc::new(Recorder::default());
        tree.attach_visual(frame, VisualEdge::borrowed(&recorder)).unwrap();
        drop(recorder);

        let one = literal(&mut tree, "1");
        tree.append(frame, one, None).unwrap();
        assert!(!tree.get(frame).unwrap().has_visual());
    }

    #[test]
    fn test_requires_parenthesis() {
        let mut tree = ElementTree::new();
        let multiply = tree.create(ElementKind::Multiplication);
        let add = tree.create(ElementKind::Addition);
        let power = tree.create(ElementKind::Power);
        let one = literal(&mut tree, "1");
        tree.set_child(multiply, 0, Some(add), None).unwrap();
        tree.set_child(multiply, 1, Some(one), None).unwrap();

        assert!(tree.requires_parenthesis(add));
        assert!(!tree.requires_parenthesis(one));

        let subtract = tree.create(ElementKind::Subtraction);
        let inner = tree.create(ElementKind::Subtraction);
        tree.set_child(subtract, 1, Some(inner), None).unwrap();
        assert!(tree.requires_parenthesis(inner));

        let base = tree.create(ElementKind::Power);
        tree.set_child(power, 0, Some(base), None).unwrap();
        assert!(tree.requires_parenthesis(base));
    }

    #[test]
    fn test_stale_id_does_not_resolve() {
        let mut tree = ElementTree::new();
        let first = tree.create(ElementKind::Text);
        tree.destroy(first, None).unwrap();
        let second = tree.create(ElementKind::Text);

        assert!(!tree.contains(first));
        assert!(tree.contains(second));
        assert_eq!(tree.remove_child(first, 0, None), Err(TreeError::UnknownElement));
    }

    #[test]
    fn test_duplicate_handle_is_rejected() {
        let mut tree = ElementTree::new();
        let handle = ElementHandle::allocate();
        tree.create_with_handle(ElementKind::Text, handle).unwrap();
        assert_eq!(
            tree.create_with_handle(ElementKind::Text, handle),
            Err(TreeError::DuplicateHandle(handle))
        );
    }

    #[test]
    fn test_unwrapping_parenthesis_keeps_inner_cursor() {
        let mut tree = ElementTree::new();
        let negate = tree.create(ElementKind::UnaryMinus);
        let paren = tree.create(ElementKind::Parenthesis);
        let number = literal(&mut tree, "123");
        tree.set_child(paren, 0, Some(number), None).unwrap();
        tree.set_child(negate, 0, Some(paren), None).unwrap();
        let recorder = Rc::new(Recorder::default());
        tree.attach_visual(number, VisualEdge::borrowed(&recorder)).unwrap();

        let mut cursors = CursorStateCollection::new();
        let inner = cursors.push_entry(CursorStateEntry::at_text(number, 0, 2));
        let on_paren = cursors.push_entry(CursorStateEntry::on_element(paren));
        tree.set_child(negate, 0, Some(number), Some(&mut cursors)).unwrap();

        assert!(!tree.contains(paren));
        assert_eq!(tree.child(negate, 0), Some(number));
        assert_eq!(tree.parent(number), Some(negate));
        assert_eq!(cursors.entry(inner), Some(&CursorStateEntry::at_text(number, 0, 2)));
        assert_eq!(cursors.entry(on_paren), Some(&CursorStateEntry::at_text(number, 0, 0)));
        assert_eq!(*recorder.events.borrow(), vec!["ungraft", "grafted"]);
    }

    #[test]
    fn test_format_users_and_notifications() {
        let mut tree = ElementTree::new();
        let shared: FormatRef = Rc::new(Shade);
        let frame = tree.create(ElementKind::Frame);
        let one = literal(&mut tree, "1");
        let two = literal(&mut tree, "2");
        tree.append(frame, one, None).unwrap();
        tree.append(frame, two, None).unwrap();

        let recorder = Rc::new(Recorder::default());
        tree.attach_visual(one, VisualEdge::borrowed(&recorder)).unwrap();
        tree.attach_visual(two, VisualEdge::borrowed(&recorder)).unwrap();
        tree.set_format(one, Some(shared.clone())).unwrap();
        tree.set_format(two, Some(shared.clone())).unwrap();
        assert_eq!(tree.elements_using_format(&shared), vec![one, two]);

        // Clones get their own duplicate of the format
        let copy = tree.clone_element(frame, None).unwrap();
        let copied = tree.child(copy, 0).unwrap();
        let duplicate = tree.get(copied).unwrap().format().unwrap().clone();
        assert!(!same_format(&duplicate, &shared));
        assert_eq!(tree.elements_using_format(&shared), vec![one, two]);
        assert_eq!(tree.elements_using_format(&duplicate), vec![copied]);

        recorder.events.borrow_mut().clear();
        assert_eq!(tree.notify_format_changed(&shared), 2);
        assert_eq!(*recorder.events.borrow(), vec!["format", "format"]);

        tree.set_format(one, None).unwrap();
        assert_eq!(tree.elements_using_format(&shared), vec![two]);
        assert_eq!(tree.notify_format_changed(&shared), 1);
        assert_eq!(recorder.events.borrow().len(), 4);
    }

    #[test]
    fn test_value_and_diagnostic_notifications() {
        let mut tree = ElementTree::new();
        let number = literal(&mut tree, "3");
        let recorder = Rc::new(Recorder::default());
        tree.attach_visual(number, VisualEdge::borrowed(&recorder)).unwrap();

        tree.set_calculated_value(number, Value::Integer(3).shared()).unwrap();
        assert!(tree.get(number).unwrap().calculated_value().is_some());
        tree.clear_calculated_value(number).unwrap();
        tree.clear_calculated_value(number).unwrap();

        tree.report_diagnostic(number, Diagnostic::error("type_mismatch", "expected real")).unwrap();
        assert_eq!(tree.get(number).unwrap().diagnostic().map(|d| d.kind.as_str()), Some("type_mismatch"));
        tree.clear_diagnostic(number).unwrap();
        tree.clear_diagnostic(number).unwrap();

        assert_eq!(
            *recorder.events.borrow(),
            vec![
                "value Integer",
                "value cleared",
                "diagnostic type_mismatch",
                "diagnostic cleared",
            ]
        );
        assert!(tree.get(number).unwrap().diagnostic().is_none());
    }
}
