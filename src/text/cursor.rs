//! Logical cursor positions and the batch that keeps them valid across edits
//!
//! The protocol is capture, mutate, update: snapshot the live cursors into a
//! [`CursorStateCollection`], hand the collection to every tree mutation so it
//! can rewrite the entries it affects, then push the entries back onto the
//! cursors.

use crate::models::core::ElementId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A logical position in the element tree
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CursorStateEntry {
    /// Position that no longer refers to anything
    #[default]
    Invalid,
    /// On a live element, optionally at a character offset within a region
    Element {
        element: ElementId,
        text_index: Option<usize>,
        region: usize,
    },
    /// Placeholder at a child position of a live parent
    Slot { parent: ElementId, child_index: usize },
}

impl CursorStateEntry {
    /// On the element as a whole
    pub fn on_element(element: ElementId) -> Self {
        CursorStateEntry::Element {
            element,
            text_index: None,
            region: 0,
        }
    }

    /// At a character offset within a region
    pub fn at_text(element: ElementId, region: usize, text_index: usize) -> Self {
        CursorStateEntry::Element {
            element,
            text_index: Some(text_index),
            region,
        }
    }

    pub fn at_slot(parent: ElementId, child_index: usize) -> Self {
        CursorStateEntry::Slot { parent, child_index }
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self, CursorStateEntry::Invalid)
    }

    pub fn is_slot(&self) -> bool {
        matches!(self, CursorStateEntry::Slot { .. })
    }

    /// Element the entry hangs off: the element itself or the slot's parent
    pub fn anchor_element(&self) -> Option<ElementId> {
        match self {
            CursorStateEntry::Invalid => None,
            CursorStateEntry::Element { element, .. } => Some(*element),
            CursorStateEntry::Slot { parent, .. } => Some(*parent),
        }
    }
}

/// Host-chosen identifier of a live cursor
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CursorKey(pub u64);

/// A live cursor: insertion point plus optional selection anchor
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Cursor {
    pub position: CursorStateEntry,
    pub anchor: Option<CursorStateEntry>,
}

impl Cursor {
    pub fn new(position: CursorStateEntry) -> Self {
        Self { position, anchor: None }
    }

    pub fn with_selection(position: CursorStateEntry, anchor: CursorStateEntry) -> Self {
        Self {
            position,
            anchor: Some(anchor),
        }
    }

    pub fn has_selection(&self) -> bool {
        self.anchor.is_some_and(|anchor| anchor != self.position)
    }

    /// Drop the selection, keeping the insertion point
    pub fn collapse(&mut self) {
        self.anchor = None;
    }
}

/// Indices of a tracked cursor's two entries
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct CursorEntries {
    position: usize,
    anchor: Option<usize>,
}

/// Batch of positions that tree mutations keep valid
#[derive(Clone, Debug, Default)]
pub struct CursorStateCollection {
    entries: Vec<CursorStateEntry>,
    cursors: BTreeMap<CursorKey, CursorEntries>,
}

impl CursorStateCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot every cursor's position and anchor into this collection
    pub fn capture_cursor_state<'a>(&mut self, cursors: impl IntoIterator<Item = (CursorKey, &'a Cursor)>) {
        for (key, cursor) in cursors {
            let position = self.store(self.cursors.get(&key).map(|tracked| tracked.position), cursor.position);
            let anchor = cursor.anchor.map(|anchor| {
                let previous = self.cursors.get(&key).and_then(|tracked| tracked.anchor);
                self.store(previous, anchor)
            });
            self.cursors.insert(key, CursorEntries { position, anchor });
        }
        log::trace!("captured {} cursors into {} entries", self.cursors.len(), self.entries.len());
    }

    /// Push the (possibly rewritten) entries back onto the cursors
    pub fn update_cursor_state<'a>(
        &self,
        cursors: impl IntoIterator<Item = (CursorKey, &'a mut Cursor)>,
        clear_selections: bool,
    ) {
        for (key, cursor) in cursors {
            let Some(tracked) = self.cursors.get(&key) else {
                continue;
            };
            cursor.position = self.entries[tracked.position];
            cursor.anchor = if clear_selections {
                None
            } else {
                tracked.anchor.map(|index| self.entries[index])
            };
        }
    }

    /// Current state of a tracked cursor
    pub fn cursor(&self, key: CursorKey) -> Option<Cursor> {
        self.cursors.get(&key).map(|tracked| Cursor {
            position: self.entries[tracked.position],
            anchor: tracked.anchor.map(|index| self.entries[index]),
        })
    }

    /// Track a standalone position, returning its index
    pub fn push_entry(&mut self, entry: CursorStateEntry) -> usize {
        self.entries.push(entry);
        self.entries.len() - 1
    }

    pub fn entry(&self, index: usize) -> Option<&CursorStateEntry> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[CursorStateEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursors.clear();
    }

    /// Rewrite every entry for which `f` returns a replacement
    pub(crate) fn rewrite(&mut self, mut f: impl FnMut(&CursorStateEntry) -> Option<CursorStateEntry>) -> usize {
        let mut rewritten = 0;
        for entry in &mut self.entries {
            if let Some(replacement) = f(entry) {
                if replacement != *entry {
                    log::trace!("cursor entry {:?} -> {:?}", entry, replacement);
                    *entry = replacement;
                    rewritten += 1;
                }
            }
        }
        rewritten
    }

    fn store(&mut self, previous: Option<usize>, entry: CursorStateEntry) -> usize {
        match previous {
            Some(index) => {
                self.entries[index] = entry;
                index
            }
            None => self.push_entry(entry),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(index: u32) -> ElementId {
        ElementId { index, generation: 0 }
    }

    #[test]
    fn test_capture_then_update_round_trips() {
        let mut collection = CursorStateCollection::new();
        let cursor = Cursor::with_selection(
            CursorStateEntry::at_text(element(1), 0, 3),
            CursorStateEntry::at_text(element(1), 0, 1),
        );
        collection.capture_cursor_state([(CursorKey(1), &cursor)]);
        assert_eq!(collection.len(), 2);

        let mut live = Cursor::default();
        collection.update_cursor_state([(CursorKey(1), &mut live)], false);
        assert_eq!(live, cursor);
        assert!(live.has_selection());
    }

    #[test]
    fn test_update_can_clear_selections() {
        let mut collection = CursorStateCollection::new();
        let cursor = Cursor::with_selection(
            CursorStateEntry::on_element(element(1)),
            CursorStateEntry::on_element(element(2)),
        );
        collection.capture_cursor_state([(CursorKey(7), &cursor)]);

        let mut live = cursor;
        collection.update_cursor_state([(CursorKey(7), &mut live)], true);
        assert_eq!(live.anchor, None);
        assert_eq!(live.position, cursor.position);
    }

    #[test]
    fn test_recapture_reuses_entries() {
        let mut collection = CursorStateCollection::new();
        let first = Cursor::new(CursorStateEntry::on_element(element(1)));
        let second = Cursor::new(CursorStateEntry::on_element(element(2)));
        collection.capture_cursor_state([(CursorKey(1), &first)]);
        collection.capture_cursor_state([(CursorKey(1), &second)]);

        assert_eq!(collection.len(), 1);
        assert_eq!(collection.cursor(CursorKey(1)), Some(second));
    }

    #[test]
    fn test_untracked_cursor_is_left_alone() {
        let collection = CursorStateCollection::new();
        let original = Cursor::new(CursorStateEntry::on_element(element(3)));
        let mut live = original;
        collection.update_cursor_state([(CursorKey(9), &mut live)], true);
        assert_eq!(live, original);
    }

    #[test]
    fn test_rewrite_counts_changes() {
        let mut collection = CursorStateCollection::new();
        collection.push_entry(CursorStateEntry::on_element(element(1)));
        collection.push_entry(CursorStateEntry::on_element(element(2)));

        let rewritten = collection.rewrite(|entry| {
            (entry.anchor_element() == Some(element(1))).then_some(CursorStateEntry::Invalid)
        });
        assert_eq!(rewritten, 1);
        assert!(!collection.entry(0).unwrap().is_valid());
        assert!(collection.entry(1).unwrap().is_valid());
    }
}
