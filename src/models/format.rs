//! Style collaborator
//!
//! Formats are opaque to the core. It only duplicates them when cloning
//! elements, compares them by identity to find which elements share one, and
//! maps them to integer ids when a document is saved or loaded.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Shared style object
pub type FormatRef = Rc<dyn Format>;

/// An opaque, cloneable style
pub trait Format: fmt::Debug {
    /// Name of the concrete format type, for diagnostics
    fn type_name(&self) -> &str;

    /// Independent copy used when an element is cloned
    fn duplicate(&self) -> FormatRef;
}

/// Identity comparison, ignoring vtable metadata
pub fn same_format(a: &FormatRef, b: &FormatRef) -> bool {
    std::ptr::eq(Rc::as_ptr(a) as *const (), Rc::as_ptr(b) as *const ())
}

/// Integer ids for the formats referenced by a document
#[derive(Debug, Default, Clone)]
pub struct FormatTable {
    formats: BTreeMap<u64, FormatRef>,
}

impl FormatTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `format` to `id`, replacing any previous binding
    pub fn insert(&mut self, id: u64, format: FormatRef) {
        self.formats.insert(id, format);
    }

    /// Id of `format`, registering it under the next free id if unseen
    pub fn register(&mut self, format: &FormatRef) -> u64 {
        if let Some(id) = self.identifier_of(format) {
            return id;
        }
        let id = self.formats.keys().next_back().map_or(0, |last| last + 1);
        self.formats.insert(id, format.clone());
        id
    }

    pub fn identifier_of(&self, format: &FormatRef) -> Option<u64> {
        self.formats
            .iter()
            .find(|(_, candidate)| same_format(candidate, format))
            .map(|(id, _)| *id)
    }

    pub fn get(&self, id: u64) -> Option<FormatRef> {
        self.formats.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Bold;

    impl Format for Bold {
        fn type_name(&self) -> &str {
            "bold"
        }

        fn duplicate(&self) -> FormatRef {
            Rc::new(Bold)
        }
    }

    #[test]
    fn test_register_is_identity_based() {
        let mut table = FormatTable::new();
        let a: FormatRef = Rc::new(Bold);
        let b: FormatRef = Rc::new(Bold);

        assert_eq!(table.register(&a), 0);
        assert_eq!(table.register(&b), 1);
        assert_eq!(table.register(&a), 0);
        assert_eq!(table.len(), 2);
        assert!(same_format(&table.get(1).unwrap(), &b));
    }

    #[test]
    fn test_duplicate_is_a_new_identity() {
        let a: FormatRef = Rc::new(Bold);
        let copy = a.duplicate();
        assert!(!same_format(&a, &copy));
        assert_eq!(copy.type_name(), "bold");
    }
}
