//! Observer interface for hosts that render elements
//!
//! A `Visual` receives notifications when the element it is attached to
//! changes. It never mutates the tree. The edge from element to visual carries
//! an explicit ownership tag: an owned visual is dropped with its element, a
//! borrowed one is only referenced weakly and outlives nothing.

use crate::diagnostics::Diagnostic;
use crate::models::core::ElementId;
use crate::value::CalculatedValue;
use std::fmt;
use std::rc::{Rc, Weak};

/// Notifications emitted by the tree; every method defaults to a no-op
#[allow(unused_variables)]
pub trait Visual {
    /// The child at `index` is about to be detached from `element`
    fn child_about_to_be_removed(&self, element: ElementId, index: usize) {}

    /// Slot `index` of `element` now holds `child`
    fn child_set(&self, element: ElementId, index: usize, child: Option<ElementId>) {}

    /// `child` was inserted at `index` of a positional or grouped container
    fn child_inserted(&self, element: ElementId, index: usize, child: ElementId) {}

    /// `element` became part of a tree
    fn grafted(&self, element: ElementId) {}

    /// `element` is about to leave its tree
    fn about_to_ungraft(&self, element: ElementId) {}

    /// Text regions or other element data changed
    fn element_data_changed(&self, element: ElementId) {}

    /// The element's format was replaced or modified
    fn format_changed(&self, element: ElementId) {}

    fn calculated_value_updated(&self, element: ElementId, value: &CalculatedValue) {}

    fn calculated_value_cleared(&self, element: ElementId) {}

    fn diagnostic_reported(&self, element: ElementId, diagnostic: &Diagnostic) {}

    fn diagnostic_cleared(&self, element: ElementId) {}
}

/// Edge from an element to its visual, tagged with who owns the visual
pub enum VisualEdge {
    /// Dropped together with the element
    Owned(Box<dyn Visual>),
    /// Owned by the host; notifications stop once the host drops it
    Borrowed(Weak<dyn Visual>),
}

impl VisualEdge {
    pub fn owned(visual: impl Visual + 'static) -> Self {
        VisualEdge::Owned(Box::new(visual))
    }

    pub fn borrowed<V: Visual + 'static>(visual: &Rc<V>) -> Self {
        let shared: Rc<dyn Visual> = visual.clone();
        VisualEdge::Borrowed(Rc::downgrade(&shared))
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, VisualEdge::Owned(_))
    }

    /// False once a borrowed visual has been dropped by its host
    pub fn is_live(&self) -> bool {
        match self {
            VisualEdge::Owned(_) => true,
            VisualEdge::Borrowed(weak) => weak.strong_count() > 0,
        }
    }

    /// Run `f` against the visual if it is still alive
    pub(crate) fn notify(&self, f: impl FnOnce(&dyn Visual)) {
        match self {
            VisualEdge::Owned(visual) => f(visual.as_ref()),
            VisualEdge::Borrowed(weak) => {
                if let Some(visual) = weak.upgrade() {
                    f(visual.as_ref());
                }
            }
        }
    }
}

impl fmt::Debug for VisualEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VisualEdge::Owned(_) => f.write_str("VisualEdge::Owned"),
            VisualEdge::Borrowed(weak) => {
                write!(f, "VisualEdge::Borrowed(live: {})", weak.strong_count() > 0)
            }
        }
    }
}
