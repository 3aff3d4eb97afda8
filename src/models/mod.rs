//! Models module for the element tree
//!
//! This module contains the element kinds, the node storage, the arena that
//! owns every node, and the collaborators a node refers to (formats and
//! visuals).

pub mod core;
pub mod elements;
pub mod format;
pub mod handle;
pub mod tree;
pub mod visual;

// Re-export commonly used types
pub use core::{Children, ElementId, ElementNode};
pub use elements::{precedence, ElementKind, Placement};
pub use format::{same_format, Format, FormatRef, FormatTable};
pub use handle::ElementHandle;
pub use tree::ElementTree;
pub use visual::{Visual, VisualEdge};
