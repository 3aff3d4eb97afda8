//! Text regions and logical cursor positions
//!
//! ## Modules
//!
//! - `regions`: Character-indexed editing of an element's text regions
//! - `cursor`: Cursor entries and the collection that keeps them valid

pub mod cursor;
pub mod regions;

// Re-exports for convenience
pub use cursor::{Cursor, CursorKey, CursorStateCollection, CursorStateEntry};
pub use regions::RegionSpan;
