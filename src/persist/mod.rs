//! XML persistence of element trees
//!
//! Every element tag carries a required `handle` attribute and an optional
//! `format` attribute holding an integer id from a caller-supplied
//! [`FormatTable`](crate::models::FormatTable). Text regions are `<region>`
//! children; fixed children are wrapped in `<slot>` and grouped children in
//! `<group>`.

pub mod reader;
pub mod writer;

pub use reader::DocumentReader;
pub use writer::DocumentWriter;

use crate::error::PersistError;

/// Result type for persistence operations
pub type Result<T> = std::result::Result<T, PersistError>;

pub const DOCUMENT_VERSION: &str = "1";

pub(crate) const DOCUMENT_TAG: &str = "document";
pub(crate) const REGION_TAG: &str = "region";
pub(crate) const SLOT_TAG: &str = "slot";
pub(crate) const GROUP_TAG: &str = "group";
