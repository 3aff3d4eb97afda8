//! Error types for tree mutation, function registration and persistence
//!
//! Every recoverable failure is reported through one of these enums. A failed
//! operation leaves the tree, the cursor entries and the function tables
//! exactly as they were before the call.

use crate::models::handle::ElementHandle;
use thiserror::Error;

/// Structural and text editing failures on the element tree
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    /// The element id is stale or was never allocated by this tree
    #[error("element is not part of this tree")]
    UnknownElement,

    /// A child index past the end of the container
    #[error("child index {index} out of range (element has {count} children)")]
    IndexOutOfRange { index: usize, count: usize },

    /// The element is not currently a child of the given parent
    #[error("element is not a child of the given parent")]
    NotAChild,

    /// The parent is a leaf and cannot hold children
    #[error("element does not accept children")]
    NoChildren,

    /// The operation needs a different child placement (e.g. resizing a positional container)
    #[error("operation requires {expected} placement")]
    PlacementMismatch { expected: &'static str },

    /// Positional and grouped containers cannot hold empty slots
    #[error("positional containers cannot hold empty slots")]
    EmptySlotNotAllowed,

    /// Attaching the child would make it its own ancestor
    #[error("attaching the element would create a cycle")]
    WouldCreateCycle,

    /// A handle that is already present in the tree
    #[error("handle {0} is already in use")]
    DuplicateHandle(ElementHandle),

    /// Region index past the element's text regions
    #[error("region {region} out of range (element has {count} regions)")]
    RegionOutOfRange { region: usize, count: usize },

    /// Character offset past the end of a text region
    #[error("text index {index} out of range (region has {length} characters)")]
    TextIndexOutOfRange { index: usize, length: usize },

    /// A removal span whose end precedes its start
    #[error("span end precedes span start")]
    InvalidSpan,
}

/// Handle text read from a document that cannot name an element
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandleError {
    #[error("malformed handle: {0}")]
    Malformed(#[from] std::num::ParseIntError),

    /// The counter could not advance past this value
    #[error("handle {0} is outside the allocatable range")]
    OutOfRange(u64),
}

/// Function and variant registration failures
#[derive(Debug, Clone, Error)]
pub enum FunctionError {
    /// Parameter types and parameter descriptions have different lengths
    #[error("{types} parameter types but {descriptions} parameter descriptions")]
    DescriptionCountMismatch { types: usize, descriptions: usize },

    /// A value type name that the mapping table does not know
    #[error("unknown value type: {0}")]
    UnknownValueType(String),

    /// A second function registered under the same internal name
    #[error("function {0} is already registered")]
    DuplicateFunction(String),

    /// Translator template failed to compile or render
    #[error("translator template error: {0}")]
    Template(String),

    /// Malformed catalog configuration
    #[error("invalid function configuration: {0}")]
    Config(String),
}

/// Document persistence failures
///
/// The reader keeps the first of these as its sticky error state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PersistError {
    /// Document is not well-formed XML
    #[error("XML parsing failed: {0}")]
    Xml(String),

    /// Writer failed to emit an event
    #[error("XML writing failed: {0}")]
    Write(String),

    /// Element tag without a `handle` attribute
    #[error("element <{0}> has no handle attribute")]
    MissingHandle(String),

    /// `format` attribute that is not an integer or not in the format table
    #[error("element <{tag}> references unknown format {format}")]
    UnresolvedFormat { tag: String, format: String },

    /// Tag that does not name an element kind
    #[error("unknown element tag <{0}>")]
    UnknownTag(String),

    /// Handle already present in the destination tree
    #[error("handle {0} appears more than once")]
    DuplicateHandle(String),

    /// Children or regions that do not fit the element's placement
    #[error("invalid document structure: {0}")]
    Structure(String),
}
