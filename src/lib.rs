//! Element tree and function resolution core
//!
//! The document is a tree of typed elements held in an [`ElementTree`] arena.
//! Structural and text edits keep a [`CursorStateCollection`] of logical
//! positions valid. Function calls are type-checked against a
//! [`FunctionCatalog`] of capability-typed variants.

pub mod binding;
pub mod capabilities;
pub mod diagnostics;
pub mod error;
pub mod functions;
pub mod models;
pub mod persist;
pub mod text;
pub mod value;

// Re-export commonly used types
pub use binding::{bind_and_report, bind_call, CallBinding};
pub use capabilities::{Capabilities, ValueType};
pub use diagnostics::{Diagnostic, DiagnosticSeverity};
pub use error::{FunctionError, HandleError, PersistError, TreeError};
pub use functions::{FunctionCatalog, FunctionData, FunctionKind, FunctionVariant, VariantRegistry, VariantSignature};
pub use models::{ElementHandle, ElementId, ElementKind, ElementTree, Format, FormatRef, FormatTable, Visual, VisualEdge};
pub use persist::{DocumentReader, DocumentWriter};
pub use text::{Cursor, CursorKey, CursorStateCollection, CursorStateEntry, RegionSpan};
pub use value::{CalculatedValue, Value};
