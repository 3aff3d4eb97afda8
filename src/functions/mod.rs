//! Functions, their variants and overload resolution
//!
//! ## Modules
//!
//! - `variant`: Interned call shapes and the registry that orders them
//! - `data`: A named function and its overload resolution queries
//! - `translator`: Per-generator code translators and the default table
//! - `catalog`: Every known function, loadable from JSON or YAML

pub mod catalog;
pub mod data;
pub mod translator;
pub mod variant;

pub use catalog::{CatalogConfig, FunctionCatalog, FunctionDefinition, ParameterDefinition, VariantDefinition};
pub use data::{is_compatible, mismatch_score, FunctionData, FunctionKind};
pub use translator::{default_translator, register_default_translator, TemplateTranslator, TranslationRequest, Translator};
pub use variant::{FunctionVariant, VariantRegistry, VariantSignature};
