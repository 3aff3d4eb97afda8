//! Function catalog and its configuration format
//!
//! A catalog is built once at configuration time, usually from a JSON or YAML
//! file listing every function and its variants:
//!
//! ```yaml
//! functions:
//!   - internal_name: builtin_sqrt
//!     name: sqrt
//!     library: math
//!     translators:
//!       cpp: "std::sqrt({{{arguments}}})"
//!     variants:
//!       - returns: real
//!         parameters:
//!           - { type: real, description: x }
//! ```

use crate::capabilities::ValueType;
use crate::error::FunctionError;
use crate::functions::data::{FunctionData, FunctionKind};
use crate::functions::translator::TemplateTranslator;
use crate::functions::variant::{FunctionVariant, VariantRegistry, VariantSignature};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

pub type Result<T> = std::result::Result<T, FunctionError>;

/// Top-level configuration document
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CatalogConfig {
    #[serde(default)]
    pub functions: Vec<FunctionDefinition>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FunctionDefinition {
    pub kind: FunctionKind,
    pub internal_name: String,
    /// User-visible name; defaults to the internal name
    pub name: Option<String>,
    pub library: String,
    pub secondary_library: String,
    pub leading_subscript: bool,
    pub insertion_command: Option<String>,
    pub description: String,
    pub category: String,
    pub help: String,
    /// Mustache templates keyed by code generator name
    pub translators: BTreeMap<String, String>,
    pub variants: Vec<VariantDefinition>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct VariantDefinition {
    pub returns: ValueType,
    pub parameters: Vec<ParameterDefinition>,
    pub variadic: Vec<ValueType>,
    /// Defining library; defaults to the function's library
    pub library: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ParameterDefinition {
    #[serde(rename = "type")]
    pub value_type: ValueType,
    #[serde(default)]
    pub description: String,
}

/// Every known function plus the registry their variants are interned in
#[derive(Debug, Default)]
pub struct FunctionCatalog {
    registry: VariantRegistry,
    functions: BTreeMap<String, FunctionData>,
    by_user_name: HashMap<String, Vec<String>>,
}

impl FunctionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: CatalogConfig = serde_json::from_str(text).map_err(|e| FunctionError::Config(e.to_string()))?;
        Self::from_config(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: CatalogConfig = serde_yaml::from_str(text).map_err(|e| FunctionError::Config(e.to_string()))?;
        Self::from_config(config)
    }

    /// Build a catalog and rebuild the variant order once at the end
    pub fn from_config(config: CatalogConfig) -> Result<Self> {
        let mut catalog = Self::new();
        for definition in config.functions {
            catalog.define(definition)?;
        }
        catalog.registry.rebuild();
        log::debug!("loaded {} functions", catalog.functions.len());
        Ok(catalog)
    }

    /// Add one configured function
    pub fn define(&mut self, definition: FunctionDefinition) -> Result<()> {
        if definition.internal_name.is_empty() {
            return Err(FunctionError::Config("function without internal_name".to_string()));
        }
        let user_visible_name = definition
            .name
            .clone()
            .unwrap_or_else(|| definition.internal_name.clone());
        let mut function = FunctionData::new(definition.kind, definition.internal_name.clone(), user_visible_name);
        function.primary_library = definition.library.clone();
        function.secondary_library = definition.secondary_library;
        function.leading_subscript = definition.leading_subscript;
        function.insertion_command = definition.insertion_command;
        function.description = definition.description;
        function.category = definition.category;
        function.help = definition.help;

        for (generator, source) in definition.translators {
            let translator = TemplateTranslator::new(source)?;
            function.register_translator(&generator, Arc::new(translator));
        }
        for variant in definition.variants {
            let mut signature = VariantSignature::new(variant.returns)
                .variadic(variant.variadic)
                .library(variant.library.unwrap_or_else(|| definition.library.clone()));
            for parameter in variant.parameters {
                signature = signature.parameter(parameter.value_type, parameter.description);
            }
            let interned = self.registry.intern(signature)?;
            function.add_variant(interned);
        }
        self.register(function)
    }

    /// Add a function; rejects a second function with the same internal name
    pub fn register(&mut self, function: FunctionData) -> Result<()> {
        if self.functions.contains_key(&function.internal_name) {
            log::warn!("function {} registered twice", function.internal_name);
            return Err(FunctionError::DuplicateFunction(function.internal_name));
        }
        self.by_user_name
            .entry(function.user_visible_name.clone())
            .or_default()
            .push(function.internal_name.clone());
        log::debug!(
            "registered function {} ({} variants)",
            function.internal_name,
            function.number_variants()
        );
        self.functions.insert(function.internal_name.clone(), function);
        Ok(())
    }

    /// Intern a variant in this catalog's registry
    pub fn intern(&mut self, signature: VariantSignature) -> Result<FunctionVariant> {
        self.registry.intern(signature)
    }

    pub fn registry(&self) -> &VariantRegistry {
        &self.registry
    }

    /// Recompute the variant order after a batch of registrations
    pub fn rebuild(&mut self) {
        self.registry.rebuild();
    }

    pub fn function(&self, internal_name: &str) -> Option<&FunctionData> {
        self.functions.get(internal_name)
    }

    pub fn function_mut(&mut self, internal_name: &str) -> Option<&mut FunctionData> {
        self.functions.get_mut(internal_name)
    }

    /// Functions the user may mean by `name`, in registration order
    pub fn functions_named(&self, name: &str) -> Vec<&FunctionData> {
        self.by_user_name
            .get(name)
            .map(|internal_names| {
                internal_names
                    .iter()
                    .filter_map(|internal_name| self.functions.get(internal_name))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionData> {
        self.functions.values()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
