//! Function variants and the registry that interns them
//!
//! A variant is one call shape of a function. Variants are immutable and
//! shared: the registry hands out one canonical `Arc` per distinct shape, so
//! equal shapes are the same allocation and cheap to compare and clone.

use crate::capabilities::{Capabilities, ValueType};
use crate::error::FunctionError;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// The fields that decide whether two variants are the same
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct Shape {
    variadic_types: Vec<ValueType>,
    parameter_types: Vec<ValueType>,
    parameter_descriptions: Vec<String>,
    return_type: ValueType,
}

#[derive(Debug)]
struct VariantInner {
    shape: Shape,
    library: String,
    sequence: usize,
    capabilities: Capabilities,
    parameter_capabilities: Vec<Capabilities>,
}

/// Interned call shape of a function
///
/// Equality, hashing and ordering are structural over the variadic types,
/// parameter types, parameter descriptions and return type. The defining
/// library does not take part. The default value is the invalid variant
/// returned by failed overload resolution.
#[derive(Clone, Default)]
pub struct FunctionVariant(Option<Arc<VariantInner>>);

impl FunctionVariant {
    /// Variant that matches nothing
    pub fn invalid() -> Self {
        FunctionVariant(None)
    }

    pub fn is_valid(&self) -> bool {
        self.0.is_some()
    }

    fn shape(&self) -> Option<&Shape> {
        self.0.as_deref().map(|inner| &inner.shape)
    }

    pub fn library(&self) -> &str {
        self.0.as_deref().map_or("", |inner| inner.library.as_str())
    }

    pub fn return_type(&self) -> ValueType {
        self.shape().map_or(ValueType::None, |shape| shape.return_type)
    }

    pub fn parameter_types(&self) -> &[ValueType] {
        self.shape().map_or(&[][..], |shape| shape.parameter_types.as_slice())
    }

    pub fn parameter_descriptions(&self) -> &[String] {
        self.shape().map_or(&[][..], |shape| shape.parameter_descriptions.as_slice())
    }

    pub fn variadic_types(&self) -> &[ValueType] {
        self.shape().map_or(&[][..], |shape| shape.variadic_types.as_slice())
    }

    pub fn is_variadic(&self) -> bool {
        !self.variadic_types().is_empty()
    }

    /// Number of fixed parameters
    pub fn number_parameters(&self) -> usize {
        self.parameter_types().len()
    }

    /// Registration sequence number; earlier registrations win ties
    pub fn sequence(&self) -> usize {
        self.0.as_deref().map_or(usize::MAX, |inner| inner.sequence)
    }

    /// Capabilities of the return type
    pub fn capabilities(&self) -> Capabilities {
        self.0.as_deref().map_or(Capabilities::empty(), |inner| inner.capabilities)
    }

    /// Capabilities of each fixed parameter
    pub fn parameter_capabilities(&self) -> &[Capabilities] {
        self.0
            .as_deref()
            .map_or(&[][..], |inner| inner.parameter_capabilities.as_slice())
    }

    /// Declared type at `index`, following the variadic cycle past the fixed
    /// parameters. `None` past the end of a non-variadic variant.
    pub fn parameter_type_at(&self, index: usize) -> Option<ValueType> {
        let fixed = self.parameter_types();
        if let Some(value_type) = fixed.get(index) {
            return Some(*value_type);
        }
        let variadic = self.variadic_types();
        if variadic.is_empty() {
            return None;
        }
        Some(variadic[(index - fixed.len()) % variadic.len()])
    }

    pub fn parameter_capabilities_at(&self, index: usize) -> Capabilities {
        match self.parameter_capabilities().get(index) {
            Some(capabilities) => *capabilities,
            None => self
                .parameter_type_at(index)
                .map_or(Capabilities::empty(), ValueType::capabilities),
        }
    }

    /// Human-readable signature, e.g. `atan2(real y, real x) -> real`
    pub fn signature(&self, name: &str) -> String {
        let mut parameters: Vec<String> = self
            .parameter_types()
            .iter()
            .zip(self.parameter_descriptions())
            .map(|(value_type, description)| {
                if description.is_empty() {
                    value_type.to_string()
                } else {
                    format!("{} {}", value_type, description)
                }
            })
            .collect();
        if self.is_variadic() {
            let cycle: Vec<&str> = self.variadic_types().iter().map(|value_type| value_type.name()).collect();
            parameters.push(format!("{}...", cycle.join(", ")));
        }
        format!("{}({}) -> {}", name, parameters.join(", "), self.return_type())
    }
}

impl PartialEq for FunctionVariant {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b) || a.shape == b.shape,
            (None, None) => true,
            _ => false,
        }
    }
}

impl Eq for FunctionVariant {}

impl Hash for FunctionVariant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.shape().hash(state);
    }
}

impl PartialOrd for FunctionVariant {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FunctionVariant {
    fn cmp(&self, other: &Self) -> Ordering {
        self.shape().cmp(&other.shape())
    }
}

impl fmt::Debug for FunctionVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            None => f.write_str("FunctionVariant::invalid"),
            Some(inner) => f
                .debug_struct("FunctionVariant")
                .field("parameters", &inner.shape.parameter_types)
                .field("variadic", &inner.shape.variadic_types)
                .field("returns", &inner.shape.return_type)
                .field("sequence", &inner.sequence)
                .finish(),
        }
    }
}

/// Description of a variant to intern
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariantSignature {
    pub library: String,
    pub return_type: ValueType,
    pub parameter_types: Vec<ValueType>,
    pub parameter_descriptions: Vec<String>,
    pub variadic_types: Vec<ValueType>,
}

impl VariantSignature {
    pub fn new(return_type: ValueType) -> Self {
        Self {
            return_type,
            ..Self::default()
        }
    }

    /// Append a fixed parameter
    pub fn parameter(mut self, value_type: ValueType, description: impl Into<String>) -> Self {
        self.parameter_types.push(value_type);
        self.parameter_descriptions.push(description.into());
        self
    }

    /// Accept any number of trailing arguments cycling through `types`
    pub fn variadic(mut self, types: impl IntoIterator<Item = ValueType>) -> Self {
        self.variadic_types = types.into_iter().collect();
        self
    }

    pub fn library(mut self, library: impl Into<String>) -> Self {
        self.library = library.into();
        self
    }
}

/// Canonical store of every variant shape in use
///
/// Interning is cheap; the total order used for listing is recomputed only
/// when [`VariantRegistry::rebuild`] is called after a batch of registrations.
#[derive(Debug, Default)]
pub struct VariantRegistry {
    variants: HashSet<FunctionVariant>,
    next_sequence: usize,
    ordinals: HashMap<FunctionVariant, usize>,
    stale: bool,
}

impl VariantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical variant for `signature`, registering it if the shape is new
    pub fn intern(&mut self, signature: VariantSignature) -> Result<FunctionVariant, FunctionError> {
        let VariantSignature {
            library,
            return_type,
            parameter_types,
            parameter_descriptions,
            variadic_types,
        } = signature;
        if parameter_types.len() != parameter_descriptions.len() {
            return Err(FunctionError::DescriptionCountMismatch {
                types: parameter_types.len(),
                descriptions: parameter_descriptions.len(),
            });
        }

        let parameter_capabilities = parameter_types.iter().map(|value_type| value_type.capabilities()).collect();
        let candidate = FunctionVariant(Some(Arc::new(VariantInner {
            shape: Shape {
                variadic_types,
                parameter_types,
                parameter_descriptions,
                return_type,
            },
            library,
            sequence: self.next_sequence,
            capabilities: return_type.capabilities(),
            parameter_capabilities,
        })));

        if let Some(existing) = self.variants.get(&candidate) {
            return Ok(existing.clone());
        }
        self.next_sequence += 1;
        self.stale = true;
        self.variants.insert(candidate.clone());
        log::debug!("interned variant {:?}", candidate);
        Ok(candidate)
    }

    /// True when variants were interned since the last rebuild
    pub fn needs_rebuild(&self) -> bool {
        self.stale
    }

    /// Recompute the total order over every interned variant
    pub fn rebuild(&mut self) {
        let mut sorted: Vec<&FunctionVariant> = self.variants.iter().collect();
        sorted.sort();
        self.ordinals = sorted
            .into_iter()
            .enumerate()
            .map(|(ordinal, variant)| (variant.clone(), ordinal))
            .collect();
        self.stale = false;
        log::debug!("rebuilt variant order over {} variants", self.ordinals.len());
    }

    /// Position of `variant` in the total order; `None` while stale
    pub fn ordinal(&self, variant: &FunctionVariant) -> Option<usize> {
        if self.stale {
            return None;
        }
        self.ordinals.get(variant).copied()
    }

    pub fn contains(&self, variant: &FunctionVariant) -> bool {
        self.variants.contains(variant)
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    /// Every interned variant in registration order
    pub fn variants(&self) -> Vec<FunctionVariant> {
        let mut variants: Vec<FunctionVariant> = self.variants.iter().cloned().collect();
        variants.sort_by_key(FunctionVariant::sequence);
        variants
    }
}
