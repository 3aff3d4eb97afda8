//! Named functions and overload resolution
//!
//! A [`FunctionData`] owns a de-duplicated set of variants and answers the
//! questions asked while a call is being edited: which variant fits best,
//! which are still compatible, and what each open argument may still be.

use crate::capabilities::{Capabilities, ValueType};
use crate::functions::translator::{default_translator, Translator};
use crate::functions::variant::{FunctionVariant, VariantRegistry};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Where a function comes from
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum FunctionKind {
    #[default]
    BuiltIn,
    PlugIn,
    UserDefined,
}

/// Mismatch score of `variant` against the known argument types
///
/// Two points per argument of arity difference, one point per known,
/// non-wildcard argument whose declared type differs. A variadic variant's
/// arity stretches to cover every known argument.
pub fn mismatch_score(variant: &FunctionVariant, known: &[ValueType]) -> usize {
    let arity = if variant.is_variadic() {
        variant.number_parameters().max(known.len())
    } else {
        variant.number_parameters()
    };
    let mut score = 2 * arity.abs_diff(known.len());
    for (index, known_type) in known.iter().enumerate() {
        if known_type.is_wildcard() {
            continue;
        }
        if let Some(declared) = variant.parameter_type_at(index) {
            if declared != *known_type {
                score += 1;
            }
        }
    }
    score
}

/// True when every known, non-wildcard argument matches its declared type
pub fn is_compatible(variant: &FunctionVariant, known: &[ValueType]) -> bool {
    known.iter().enumerate().all(|(index, known_type)| {
        known_type.is_wildcard() || variant.parameter_type_at(index) == Some(*known_type)
    })
}

/// A function and every call shape it accepts
pub struct FunctionData {
    pub kind: FunctionKind,
    pub internal_name: String,
    pub primary_library: String,
    pub secondary_library: String,
    pub user_visible_name: String,
    /// Name is drawn with a leading subscript region
    pub leading_subscript: bool,
    /// Editor command that inserts a call, if any
    pub insertion_command: Option<String>,
    pub description: String,
    pub category: String,
    pub help: String,
    translators: HashMap<String, Arc<dyn Translator>>,
    variants: BTreeMap<FunctionVariant, Capabilities>,
    minimum_parameters: usize,
    maximum_parameters: usize,
    capabilities: Capabilities,
}

impl FunctionData {
    pub fn new(kind: FunctionKind, internal_name: impl Into<String>, user_visible_name: impl Into<String>) -> Self {
        Self {
            kind,
            internal_name: internal_name.into(),
            primary_library: String::new(),
            secondary_library: String::new(),
            user_visible_name: user_visible_name.into(),
            leading_subscript: false,
            insertion_command: None,
            description: String::new(),
            category: String::new(),
            help: String::new(),
            translators: HashMap::new(),
            variants: BTreeMap::new(),
            minimum_parameters: 0,
            maximum_parameters: 0,
            capabilities: Capabilities::empty(),
        }
    }

    /// Add a variant; false if an equal variant is already present
    pub fn add_variant(&mut self, variant: FunctionVariant) -> bool {
        if !variant.is_valid() {
            log::warn!("{}: refusing to add the invalid variant", self.internal_name);
            return false;
        }
        if self.variants.contains_key(&variant) {
            log::debug!("{}: variant {:?} already present", self.internal_name, variant);
            return false;
        }
        let count = variant.number_parameters();
        if self.variants.is_empty() {
            self.minimum_parameters = count;
            self.maximum_parameters = count;
        } else {
            self.minimum_parameters = self.minimum_parameters.min(count);
            self.maximum_parameters = self.maximum_parameters.max(count);
        }
        self.capabilities |= variant.capabilities();
        self.variants.insert(variant.clone(), variant.capabilities());
        true
    }

    pub fn variants(&self) -> &BTreeMap<FunctionVariant, Capabilities> {
        &self.variants
    }

    pub fn number_variants(&self) -> usize {
        self.variants.len()
    }

    /// Fewest fixed parameters over every variant
    pub fn minimum_number_parameters(&self) -> usize {
        self.minimum_parameters
    }

    /// Most fixed parameters over every variant
    pub fn maximum_number_parameters(&self) -> usize {
        self.maximum_parameters
    }

    pub fn is_variadic(&self) -> bool {
        self.variants.keys().any(FunctionVariant::is_variadic)
    }

    /// Every value type category this function can produce
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Variants that can produce `required`, in registration order
    fn candidates(&self, required: Capabilities) -> Vec<&FunctionVariant> {
        let mut candidates: Vec<&FunctionVariant> = self
            .variants
            .iter()
            .filter(|(_, capabilities)| capabilities.intersects(required))
            .map(|(variant, _)| variant)
            .collect();
        candidates.sort_by_key(|variant| variant.sequence());
        candidates
    }

    /// Lowest-scoring variant that can produce `required`; ties go to the
    /// earliest registered. Invalid when nothing intersects `required`.
    pub fn best_fit_variant(&self, required: Capabilities, known: &[ValueType]) -> FunctionVariant {
        let mut best: Option<(usize, &FunctionVariant)> = None;
        for variant in self.candidates(required) {
            let score = mismatch_score(variant, known);
            if best.map_or(true, |(best_score, _)| score < best_score) {
                best = Some((score, variant));
                if score == 0 {
                    break;
                }
            }
        }
        match best {
            Some((score, variant)) => {
                log::trace!("{}: best fit {:?} (score {})", self.internal_name, variant, score);
                variant.clone()
            }
            None => FunctionVariant::invalid(),
        }
    }

    /// Every variant that can produce `required` and agrees with the known
    /// arguments, in registration order
    pub fn all_compatible_variants(&self, required: Capabilities, known: &[ValueType]) -> Vec<FunctionVariant> {
        self.candidates(required)
            .into_iter()
            .filter(|variant| is_compatible(variant, known))
            .cloned()
            .collect()
    }

    /// What argument `index` may still be, given the arguments known so far
    pub fn parent_requires(&self, index: usize, required: Capabilities, known: &[ValueType]) -> Capabilities {
        self.all_compatible_variants(required, known)
            .iter()
            .fold(Capabilities::empty(), |accepted, variant| {
                accepted | variant.parameter_capabilities_at(index)
            })
    }

    /// [`parent_requires`](Self::parent_requires) for every argument position
    ///
    /// The list is as long as the longest compatible variant. Variadic
    /// variants contribute one full cycle past their fixed parameters, or up
    /// to the last known argument if that is further.
    pub fn parent_requires_all(&self, required: Capabilities, known: &[ValueType]) -> Vec<Capabilities> {
        let mut accepted: Vec<Capabilities> = Vec::new();
        for variant in self.all_compatible_variants(required, known) {
            let positions = if variant.is_variadic() {
                (variant.number_parameters() + variant.variadic_types().len()).max(known.len())
            } else {
                variant.number_parameters()
            };
            if accepted.len() < positions {
                accepted.resize(positions, Capabilities::empty());
            }
            for (index, slot) in accepted.iter_mut().enumerate().take(positions) {
                *slot |= variant.parameter_capabilities_at(index);
            }
        }
        accepted
    }

    /// Override the translator for `generator`; false if one is registered
    pub fn register_translator(&mut self, generator: &str, translator: Arc<dyn Translator>) -> bool {
        if self.translators.contains_key(generator) {
            log::warn!("{}: translator for {} already registered", self.internal_name, generator);
            return false;
        }
        self.translators.insert(generator.to_string(), translator);
        true
    }

    /// Function-specific translator, falling back to the generator default
    pub fn translator(&self, generator: &str) -> Option<Arc<dyn Translator>> {
        self.translators
            .get(generator)
            .cloned()
            .or_else(|| default_translator(generator))
    }

    /// Signatures of every variant in `registry` order (registration order
    /// while the registry is stale)
    pub fn signatures(&self, registry: &VariantRegistry) -> Vec<String> {
        let mut variants: Vec<&FunctionVariant> = self.variants.keys().collect();
        variants.sort_by_key(|variant| (registry.ordinal(variant).unwrap_or(usize::MAX), variant.sequence()));
        variants
            .into_iter()
            .map(|variant| variant.signature(&self.user_visible_name))
            .collect()
    }
}

impl fmt::Debug for FunctionData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionData")
            .field("kind", &self.kind)
            .field("internal_name", &self.internal_name)
            .field("user_visible_name", &self.user_visible_name)
            .field("variants", &self.variants.len())
            .field("translators", &self.translators.keys().collect::<Vec<_>>())
            .finish()
    }
}
