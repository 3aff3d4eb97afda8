//! Binding function-call elements against a catalog
//!
//! The function name is the call's first text region. Argument types come
//! from each child's calculated value when it has one, else from its kind's
//! type hint; anything unknown is the wildcard.

use crate::capabilities::{Capabilities, ValueType};
use crate::diagnostics::Diagnostic;
use crate::functions::{mismatch_score, FunctionCatalog, FunctionVariant};
use crate::models::{ElementId, ElementKind, ElementTree};

/// Outcome of resolving one call
#[derive(Debug, Clone, PartialEq)]
pub struct CallBinding {
    pub internal_name: String,
    pub variant: FunctionVariant,
    /// Types the call's arguments were resolved against
    pub known: Vec<ValueType>,
    /// What each argument position may be, given the other arguments
    pub parameter_requirements: Vec<Capabilities>,
}

/// Known type of every argument of `call`
pub fn argument_types(tree: &ElementTree, call: ElementId) -> Vec<ValueType> {
    tree.children(call)
        .into_iter()
        .map(|child| {
            let Some(node) = child.and_then(|child| tree.get(child)) else {
                return ValueType::None;
            };
            match node.calculated_value() {
                Some(value) => value.value_type(),
                None => node.kind().value_type_hint(),
            }
        })
        .collect()
}

/// Resolve `call` against every function with its name
///
/// Among same-named functions the lowest mismatch score wins, then the
/// earliest registered variant. `None` when `call` is not a function call or
/// nothing can produce `required`.
pub fn bind_call(
    tree: &ElementTree,
    call: ElementId,
    catalog: &FunctionCatalog,
    required: Capabilities,
) -> Option<CallBinding> {
    if tree.kind(call)? != ElementKind::FunctionCall {
        return None;
    }
    let name = tree.text(call, 0)?;
    let known = argument_types(tree, call);

    let mut best: Option<(usize, usize, &str, FunctionVariant)> = None;
    for function in catalog.functions_named(name) {
        let variant = function.best_fit_variant(required, &known);
        if !variant.is_valid() {
            continue;
        }
        let rank = (mismatch_score(&variant, &known), variant.sequence());
        if best.as_ref().map_or(true, |(score, sequence, _, _)| rank < (*score, *sequence)) {
            best = Some((rank.0, rank.1, function.internal_name.as_str(), variant));
        }
    }

    let (_, _, internal_name, variant) = best?;
    let function = catalog.function(internal_name)?;
    log::debug!("bound call {:?} to {}", call, variant.signature(&function.user_visible_name));
    Some(CallBinding {
        internal_name: internal_name.to_string(),
        parameter_requirements: function.parent_requires_all(required, &known),
        variant,
        known,
    })
}

/// [`bind_call`], recording the outcome on the element: an unresolved call
/// gets an error diagnostic, a resolved one has its diagnostic cleared
pub fn bind_and_report(
    tree: &mut ElementTree,
    call: ElementId,
    catalog: &FunctionCatalog,
    required: Capabilities,
) -> Option<CallBinding> {
    let binding = bind_call(tree, call, catalog, required);
    let outcome = match &binding {
        Some(_) => tree.clear_diagnostic(call),
        None => {
            let name = tree.text(call, 0).unwrap_or_default().to_string();
            log::warn!("unresolved function call {:?} ({})", call, name);
            tree.report_diagnostic(
                call,
                Diagnostic::error("unresolved_function", format!("no matching variant of {}", name)).in_region(0),
            )
        }
    };
    if let Err(e) = outcome {
        log::warn!("could not record binding on {:?}: {}", call, e);
    }
    binding
}
