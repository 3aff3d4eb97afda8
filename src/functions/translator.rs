//! Code-generator translators
//!
//! A translator turns a resolved call into source text for one code
//! generator (`"cpp"`, `"latex"`, ...). Functions may override the translator
//! for a generator; otherwise the default registered for that generator name
//! applies. Both tables keep the first registration.

use crate::error::FunctionError;
use crate::functions::variant::FunctionVariant;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

pub type Result<T> = std::result::Result<T, FunctionError>;

/// Everything a translator may need to emit one call
#[derive(Debug, Clone)]
pub struct TranslationRequest<'a> {
    /// Name the user typed
    pub user_visible_name: &'a str,
    pub internal_name: &'a str,
    pub library: &'a str,
    /// Already translated argument text, in order
    pub arguments: Vec<String>,
    pub variant: &'a FunctionVariant,
}

/// Emits source text for one code generator
pub trait Translator: Send + Sync {
    fn translate(&self, request: &TranslationRequest<'_>) -> Result<String>;
}

/// Data handed to the mustache template
#[derive(Serialize)]
struct TemplateContext<'a> {
    name: &'a str,
    internal_name: &'a str,
    library: &'a str,
    arguments: String,
    argument: Vec<ArgumentContext<'a>>,
    return_type: &'static str,
}

#[derive(Serialize)]
struct ArgumentContext<'a> {
    index: usize,
    text: &'a str,
    last: bool,
}

/// Translator driven by a mustache template
///
/// The template sees `name`, `internal_name`, `library`, `return_type`,
/// `arguments` (comma separated) and the list `argument` with `index`,
/// `text` and `last` for each argument. Use triple braces for raw output.
pub struct TemplateTranslator {
    source: String,
    template: mustache::Template,
}

impl TemplateTranslator {
    pub fn new(source: impl Into<String>) -> Result<Self> {
        let source = source.into();
        let template = mustache::compile_str(&source).map_err(|e| FunctionError::Template(e.to_string()))?;
        Ok(Self { source, template })
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl fmt::Debug for TemplateTranslator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateTranslator").field("source", &self.source).finish()
    }
}

impl Translator for TemplateTranslator {
    fn translate(&self, request: &TranslationRequest<'_>) -> Result<String> {
        let count = request.arguments.len();
        let context = TemplateContext {
            name: request.user_visible_name,
            internal_name: request.internal_name,
            library: request.library,
            arguments: request.arguments.join(", "),
            argument: request
                .arguments
                .iter()
                .enumerate()
                .map(|(index, text)| ArgumentContext {
                    index,
                    text,
                    last: index + 1 == count,
                })
                .collect(),
            return_type: request.variant.return_type().name(),
        };
        self.template
            .render_to_string(&context)
            .map_err(|e| FunctionError::Template(e.to_string()))
    }
}

static DEFAULT_TRANSLATORS: Lazy<RwLock<HashMap<String, Arc<dyn Translator>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Register the fallback translator for `generator`; false if one exists
pub fn register_default_translator(generator: &str, translator: Arc<dyn Translator>) -> bool {
    let mut table = match DEFAULT_TRANSLATORS.write() {
        Ok(table) => table,
        Err(poisoned) => poisoned.into_inner(),
    };
    if table.contains_key(generator) {
        log::warn!("default translator for {} already registered", generator);
        return false;
    }
    table.insert(generator.to_string(), translator);
    log::debug!("registered default translator for {}", generator);
    true
}

/// Fallback translator registered for `generator`
pub fn default_translator(generator: &str) -> Option<Arc<dyn Translator>> {
    let table = match DEFAULT_TRANSLATORS.read() {
        Ok(table) => table,
        Err(poisoned) => poisoned.into_inner(),
    };
    table.get(generator).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request<'a>(variant: &'a FunctionVariant, arguments: &[&str]) -> TranslationRequest<'a> {
        TranslationRequest {
            user_visible_name: "sqrt",
            internal_name: "builtin_sqrt",
            library: "math",
            arguments: arguments.iter().map(|argument| argument.to_string()).collect(),
            variant,
        }
    }

    #[test]
    fn test_template_renders_arguments() {
        let translator = TemplateTranslator::new("{{library}}::{{name}}({{{arguments}}})").unwrap();
        let variant = FunctionVariant::invalid();
        let text = translator.translate(&request(&variant, &["a<b", "c"])).unwrap();
        assert_eq!(text, "math::sqrt(a<b, c)");
    }

    #[test]
    fn test_template_argument_list() {
        let translator =
            TemplateTranslator::new("{{#argument}}[{{index}}:{{{text}}}]{{/argument}}").unwrap();
        let variant = FunctionVariant::invalid();
        let text = translator.translate(&request(&variant, &["x", "y"])).unwrap();
        assert_eq!(text, "[0:x][1:y]");
    }

    #[test]
    fn test_bad_template_is_rejected() {
        assert!(matches!(
            TemplateTranslator::new("{{#open}}never closed"),
            Err(FunctionError::Template(_))
        ));
    }

    #[test]
    fn test_first_default_registration_wins() {
        let first: Arc<dyn Translator> = Arc::new(TemplateTranslator::new("first").unwrap());
        let second: Arc<dyn Translator> = Arc::new(TemplateTranslator::new("second").unwrap());
        assert!(register_default_translator("translator-unit-test", first));
        assert!(!register_default_translator("translator-unit-test", second));

        let variant = FunctionVariant::invalid();
        let found = default_translator("translator-unit-test").unwrap();
        assert_eq!(found.translate(&request(&variant, &[])).unwrap(), "first");
        assert!(default_translator("translator-unit-test-missing").is_none());
    }
}
