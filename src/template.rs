//! Endpoint path templates
//!
//! Entity paths carry `{{ name }}` placeholders, e.g.
//! `/List/{{ listId }}/Message/{{ messageId }}/Activity`, filled from the
//! scope keys of the parent records being walked.

use crate::error::{Error, Result};
use crate::types::{scalar_to_string, JsonObject};
use regex::{Captures, Regex};
use std::sync::LazyLock;

/// `{{ name }}`, with optional whitespace inside the braces
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([a-zA-Z_][a-zA-Z0-9_]*)\s*\}\}").expect("placeholder pattern compiles")
});

/// Render a template against scope keys
///
/// Every placeholder must resolve to a string, number or boolean; the
/// error names all that did not.
pub fn render(template: &str, vars: &JsonObject) -> Result<String> {
    let mut missing = Vec::new();

    let rendered = PLACEHOLDER.replace_all(template, |caps: &Captures<'_>| {
        let name = &caps[1];
        match vars.get(name).and_then(scalar_to_string) {
            Some(value) => value,
            None => {
                missing.push(name.to_string());
                caps[0].to_string()
            }
        }
    });

    if missing.is_empty() {
        Ok(rendered.into_owned())
    } else {
        Err(Error::undefined_var(missing.join(", ")))
    }
}

/// Check if a string contains template variables
pub fn has_templates(s: &str) -> bool {
    PLACEHOLDER.is_match(s)
}

/// Variable names in order of appearance
pub fn extract_variables(template: &str) -> Vec<&str> {
    PLACEHOLDER
        .captures_iter(template)
        .filter_map(|caps| caps.get(1))
        .map(|name| name.as_str())
        .collect()
}
