//! Tera adapter: delimiter translation, directive binding and per-pass
//! definition sets.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde_json::Value as JsonValue;
use tera::{Context, Tera};
use tracing::debug;

use crate::config::{DEFAULT_LEFT, DEFAULT_RIGHT, ViewConfig};
use crate::context::RenderContext;
use crate::directives::{Directive, DirectiveArgs};
use crate::error::{Result, ViewError};
use crate::request::{DirectiveTable, Map};
use crate::store::LoadedTemplate;

const EXPRESSION_OPEN: &str = "{{";
const EXPRESSION_CLOSE: &str = "}}";
/// Tera tag openers that are plain text once a custom pair is configured
const NATIVE_MARKERS: [&str; 2] = ["{%", "{#"];

/// Statement delimiter pair used by template authors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delimiters {
    pub left: String,
    pub right: String,
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            left: DEFAULT_LEFT.to_string(),
            right: DEFAULT_RIGHT.to_string(),
        }
    }
}

impl Delimiters {
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
        }
    }

    /// Delimiters from configuration, empty sides falling back to Tera's own
    pub fn from_config(config: &ViewConfig) -> Self {
        let pick = |value: &str, fallback: &str| {
            if value.is_empty() {
                fallback.to_string()
            } else {
                value.to_string()
            }
        };
        Self {
            left: pick(&config.left, DEFAULT_LEFT),
            right: pick(&config.right, DEFAULT_RIGHT),
        }
    }

    /// True when the pair is Tera's native `{%`/`%}`
    pub fn is_native(&self) -> bool {
        self.left == DEFAULT_LEFT && self.right == DEFAULT_RIGHT
    }

    /// Rewrite every `left … right` region into `{% … %}`.
    ///
    /// Outside those regions Tera's own `{%` and `{#` are emitted as literal
    /// text, while `{{ … }}` expressions pass through untouched. An opening
    /// delimiter without a matching close is left as text.
    pub fn translate<'a>(&self, source: &'a str) -> Cow<'a, str> {
        if self.is_native() {
            return Cow::Borrowed(source);
        }

        let mut out = String::with_capacity(source.len());
        let mut rest = source;
        while let Some(ch) = rest.chars().next() {
            if let Some(inner) = rest
                .strip_prefix(self.left.as_str())
                .filter(|_| !self.left.is_empty())
            {
                if let Some(end) = inner.find(self.right.as_str()) {
                    out.push_str(DEFAULT_LEFT);
                    out.push_str(&inner[..end]);
                    out.push_str(DEFAULT_RIGHT);
                    rest = &inner[end + self.right.len()..];
                    continue;
                }
                out.push_str(&self.left);
                rest = inner;
                continue;
            }

            if let Some(inner) = rest.strip_prefix(EXPRESSION_OPEN) {
                let end = inner
                    .find(EXPRESSION_CLOSE)
                    .map_or(inner.len(), |end| end + EXPRESSION_CLOSE.len());
                out.push_str(EXPRESSION_OPEN);
                out.push_str(&inner[..end]);
                rest = &inner[end..];
                continue;
            }

            if let Some(marker) = NATIVE_MARKERS
                .iter()
                .find(|marker| rest.starts_with(**marker))
            {
                out.push_str(&format!("{EXPRESSION_OPEN} \"{marker}\" {EXPRESSION_CLOSE}"));
                rest = &rest[marker.len()..];
                continue;
            }

            out.push(ch);
            rest = &rest[ch.len_utf8()..];
        }
        Cow::Owned(out)
    }
}

/// A directive registered as a Tera function for one render
struct BoundDirective {
    name: String,
    directive: Arc<dyn Directive>,
    context: Weak<RenderContext>,
}

impl tera::Function for BoundDirective {
    fn call(&self, args: &HashMap<String, JsonValue>) -> tera::Result<JsonValue> {
        let context = self.context.upgrade().ok_or_else(|| {
            tera::Error::msg(format!(
                "directive '{}' called after its render finished",
                self.name
            ))
        })?;
        self.directive
            .call(&context, &DirectiveArgs::new(&self.name, args))
            .map_err(|err| tera::Error::msg(err.to_string()))
    }

    fn is_safe(&self) -> bool {
        self.directive.is_safe()
    }
}

/// Per-render Tera instance.
///
/// `base` holds the directive functions and no templates. Each pass starts
/// from a clone of it, and every execution renders from a snapshot of the pass
/// set, so templates compiled by nested `render` calls land in the current
/// pass only and never disturb a template that is mid-render.
pub struct Engine {
    base: Tera,
    pass: Mutex<Tera>,
    delimiters: Delimiters,
}

impl Engine {
    pub fn new(
        delimiters: Delimiters,
        directives: &DirectiveTable,
        context: Weak<RenderContext>,
    ) -> Self {
        let mut base = Tera::default();
        for (name, directive) in directives {
            base.register_function(
                name,
                BoundDirective {
                    name: name.clone(),
                    directive: Arc::clone(directive),
                    context: context.clone(),
                },
            );
        }

        Self {
            pass: Mutex::new(base.clone()),
            base,
            delimiters,
        }
    }

    pub fn delimiters(&self) -> &Delimiters {
        &self.delimiters
    }

    fn pass_set(&self) -> Result<MutexGuard<'_, Tera>> {
        self.pass
            .lock()
            .map_err(|_| ViewError::Internal("template definition lock poisoned".to_string()))
    }

    /// Start a new pass from a fresh copy of the base definitions
    pub fn begin_pass(&self) -> Result<()> {
        *self.pass_set()? = self.base.clone();
        Ok(())
    }

    /// Compile a template into the current pass set
    pub fn compile(&self, template: &LoadedTemplate) -> Result<()> {
        let source = self.delimiters.translate(&template.source);
        debug!("Compiling template {}", template.identifier);
        self.pass_set()?
            .add_raw_template(&template.identifier, &source)
            .map_err(|err| ViewError::syntax(&template.identifier, &err))
    }

    /// Whether `identifier` is already compiled in the current pass set
    pub fn is_compiled(&self, identifier: &str) -> Result<bool> {
        Ok(self
            .pass_set()?
            .get_template_names()
            .any(|name| name == identifier))
    }

    /// Number of templates compiled in the current pass set
    pub fn compiled_count(&self) -> Result<usize> {
        Ok(self.pass_set()?.get_template_names().count())
    }

    /// Execute a compiled template against `data`
    pub fn execute(&self, identifier: &str, data: Map) -> Result<String> {
        let snapshot = self.pass_set()?.clone();

        let mut context = Context::new();
        for (key, value) in data {
            context.insert(key, &value);
        }

        snapshot
            .render(identifier, &context)
            .map_err(|err| ViewError::execution(identifier, &err))
    }
}
