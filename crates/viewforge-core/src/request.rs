//! Render requests: what the caller hands to `parse`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::directives::Directive;

/// Data bag passed to every template pass
pub type Map = serde_json::Map<String, JsonValue>;

/// Directive table keyed by the name templates call
pub type DirectiveTable = BTreeMap<String, Arc<dyn Directive>>;

/// Where a template's source comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewSource {
    /// A logical name resolved against the template root
    File(String),
    /// Raw template source
    Inline(String),
}

impl ViewSource {
    /// Classify a string: text containing a newline is inline source,
    /// anything else is a file reference.
    pub fn parse(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.contains('\n') {
            ViewSource::Inline(value)
        } else {
            ViewSource::File(value)
        }
    }

    /// Short label for logs and errors
    pub fn label(&self) -> &str {
        match self {
            ViewSource::File(name) => name,
            ViewSource::Inline(_) => "<inline>",
        }
    }
}

impl From<&str> for ViewSource {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl From<String> for ViewSource {
    fn from(value: String) -> Self {
        Self::parse(value)
    }
}

/// A fully resolved render request
#[derive(Clone)]
pub struct RenderRequest {
    /// The body view to render
    pub view: ViewSource,
    /// Optional site scope
    pub site: Option<String>,
    /// Language scope
    pub language: String,
    /// Read-only data shared by every pass
    pub data: Map,
    /// Model exposed as `model` during the body pass
    pub model: Option<JsonValue>,
    /// Caller-supplied directives
    pub helpers: DirectiveTable,
}

impl RenderRequest {
    /// Create a request for the given view with no site and an empty language
    pub fn new(view: impl Into<ViewSource>) -> Self {
        Self {
            view: view.into(),
            site: None,
            language: String::new(),
            data: Map::new(),
            model: None,
            helpers: DirectiveTable::new(),
        }
    }

    pub fn with_site(mut self, site: impl Into<String>) -> Self {
        let site = site.into();
        self.site = if site.is_empty() { None } else { Some(site) };
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_data(mut self, data: Map) -> Self {
        self.data = data;
        self
    }

    /// Insert a single data entry
    pub fn with_value(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    pub fn with_model(mut self, model: JsonValue) -> Self {
        self.model = Some(model);
        self
    }

    /// Add a caller directive. Built-in directive names take precedence.
    pub fn with_helper(mut self, name: impl Into<String>, directive: Arc<dyn Directive>) -> Self {
        self.helpers.insert(name.into(), directive);
        self
    }
}

impl fmt::Debug for RenderRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderRequest")
            .field("view", &self.view)
            .field("site", &self.site)
            .field("language", &self.language)
            .field("data", &self.data)
            .field("model", &self.model)
            .field("helpers", &self.helpers.keys().collect::<Vec<_>>())
            .finish()
    }
}
