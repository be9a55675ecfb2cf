//! Directives callable from templates.
//!
//! Every template sees the built-in vocabulary below plus whatever the caller
//! (or the module's registered helpers) adds. Directives are invoked as Tera
//! function calls with named arguments:
//!
//! ```text
//! {{ layout(name="main", model=page) }}
//! {{ title(value="Home") }}{{ style(href="/css/site.css", media="screen") }}
//! <head><title>{{ title() }}</title>{{ styles() }}</head>
//! <body>{{ body() }}{{ render(name="footer") }}</body>
//! ```
//!
//! Setters and accumulators return an empty string; getters return the raw
//! markup gathered so far. A directive receives the render context explicitly,
//! so all per-render state lives in one place.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use tera::escape_html;
use tracing::warn;

use crate::context::{RenderContext, RenderState};
use crate::error::{Result, ViewError};
use crate::request::{DirectiveTable, Map, ViewSource};

/// Default MIME type for `script`
pub const DEFAULT_SCRIPT_TYPE: &str = "text/javascript";

/// A callable exposed to templates
pub trait Directive: Send + Sync {
    /// Run the directive against the current render
    fn call(&self, ctx: &RenderContext, args: &DirectiveArgs<'_>) -> Result<JsonValue>;

    /// Whether the output is trusted markup that must not be escaped
    fn is_safe(&self) -> bool {
        false
    }
}

impl<F> Directive for F
where
    F: Fn(&RenderContext, &DirectiveArgs<'_>) -> Result<JsonValue> + Send + Sync,
{
    fn call(&self, ctx: &RenderContext, args: &DirectiveArgs<'_>) -> Result<JsonValue> {
        self(ctx, args)
    }
}

/// Wraps a directive whose output is already safe markup
pub struct SafeDirective<D>(pub D);

impl<D: Directive> Directive for SafeDirective<D> {
    fn call(&self, ctx: &RenderContext, args: &DirectiveArgs<'_>) -> Result<JsonValue> {
        self.0.call(ctx, args)
    }

    fn is_safe(&self) -> bool {
        true
    }
}

/// Named arguments of one directive call
#[derive(Debug, Clone, Copy)]
pub struct DirectiveArgs<'a> {
    directive: &'a str,
    args: &'a HashMap<String, JsonValue>,
}

impl<'a> DirectiveArgs<'a> {
    pub fn new(directive: &'a str, args: &'a HashMap<String, JsonValue>) -> Self {
        Self { directive, args }
    }

    /// Name the directive was called under
    pub fn directive(&self) -> &str {
        self.directive
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&'a JsonValue> {
        self.args.get(key)
    }

    /// The argument named `key`, or the only argument when exactly one was given
    pub fn positional(&self, key: &str) -> Option<&'a JsonValue> {
        self.args.get(key).or_else(|| {
            if self.args.len() == 1 {
                self.args.values().next()
            } else {
                None
            }
        })
    }

    /// String form of the argument named `key`; `null` counts as absent
    pub fn string(&self, key: &str) -> Option<String> {
        self.get(key).and_then(value_to_string)
    }

    /// Like [`DirectiveArgs::string`] but falls back to a lone argument
    pub fn positional_string(&self, key: &str) -> Option<String> {
        self.positional(key).and_then(value_to_string)
    }

    /// Required string argument, with a lone argument accepted in its place
    pub fn required(&self, key: &str) -> Result<String> {
        self.positional_string(key).ok_or_else(|| {
            ViewError::directive(self.directive, format!("missing argument '{key}'"))
        })
    }

    /// Truthiness of the argument named `key`
    pub fn flag(&self, key: &str) -> bool {
        match self.get(key) {
            Some(JsonValue::Bool(flag)) => *flag,
            Some(JsonValue::String(text)) => matches!(text.as_str(), "true" | "1" | "yes"),
            Some(JsonValue::Number(number)) => number.as_f64().is_some_and(|n| n != 0.0),
            _ => false,
        }
    }
}

fn value_to_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

fn empty() -> JsonValue {
    JsonValue::String(String::new())
}

/// The fixed directive vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Layout,
    Title,
    Author,
    Keywords,
    Description,
    Body,
    Render,
    Meta,
    Metas,
    Style,
    Styles,
    Script,
    Scripts,
}

impl Builtin {
    pub const ALL: [Builtin; 13] = [
        Builtin::Layout,
        Builtin::Title,
        Builtin::Author,
        Builtin::Keywords,
        Builtin::Description,
        Builtin::Body,
        Builtin::Render,
        Builtin::Meta,
        Builtin::Metas,
        Builtin::Style,
        Builtin::Styles,
        Builtin::Script,
        Builtin::Scripts,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Layout => "layout",
            Builtin::Title => "title",
            Builtin::Author => "author",
            Builtin::Keywords => "keywords",
            Builtin::Description => "description",
            Builtin::Body => "body",
            Builtin::Render => "render",
            Builtin::Meta => "meta",
            Builtin::Metas => "metas",
            Builtin::Style => "style",
            Builtin::Styles => "styles",
            Builtin::Script => "script",
            Builtin::Scripts => "scripts",
        }
    }
}

impl Directive for Builtin {
    fn call(&self, ctx: &RenderContext, args: &DirectiveArgs<'_>) -> Result<JsonValue> {
        match self {
            Builtin::Layout => layout(ctx, args),
            Builtin::Title => scalar(ctx, args, |state| &mut state.title),
            Builtin::Author => scalar(ctx, args, |state| &mut state.author),
            Builtin::Keywords => scalar(ctx, args, |state| &mut state.keywords),
            Builtin::Description => scalar(ctx, args, |state| &mut state.description),
            Builtin::Body => ctx.update(|state| JsonValue::String(state.body.clone())),
            Builtin::Render => render(ctx, args),
            Builtin::Meta => {
                let tag = meta_tag(args)?;
                ctx.update(|state| state.metas.push(tag))?;
                Ok(empty())
            }
            Builtin::Metas => joined(ctx, |state| &state.metas),
            Builtin::Style => {
                let tag = style_tag(args)?;
                ctx.update(|state| state.styles.push(tag))?;
                Ok(empty())
            }
            Builtin::Styles => joined(ctx, |state| &state.styles),
            Builtin::Script => {
                let tag = script_tag(args)?;
                ctx.update(|state| state.scripts.push(tag))?;
                Ok(empty())
            }
            Builtin::Scripts => joined(ctx, |state| &state.scripts),
        }
    }

    fn is_safe(&self) -> bool {
        true
    }
}

/// Built-in directives keyed by name
pub fn builtin_directives() -> DirectiveTable {
    Builtin::ALL
        .iter()
        .map(|builtin| (builtin.name().to_string(), Arc::new(*builtin) as Arc<dyn Directive>))
        .collect()
}

/// Caller directives overlaid with the built-ins; built-in names win
pub fn merge_directives(caller: &DirectiveTable) -> DirectiveTable {
    let mut table = caller.clone();
    table.extend(builtin_directives());
    table
}

fn layout(ctx: &RenderContext, args: &DirectiveArgs<'_>) -> Result<JsonValue> {
    let name = args.required("name")?;
    let model = layout_model(args.get("model"));
    ctx.update(|state| {
        state.layout = Some(name);
        state.layout_model = model;
    })?;
    Ok(empty())
}

/// Objects are taken as-is, strings are parsed as JSON objects, anything else
/// (including unparsable strings) yields an empty model.
fn layout_model(value: Option<&JsonValue>) -> Map {
    match value {
        Some(JsonValue::Object(map)) => map.clone(),
        Some(JsonValue::String(text)) => serde_json::from_str::<Map>(text).unwrap_or_default(),
        _ => Map::new(),
    }
}

fn scalar(
    ctx: &RenderContext,
    args: &DirectiveArgs<'_>,
    field: fn(&mut RenderState) -> &mut String,
) -> Result<JsonValue> {
    match args.positional_string("value") {
        Some(value) => {
            ctx.update(|state| *field(state) = value)?;
            Ok(empty())
        }
        None => ctx.update(|state| JsonValue::String(field(state).clone())),
    }
}

fn joined(ctx: &RenderContext, field: fn(&RenderState) -> &Vec<String>) -> Result<JsonValue> {
    ctx.update(|state| JsonValue::String(field(state).join("\n")))
}

fn render(ctx: &RenderContext, args: &DirectiveArgs<'_>) -> Result<JsonValue> {
    let name = args.required("name")?;
    let model = args
        .get("model")
        .cloned()
        .unwrap_or_else(|| JsonValue::Object(Map::new()));
    let source = ViewSource::parse(name);

    match ctx.render_partial(&source, model) {
        Ok(output) => Ok(JsonValue::String(output)),
        Err(err) => {
            warn!(
                partial = source.label(),
                error = %err,
                "Partial render failed, substituting inline error"
            );
            Ok(JsonValue::String(render_error_marker(&err)))
        }
    }
}

/// Inline text substituted for a failed partial
pub fn render_error_marker(err: &ViewError) -> String {
    format!("render error: {}", escape_html(&err.to_string()))
}

fn meta_tag(args: &DirectiveArgs<'_>) -> Result<String> {
    let name = args
        .string("name")
        .ok_or_else(|| ViewError::directive(args.directive(), "missing argument 'name'"))?;
    let content = args
        .string("content")
        .ok_or_else(|| ViewError::directive(args.directive(), "missing argument 'content'"))?;
    let attribute = if args.flag("http_equiv") {
        "http-equiv"
    } else {
        "name"
    };
    Ok(format!(
        r#"<meta {attribute}="{}" content="{}" />"#,
        escape_html(&name),
        escape_html(&content)
    ))
}

fn style_tag(args: &DirectiveArgs<'_>) -> Result<String> {
    let href = args.required("href")?;
    Ok(match args.string("media").filter(|media| !media.is_empty()) {
        Some(media) => format!(
            r#"<link type="text/css" rel="stylesheet" href="{}" media="{}" />"#,
            escape_html(&href),
            escape_html(&media)
        ),
        None => format!(
            r#"<link type="text/css" rel="stylesheet" href="{}" />"#,
            escape_html(&href)
        ),
    })
}

fn script_tag(args: &DirectiveArgs<'_>) -> Result<String> {
    let src = args.required("src")?;
    let kind = args
        .string("type")
        .filter(|kind| !kind.is_empty())
        .unwrap_or_else(|| DEFAULT_SCRIPT_TYPE.to_string());
    Ok(format!(
        r#"<script type="{}" src="{}"></script>"#,
        escape_html(&kind),
        escape_html(&src)
    ))
}
