//! The composition engine: one `RenderContext` per parse.
//!
//! A render runs in up to two passes. The body pass executes the requested
//! view; while it runs, directives may pick a layout, set the title, queue
//! stylesheets and so on. If a layout was picked, the layout pass executes it
//! with the body's output available through `body()`. The body decides which
//! layout wraps it at render time, which is why the state below outlives a
//! single pass.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, Weak};

use serde_json::Value as JsonValue;
use tracing::debug;

use crate::config::ViewConfig;
use crate::directives::merge_directives;
use crate::engine::{Delimiters, Engine};
use crate::error::{Result, ViewError};
use crate::request::{Map, RenderRequest, ViewSource};
use crate::store::{LoadedTemplate, ResolveKind, TemplateStore};

/// Deepest chain of nested `render` calls allowed in one render
pub const MAX_RENDER_DEPTH: usize = 16;

/// Mutable state shared by the passes of one render
#[derive(Debug, Clone, Default)]
pub struct RenderState {
    /// Directory of the last file-based body template
    pub search_dir: Option<PathBuf>,
    /// Layout picked by the `layout` directive
    pub layout: Option<String>,
    /// Model captured by the `layout` directive
    pub layout_model: Map,
    /// Output of the body pass, served by `body()`
    pub body: String,
    pub title: String,
    pub author: String,
    pub keywords: String,
    pub description: String,
    pub metas: Vec<String>,
    pub styles: Vec<String>,
    pub scripts: Vec<String>,
    depth: usize,
}

/// Per-parse composition state and the engine bound to it
pub struct RenderContext {
    request: RenderRequest,
    store: TemplateStore,
    engine: Engine,
    state: Mutex<RenderState>,
}

impl RenderContext {
    /// Build the context for one request. Directives are bound to the
    /// returned context and stop working once it is dropped.
    pub fn new(config: &ViewConfig, request: RenderRequest) -> Arc<Self> {
        let directives = merge_directives(&request.helpers);
        let store = TemplateStore::from_config(config, request.site.as_deref(), &request.language);
        let delimiters = Delimiters::from_config(config);

        Arc::new_cyclic(|context: &Weak<RenderContext>| Self {
            engine: Engine::new(delimiters, &directives, context.clone()),
            request,
            store,
            state: Mutex::new(RenderState::default()),
        })
    }

    pub fn request(&self) -> &RenderRequest {
        &self.request
    }

    pub fn store(&self) -> &TemplateStore {
        &self.store
    }

    /// Run `f` with exclusive access to the render state
    pub fn update<R>(&self, f: impl FnOnce(&mut RenderState) -> R) -> Result<R> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ViewError::Internal("render state lock poisoned".to_string()))?;
        Ok(f(&mut state))
    }

    /// Copy of the current render state
    pub fn snapshot(&self) -> Result<RenderState> {
        self.update(|state| state.clone())
    }

    /// Render the request: body pass, then the layout pass if one was picked
    pub fn parse(&self) -> Result<String> {
        let body = self.body_pass()?;

        let Some(layout) = self.update(|state| state.layout.clone())? else {
            debug!(view = self.request.view.label(), "No layout selected");
            return Ok(body);
        };

        self.update(|state| state.body = body)?;
        self.layout_pass(&layout)
    }

    fn body_pass(&self) -> Result<String> {
        let template = self
            .store
            .resolve(ResolveKind::Body, &self.request.view, None)?;
        if let Some(dir) = template.directory() {
            let dir = dir.to_path_buf();
            self.update(|state| state.search_dir = Some(dir))?;
        }

        debug!(
            view = self.request.view.label(),
            template = %template.identifier,
            "Starting body pass"
        );
        self.engine.begin_pass()?;
        self.engine.compile(&template)?;

        let model = self.request.model.clone().unwrap_or(JsonValue::Null);
        self.engine
            .execute(&template.identifier, self.pass_data(model))
    }

    fn layout_pass(&self, layout: &str) -> Result<String> {
        let template = self
            .store
            .resolve(ResolveKind::Layout, &ViewSource::parse(layout), None)?;

        debug!(layout = %template.identifier, "Starting layout pass");
        self.engine.begin_pass()?;
        self.engine.compile(&template)?;

        let model = self.update(|state| JsonValue::Object(state.layout_model.clone()))?;
        self.engine
            .execute(&template.identifier, self.pass_data(model))
    }

    /// Resolve, compile and execute a partial within the current pass.
    ///
    /// Partials already compiled in this pass are reused.
    pub fn render_partial(&self, source: &ViewSource, model: JsonValue) -> Result<String> {
        let depth = self.update(|state| {
            state.depth += 1;
            state.depth
        })?;
        let result = self.render_nested(source, model, depth);
        self.update(|state| state.depth -= 1)?;
        result
    }

    fn render_nested(&self, source: &ViewSource, model: JsonValue, depth: usize) -> Result<String> {
        if depth > MAX_RENDER_DEPTH {
            return Err(ViewError::RenderDepthExceeded {
                name: source.label().to_string(),
                depth: MAX_RENDER_DEPTH,
            });
        }

        let identifier = match source {
            ViewSource::File(name) => {
                let search_dir = self.update(|state| state.search_dir.clone())?;
                let path = self
                    .store
                    .locate(ResolveKind::Render, name, search_dir.as_deref())?;
                let identifier = TemplateStore::identifier_for(&path);
                if !self.engine.is_compiled(&identifier)? {
                    let source = std::fs::read_to_string(&path)?;
                    self.engine.compile(&LoadedTemplate {
                        identifier: identifier.clone(),
                        source,
                        path: Some(path),
                    })?;
                }
                identifier
            }
            ViewSource::Inline(_) => {
                let template = self.store.resolve(ResolveKind::Render, source, None)?;
                if !self.engine.is_compiled(&template.identifier)? {
                    self.engine.compile(&template)?;
                }
                template.identifier
            }
        };

        debug!(partial = %identifier, depth, "Rendering partial");
        self.engine.execute(&identifier, self.pass_data(model))
    }

    /// The request's data bag with `model` set for one pass
    fn pass_data(&self, model: JsonValue) -> Map {
        let mut data = self.request.data.clone();
        data.insert("model".to_string(), model);
        data
    }
}

impl fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderContext")
            .field("request", &self.request)
            .field("store", &self.store)
            .field("delimiters", self.engine.delimiters())
            .finish_non_exhaustive()
    }
}
