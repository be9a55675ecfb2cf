//! Viewforge Core Library
//!
//! Resolves HTML templates across site, language and shared directories and
//! composes pages from a body view, an optional layout and nested partials,
//! with Tera as the template engine.
//!
//! ```no_run
//! use viewforge_core::{RenderRequest, ViewModule};
//!
//! # fn main() -> viewforge_core::Result<()> {
//! let module = ViewModule::new();
//! module.configure(&serde_json::json!({"view": {"root": "templates"}}))?;
//! module.open()?;
//! let page = module.parse(RenderRequest::new("home").with_language("en"))?;
//! # let _ = page;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod directives;
pub mod driver;
pub mod engine;
pub mod error;
pub mod module;
pub mod request;
pub mod store;

pub use crate::{
    config::ViewConfig,
    context::{RenderContext, RenderState},
    directives::{Directive, DirectiveArgs, SafeDirective},
    driver::{Connection, Driver, Health, Instance, TeraDriver},
    error::{Result, ViewError},
    module::{Helper, Phase, ViewModule},
    request::{DirectiveTable, Map, RenderRequest, ViewSource},
    store::{ResolveKind, TemplateStore},
};
