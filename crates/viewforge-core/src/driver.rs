//! Driver boundary and the built-in Tera driver.

use std::sync::atomic::{AtomicI64, Ordering};

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::ViewConfig;
use crate::context::RenderContext;
use crate::error::Result;
use crate::request::{Map, RenderRequest};

/// Settings handed to a driver when the module connects
#[derive(Debug, Clone)]
pub struct Instance {
    pub config: ViewConfig,
    pub setting: Map,
}

impl Instance {
    pub fn new(config: ViewConfig) -> Self {
        let setting = config.setting.clone();
        Self { config, setting }
    }
}

/// Load indicator reported by a connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Health {
    /// Renders currently in flight
    pub workload: i64,
}

/// Factory for connections
pub trait Driver: Send + Sync {
    fn connect(&self, instance: &Instance) -> Result<Box<dyn Connection>>;
}

/// A connected rendering backend
pub trait Connection: Send + Sync {
    fn open(&self) -> Result<()>;
    fn health(&self) -> Result<Health>;
    fn close(&self) -> Result<()>;
    fn parse(&self, request: RenderRequest) -> Result<String>;
}

/// The built-in driver, composing templates with Tera
#[derive(Debug, Default, Clone, Copy)]
pub struct TeraDriver;

impl Driver for TeraDriver {
    fn connect(&self, instance: &Instance) -> Result<Box<dyn Connection>> {
        Ok(Box::new(TeraConnection::new(instance.config.clone())))
    }
}

/// Connection of [`TeraDriver`]; every parse gets its own render context
#[derive(Debug)]
pub struct TeraConnection {
    config: ViewConfig,
    in_flight: AtomicI64,
}

impl TeraConnection {
    pub fn new(config: ViewConfig) -> Self {
        Self {
            config,
            in_flight: AtomicI64::new(0),
        }
    }
}

struct InFlight<'a>(&'a AtomicI64);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicI64) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Connection for TeraConnection {
    fn open(&self) -> Result<()> {
        if self.config.root.is_dir() {
            debug!("Template root {}", self.config.root.display());
        } else {
            warn!(
                "Template root {} does not exist; only inline views will render",
                self.config.root.display()
            );
        }
        Ok(())
    }

    fn health(&self) -> Result<Health> {
        Ok(Health {
            workload: self.in_flight.load(Ordering::SeqCst),
        })
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }

    fn parse(&self, request: RenderRequest) -> Result<String> {
        let _guard = InFlight::enter(&self.in_flight);
        RenderContext::new(&self.config, request).parse()
    }
}
