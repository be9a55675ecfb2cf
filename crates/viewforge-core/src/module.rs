//! The view module: driver and helper registries plus the lifecycle that
//! connects a driver and serves renders through it.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use crate::config::{DEFAULT_DRIVER, ViewConfig};
use crate::directives::Directive;
use crate::driver::{Connection, Driver, Health, Instance, TeraDriver};
use crate::error::{Result, ViewError};
use crate::request::{DirectiveTable, RenderRequest};

/// A template helper registered with the module
#[derive(Clone)]
pub struct Helper {
    pub name: String,
    pub desc: Option<String>,
    pub alias: Vec<String>,
    pub action: Arc<dyn Directive>,
}

impl Helper {
    pub fn new(name: impl Into<String>, action: impl Directive + 'static) -> Self {
        Self {
            name: name.into(),
            desc: None,
            alias: Vec::new(),
            action: Arc::new(action),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias.push(alias.into());
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.desc = Some(desc.into());
        self
    }
}

impl fmt::Debug for Helper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Helper")
            .field("name", &self.name)
            .field("desc", &self.desc)
            .field("alias", &self.alias)
            .finish_non_exhaustive()
    }
}

/// Lifecycle position of a [`ViewModule`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Initialized,
    Connected,
    Started,
    Stopped,
}

#[derive(Default)]
struct ModuleState {
    initialized: bool,
    connected: bool,
    started: bool,
    stopped: bool,
    drivers: HashMap<String, Arc<dyn Driver>>,
    helpers: BTreeMap<String, Helper>,
    helper_actions: Arc<DirectiveTable>,
    config: ViewConfig,
    connection: Option<Arc<dyn Connection>>,
}

impl ModuleState {
    fn phase(&self) -> Phase {
        if self.stopped {
            Phase::Stopped
        } else if self.started {
            Phase::Started
        } else if self.connected {
            Phase::Connected
        } else if self.initialized {
            Phase::Initialized
        } else {
            Phase::Uninitialized
        }
    }
}

/// Owns the registries and the active connection.
///
/// Registrations are accepted until `setup`; afterwards the registries are
/// frozen until `close` resets the module.
pub struct ViewModule {
    inner: RwLock<ModuleState>,
    allow_override: bool,
}

impl Default for ViewModule {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewModule {
    /// A module with the built-in Tera driver registered as `"default"`
    pub fn new() -> Self {
        let mut state = ModuleState::default();
        state
            .drivers
            .insert(DEFAULT_DRIVER.to_string(), Arc::new(TeraDriver));
        Self {
            inner: RwLock::new(state),
            allow_override: false,
        }
    }

    /// Let later registrations replace earlier ones under the same name
    pub fn with_override(mut self) -> Self {
        self.allow_override = true;
        self
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, ModuleState>> {
        self.inner
            .read()
            .map_err(|_| ViewError::Internal("Failed to acquire read lock".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, ModuleState>> {
        self.inner
            .write()
            .map_err(|_| ViewError::Internal("Failed to acquire write lock".to_string()))
    }

    pub fn register_driver(&self, name: &str, driver: Arc<dyn Driver>) -> Result<()> {
        let name = if name.is_empty() { DEFAULT_DRIVER } else { name };
        let mut state = self.write()?;
        if state.initialized {
            warn!("Ignoring driver '{}' registered after setup", name);
            return Ok(());
        }
        if state.drivers.contains_key(name) && !self.allow_override {
            debug!("Driver '{}' already registered", name);
            return Ok(());
        }
        state.drivers.insert(name.to_string(), driver);
        Ok(())
    }

    /// Register a helper under `name` and every alias. An empty `name`
    /// registers the aliases only.
    pub fn register_helper(&self, name: &str, helper: Helper) -> Result<()> {
        let mut state = self.write()?;
        if state.initialized {
            warn!("Ignoring helper '{}' registered after setup", name);
            return Ok(());
        }

        let keys: Vec<String> = std::iter::once(name.to_string())
            .chain(helper.alias.iter().cloned())
            .filter(|key| !key.is_empty())
            .collect();
        for key in keys {
            if state.helpers.contains_key(&key) && !self.allow_override {
                debug!("Helper '{}' already registered", key);
                continue;
            }
            state.helpers.insert(key, helper.clone());
        }
        Ok(())
    }

    /// Replace the configuration wholesale
    pub fn register_config(&self, config: ViewConfig) -> Result<()> {
        let mut state = self.write()?;
        if state.initialized {
            warn!("Ignoring configuration registered after setup");
            return Ok(());
        }
        state.config = config;
        Ok(())
    }

    /// Merge the `view` section of a global settings document
    pub fn configure(&self, global: &JsonValue) -> Result<()> {
        let mut state = self.write()?;
        if state.initialized {
            warn!("Ignoring configuration merged after setup");
            return Ok(());
        }
        state.config.merge_global(global);
        Ok(())
    }

    /// Fill configuration defaults and freeze the registries
    pub fn setup(&self) -> Result<()> {
        let mut state = self.write()?;
        Self::setup_locked(&mut state);
        Ok(())
    }

    fn setup_locked(state: &mut ModuleState) {
        if state.initialized {
            return;
        }
        state.config.fill_defaults();
        let actions: DirectiveTable = state
            .helpers
            .iter()
            .map(|(key, helper)| (key.clone(), Arc::clone(&helper.action)))
            .collect();
        state.helper_actions = Arc::new(actions);
        state.initialized = true;
        info!(
            "View module initialized with driver '{}', root {}",
            state.config.driver,
            state.config.root.display()
        );
    }

    /// Connect the configured driver and open the connection
    pub fn open(&self) -> Result<()> {
        let mut state = self.write()?;
        if state.connected {
            return Ok(());
        }
        Self::setup_locked(&mut state);

        let driver = state
            .drivers
            .get(&state.config.driver)
            .cloned()
            .ok_or_else(|| {
                ViewError::config(format!("unknown view driver '{}'", state.config.driver))
            })?;

        let instance = Instance::new(state.config.clone());
        let connection: Arc<dyn Connection> = Arc::from(
            driver
                .connect(&instance)
                .map_err(|e| ViewError::config(format!("failed to connect view driver: {e}")))?,
        );
        connection
            .open()
            .map_err(|e| ViewError::config(format!("failed to open view connection: {e}")))?;

        state.connection = Some(connection);
        state.connected = true;
        info!("View module connected with driver '{}'", state.config.driver);
        Ok(())
    }

    /// Mark the module as serving; opens it first if needed
    pub fn start(&self) -> Result<()> {
        if !self.read()?.connected {
            self.open()?;
        }
        let mut state = self.write()?;
        if state.started {
            return Ok(());
        }
        state.started = true;
        state.stopped = false;
        let connections = usize::from(state.connection.is_some());
        info!(
            "view module is running with {} connections, {} helpers",
            connections,
            state.helpers.len()
        );
        Ok(())
    }

    pub fn stop(&self) -> Result<()> {
        let mut state = self.write()?;
        if !state.started {
            return Ok(());
        }
        state.started = false;
        state.stopped = true;
        info!("View module stopped");
        Ok(())
    }

    /// Close the connection and return to the uninitialized phase.
    /// Registered drivers and helpers are kept.
    pub fn close(&self) -> Result<()> {
        let mut state = self.write()?;
        if let Some(connection) = state.connection.take() {
            if let Err(err) = connection.close() {
                warn!("Failed to close view connection: {}", err);
            }
        }
        state.initialized = false;
        state.connected = false;
        state.started = false;
        state.stopped = false;
        state.helper_actions = Arc::new(DirectiveTable::new());
        info!("View module closed");
        Ok(())
    }

    pub fn phase(&self) -> Result<Phase> {
        Ok(self.read()?.phase())
    }

    /// Current configuration (defaults are filled in at setup)
    pub fn config(&self) -> Result<ViewConfig> {
        Ok(self.read()?.config.clone())
    }

    /// Registered helper keys, aliases included
    pub fn helper_names(&self) -> Result<Vec<String>> {
        Ok(self.read()?.helpers.keys().cloned().collect())
    }

    pub fn health(&self) -> Result<Health> {
        let connection = self
            .read()?
            .connection
            .clone()
            .ok_or(ViewError::InvalidConnection)?;
        connection.health()
    }

    /// Render a view through the connected driver.
    ///
    /// Registered helpers are added to the request unless it already carries
    /// a helper under the same name.
    pub fn parse(&self, mut request: RenderRequest) -> Result<String> {
        let (connection, actions) = {
            let state = self.read()?;
            let connection = match (&state.connection, state.connected) {
                (Some(connection), true) => Arc::clone(connection),
                _ => return Err(ViewError::InvalidConnection),
            };
            (connection, Arc::clone(&state.helper_actions))
        };

        for (name, action) in actions.iter() {
            request
                .helpers
                .entry(name.clone())
                .or_insert_with(|| Arc::clone(action));
        }
        connection.parse(request)
    }
}

impl fmt::Debug for ViewModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("ViewModule");
        debug.field("allow_override", &self.allow_override);
        if let Ok(state) = self.inner.read() {
            debug
                .field("phase", &state.phase())
                .field("drivers", &state.drivers.keys().collect::<Vec<_>>())
                .field("helpers", &state.helpers.keys().collect::<Vec<_>>())
                .field("config", &state.config);
        }
        debug.finish_non_exhaustive()
    }
}
