//! View module configuration.
//!
//! Configuration can be built in code, loaded from a TOML, YAML or JSON file,
//! or merged from a global settings document whose `view` section carries the
//! recognized keys (`driver`, `root`, `shared`, `left`, `right`, `setting`).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::{Result, ViewError};
use crate::request::Map;

/// Name of the built-in Tera driver
pub const DEFAULT_DRIVER: &str = "default";
/// Default template root directory
pub const DEFAULT_ROOT: &str = "asset/views";
/// Default shared folder name
pub const DEFAULT_SHARED: &str = "shared";
/// Default opening statement delimiter
pub const DEFAULT_LEFT: &str = "{%";
/// Default closing statement delimiter
pub const DEFAULT_RIGHT: &str = "%}";

/// Configuration of the view module and its driver instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    /// Name of the registered driver to connect
    pub driver: String,
    /// Template root directory
    pub root: PathBuf,
    /// Name of the shared folder inside each scope
    pub shared: String,
    /// Opening statement delimiter
    pub left: String,
    /// Closing statement delimiter
    pub right: String,
    /// Free-form driver settings
    pub setting: Map,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            driver: DEFAULT_DRIVER.to_string(),
            root: PathBuf::from(DEFAULT_ROOT),
            shared: DEFAULT_SHARED.to_string(),
            left: DEFAULT_LEFT.to_string(),
            right: DEFAULT_RIGHT.to_string(),
            setting: Map::new(),
        }
    }
}

/// File wrapper accepting either a bare table or one nested under `view`
#[derive(Deserialize)]
#[serde(untagged)]
enum ConfigFile {
    Nested { view: ViewConfig },
    Bare(ViewConfig),
}

impl ConfigFile {
    fn into_config(self) -> ViewConfig {
        match self {
            ConfigFile::Nested { view } => view,
            ConfigFile::Bare(view) => view,
        }
    }
}

impl ViewConfig {
    /// Load configuration from a `.toml`, `.yml`/`.yaml` or `.json` file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ViewError::config(format!("failed to read {}: {e}", path.display()))
        })?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let parsed: ConfigFile = match extension.as_str() {
            "toml" => toml::from_str(&content).map_err(|e| {
                ViewError::config(format!("failed to parse {}: {e}", path.display()))
            })?,
            "yml" | "yaml" => serde_yaml::from_str(&content).map_err(|e| {
                ViewError::config(format!("failed to parse {}: {e}", path.display()))
            })?,
            "json" => serde_json::from_str(&content).map_err(|e| {
                ViewError::config(format!("failed to parse {}: {e}", path.display()))
            })?,
            other => {
                return Err(ViewError::config(format!(
                    "unsupported config format '{other}' for {}",
                    path.display()
                )));
            }
        };

        debug!("Loaded view configuration from {}", path.display());
        Ok(parsed.into_config())
    }

    /// Merge the recognized keys of a global settings document's `view`
    /// section. Unknown keys and values of the wrong type are ignored.
    pub fn merge_global(&mut self, global: &JsonValue) {
        let Some(section) = global.get("view").and_then(JsonValue::as_object) else {
            return;
        };

        if let Some(driver) = section.get("driver").and_then(JsonValue::as_str) {
            if !driver.is_empty() {
                self.driver = driver.to_string();
            }
        }
        if let Some(root) = section.get("root").and_then(JsonValue::as_str) {
            self.root = PathBuf::from(root);
        }
        if let Some(shared) = section.get("shared").and_then(JsonValue::as_str) {
            self.shared = shared.to_string();
        }
        if let Some(left) = section.get("left").and_then(JsonValue::as_str) {
            self.left = left.to_string();
        }
        if let Some(right) = section.get("right").and_then(JsonValue::as_str) {
            self.right = right.to_string();
        }
        if let Some(setting) = section.get("setting").and_then(JsonValue::as_object) {
            self.setting = setting.clone();
        }
    }

    /// Replace empty fields with their defaults
    pub fn fill_defaults(&mut self) {
        if self.driver.is_empty() {
            self.driver = DEFAULT_DRIVER.to_string();
        }
        if self.root.as_os_str().is_empty() {
            self.root = PathBuf::from(DEFAULT_ROOT);
        }
        if self.shared.is_empty() {
            self.shared = DEFAULT_SHARED.to_string();
        }
        if self.left.is_empty() {
            self.left = DEFAULT_LEFT.to_string();
        }
        if self.right.is_empty() {
            self.right = DEFAULT_RIGHT.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ViewConfig::default();
        assert_eq!(config.driver, "default");
        assert_eq!(config.root, PathBuf::from("asset/views"));
        assert_eq!(config.shared, "shared");
        assert_eq!(config.left, "{%");
        assert_eq!(config.right, "%}");
        assert!(config.setting.is_empty());
    }

    #[test]
    fn test_merge_global_recognized_keys() {
        let mut config = ViewConfig::default();
        config.merge_global(&json!({
            "view": {
                "driver": "custom",
                "root": "/srv/views",
                "shared": "common",
                "left": "<%",
                "right": "%>",
                "setting": {"minify": true},
                "unknown": 1
            }
        }));

        assert_eq!(config.driver, "custom");
        assert_eq!(config.root, PathBuf::from("/srv/views"));
        assert_eq!(config.shared, "common");
        assert_eq!(config.left, "<%");
        assert_eq!(config.right, "%>");
        assert_eq!(config.setting.get("minify"), Some(&json!(true)));
    }

    #[test]
    fn test_merge_global_ignores_empty_driver_and_missing_section() {
        let mut config = ViewConfig::default();
        config.merge_global(&json!({"view": {"driver": ""}}));
        assert_eq!(config.driver, "default");

        config.merge_global(&json!({"database": {"driver": "pg"}}));
        assert_eq!(config, ViewConfig::default());
    }

    #[test]
    fn test_fill_defaults() {
        let mut config = ViewConfig {
            driver: String::new(),
            root: PathBuf::new(),
            shared: String::new(),
            left: String::new(),
            right: String::new(),
            setting: Map::new(),
        };
        config.fill_defaults();
        assert_eq!(config, ViewConfig::default());
    }

    #[test]
    fn test_from_toml_file_nested() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("view.toml");
        fs::write(
            &path,
            "[view]\nroot = \"templates\"\nleft = \"<%\"\nright = \"%>\"\n",
        )
        .unwrap();

        let config = ViewConfig::from_file(&path).unwrap();
        assert_eq!(config.root, PathBuf::from("templates"));
        assert_eq!(config.left, "<%");
        assert_eq!(config.shared, "shared");
    }

    #[test]
    fn test_from_yaml_file_bare() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("view.yml");
        fs::write(&path, "root: pages\nshared: common\n").unwrap();

        let config = ViewConfig::from_file(&path).unwrap();
        assert_eq!(config.root, PathBuf::from("pages"));
        assert_eq!(config.shared, "common");
        assert_eq!(config.driver, "default");
    }

    #[test]
    fn test_from_file_rejects_unknown_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("view.ini");
        fs::write(&path, "root=x").unwrap();

        let err = ViewConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ViewError::Configuration(_)));
        assert!(err.to_string().contains("unsupported config format"));
    }
}
