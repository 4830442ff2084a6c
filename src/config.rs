//! Launcher configuration: fixed layout under a base directory plus an
//! optional JSON overrides file.

use crate::error::{Result, UglError};
use crate::paths::ensure_parent;
use crate::tool::ToolBinding;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_ROOT_ENV: &str = "UGL_CONFIG_ROOT";
pub const OVERRIDE_FILENAME: &str = "launcher_config.json";

/// Keys accepted in the overrides file.
pub const OVERRIDE_KEYS: &[&str] = &[
    "json_path",
    "log_root",
    "template_path",
    "json_backup_root",
    "clients_root",
    "tool_executable",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LauncherConfig {
    pub config_root: PathBuf,
    pub json_path: PathBuf,
    pub log_root: PathBuf,
    pub template_path: PathBuf,
    pub json_backup_root: PathBuf,
    pub clients_root: PathBuf,
    pub tool: ToolBinding,
}

impl LauncherConfig {
    pub fn default_for(config_root: &Path) -> Self {
        Self {
            config_root: config_root.to_path_buf(),
            json_path: config_root.join("GAM_Clients.json"),
            log_root: config_root.join("Logs"),
            template_path: config_root.join("GAM-Template"),
            json_backup_root: config_root.join("GAM-JSONBackups"),
            clients_root: config_root.join("GAM-Clients"),
            tool: ToolBinding::default(),
        }
    }

    fn with_overrides(mut self, overrides: &BTreeMap<String, String>) -> Self {
        let path_fields: [(&str, &mut PathBuf); 5] = [
            ("json_path", &mut self.json_path),
            ("log_root", &mut self.log_root),
            ("template_path", &mut self.template_path),
            ("json_backup_root", &mut self.json_backup_root),
            ("clients_root", &mut self.clients_root),
        ];
        for (key, field) in path_fields {
            if let Some(value) = overrides.get(key) {
                *field = PathBuf::from(value);
            }
        }
        if let Some(executable) = overrides.get("tool_executable") {
            self.tool = self.tool.with_executable(executable.clone());
        }
        self
    }
}

/// Base directory: explicit flag, then `UGL_CONFIG_ROOT`, then
/// `~/.config/ugl`, then the current directory.
pub fn resolve_config_root(override_path: Option<&Path>) -> PathBuf {
    if let Some(path) = override_path {
        return path.to_path_buf();
    }
    if let Ok(path) = env::var(CONFIG_ROOT_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".config").join("ugl");
    }
    env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_root: PathBuf,
}

impl ConfigManager {
    pub fn new(config_root: impl Into<PathBuf>) -> Self {
        Self {
            config_root: config_root.into(),
        }
    }

    pub fn override_path(&self) -> PathBuf {
        self.config_root.join(OVERRIDE_FILENAME)
    }

    pub fn load(&self) -> LauncherConfig {
        LauncherConfig::default_for(&self.config_root).with_overrides(&self.read_overrides())
    }

    /// Non-empty values set a key; empty values remove it.
    pub fn update_overrides(&self, updates: &BTreeMap<String, String>) -> Result<LauncherConfig> {
        if let Some(unknown) = updates
            .keys()
            .find(|key| !OVERRIDE_KEYS.contains(&key.as_str()))
        {
            return Err(UglError::Config(format!(
                "unknown override key '{unknown}'; expected one of: {}",
                OVERRIDE_KEYS.join(", ")
            )));
        }
        let mut overrides = self.read_overrides();
        for (key, value) in updates {
            let value = value.trim();
            if value.is_empty() {
                overrides.remove(key);
            } else {
                overrides.insert(key.clone(), value.to_string());
            }
        }
        let path = self.override_path();
        ensure_parent(&path)?;
        let mut text = serde_json::to_string_pretty(&overrides)?;
        text.push('\n');
        fs::write(&path, text).map_err(|err| UglError::fs("write config overrides", &path, err))?;
        Ok(self.load())
    }

    /// Current overrides; unreadable or non-object files count as none.
    pub fn read_overrides(&self) -> BTreeMap<String, String> {
        let Ok(content) = fs::read_to_string(self.override_path()) else {
            return BTreeMap::new();
        };
        let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&content) else {
            return BTreeMap::new();
        };
        stringify_values(map)
    }
}

fn stringify_values(map: Map<String, Value>) -> BTreeMap<String, String> {
    map.into_iter()
        .map(|(key, value)| {
            let text = match value {
                Value::String(text) => text,
                other => other.to_string(),
            };
            (key, text)
        })
        .collect()
}
