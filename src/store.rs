//! Registry document persistence.
//!
//! The document is read fresh for every operation and rewritten whole. Before
//! an existing document is overwritten its current bytes are copied into the
//! backup folder. Nothing here locks the file: two writers racing through
//! load → mutate → save lose the earlier writer's changes.

use crate::environment::{Environment, Registry};
use crate::error::{Result, UglError};
use crate::paths::{ensure_directories, ensure_parent};
use chrono::{DateTime, Local};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

pub const ENVIRONMENTS_KEY: &str = "Environments";

/// The full registry document, unknown top-level keys included.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryDocument {
    root: Map<String, Value>,
}

impl Default for RegistryDocument {
    fn default() -> Self {
        let mut root = Map::new();
        root.insert(ENVIRONMENTS_KEY.to_string(), Value::Array(Vec::new()));
        Self { root }
    }
}

impl RegistryDocument {
    pub fn from_json(content: &str) -> std::result::Result<Self, String> {
        let value: Value = serde_json::from_str(content).map_err(|err| err.to_string())?;
        let Value::Object(mut root) = value else {
            return Err("top-level value is not a JSON object".to_string());
        };
        decode_with_repair(&mut root);
        Ok(Self { root })
    }

    pub fn to_json(&self) -> Result<String> {
        let mut text = serde_json::to_string_pretty(&self.root)?;
        text.push('\n');
        Ok(text)
    }

    pub fn records(&self) -> &[Value] {
        match self.root.get(ENVIRONMENTS_KEY) {
            Some(Value::Array(items)) => items.as_slice(),
            _ => &[],
        }
    }

    pub fn registry(&self) -> Registry {
        Registry::from_records(self.records())
    }

    pub fn set_environments(&mut self, environments: &[Environment]) {
        let records = environments.iter().map(Environment::to_value).collect();
        self.root
            .insert(ENVIRONMENTS_KEY.to_string(), Value::Array(records));
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.root.get(key)
    }
}

/// Repairs historical shapes of the `Environments` field in place.
///
/// - absent or null: empty list
/// - a single object: wrapped in a one-element list
/// - a string or any other scalar: empty list
/// - a list: kept as is
pub fn decode_with_repair(root: &mut Map<String, Value>) {
    let slot = root
        .entry(ENVIRONMENTS_KEY)
        .or_insert(Value::Array(Vec::new()));
    *slot = match slot.take() {
        Value::Array(items) => Value::Array(items),
        Value::Object(record) => Value::Array(vec![Value::Object(record)]),
        other => {
            if !other.is_null() {
                debug!(shape = %json_kind(&other), "discarding malformed Environments value");
            }
            Value::Array(Vec::new())
        }
    };
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub fn ensure_exists(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    ensure_parent(path)?;
    let content = RegistryDocument::default().to_json()?;
    fs::write(path, content).map_err(|err| UglError::fs("create registry document", path, err))?;
    info!(path = %path.display(), "created empty registry document");
    Ok(())
}

pub fn load(path: &Path) -> Result<RegistryDocument> {
    let content = fs::read_to_string(path).map_err(|err| UglError::LoadFailure {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    RegistryDocument::from_json(&content).map_err(|reason| UglError::LoadFailure {
        path: path.to_path_buf(),
        reason,
    })
}

/// Writes `document` to `path`, first copying any existing document into
/// `backup_root`. Returns the backup path when a prior document existed.
pub fn save(
    path: &Path,
    backup_root: &Path,
    document: &RegistryDocument,
) -> Result<Option<PathBuf>> {
    let mut backup_path = None;
    if path.exists() {
        ensure_directories(&[backup_root])?;
        let previous =
            fs::read(path).map_err(|err| UglError::fs("read registry document", path, err))?;
        let target = backup_path_for(path, backup_root, Local::now());
        fs::write(&target, previous)
            .map_err(|err| UglError::fs("write registry backup", &target, err))?;
        info!(backup = %target.display(), "registry backup saved");
        backup_path = Some(target);
    }

    write_atomic_text_file(path, &document.to_json()?)?;
    debug!(path = %path.display(), "registry document saved");
    Ok(backup_path)
}

/// `<stem>_<YYYYMMDD_HHMMSS>.json` in `backup_root`. A second backup within
/// the same second gets a `_<n>` suffix instead of replacing the first.
pub fn backup_path_for(path: &Path, backup_root: &Path, now: DateTime<Local>) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "registry".to_string());
    let timestamp = now.format("%Y%m%d_%H%M%S");
    let candidate = backup_root.join(format!("{stem}_{timestamp}.json"));
    if !candidate.exists() {
        return candidate;
    }
    (1..)
        .map(|n| backup_root.join(format!("{stem}_{timestamp}_{n}.json")))
        .find(|path| !path.exists())
        .unwrap_or(candidate)
}

/// Distinguishes temp files of writers in the same process and millisecond.
static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

fn write_atomic_text_file(path: &Path, content: &str) -> Result<()> {
    ensure_parent(path)?;
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let tmp_path = parent.join(format!(
        ".{}.tmp.{}.{}.{}",
        path.file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "registry".to_string()),
        std::process::id(),
        ts,
        TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    fs::write(&tmp_path, content)
        .map_err(|err| UglError::fs("write registry document", &tmp_path, err))?;
    fs::rename(&tmp_path, path).map_err(|err| {
        let _ = fs::remove_file(&tmp_path);
        UglError::fs("replace registry document", path, err)
    })
}
