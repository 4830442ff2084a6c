//! Path string handling for registry records.
//!
//! The registry stores folder paths in a canonical backslash form. Hosts that
//! use `/` as their separator map that form back with [`to_native`] before
//! touching the filesystem.

use crate::error::{Result, UglError};
use std::fs;
use std::path::{Path, PathBuf};

/// Canonical registry form of a path string.
///
/// Surrounding whitespace and enclosing `"` pairs are removed until the
/// value is stable, then every `/` becomes `\`. Applying it twice yields the
/// same string as applying it once.
pub fn normalise(raw: &str) -> String {
    let mut current = raw;
    loop {
        let trimmed = current.trim();
        let unquoted = strip_enclosing_quotes(trimmed);
        if unquoted.len() == current.len() {
            break;
        }
        current = unquoted;
    }
    current.replace('/', "\\")
}

fn strip_enclosing_quotes(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(value)
}

/// Folder name derived from an environment label.
///
/// Only ASCII letters, digits and `-` survive. Distinct names can collapse
/// to the same key ("A B" and "AB").
pub fn safe_key(name: &str) -> String {
    name.chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || *ch == '-')
        .collect()
}

/// Host path for a canonical registry path string.
pub fn to_native(canonical: &str) -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(canonical)
    } else {
        PathBuf::from(canonical.replace('\\', "/"))
    }
}

/// Host path for a raw registry value, normalising first.
pub fn resolve(raw: &str) -> PathBuf {
    to_native(&normalise(raw))
}

pub fn ensure_directories<P: AsRef<Path>>(paths: &[P]) -> Result<()> {
    for path in paths {
        let path = path.as_ref();
        fs::create_dir_all(path).map_err(|err| UglError::fs("create directory", path, err))?;
    }
    Ok(())
}

pub fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            ensure_directories(&[parent])?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalise_rewrites_forward_slashes() {
        assert_eq!(normalise("C:/Configs/Clients/A"), "C:\\Configs\\Clients\\A");
        assert_eq!(normalise("C:\\already\\clean"), "C:\\already\\clean");
    }

    #[test]
    fn normalise_strips_whitespace_and_quotes() {
        assert_eq!(normalise("  \"C:/x/y\"  "), "C:\\x\\y");
        assert_eq!(normalise("'C:/x'"), "'C:\\x'");
        assert_eq!(normalise("\"  C:/x  \""), "C:\\x");
        assert_eq!(normalise(""), "");
    }

    #[test]
    fn normalise_keeps_unbalanced_quotes() {
        assert_eq!(normalise("\"C:/x"), "\"C:\\x");
        assert_eq!(normalise("C:/x'"), "C:\\x'");
    }

    #[test]
    fn single_quotes_are_part_of_the_path() {
        assert_eq!(normalise("'/srv/it's'"), "'\\srv\\it's'");
        assert_eq!(normalise("\"'C:/a'\""), "'C:\\a'");
        assert_eq!(normalise("'"), "'");
        assert_eq!(normalise("\""), "\"");
    }

    #[test]
    fn normalise_is_idempotent() {
        for raw in [
            "\"'C:/a/b'\"",
            "  \" /srv/env \" ",
            "plain",
            "'\"'",
            "\\\\server/share",
        ] {
            let once = normalise(raw);
            assert_eq!(normalise(&once), once, "input {raw:?}");
        }
    }

    #[test]
    fn safe_key_drops_punctuation_and_spaces() {
        assert_eq!(safe_key("Test Env"), "TestEnv");
        assert_eq!(
            safe_key("WMAT-ROD - Rodborough School"),
            "WMAT-ROD-RodboroughSchool"
        );
        assert_eq!(safe_key("Ünï/cødé: 42!"), "ncd42");
        assert_eq!(safe_key("!!!"), "");
    }

    #[cfg(not(windows))]
    #[test]
    fn to_native_maps_backslashes_on_unix() {
        assert_eq!(to_native("\\tmp\\env\\A"), PathBuf::from("/tmp/env/A"));
        assert_eq!(resolve(" \"/tmp/env/A\" "), PathBuf::from("/tmp/env/A"));
    }

    #[test]
    fn ensure_directories_creates_nested() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        ensure_directories(&[&nested]).unwrap();
        assert!(nested.is_dir());
        ensure_directories(&[&nested]).unwrap();
    }
}
