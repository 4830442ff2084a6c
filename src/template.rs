//! Template lookup and cloning for new environment folders.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Non-fatal conditions raised while provisioning an environment folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionWarning {
    TemplateUnavailable { template_root: PathBuf, executable: String },
    CopyFailure { source: PathBuf, reason: String },
}

impl fmt::Display for ProvisionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TemplateUnavailable {
                template_root,
                executable,
            } => write!(
                f,
                "no valid template found: expected {executable} under {}",
                template_root.display()
            ),
            Self::CopyFailure { source, reason } => {
                write!(f, "template copy from {} failed: {reason}", source.display())
            }
        }
    }
}

/// The template folder to clone: `template_root` itself when it holds the
/// executable, else the first subdirectory (by name) that does.
pub fn select_source(template_root: &Path, executable: &str) -> Option<PathBuf> {
    if template_root.join(executable).is_file() {
        return Some(template_root.to_path_buf());
    }
    let entries = fs::read_dir(template_root).ok()?;
    let mut children: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    children.sort();
    children
        .into_iter()
        .find(|child| child.join(executable).is_file())
}

/// Copies every entry under `source` into `destination`, merging into any
/// existing tree. Same-named files are overwritten; extra destination files
/// are left alone.
pub fn clone_template(source: &Path, destination: &Path) -> io::Result<()> {
    fs::create_dir_all(destination)?;
    for entry in WalkDir::new(source).min_depth(1).follow_links(true) {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        let target = destination.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
