//! Destinations for streamed command output.

use crate::error::{Result, UglError};
use crate::paths::ensure_directories;
use chrono::Local;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Accepts output lines in the order a command produced them.
pub trait OutputSink {
    fn line(&mut self, line: &str);
}

impl OutputSink for Vec<String> {
    fn line(&mut self, line: &str) {
        self.push(line.to_string());
    }
}

/// Console echo plus an optional transcript file under the log root.
///
/// Transcript files are named `GAMLaunch_<YYYYMMDD_HHMMSS>.txt`; each call to
/// [`Transcript::start_new`] closes the current file and opens a fresh one.
#[derive(Debug)]
pub struct Transcript {
    log_root: PathBuf,
    echo: bool,
    file: Option<File>,
    path: Option<PathBuf>,
}

impl Transcript {
    pub fn new(log_root: impl Into<PathBuf>, echo: bool) -> Self {
        Self {
            log_root: log_root.into(),
            echo,
            file: None,
            path: None,
        }
    }

    pub fn start_new(&mut self) -> Result<PathBuf> {
        self.file = None;
        ensure_directories(&[&self.log_root])?;
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let mut path = self.log_root.join(format!("GAMLaunch_{stamp}.txt"));
        let mut n = 1;
        while path.exists() {
            path = self.log_root.join(format!("GAMLaunch_{stamp}_{n}.txt"));
            n += 1;
        }
        let file =
            File::create(&path).map_err(|err| UglError::fs("create transcript", &path, err))?;
        self.file = Some(file);
        self.path = Some(path.clone());
        Ok(path)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn append(&mut self, line: &str) -> io::Result<()> {
        if let Some(file) = self.file.as_mut() {
            writeln!(file, "{line}")?;
        }
        Ok(())
    }
}

impl OutputSink for Transcript {
    fn line(&mut self, line: &str) {
        if self.echo {
            println!("{line}");
        }
        if let Err(err) = self.append(line) {
            warn!(error = %err, "transcript write failed; closing transcript");
            self.file = None;
        }
    }
}
