//! Operations the command line, menu and HTTP surfaces call into.
//!
//! Every operation re-reads the registry document. Mutations rewrite the
//! whole document through [`store::save`]; concurrent mutators are not
//! coordinated and the last writer wins.

use crate::config::LauncherConfig;
use crate::environment::{Environment, PathIssue};
use crate::error::{Result, UglError};
use crate::paths::{self, ensure_directories, safe_key};
use crate::session::{self, Session};
use crate::sink::OutputSink;
use crate::store::{self, RegistryDocument};
use crate::template::{self, ProvisionWarning};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct CreateOutcome {
    pub environment: Environment,
    pub backup_path: Option<PathBuf>,
    pub template_source: Option<PathBuf>,
    pub executable_present: bool,
    #[serde(serialize_with = "serialize_warnings")]
    pub warnings: Vec<ProvisionWarning>,
}

fn serialize_warnings<S: serde::Serializer>(
    warnings: &[ProvisionWarning],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_seq(warnings.iter().map(ToString::to_string))
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteOutcome {
    pub environment: Environment,
    pub backup_path: Option<PathBuf>,
    pub folder_deleted: bool,
    pub folder_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationOutcome {
    pub issues: Vec<PathIssue>,
    pub applied: bool,
    pub backup_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Launcher {
    config: LauncherConfig,
}

impl Launcher {
    /// Ensures the configuration, log and backup folders and the registry
    /// document exist.
    pub fn new(config: LauncherConfig) -> Result<Self> {
        ensure_directories(&[
            &config.config_root,
            &config.log_root,
            &config.json_backup_root,
        ])?;
        store::ensure_exists(&config.json_path)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &LauncherConfig {
        &self.config
    }

    fn load(&self) -> Result<RegistryDocument> {
        store::load(&self.config.json_path)
    }

    fn save(&self, document: &RegistryDocument) -> Result<Option<PathBuf>> {
        store::save(
            &self.config.json_path,
            &self.config.json_backup_root,
            document,
        )
    }

    pub fn list_environments(&self) -> Result<Vec<Environment>> {
        Ok(self.load()?.registry().into_vec())
    }

    pub fn find_environment(&self, name: &str) -> Result<Environment> {
        self.load()?
            .registry()
            .find(name)
            .cloned()
            .ok_or_else(|| UglError::NotFound(name.to_string()))
    }

    /// Folder a new environment called `name` would get.
    pub fn folder_for(&self, name: &str) -> PathBuf {
        self.config.clients_root.join(safe_key(name))
    }

    pub fn create_environment(
        &self,
        name: &str,
        admin: Option<String>,
        color: Option<String>,
    ) -> Result<CreateOutcome> {
        let name = name.trim();
        if name.is_empty() || safe_key(name).is_empty() {
            return Err(UglError::InvalidName(name.to_string()));
        }
        let mut document = self.load()?;
        let mut registry = document.registry();
        let path = self.folder_for(name);
        let path_text = path.to_string_lossy().to_string();
        if registry.conflicts_with(name, &path_text) {
            return Err(UglError::AlreadyExists(name.to_string()));
        }

        ensure_directories(&[&path])?;

        let tool = &self.config.tool;
        let mut warnings = Vec::new();
        let template_source = template::select_source(&self.config.template_path, &tool.executable);
        match &template_source {
            Some(source) => {
                info!(source = %source.display(), destination = %path.display(), "cloning template");
                if let Err(err) = template::clone_template(source, &path) {
                    warnings.push(ProvisionWarning::CopyFailure {
                        source: source.clone(),
                        reason: err.to_string(),
                    });
                }
            }
            None => warnings.push(ProvisionWarning::TemplateUnavailable {
                template_root: self.config.template_path.clone(),
                executable: tool.executable.clone(),
            }),
        }
        for warning in &warnings {
            warn!(environment = name, "{warning}");
        }

        let config_dir = session::ensure_tool_structure(&path, tool)?;
        session::remove_tokens(&config_dir, tool)?;

        let environment = Environment {
            name: name.to_string(),
            path: path_text,
            admin: admin.filter(|value| !value.trim().is_empty()),
            color: color.filter(|value| !value.trim().is_empty()),
        };
        registry.push(environment.clone());
        document.set_environments(registry.list());
        let backup_path = self.save(&document)?;
        info!(environment = name, path = %path.display(), "environment created");

        Ok(CreateOutcome {
            environment,
            backup_path,
            template_source,
            executable_present: path.join(&tool.executable).is_file(),
            warnings,
        })
    }

    /// Removes the record, then optionally the folder. A folder that cannot
    /// be removed is reported in the outcome; the record stays deleted.
    pub fn delete_environment(&self, name: &str, delete_folder: bool) -> Result<DeleteOutcome> {
        let mut document = self.load()?;
        let mut registry = document.registry();
        let index = registry
            .position(name)
            .ok_or_else(|| UglError::NotFound(name.to_string()))?;
        let environment = registry.remove(index);
        document.set_environments(registry.list());
        let backup_path = self.save(&document)?;
        info!(environment = %environment.name, "environment removed from registry");

        let mut folder_deleted = false;
        let mut folder_error = None;
        let folder = paths::resolve(&environment.path);
        if delete_folder && !environment.path.trim().is_empty() && folder.exists() {
            match fs::remove_dir_all(&folder) {
                Ok(()) => {
                    info!(folder = %folder.display(), "environment folder deleted");
                    folder_deleted = true;
                }
                Err(err) => {
                    warn!(folder = %folder.display(), error = %err, "failed to delete environment folder");
                    folder_error = Some(format!(
                        "error deleting folder {}: {err}",
                        folder.display()
                    ));
                }
            }
        }

        Ok(DeleteOutcome {
            environment,
            backup_path,
            folder_deleted,
            folder_error,
        })
    }

    pub fn validate_paths(&self, apply_changes: bool) -> Result<ValidationOutcome> {
        let mut document = self.load()?;
        let mut registry = document.registry();
        let issues = registry.sanitise_paths();

        let mut backup_path = None;
        let mut applied = false;
        if apply_changes && !issues.is_empty() {
            registry.apply_fixes(&issues);
            document.set_environments(registry.list());
            backup_path = self.save(&document)?;
            applied = true;
            info!(fixed = issues.len(), "registry paths sanitised");
        }

        Ok(ValidationOutcome {
            issues,
            applied,
            backup_path,
        })
    }

    pub fn prepare_session(&self, environment: &Environment) -> Result<Session> {
        session::prepare(environment, &self.config.tool)
    }

    pub fn run_command(
        &self,
        session: &Session,
        command_line: &str,
        sink: &mut dyn OutputSink,
    ) -> Result<i32> {
        session::route(session, command_line, sink)
    }
}
