//! Environment registry and session launcher for the GAM command-line tool.
//!
//! Each environment is a folder holding its own GAM configuration tree. The
//! registry is a JSON document rewritten in full on every change, with the
//! previous version copied aside first. Sessions run commands with the
//! environment's configuration directory exported, either through the bound
//! executable or the platform shell.

pub mod config;
pub mod environment;
pub mod error;
pub mod paths;
pub mod service;
pub mod session;
pub mod sink;
pub mod store;
pub mod tasks;
pub mod template;
pub mod tool;
pub mod web;

pub use config::{ConfigManager, LauncherConfig};
pub use environment::{Environment, PathIssue, Registry};
pub use error::{Result, UglError};
pub use service::{CreateOutcome, DeleteOutcome, Launcher, ValidationOutcome};
pub use session::Session;
pub use sink::{OutputSink, Transcript};
pub use tasks::{CommandTask, TaskManager, TaskStatus};
pub use tool::ToolBinding;
