//! Session preparation and command routing.
//!
//! A [`Session`] binds one environment folder to the tool's configuration
//! directory and an explicit process environment. Routed commands run with
//! that environment and the folder as working directory; the launcher's own
//! process environment is never modified.

use crate::environment::Environment;
use crate::error::{Result, UglError};
use crate::paths::{self, ensure_directories};
use crate::sink::OutputSink;
use crate::tool::{is_tool_verb, ToolBinding};
use std::collections::BTreeMap;
use std::env;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct Session {
    pub environment: Environment,
    pub resolved_path: PathBuf,
    pub config_dir: PathBuf,
    pub executable_path: PathBuf,
    pub executable_available: bool,
    pub process_environment: BTreeMap<OsString, OsString>,
    pub tool: ToolBinding,
}

/// Resolves the environment folder and readies it for routed commands.
///
/// Fails with [`UglError::PathMissing`] when the folder is gone. Otherwise
/// the tool's configuration tree is created, stale OAuth tokens inside it are
/// deleted, and the executable is probed.
pub fn prepare(environment: &Environment, tool: &ToolBinding) -> Result<Session> {
    let resolved_path = paths::resolve(&environment.path);
    if !resolved_path.is_dir() {
        return Err(UglError::PathMissing(resolved_path));
    }

    let config_dir = ensure_tool_structure(&resolved_path, tool)?;
    remove_tokens(&config_dir, tool)?;

    let executable_path = resolved_path.join(&tool.executable);
    let executable_available = executable_path.is_file();

    let mut process_environment: BTreeMap<OsString, OsString> = env::vars_os().collect();
    process_environment.insert(
        OsString::from(&tool.config_env_var),
        config_dir.clone().into_os_string(),
    );

    info!(
        environment = %environment.name,
        path = %resolved_path.display(),
        executable_available,
        "session prepared"
    );
    Ok(Session {
        environment: environment.clone(),
        resolved_path,
        config_dir,
        executable_path,
        executable_available,
        process_environment,
        tool: tool.clone(),
    })
}

/// Creates `<base>/<config_dir>` and its cache folders, returning the
/// configuration directory.
pub fn ensure_tool_structure(base: &Path, tool: &ToolBinding) -> Result<PathBuf> {
    let config_dir = base.join(&tool.config_dir);
    let mut dirs = vec![config_dir.clone()];
    dirs.extend(tool.cache_dirs.iter().map(|name| config_dir.join(name)));
    ensure_directories(&dirs)?;
    Ok(config_dir)
}

/// Deletes OAuth token files so credentials never carry across environments.
pub fn remove_tokens(config_dir: &Path, tool: &ToolBinding) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for name in &tool.token_files {
        let token = config_dir.join(name);
        if token.exists() {
            fs::remove_file(&token).map_err(|err| UglError::fs("remove token", &token, err))?;
            info!(token = %token.display(), "removed stale token");
            removed.push(token);
        }
    }
    Ok(removed)
}

/// Where a command line goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Nothing to run.
    Empty,
    /// The invocation name alone, with no tool arguments.
    MissingToolArgs,
    /// Arguments for the bound executable.
    Tool(Vec<String>),
    /// The original line, for the general shell.
    Shell,
}

pub fn classify(command_line: &str, tool: &ToolBinding) -> Result<Dispatch> {
    let mut args =
        shell_words::split(command_line).map_err(|err| UglError::CommandParse(err.to_string()))?;
    let Some(first) = args.first() else {
        return Ok(Dispatch::Empty);
    };
    let root = first.to_lowercase();
    if root == tool.invocation {
        args.remove(0);
        if args.is_empty() {
            return Ok(Dispatch::MissingToolArgs);
        }
        return Ok(Dispatch::Tool(args));
    }
    if is_tool_verb(&root) {
        return Ok(Dispatch::Tool(args));
    }
    Ok(Dispatch::Shell)
}

/// Runs `command_line` in the session and returns the child's exit code.
///
/// Combined stdout/stderr is forwarded to `sink` line by line, in the order
/// the child wrote it, before this returns.
pub fn route(session: &Session, command_line: &str, sink: &mut dyn OutputSink) -> Result<i32> {
    let dispatch = classify(command_line, &session.tool)?;
    debug!(?dispatch, command = command_line, "routing command");
    match dispatch {
        Dispatch::Empty => Ok(0),
        Dispatch::MissingToolArgs => {
            sink.line(&format!("No {} command provided.", session.tool.invocation));
            Ok(0)
        }
        Dispatch::Tool(args) => {
            if !session.executable_available {
                sink.line(&format!(
                    "{} is not available for this environment.",
                    session.tool.executable
                ));
                return Ok(1);
            }
            let mut command = Command::new(&session.executable_path);
            command.args(&args);
            run_streaming(command, session, sink)
        }
        Dispatch::Shell => run_streaming(shell_command(command_line), session, sink),
    }
}

#[cfg(windows)]
fn shell_command(command_line: &str) -> Command {
    use std::os::windows::process::CommandExt;
    let shell = env::var_os("ComSpec")
        .map(PathBuf::from)
        .or_else(|| which::which("cmd").ok())
        .unwrap_or_else(|| PathBuf::from("cmd.exe"));
    let mut command = Command::new(shell);
    command.arg("/C").raw_arg(command_line);
    command
}

#[cfg(not(windows))]
fn shell_command(command_line: &str) -> Command {
    let shell = which::which("sh").unwrap_or_else(|_| PathBuf::from("/bin/sh"));
    let mut command = Command::new(shell);
    command.arg("-c").arg(command_line);
    command
}

/// The general shell used for non-tool commands, if it can be found.
pub fn shell_program() -> Option<PathBuf> {
    let program = shell_command("").get_program().to_os_string();
    let path = PathBuf::from(&program);
    if path.is_absolute() {
        return path.is_file().then_some(path);
    }
    which::which(program).ok()
}

fn run_streaming(mut command: Command, session: &Session, sink: &mut dyn OutputSink) -> Result<i32> {
    let program = command.get_program().to_string_lossy().to_string();
    let (reader, writer) = io::pipe()?;
    let writer_err = writer.try_clone()?;
    command
        .current_dir(&session.resolved_path)
        .env_clear()
        .envs(
            session
                .process_environment
                .iter()
                .map(|(k, v)| (k.as_os_str(), v.as_os_str())),
        )
        .stdin(Stdio::inherit())
        .stdout(writer)
        .stderr(writer_err);

    info!(program = %program, cwd = %session.resolved_path.display(), "spawning");
    let mut child = command
        .spawn()
        .map_err(|source| UglError::Spawn {
            program: program.clone(),
            source,
        })?;
    // The pipe only reaches EOF once every write end is closed, including the
    // copies held by `command`.
    drop(command);

    let forwarded = forward_lines(reader, sink);
    let status = child.wait()?;
    forwarded?;
    let code = status.code().unwrap_or(if status.success() { 0 } else { 1 });
    debug!(program = %program, code, "child exited");
    Ok(code)
}

fn forward_lines<R: Read>(reader: R, sink: &mut dyn OutputSink) -> io::Result<()> {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(());
        }
        let line = String::from_utf8_lossy(&buf);
        sink.line(line.trim_end());
    }
}

impl Session {
    pub fn env_var(&self, key: &str) -> Option<&OsStr> {
        self.process_environment
            .get(OsStr::new(key))
            .map(OsString::as_os_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn tool() -> ToolBinding {
        ToolBinding::default()
    }

    #[test]
    fn classify_blank_lines() {
        assert_eq!(classify("", &tool()).unwrap(), Dispatch::Empty);
        assert_eq!(classify("   \t ", &tool()).unwrap(), Dispatch::Empty);
    }

    #[test]
    fn classify_strips_invocation_name() {
        assert_eq!(
            classify("GAM info domain", &tool()).unwrap(),
            Dispatch::Tool(vec!["info".to_string(), "domain".to_string()])
        );
        assert_eq!(classify("gam", &tool()).unwrap(), Dispatch::MissingToolArgs);
        assert_eq!(classify("  gam  ", &tool()).unwrap(), Dispatch::MissingToolArgs);
    }

    #[test]
    fn classify_allow_listed_verbs_keep_first_token() {
        assert_eq!(
            classify("user info someone@example.com", &tool()).unwrap(),
            Dispatch::Tool(vec![
                "user".to_string(),
                "info".to_string(),
                "someone@example.com".to_string()
            ])
        );
        assert_eq!(
            classify("Users 'print' \"with space\"", &tool()).unwrap(),
            Dispatch::Tool(vec![
                "Users".to_string(),
                "print".to_string(),
                "with space".to_string()
            ])
        );
    }

    #[test]
    fn classify_everything_else_goes_to_shell() {
        assert_eq!(classify("echo hello", &tool()).unwrap(), Dispatch::Shell);
        assert_eq!(classify("dir /b", &tool()).unwrap(), Dispatch::Shell);
    }

    #[test]
    fn classify_rejects_unbalanced_quotes() {
        assert!(matches!(
            classify("echo \"unterminated", &tool()),
            Err(UglError::CommandParse(_))
        ));
    }

    #[test]
    fn prepare_fails_for_missing_folder() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("gone");
        let env = Environment::new("Gone", missing.to_string_lossy());
        match prepare(&env, &tool()) {
            Err(UglError::PathMissing(path)) => assert_eq!(path, missing),
            other => panic!("expected PathMissing, got {other:?}"),
        }
    }

    #[test]
    fn prepare_builds_structure_and_clears_tokens() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("Env");
        let config_dir = root.join(".gam");
        fs::create_dir_all(&config_dir).unwrap();
        fs::write(config_dir.join("oauth2.txt"), "secret").unwrap();
        fs::write(config_dir.join("oauth2service.json"), "{}").unwrap();
        fs::write(config_dir.join("gam.cfg"), "keep").unwrap();

        let env = Environment::new("Env", format!("  \"{}\"  ", root.display()));
        let session = prepare(&env, &tool()).unwrap();

        assert_eq!(session.resolved_path, root);
        assert_eq!(session.config_dir, config_dir);
        assert!(config_dir.join("gamcache").is_dir());
        assert!(config_dir.join("drive").is_dir());
        assert!(!config_dir.join("oauth2.txt").exists());
        assert!(!config_dir.join("oauth2service.json").exists());
        assert!(config_dir.join("gam.cfg").exists());
        assert!(!session.executable_available);
        assert_eq!(
            session.env_var("GAMCFGDIR"),
            Some(config_dir.as_os_str())
        );
        assert_ne!(
            env::var_os("GAMCFGDIR").as_deref(),
            Some(config_dir.as_os_str())
        );
    }

    #[test]
    fn route_empty_line_spawns_nothing() {
        let dir = tempdir().unwrap();
        let env = Environment::new("E", dir.path().to_string_lossy());
        let session = prepare(&env, &tool()).unwrap();
        let mut lines: Vec<String> = Vec::new();
        assert_eq!(route(&session, "   ", &mut lines).unwrap(), 0);
        assert!(lines.is_empty());
    }

    #[test]
    fn route_reports_missing_executable() {
        let dir = tempdir().unwrap();
        let env = Environment::new("E", dir.path().to_string_lossy());
        let session = prepare(&env, &tool()).unwrap();
        let mut lines: Vec<String> = Vec::new();
        assert_eq!(route(&session, "user info a@b.c", &mut lines).unwrap(), 1);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("is not available"));

        lines.clear();
        assert_eq!(route(&session, "gam", &mut lines).unwrap(), 0);
        assert_eq!(lines, vec!["No gam command provided."]);
    }

    #[test]
    fn forward_lines_strips_trailing_whitespace() {
        let mut lines: Vec<String> = Vec::new();
        forward_lines(&b"alpha  \r\nbeta\n\ngamma"[..], &mut lines).unwrap();
        assert_eq!(lines, vec!["alpha", "beta", "", "gamma"]);
    }
}
