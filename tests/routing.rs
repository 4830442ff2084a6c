#![cfg(unix)]

use serial_test::serial;
use std::env;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tempfile::{tempdir, TempDir};
use ugl::{Environment, Launcher, LauncherConfig, Session};

const STUB: &str = r#"#!/bin/sh
for arg in "$@"; do echo "arg=$arg"; done
echo "cwd=$(pwd -P)"
echo "cfg=$GAMCFGDIR"
echo "marker=$UGL_ROUTING_MARKER"
echo "to-stderr" >&2
echo "after-stderr"
exit 7
"#;

struct Fixture {
    _dir: TempDir,
    launcher: Launcher,
    environment: Environment,
}

fn write_stub(path: &Path) {
    fs::write(path, STUB).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

/// Environment provisioned from a template that carries a stub `gam`.
fn fixture() -> Fixture {
    let dir = tempdir().unwrap();
    let config = LauncherConfig::default_for(dir.path());
    let template = config.template_path.join("GAM7");
    fs::create_dir_all(&template).unwrap();
    write_stub(&template.join(&config.tool.executable));

    let launcher = Launcher::new(config).unwrap();
    let created = launcher.create_environment("Routing Env", None, None).unwrap();
    assert!(created.executable_present);
    assert!(created.warnings.is_empty());
    Fixture {
        _dir: dir,
        launcher,
        environment: created.environment,
    }
}

fn run(launcher: &Launcher, session: &Session, line: &str) -> (i32, Vec<String>) {
    let mut lines: Vec<String> = Vec::new();
    let code = launcher.run_command(session, line, &mut lines).unwrap();
    (code, lines)
}

#[test]
#[serial]
fn allow_listed_verb_runs_executable_in_environment_folder() {
    let fx = fixture();
    let session = fx.launcher.prepare_session(&fx.environment).unwrap();
    assert!(session.executable_available);

    let (code, lines) = run(&fx.launcher, &session, "user info someone@example.com");
    assert_eq!(code, 7);
    let canonical = fs::canonicalize(&session.resolved_path).unwrap();
    let canonical_cfg = fs::canonicalize(&session.config_dir).unwrap();
    assert_eq!(
        lines,
        vec![
            "arg=user".to_string(),
            "arg=info".to_string(),
            "arg=someone@example.com".to_string(),
            format!("cwd={}", canonical.display()),
            format!("cfg={}", session.config_dir.display()),
            "marker=".to_string(),
            "to-stderr".to_string(),
            "after-stderr".to_string(),
        ]
    );
    assert!(canonical_cfg.ends_with(".gam"));
}

#[test]
#[serial]
fn invocation_name_is_stripped_and_quotes_respected() {
    let fx = fixture();
    let session = fx.launcher.prepare_session(&fx.environment).unwrap();
    let (code, lines) = run(
        &fx.launcher,
        &session,
        "GAM print users query \"orgUnitPath='/Sales Team'\"",
    );
    assert_eq!(code, 7);
    assert_eq!(lines[0], "arg=print");
    assert_eq!(lines[1], "arg=users");
    assert_eq!(lines[2], "arg=query");
    assert_eq!(lines[3], "arg=orgUnitPath='/Sales Team'");
}

#[test]
#[serial]
fn shell_commands_inherit_process_environment() {
    let fx = fixture();
    env::set_var("UGL_ROUTING_MARKER", "inherited");
    let session = fx.launcher.prepare_session(&fx.environment);
    env::remove_var("UGL_ROUTING_MARKER");
    let session = session.unwrap();

    let (code, lines) = run(
        &fx.launcher,
        &session,
        "echo \"$UGL_ROUTING_MARKER\"; echo \"$GAMCFGDIR\"; pwd -P",
    );
    assert_eq!(code, 0);
    assert_eq!(
        lines,
        vec![
            "inherited".to_string(),
            session.config_dir.display().to_string(),
            fs::canonicalize(&session.resolved_path)
                .unwrap()
                .display()
                .to_string(),
        ]
    );
    // The launcher's own environment is untouched.
    assert_ne!(
        env::var_os("GAMCFGDIR").as_deref(),
        Some(session.config_dir.as_os_str())
    );
}

#[test]
#[serial]
fn shell_exit_codes_and_stderr_are_forwarded() {
    let fx = fixture();
    let session = fx.launcher.prepare_session(&fx.environment).unwrap();
    let (code, lines) = run(
        &fx.launcher,
        &session,
        "echo out; echo err 1>&2; echo out-again; exit 12",
    );
    assert_eq!(code, 12);
    assert_eq!(lines, vec!["out", "err", "out-again"]);
}

#[test]
#[serial]
fn tokens_are_cleared_on_each_activation() {
    let fx = fixture();
    let session = fx.launcher.prepare_session(&fx.environment).unwrap();
    let token = session.config_dir.join("oauth2.txt");
    fs::write(&token, "stale").unwrap();

    let again = fx.launcher.prepare_session(&fx.environment).unwrap();
    assert!(!token.exists());
    assert_eq!(again.config_dir, session.config_dir);
}

#[test]
#[serial]
fn bare_invocation_reports_missing_arguments() {
    let fx = fixture();
    let session = fx.launcher.prepare_session(&fx.environment).unwrap();
    let (code, lines) = run(&fx.launcher, &session, "gam");
    assert_eq!(code, 0);
    assert_eq!(lines, vec!["No gam command provided."]);
}
