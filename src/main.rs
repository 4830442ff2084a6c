use clap::{ArgAction, Parser, Subcommand};
use dialoguer::theme::ColorfulTheme;
use dialoguer::Confirm;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::env;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use ugl::config::resolve_config_root;
use ugl::environment::PathIssue;
use ugl::{
    template, web, ConfigManager, CreateOutcome, Launcher, LauncherConfig, OutputSink, Transcript,
    UglError, ValidationOutcome,
};

mod interactive;

const LOG_ENV: &str = "UGL_LOG";
const DEFAULT_BIND: &str = "127.0.0.1:8765";

#[derive(Parser, Debug)]
#[command(name = "ugl", version, about = "GAM environment launcher")]
struct Cli {
    #[arg(long, global = true)]
    config_root: Option<PathBuf>,
    #[arg(long, global = true)]
    json: bool,
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List registered environments.
    List,
    /// Register a new environment and provision its folder.
    Create {
        name: String,
        #[arg(long)]
        admin: Option<String>,
        #[arg(long)]
        color: Option<String>,
    },
    /// Remove an environment from the registry.
    Delete {
        name: String,
        #[arg(long, default_value_t = false)]
        delete_folder: bool,
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
    /// Report (and optionally fix) unnormalised environment paths.
    Validate {
        #[arg(long, default_value_t = false)]
        apply: bool,
    },
    /// Run one command line inside an environment.
    Exec {
        environment: String,
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Open an interactive session for an environment.
    Session { environment: String },
    /// Interactive environment menu.
    Menu,
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Readiness checks for the registry, template and environments.
    Doctor,
    /// Serve the task HTTP API.
    Serve {
        #[arg(long, default_value = DEFAULT_BIND)]
        bind: String,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    Show,
    /// Set overrides; an empty value clears one.
    Set {
        #[arg(long)]
        template_path: Option<String>,
        #[arg(long)]
        clients_root: Option<String>,
        #[arg(long)]
        log_root: Option<String>,
        #[arg(long)]
        json_path: Option<String>,
        #[arg(long)]
        backup_root: Option<String>,
        #[arg(long)]
        tool_executable: Option<String>,
    },
}

#[derive(Debug, Serialize)]
struct JsonResult<T: Serialize> {
    ok: bool,
    result: Option<T>,
    error: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct Context {
    config: ConfigManager,
    json: bool,
}

impl Context {
    pub(crate) fn launcher(&self) -> Result<Launcher, UglError> {
        Launcher::new(self.config.load())
    }
}

#[derive(Debug, Clone, Serialize)]
struct DoctorCheck {
    id: String,
    ok: bool,
    severity: String,
    message: String,
    remediation: String,
}

fn main() -> Result<(), UglError> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let ctx = build_context(&cli);

    let result = match cli.command {
        Some(Commands::List) => handle_list(&ctx),
        Some(Commands::Create { name, admin, color }) => handle_create(&ctx, &name, admin, color),
        Some(Commands::Delete {
            name,
            delete_folder,
            yes,
        }) => handle_delete(&ctx, &name, delete_folder, yes),
        Some(Commands::Validate { apply }) => handle_validate(&ctx, apply),
        Some(Commands::Exec {
            environment,
            command,
        }) => handle_exec(&ctx, &environment, &command),
        Some(Commands::Session { environment }) => handle_session(&ctx, &environment),
        Some(Commands::Menu) => handle_menu(&ctx),
        Some(Commands::Config { command }) => handle_config(&ctx, command),
        Some(Commands::Doctor) => handle_doctor(&ctx),
        Some(Commands::Serve { bind }) => handle_serve(&ctx, &bind),
        None => {
            if io::stdin().is_terminal() && !ctx.json {
                handle_menu(&ctx)
            } else {
                Err(UglError::Process(
                    "no command given; run `ugl --help` for usage".to_string(),
                ))
            }
        }
    };

    if let Err(err) = result {
        if ctx.json {
            let payload = JsonResult::<serde_json::Value> {
                ok: false,
                result: None,
                error: Some(err.to_string()),
            };
            print_json(&payload)?;
        } else {
            eprintln!("{err}");
        }
        std::process::exit(1);
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = env::var(LOG_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| format!("ugl={level}"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn build_context(cli: &Cli) -> Context {
    let config_root = resolve_config_root(cli.config_root.as_deref());
    Context {
        config: ConfigManager::new(config_root),
        json: cli.json,
    }
}

fn handle_list(ctx: &Context) -> Result<(), UglError> {
    let environments = ctx.launcher()?.list_environments()?;
    if ctx.json {
        let items: Vec<serde_json::Value> = environments
            .iter()
            .map(|env| {
                json!({
                    "name": env.name,
                    "path": env.path,
                    "normalised_path": env.normalised_path(),
                    "admin": env.admin,
                    "color": env.color,
                })
            })
            .collect();
        return output(ctx, json!({ "environments": items }));
    }
    if environments.is_empty() {
        println!("No environments registered.");
        return Ok(());
    }
    for (index, env) in environments.iter().enumerate() {
        let mut line = format!("{:>3}. {}  {}", index + 1, env.name, env.normalised_path());
        if let Some(admin) = &env.admin {
            line.push_str(&format!("  [{admin}]"));
        }
        println!("{line}");
    }
    Ok(())
}

fn handle_create(
    ctx: &Context,
    name: &str,
    admin: Option<String>,
    color: Option<String>,
) -> Result<(), UglError> {
    let outcome = ctx.launcher()?.create_environment(name, admin, color)?;
    if ctx.json {
        return output(ctx, serde_json::to_value(&outcome)?);
    }
    print_create_outcome(&outcome);
    Ok(())
}

pub(crate) fn print_create_outcome(outcome: &CreateOutcome) {
    println!(
        "Created environment '{}' at {}",
        outcome.environment.name, outcome.environment.path
    );
    if let Some(source) = &outcome.template_source {
        println!("  template: {}", source.display());
    }
    for warning in &outcome.warnings {
        println!("  warning: {warning}");
    }
    if !outcome.executable_present {
        println!("  note: the GAM executable is not present in the new folder");
    }
    if let Some(backup) = &outcome.backup_path {
        println!("  registry backup: {}", backup.display());
    }
}

fn handle_delete(ctx: &Context, name: &str, delete_folder: bool, yes: bool) -> Result<(), UglError> {
    let launcher = ctx.launcher()?;
    let environment = launcher.find_environment(name)?;
    if !yes {
        if ctx.json || !io::stdin().is_terminal() {
            return Err(UglError::Process(
                "delete requires confirmation; re-run with --yes for non-interactive mode"
                    .to_string(),
            ));
        }
        let prompt = if delete_folder {
            format!(
                "Delete environment '{}' and its folder {}?",
                environment.name, environment.path
            )
        } else {
            format!("Delete environment '{}'?", environment.name)
        };
        let confirmed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .default(false)
            .interact()?;
        if !confirmed {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let outcome = launcher.delete_environment(&environment.name, delete_folder)?;
    if ctx.json {
        return output(ctx, serde_json::to_value(&outcome)?);
    }
    println!("Deleted environment '{}'", outcome.environment.name);
    if outcome.folder_deleted {
        println!("  folder removed: {}", outcome.environment.path);
    }
    if let Some(err) = &outcome.folder_error {
        println!("  warning: {err}");
    }
    if let Some(backup) = &outcome.backup_path {
        println!("  registry backup: {}", backup.display());
    }
    Ok(())
}

fn handle_validate(ctx: &Context, apply: bool) -> Result<(), UglError> {
    let outcome = ctx.launcher()?.validate_paths(apply)?;
    if ctx.json {
        return output(ctx, serde_json::to_value(&outcome)?);
    }
    print_validation(&outcome);
    Ok(())
}

pub(crate) fn print_issues(issues: &[PathIssue]) {
    for issue in issues {
        println!("  {}: {} -> {}", issue.name, issue.original, issue.normalised);
    }
}

pub(crate) fn print_validation(outcome: &ValidationOutcome) {
    if outcome.issues.is_empty() {
        println!("All environment paths are clean.");
        return;
    }
    println!("{} path issue(s):", outcome.issues.len());
    print_issues(&outcome.issues);
    if outcome.applied {
        println!("Applied fixes.");
        if let Some(backup) = &outcome.backup_path {
            println!("  registry backup: {}", backup.display());
        }
    } else {
        println!("Re-run with --apply to rewrite them.");
    }
}

/// Console/transcript sink that also keeps the lines for a JSON report.
struct CapturingSink<'a> {
    transcript: &'a mut Transcript,
    lines: Vec<String>,
}

impl OutputSink for CapturingSink<'_> {
    fn line(&mut self, line: &str) {
        self.transcript.line(line);
        self.lines.push(line.to_string());
    }
}

/// A single argument is taken as a complete command line; several are
/// re-joined with shell quoting.
fn join_command(parts: &[String]) -> String {
    match parts {
        [single] => single.clone(),
        _ => shell_words::join(parts),
    }
}

fn handle_exec(ctx: &Context, environment: &str, command: &[String]) -> Result<(), UglError> {
    let launcher = ctx.launcher()?;
    let env = launcher.find_environment(environment)?;
    let session = launcher.prepare_session(&env)?;
    let line = join_command(command);

    let mut transcript = Transcript::new(&launcher.config().log_root, !ctx.json);
    let transcript_path = transcript.start_new()?;
    let mut sink = CapturingSink {
        transcript: &mut transcript,
        lines: Vec::new(),
    };
    let code = launcher.run_command(&session, &line, &mut sink)?;

    if ctx.json {
        output(
            ctx,
            json!({
                "environment": env.name,
                "command": line,
                "exit_code": code,
                "output": sink.lines,
                "transcript": transcript_path,
            }),
        )?;
    }
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

fn require_interactive(ctx: &Context, what: &str) -> Result<(), UglError> {
    if ctx.json {
        return Err(UglError::Process(format!("--json is not supported for {what}")));
    }
    Ok(())
}

fn handle_session(ctx: &Context, environment: &str) -> Result<(), UglError> {
    require_interactive(ctx, "interactive sessions")?;
    let launcher = ctx.launcher()?;
    let env = launcher.find_environment(environment)?;
    match interactive::session_chain(&launcher, env)? {
        interactive::SessionExit::Switch(None) if io::stdin().is_terminal() => {
            interactive::run_menu(ctx)
        }
        _ => Ok(()),
    }
}

fn handle_menu(ctx: &Context) -> Result<(), UglError> {
    require_interactive(ctx, "the menu")?;
    if !io::stdin().is_terminal() {
        return Err(UglError::Process("the menu requires a TTY".to_string()));
    }
    interactive::run_menu(ctx)
}

fn handle_config(ctx: &Context, command: ConfigCommand) -> Result<(), UglError> {
    match command {
        ConfigCommand::Show => {
            let cfg = ctx.config.load();
            if ctx.json {
                return output(ctx, config_payload(ctx, &cfg));
            }
            print_config(ctx, &cfg);
            Ok(())
        }
        ConfigCommand::Set {
            template_path,
            clients_root,
            log_root,
            json_path,
            backup_root,
            tool_executable,
        } => {
            let mut updates = BTreeMap::new();
            for (key, value) in [
                ("template_path", template_path),
                ("clients_root", clients_root),
                ("log_root", log_root),
                ("json_path", json_path),
                ("json_backup_root", backup_root),
                ("tool_executable", tool_executable),
            ] {
                if let Some(value) = value {
                    updates.insert(key.to_string(), value);
                }
            }
            if updates.is_empty() {
                return Err(UglError::Config(
                    "nothing to set; pass at least one override flag".to_string(),
                ));
            }
            let cfg = ctx.config.update_overrides(&updates)?;
            if ctx.json {
                return output(ctx, config_payload(ctx, &cfg));
            }
            println!("Saved {}", ctx.config.override_path().display());
            print_config(ctx, &cfg);
            Ok(())
        }
    }
}

fn config_payload(ctx: &Context, cfg: &LauncherConfig) -> serde_json::Value {
    json!({
        "config": cfg,
        "override_path": ctx.config.override_path(),
        "overrides": ctx.config.read_overrides(),
    })
}

fn print_config(ctx: &Context, cfg: &LauncherConfig) {
    println!("config_root: {}", cfg.config_root.display());
    println!("json_path: {}", cfg.json_path.display());
    println!("log_root: {}", cfg.log_root.display());
    println!("template_path: {}", cfg.template_path.display());
    println!("json_backup_root: {}", cfg.json_backup_root.display());
    println!("clients_root: {}", cfg.clients_root.display());
    println!("tool_executable: {}", cfg.tool.executable);
    println!("overrides: {}", ctx.config.override_path().display());
}

fn doctor_check(id: &str, ok: bool, severity: &str, message: String, remediation: &str) -> DoctorCheck {
    DoctorCheck {
        id: id.to_string(),
        ok,
        severity: severity.to_string(),
        message,
        remediation: remediation.to_string(),
    }
}

fn collect_doctor_checks(ctx: &Context) -> Result<Vec<DoctorCheck>, UglError> {
    let launcher = ctx.launcher()?;
    let cfg = launcher.config();
    let mut checks = Vec::new();

    let environments = match launcher.list_environments() {
        Ok(environments) => {
            checks.push(doctor_check(
                "registry",
                true,
                "error",
                format!(
                    "registry {} loads ({} environments)",
                    cfg.json_path.display(),
                    environments.len()
                ),
                "",
            ));
            environments
        }
        Err(err) => {
            checks.push(doctor_check(
                "registry",
                false,
                "error",
                err.to_string(),
                "fix the JSON syntax or restore a copy from the backup folder",
            ));
            Vec::new()
        }
    };

    let source = template::select_source(&cfg.template_path, &cfg.tool.executable);
    checks.push(doctor_check(
        "template",
        source.is_some(),
        "warning",
        match &source {
            Some(path) => format!("template source {}", path.display()),
            None => format!(
                "no {} found in {} or its subfolders",
                cfg.tool.executable,
                cfg.template_path.display()
            ),
        },
        "place a GAM install under the template folder or run `ugl config set --template-path`",
    ));

    let shell = ugl::session::shell_program();
    checks.push(doctor_check(
        "shell",
        shell.is_some(),
        "error",
        match &shell {
            Some(path) => format!("shell {}", path.display()),
            None => "no command shell found on PATH".to_string(),
        },
        "install a POSIX shell (or cmd.exe on Windows) and make it reachable on PATH",
    ));

    for env in &environments {
        let session_root = ugl::paths::resolve(&env.path);
        let folder_ok = session_root.is_dir();
        checks.push(doctor_check(
            &format!("environment:{}:folder", env.name),
            folder_ok,
            "error",
            format!("{} -> {}", env.name, session_root.display()),
            "recreate the folder or delete the environment",
        ));
        if folder_ok {
            let executable = session_root.join(&cfg.tool.executable);
            checks.push(doctor_check(
                &format!("environment:{}:executable", env.name),
                executable.is_file(),
                "warning",
                format!("{} executable {}", env.name, executable.display()),
                "copy the GAM executable into the environment folder",
            ));
        }
    }
    Ok(checks)
}

fn handle_doctor(ctx: &Context) -> Result<(), UglError> {
    let checks = collect_doctor_checks(ctx)?;
    let primary_error = checks
        .iter()
        .find(|check| !check.ok && check.severity == "error")
        .map(|check| check.message.clone());
    let ok = primary_error.is_none();

    if ctx.json {
        let payload = JsonResult {
            ok,
            result: Some(json!({ "checks": checks })),
            error: primary_error,
        };
        print_json(&payload)?;
        if !ok {
            std::process::exit(1);
        }
        return Ok(());
    }

    for check in &checks {
        let state = if check.ok { "ok" } else { "fail" };
        println!(
            "[{}] {} ({}) - {}",
            state, check.id, check.severity, check.message
        );
        if !check.ok {
            println!("  remediation: {}", check.remediation);
        }
    }
    match primary_error {
        None => Ok(()),
        Some(message) => Err(UglError::Process(message)),
    }
}

fn handle_serve(ctx: &Context, bind: &str) -> Result<(), UglError> {
    // Fail fast on an unreadable registry before accepting connections.
    ctx.launcher()?.list_environments()?;
    web::serve(bind, ctx.config.clone())
}

fn output(ctx: &Context, payload: serde_json::Value) -> Result<(), UglError> {
    if ctx.json {
        let wrapper = JsonResult {
            ok: true,
            result: Some(payload),
            error: None,
        };
        print_json(&wrapper)?;
    } else {
        println!("{}", payload);
    }
    Ok(())
}

fn print_json<T: Serialize>(payload: &T) -> Result<(), UglError> {
    let text = serde_json::to_string_pretty(payload)?;
    println!("{}", text);
    Ok(())
}
