//! Operator menu and the `GAM>` session prompt.

use crate::{print_create_outcome, print_issues, Context};
use dialoguer::console::style;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Select};
use std::io::{self, BufRead, Write};
use ugl::{Environment, Launcher, Transcript, UglError};

const PROMPT: &str = "GAM> ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionExit {
    Quit,
    /// Leave the session, optionally naming the environment to open next.
    Switch(Option<String>),
}

#[derive(Debug, PartialEq, Eq)]
enum SessionInput<'a> {
    Skip,
    Exit,
    Switch(Option<&'a str>),
    Route(&'a str),
}

fn parse_session_input(line: &str) -> SessionInput<'_> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return SessionInput::Skip;
    }
    let (head, rest) = trimmed
        .split_once(char::is_whitespace)
        .map_or((trimmed, ""), |(head, rest)| (head, rest.trim()));
    match head.to_lowercase().as_str() {
        "exit" | "quit" if rest.is_empty() => SessionInput::Exit,
        "switch" => SessionInput::Switch((!rest.is_empty()).then_some(rest)),
        _ => SessionInput::Route(trimmed),
    }
}

/// Runs one session against `environment` reading lines from stdin.
pub fn run_session(launcher: &Launcher, environment: &Environment) -> Result<SessionExit, UglError> {
    let session = launcher.prepare_session(environment)?;
    let mut transcript = Transcript::new(&launcher.config().log_root, true);
    let transcript_path = transcript.start_new()?;

    println!(
        "{} {}",
        style("Session:").bold(),
        style(&environment.name).cyan()
    );
    println!("  folder: {}", session.resolved_path.display());
    println!("  config: {}", session.config_dir.display());
    println!("  transcript: {}", transcript_path.display());
    if !session.executable_available {
        println!(
            "  {}",
            style(format!(
                "{} not found; only shell commands will run",
                session.executable_path.display()
            ))
            .yellow()
        );
    }
    println!("Type `exit` to quit or `switch [name]` to change environment.");

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("{PROMPT}");
        io::stdout().flush()?;
        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            println!();
            return Ok(SessionExit::Quit);
        }
        match parse_session_input(&line) {
            SessionInput::Skip => {}
            SessionInput::Exit => return Ok(SessionExit::Quit),
            SessionInput::Switch(target) => {
                return Ok(SessionExit::Switch(target.map(str::to_string)))
            }
            SessionInput::Route(command) => {
                match launcher.run_command(&session, command, &mut transcript) {
                    Ok(0) => {}
                    Ok(code) => eprintln!("{}", style(format!("exit code {code}")).dim()),
                    Err(err) => eprintln!("{err}"),
                }
            }
        }
    }
}

/// Runs sessions back to back while the operator switches to named
/// environments.
pub fn session_chain(launcher: &Launcher, first: Environment) -> Result<SessionExit, UglError> {
    let mut current = first;
    loop {
        match run_session(launcher, &current)? {
            SessionExit::Switch(Some(name)) => match launcher.find_environment(&name) {
                Ok(next) => current = next,
                Err(err) => {
                    eprintln!("{err}");
                    return Ok(SessionExit::Switch(None));
                }
            },
            other => return Ok(other),
        }
    }
}

pub fn run_menu(ctx: &Context) -> Result<(), UglError> {
    let theme = ColorfulTheme::default();
    loop {
        let launcher = ctx.launcher()?;
        let environments = launcher.list_environments()?;
        let mut items: Vec<String> = environments
            .iter()
            .enumerate()
            .map(|(index, env)| match &env.admin {
                Some(admin) => format!("{}. {} ({admin})", index + 1, env.name),
                None => format!("{}. {}", index + 1, env.name),
            })
            .collect();
        items.extend(
            ["Create environment", "Delete environment", "Validate paths", "Quit"]
                .iter()
                .map(|item| item.to_string()),
        );

        let choice = Select::with_theme(&theme)
            .with_prompt("Select an environment or action")
            .items(&items)
            .default(0)
            .interact()?;

        if let Some(env) = environments.get(choice) {
            match session_chain(&launcher, env.clone()) {
                Ok(SessionExit::Quit) => return Ok(()),
                Ok(SessionExit::Switch(_)) => {}
                Err(err @ UglError::PathMissing(_)) => eprintln!("{err}"),
                Err(err) => return Err(err),
            }
            continue;
        }
        let result = match choice - environments.len() {
            0 => menu_create(&launcher, &theme),
            1 => menu_delete(&launcher, &environments, &theme),
            2 => menu_validate(&launcher, &theme),
            _ => return Ok(()),
        };
        // Keep the menu alive after operation failures; prompt failures end it.
        match result {
            Err(err @ UglError::Prompt(_)) => return Err(err),
            Err(err) => eprintln!("{}", style(err).red()),
            Ok(()) => {}
        }
    }
}

fn optional(value: String) -> Option<String> {
    let value = value.trim().to_string();
    (!value.is_empty()).then_some(value)
}

fn menu_create(launcher: &Launcher, theme: &ColorfulTheme) -> Result<(), UglError> {
    let name: String = Input::with_theme(theme)
        .with_prompt("Environment name")
        .interact_text()?;
    let admin: String = Input::with_theme(theme)
        .with_prompt("Admin email (optional)")
        .allow_empty(true)
        .interact_text()?;
    let color: String = Input::with_theme(theme)
        .with_prompt("Colour (optional)")
        .allow_empty(true)
        .interact_text()?;
    let outcome = launcher.create_environment(&name, optional(admin), optional(color))?;
    print_create_outcome(&outcome);
    Ok(())
}

fn menu_delete(
    launcher: &Launcher,
    environments: &[Environment],
    theme: &ColorfulTheme,
) -> Result<(), UglError> {
    if environments.is_empty() {
        println!("No environments registered.");
        return Ok(());
    }
    let names: Vec<&str> = environments.iter().map(|env| env.name.as_str()).collect();
    let choice = Select::with_theme(theme)
        .with_prompt("Environment to delete")
        .items(&names)
        .default(0)
        .interact()?;
    let environment = &environments[choice];
    let delete_folder = Confirm::with_theme(theme)
        .with_prompt(format!("Also delete the folder {}?", environment.path))
        .default(false)
        .interact()?;
    let typed: String = Input::with_theme(theme)
        .with_prompt(format!("Type '{}' to confirm", environment.name))
        .allow_empty(true)
        .interact_text()?;
    if typed.trim() != environment.name {
        println!("Cancelled.");
        return Ok(());
    }
    let outcome = launcher.delete_environment(&environment.name, delete_folder)?;
    println!("Deleted environment '{}'", outcome.environment.name);
    if let Some(err) = outcome.folder_error {
        println!("  warning: {err}");
    }
    Ok(())
}

fn menu_validate(launcher: &Launcher, theme: &ColorfulTheme) -> Result<(), UglError> {
    let report = launcher.validate_paths(false)?;
    if report.issues.is_empty() {
        println!("All environment paths are clean.");
        return Ok(());
    }
    println!("{} path issue(s):", report.issues.len());
    print_issues(&report.issues);
    let apply = Confirm::with_theme(theme)
        .with_prompt("Rewrite these paths?")
        .default(true)
        .interact()?;
    if apply {
        let applied = launcher.validate_paths(true)?;
        println!("Fixed {} path(s).", applied.issues.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_keywords() {
        assert_eq!(parse_session_input("   "), SessionInput::Skip);
        assert_eq!(parse_session_input("exit\n"), SessionInput::Exit);
        assert_eq!(parse_session_input("  QUIT "), SessionInput::Exit);
        assert_eq!(parse_session_input("switch"), SessionInput::Switch(None));
        assert_eq!(
            parse_session_input("Switch  Other Env \n"),
            SessionInput::Switch(Some("Other Env"))
        );
    }

    #[test]
    fn other_lines_are_routed_verbatim() {
        assert_eq!(
            parse_session_input("  user info a@example.com\n"),
            SessionInput::Route("user info a@example.com")
        );
        assert_eq!(
            parse_session_input("exit 3"),
            SessionInput::Route("exit 3")
        );
        assert_eq!(parse_session_input("exiting"), SessionInput::Route("exiting"));
    }
}
