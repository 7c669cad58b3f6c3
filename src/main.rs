//! Guardify - Command Line Entry Point
//!
//! Loads settings through the full precedence chain and either validates them
//! (`check`) or runs a scripted session against the mock host (`simulate`).

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use guardify::{
    config::{CliArgs, GuardifySettings},
    input::InterceptedEvent,
    simulate::{demo_script, parse_script, Simulation},
    NAME, VERSION,
};

/// ANSI color codes for terminal output
mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
}

/// Print configuration summary
fn print_config_summary(settings: &GuardifySettings) {
    let on_off = |enabled: bool| {
        if enabled {
            format!("{green}blocked{reset}", green = colors::GREEN, reset = colors::RESET)
        } else {
            format!("{yellow}allowed{reset}", yellow = colors::YELLOW, reset = colors::RESET)
        }
    };

    println!(
        "{bold}{blue}Configuration:{reset}",
        bold = colors::BOLD,
        blue = colors::BLUE,
        reset = colors::RESET
    );
    for event in InterceptedEvent::ALL {
        println!(
            "  {dim}{:<14}{reset} {}",
            event.name(),
            on_off(settings.is_blocked(event)),
            dim = colors::DIM,
            reset = colors::RESET
        );
    }
    let keys: Vec<&str> = settings.disable_keys.iter().map(|k| k.name()).collect();
    println!(
        "  {dim}{:<14}{reset} {}",
        "keys",
        if keys.is_empty() { "-".to_string() } else { keys.join(", ") },
        dim = colors::DIM,
        reset = colors::RESET
    );
    println!(
        "  {dim}{:<14}{reset} {}",
        "devtools",
        if settings.detect_devtools {
            format!(
                "every {}ms, action {}",
                settings.devtools_interval_ms, settings.devtools_action
            )
        } else {
            "disabled".to_string()
        },
        dim = colors::DIM,
        reset = colors::RESET
    );
    println!(
        "  {dim}{:<14}{reset} {}ms",
        "throttle",
        settings.throttle_ms,
        dim = colors::DIM,
        reset = colors::RESET
    );
    if !settings.exclude_selectors.is_empty() {
        println!(
            "  {dim}{:<14}{reset} {}",
            "excluded",
            settings.exclude_selectors.join(" | "),
            dim = colors::DIM,
            reset = colors::RESET
        );
    }
    println!();
}

/// Build the CLI command parser
fn build_cli() -> Command {
    Command::new(NAME)
        .version(VERSION)
        .about("Interaction-restriction engine with devtools detection")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Path to configuration file (TOML or JSON)")
                .value_parser(clap::value_parser!(PathBuf))
                .global(true),
        )
        .arg(
            Arg::new("interval")
                .long("interval")
                .value_name("MS")
                .help("DevTools polling interval in milliseconds (minimum 100)")
                .value_parser(clap::value_parser!(u64))
                .global(true),
        )
        .arg(
            Arg::new("throttle")
                .long("throttle")
                .value_name("MS")
                .help("Violation reporting window per event type")
                .value_parser(clap::value_parser!(u64))
                .global(true),
        )
        .arg(
            Arg::new("no-devtools")
                .long("no-devtools")
                .help("Disable devtools detection")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("action")
                .long("action")
                .value_name("ACTION")
                .help("Response to detected devtools")
                .value_parser(["warn", "redirect", "custom"])
                .global(true),
        )
        .arg(
            Arg::new("redirect-url")
                .long("redirect-url")
                .value_name("URL")
                .help("Target for the redirect action")
                .global(true),
        )
        .arg(
            Arg::new("message")
                .long("message")
                .value_name("TEXT")
                .help("Console message shown on detection")
                .global(true),
        )
        .arg(
            Arg::new("keys")
                .long("keys")
                .value_name("LIST")
                .help("Comma-separated shortcuts to block (e.g. \"F12,Ctrl+Shift+I\")")
                .global(true),
        )
        .arg(
            Arg::new("signal-policy")
                .long("signal-policy")
                .value_name("POLICY")
                .help("Console probe trigger policy")
                .value_parser(["edge", "every-tick"])
                .global(true),
        )
        .arg(
            Arg::new("exclude")
                .short('x')
                .long("exclude")
                .value_name("SELECTOR")
                .help("Exclude a region from interception (repeatable)")
                .action(ArgAction::Append)
                .global(true),
        )
        .arg(
            Arg::new("allow")
                .long("allow")
                .value_name("EVENT")
                .help("Stop intercepting an event (repeatable)")
                .value_parser(clap::value_parser!(InterceptedEvent))
                .action(ArgAction::Append)
                .global(true),
        )
        .arg(
            Arg::new("block")
                .long("block")
                .value_name("EVENT")
                .help("Start intercepting an event (repeatable)")
                .value_parser(clap::value_parser!(InterceptedEvent))
                .action(ArgAction::Append)
                .global(true),
        )
        .arg(
            Arg::new("silent")
                .long("silent")
                .help("Do not write lifecycle notices to the page console")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(ArgAction::Count)
                .global(true),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Suppress output except errors")
                .action(ArgAction::SetTrue)
                .conflicts_with("verbose")
                .global(true),
        )
        .subcommand(
            Command::new("check")
                .about("Validate the configuration and print the resolved settings")
                .arg(
                    Arg::new("format")
                        .long("format")
                        .value_name("FORMAT")
                        .help("Output format")
                        .value_parser(["toml", "json"])
                        .default_value("toml"),
                ),
        )
        .subcommand(
            Command::new("simulate")
                .about("Run a scripted session against an in-memory page")
                .arg(
                    Arg::new("script")
                        .value_name("SCRIPT")
                        .help("JSON script; a built-in demo runs when omitted")
                        .value_parser(clap::value_parser!(PathBuf)),
                ),
        )
}

/// Parse CLI arguments into CliArgs struct
fn parse_cli_args(matches: &ArgMatches) -> CliArgs {
    let mut args = CliArgs::default();

    args.config_file = matches.get_one::<PathBuf>("config").cloned();
    args.devtools_interval_ms = matches.get_one::<u64>("interval").copied();
    args.throttle_ms = matches.get_one::<u64>("throttle").copied();
    args.devtools_action = matches.get_one::<String>("action").cloned();
    args.redirect_url = matches.get_one::<String>("redirect-url").cloned();
    args.devtools_message = matches.get_one::<String>("message").cloned();
    args.disable_keys = matches.get_one::<String>("keys").cloned();
    args.console_signal_policy = matches.get_one::<String>("signal-policy").cloned();

    if matches.get_flag("no-devtools") {
        args.detect_devtools = Some(false);
    }
    if matches.get_flag("silent") {
        args.console_output = Some(false);
    }

    args.exclude_selectors = matches
        .get_many::<String>("exclude")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    args.allow_events = matches
        .get_many::<InterceptedEvent>("allow")
        .map(|values| values.copied().collect())
        .unwrap_or_default();
    args.block_events = matches
        .get_many::<InterceptedEvent>("block")
        .map(|values| values.copied().collect())
        .unwrap_or_default();

    args
}

/// Initialize the tracing/logging subsystem
fn init_tracing(verbosity: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbosity {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn run_check(settings: &GuardifySettings, matches: &ArgMatches, quiet: bool) -> Result<()> {
    if !quiet {
        print_config_summary(settings);
    }

    let rendered = match matches.get_one::<String>("format").map(String::as_str) {
        Some("json") => serde_json::to_string_pretty(settings).context("Failed to render settings")?,
        _ => toml::to_string_pretty(settings).context("Failed to render settings")?,
    };
    println!("{}", rendered);
    Ok(())
}

fn run_simulate(settings: GuardifySettings, matches: &ArgMatches) -> Result<()> {
    let steps = match matches.get_one::<PathBuf>("script") {
        Some(path) => {
            let source = fs::read_to_string(path)
                .with_context(|| format!("Failed to read script {}", path.display()))?;
            parse_script(&source)
                .with_context(|| format!("Failed to parse script {}", path.display()))?
        }
        None => {
            debug!("No script given, running demo");
            demo_script()
        }
    };

    let mut simulation = Simulation::new(settings).context("Failed to start engine")?;
    info!(steps = steps.len(), "Running simulation");

    for step in &steps {
        for output in simulation.step(step) {
            println!(
                "{}",
                serde_json::to_string(&output).context("Failed to render output")?
            );
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    let matches = build_cli().get_matches();
    let Some((command, sub)) = matches.subcommand() else {
        anyhow::bail!("No command given");
    };

    // Global arguments are read from the subcommand, where clap propagates them.
    let verbosity = sub.get_count("verbose");
    let quiet = sub.get_flag("quiet");
    init_tracing(verbosity, quiet);

    let cli_args = parse_cli_args(sub);
    let settings = cli_args
        .load_settings()
        .context("Failed to load configuration")?;

    match command {
        "check" => run_check(&settings, sub, quiet),
        "simulate" => run_simulate(settings, sub),
        other => anyhow::bail!("Unknown command: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let matches = build_cli()
            .try_get_matches_from([
                "guardify",
                "check",
                "--interval",
                "500",
                "--allow",
                "copy",
                "--block",
                "paste",
                "-x",
                ".copyable",
                "-x",
                "textarea",
            ])
            .unwrap();

        let args = parse_cli_args(matches.subcommand_matches("check").unwrap());
        assert_eq!(args.devtools_interval_ms, Some(500));
        assert_eq!(args.allow_events, vec![InterceptedEvent::Copy]);
        assert_eq!(args.block_events, vec![InterceptedEvent::Paste]);
        assert_eq!(args.exclude_selectors, vec![".copyable", "textarea"]);
    }

    #[test]
    fn test_cli_rejects_unknown_action() {
        let result = build_cli().try_get_matches_from(["guardify", "check", "--action", "explode"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_conflicts() {
        let result = build_cli().try_get_matches_from(["guardify", "check", "-v", "--quiet"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_flags_map_to_args() {
        let matches = build_cli()
            .try_get_matches_from(["guardify", "simulate", "--no-devtools", "--silent"])
            .unwrap();

        let args = parse_cli_args(matches.subcommand_matches("simulate").unwrap());
        assert_eq!(args.detect_devtools, Some(false));
        assert_eq!(args.console_output, Some(false));
    }
}
