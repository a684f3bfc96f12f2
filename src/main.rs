// ============================================================================
// main.rs — overrun CLI entry point (binary: overrun)
// ============================================================================

use std::process::ExitCode;

use clap::Parser;
use colored::*;

use overrun::component::{self, registered_names};
use overrun::config::{Config, ConfigSource};
use overrun::options::{Cli, Command, ComponentAction, TargetAction};
use overrun::registry::Registry;
use overrun::{runtime, ConfigError};

fn main() -> ExitCode {
    let cli = Cli::parse();
    configure_logging(&cli);
    component::register_builtin_components();

    match &cli.command {
        Command::Version => {
            println!("overrun {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        Command::Doctor => cmd_doctor(&cli),
        Command::Config => cmd_config(&cli),
        Command::Target { action } => match action {
            TargetAction::List => cmd_target_list(&cli),
            TargetAction::Run { name } => cmd_target_run(&cli, name),
        },
        Command::Component { action } => match action {
            ComponentAction::List => cmd_component_list(),
        },
    }
}

fn configure_logging(cli: &Cli) {
    let filter = if cli.quiet {
        "warn"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config, ConfigError> {
    let source = cli.config.clone().map(ConfigSource::Path);
    Config::attempt_init(source)
}

fn cmd_doctor(cli: &Cli) -> ExitCode {
    match load_config(cli) {
        Ok(config) => {
            println!("{}", "overrun doctor".bold());
            println!("{} config usable", "✓".green());
            println!("  current working project: {}", config.current_working_project.display());
            println!("  projects:");
            let mut projects: Vec<_> = config.projects.iter().collect();
            projects.sort();
            for project in projects {
                println!("    - {}", project.display());
            }
            println!("  target directories:");
            let mut dirs: Vec<_> = config.target_directories.iter().collect();
            dirs.sort_by_key(|(project, _)| project.clone());
            for (project, found) in dirs {
                let mut found: Vec<_> = found.iter().collect();
                found.sort();
                for dir in found {
                    println!("    - {} ({})", dir.display(), project.display());
                }
            }
            println!("{}", "effective config:".bold());
            match toml::to_string_pretty(&config.options) {
                Ok(toml) => print!("{toml}"),
                Err(err) => eprintln!("{} failed to render config: {err}", "✗".red()),
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            println!("{}", "overrun doctor".bold());
            println!("{} config not usable: {err}", "✗".red());
            ExitCode::SUCCESS
        }
    }
}

fn cmd_config(cli: &Cli) -> ExitCode {
    match load_config(cli) {
        Ok(config) => match toml::to_string_pretty(&config.options) {
            Ok(toml) => {
                print!("{toml}");
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("{} failed to render config: {err}", "✗".red());
                ExitCode::FAILURE
            }
        },
        Err(err) => {
            eprintln!("{} {err}", "✗".red());
            ExitCode::FAILURE
        }
    }
}

fn cmd_target_list(cli: &Cli) -> ExitCode {
    let registry = match Registry::attempt_init_from(load_config(cli)) {
        Ok(registry) => registry,
        Err(err) => {
            eprintln!("{} {err}", "✗".red());
            return ExitCode::FAILURE;
        }
    };

    for (name, path) in registry.target_names() {
        println!("{:<24} {}", name.cyan(), path.display());
    }
    ExitCode::SUCCESS
}

fn cmd_target_run(cli: &Cli, name: &str) -> ExitCode {
    let config = match load_config(cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{} {err}", "✗".red());
            return ExitCode::FAILURE;
        }
    };
    let registry = match Registry::attempt_init(&config) {
        Ok(registry) => registry,
        Err(err) => {
            eprintln!("{} {err}", "✗".red());
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("{} failed to start async runtime: {err}", "✗".red());
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(runtime::run(&registry, &config, name)) {
        Ok(()) => {
            println!("{} {name} finished", "✓".green());
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{} {name} failed: {err}", "✗".red());
            ExitCode::FAILURE
        }
    }
}

fn cmd_component_list() -> ExitCode {
    for name in registered_names() {
        let summary = match name.as_str() {
            "exec" => "spawn an arbitrary subprocess as a component",
            "homebrew" => "ensure a list of Homebrew packages are installed",
            _ => "",
        };
        println!("{:<16} {}", name.cyan(), summary);
    }
    ExitCode::SUCCESS
}
