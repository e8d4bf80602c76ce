//! deisctl - Deis platform control utility
//!
//! Usage:
//!   deisctl install               # Load every platform component
//!   deisctl start router@2        # Start the second router
//!   deisctl scale router@5        # Run five routers
//!   deisctl config platform set domain=example.com

mod output;

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use deisctl_core::backend::BackendKind;
use deisctl_core::commands::{ConfigAction, DispatchContext, RouterMeshSize};
use deisctl_core::error::{EXIT_OK, EXIT_UNAVAILABLE, Error};
use deisctl_core::units::{DEFAULT_UNITS_REF, refresh_units_blocking};

use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "deisctl", version)]
#[command(about = "Deis platform control utility", long_about = None)]
struct Cli {
    /// Settings file (default: <config dir>/deisctl/deisctl.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Scheduling backend, overriding the settings file
    #[arg(long, global = true, value_parser = ["local", "fleet"])]
    backend: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Get, set or remove a configuration value of a component
    ///
    /// Values live at /deis/<component>/<key>. "config platform set
    /// sshPrivateKey=<path>" stores the contents of the key file.
    Config(ConfigArgs),

    /// Load the definitions of components from local unit files
    ///
    /// Unit files are looked up in $DEISCTL_UNITS, then $HOME/.deis/units,
    /// then /var/lib/deis/units. No target installs the whole platform.
    Install {
        targets: Vec<String>,
        /// Number of routers loaded when installing the platform (1-255)
        #[arg(long, default_value = "3", value_name = "NUM")]
        router_mesh_size: String,
    },

    /// Print log output for components
    Journal { targets: Vec<String> },

    /// List installed units
    List {
        /// Output format
        #[arg(short = 'o', long, default_value = "table")]
        format: OutputFormat,
    },

    /// Overwrite local unit files with those from the upstream repository
    RefreshUnits {
        /// Where to save unit files (default: $HOME/.deis/units)
        #[arg(short, long, value_name = "DIR")]
        path: Option<PathBuf>,
        /// Git tag, branch or SHA to download
        #[arg(short, long, default_value = DEFAULT_UNITS_REF)]
        tag: String,
    },

    /// Stop and then start components
    Restart { targets: Vec<String> },

    /// Grow or shrink the number of running instances (e.g. router@5)
    ///
    /// Only router, registry and store-gateway can run more than one instance.
    Scale { targets: Vec<String> },

    /// Open a shell, or run a command, on the machine hosting a component
    Ssh(SessionArgs),

    /// Run a command inside a component's container
    Dock(SessionArgs),

    /// Activate components
    Start { targets: Vec<String> },

    /// Print the current status of components
    Status {
        targets: Vec<String>,
        /// Output format
        #[arg(short = 'o', long, default_value = "table")]
        format: OutputFormat,
    },

    /// Deactivate components
    Stop { targets: Vec<String> },

    /// Unload the definitions of components
    Uninstall { targets: Vec<String> },
}

#[derive(Args)]
struct ConfigArgs {
    /// Component (or "platform")
    component: String,
    #[arg(value_parser = ["get", "set", "rm"])]
    action: String,
    /// Keys for get/rm, key=value pairs for set
    keys: Vec<String>,
    /// Output format
    #[arg(short = 'o', long, default_value = "table")]
    format: OutputFormat,
}

#[derive(Args)]
struct SessionArgs {
    /// Component instance, e.g. router@1
    target: String,
    /// Command to run; an interactive shell when omitted
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

fn main() -> ExitCode {
    // Logs go to stderr; stdout carries command output.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "deisctl_core=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(exit_code_for(&err))
        }
    }
}

fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<Error>()
        .map(Error::exit_code)
        .unwrap_or(EXIT_UNAVAILABLE)
}

fn run(cli: Cli) -> Result<u8> {
    let backend = cli
        .backend
        .as_deref()
        .map(str::parse::<BackendKind>)
        .transpose()?;
    let ctx = DispatchContext::with_defaults(cli.config.as_deref(), backend)?;

    let dispatcher = ctx.dispatcher();
    let code = match cli.command {
        Commands::Config(args) => {
            let action = ConfigAction::parse(&args.action, &args.keys)?;
            let report = dispatcher.config(&args.component, &action)?;
            output::print_config(&report, &action, args.format)?;
            report.exit_code()
        }
        Commands::Install {
            targets,
            router_mesh_size,
        } => {
            let mesh: RouterMeshSize = router_mesh_size.parse()?;
            let report = dispatcher.install(&targets, mesh)?;
            output::print_command_report(&report);
            report.exit_code()
        }
        Commands::Journal { targets } => {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            let report = dispatcher.journal(&targets, &mut out)?;
            out.flush()?;
            drop(out);
            print_failures_only(&report);
            report.exit_code()
        }
        Commands::List { format } => {
            output::print_list(&dispatcher.list()?, format)?;
            EXIT_OK
        }
        Commands::RefreshUnits { path, tag } => run_refresh_units(&ctx, path, &tag)?,
        Commands::Restart { targets } => finish(dispatcher.restart(&targets)?),
        Commands::Scale { targets } => finish(dispatcher.scale(&targets)?),
        Commands::Ssh(args) => {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            let report = dispatcher.ssh(&args.target, &args.command, &mut out)?;
            drop(out);
            print_failures_only(&report);
            report.exit_code()
        }
        Commands::Dock(args) => {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            let report = dispatcher.dock(&args.target, &args.command, &mut out)?;
            drop(out);
            print_failures_only(&report);
            report.exit_code()
        }
        Commands::Start { targets } => finish(dispatcher.start(&targets)?),
        Commands::Status { targets, format } => {
            let report = dispatcher.status(&targets)?;
            output::print_status(&report, format)?;
            report.exit_code()
        }
        Commands::Stop { targets } => finish(dispatcher.stop(&targets)?),
        Commands::Uninstall { targets } => finish(dispatcher.uninstall(&targets)?),
    };
    Ok(code)
}

fn finish(report: deisctl_core::commands::CommandReport) -> u8 {
    output::print_command_report(&report);
    report.exit_code()
}

/// Session and journal output already went to stdout; only report failures.
fn print_failures_only(report: &deisctl_core::commands::CommandReport) {
    for failure in report.failures() {
        eprintln!(
            "Error: {} {}: {}",
            report.command,
            failure.instance.unit_name(),
            failure.outcome
        );
    }
}

fn run_refresh_units(ctx: &DispatchContext, path: Option<PathBuf>, tag: &str) -> Result<u8> {
    let destination = match path {
        Some(path) => path,
        None => ctx.default_units_dir()?,
    };
    tracing::debug!(destination = %destination.display(), tag, "Refreshing unit files");
    let report = refresh_units_blocking(&destination, tag, &ctx.settings().units_url)?;
    for path in &report.written {
        println!("  ✓ {}", path.display());
    }
    println!(
        "Refreshed {} unit files in {}",
        report.written.len(),
        destination.display()
    );
    Ok(EXIT_OK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parses_install_with_mesh_size() {
        let cli = Cli::try_parse_from(["deisctl", "install", "--router-mesh-size", "5"]).unwrap();
        match cli.command {
            Commands::Install {
                targets,
                router_mesh_size,
            } => {
                assert!(targets.is_empty());
                assert_eq!(router_mesh_size, "5");
            }
            _ => panic!("expected install"),
        }
    }

    #[test]
    fn ssh_keeps_trailing_command_flags() {
        let cli = Cli::try_parse_from(["deisctl", "ssh", "router@1", "ls", "-la", "/"]).unwrap();
        match cli.command {
            Commands::Ssh(args) => {
                assert_eq!(args.target, "router@1");
                assert_eq!(args.command, vec!["ls", "-la", "/"]);
            }
            _ => panic!("expected ssh"),
        }
    }

    #[test]
    fn config_action_is_restricted() {
        assert!(Cli::try_parse_from(["deisctl", "config", "platform", "delete", "x"]).is_err());
        let cli = Cli::try_parse_from([
            "deisctl",
            "config",
            "platform",
            "set",
            "domain=example.com",
            "-o",
            "json",
        ])
        .unwrap();
        match cli.command {
            Commands::Config(args) => {
                assert_eq!(args.action, "set");
                assert_eq!(args.keys, vec!["domain=example.com"]);
                assert_eq!(args.format, OutputFormat::Json);
            }
            _ => panic!("expected config"),
        }
    }

    #[test]
    fn global_backend_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["deisctl", "list", "--backend", "fleet"]).unwrap();
        assert_eq!(cli.backend.as_deref(), Some("fleet"));
        assert!(Cli::try_parse_from(["deisctl", "--backend", "swarm", "list"]).is_err());
    }

    #[test]
    fn invalid_mesh_size_maps_to_usage_exit() {
        let err: anyhow::Error = "0".parse::<RouterMeshSize>().unwrap_err().into();
        assert_eq!(exit_code_for(&err), deisctl_core::error::EXIT_USAGE);
    }
}
