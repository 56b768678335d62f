//! Command-line interface for the mod runner.

use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;

/// Command line arguments, each overriding the matching configuration value.
#[derive(Debug, Clone)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Optional override for the mods directory
    pub mods_dir: Option<PathBuf>,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
    /// Commands to run after startup, appended to the configured ones
    pub commands: Vec<String>,
}

impl CliArgs {
    /// Parses the process arguments.
    pub fn parse() -> Self {
        Self::from_matches(&command().get_matches())
    }

    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("mod_runner.toml")),
            mods_dir: matches.get_one::<String>("mods").map(PathBuf::from),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
            commands: matches
                .get_many::<String>("command")
                .map(|values| values.cloned().collect())
                .unwrap_or_default(),
        }
    }
}

fn command() -> Command {
    Command::new("InterMod Runner")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Hosts the InterModHost and InterModClient mods")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("mod_runner.toml"),
        )
        .arg(
            Arg::new("mods")
                .short('m')
                .long("mods")
                .value_name("DIR")
                .help("Mods directory path"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .help("Output logs in JSON format")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("command")
                .short('x')
                .long("command")
                .value_name("COMMAND")
                .help("Run a mod command after startup (repeatable)")
                .action(ArgAction::Append),
        )
}
