//! Command-line interface handling for the walkgrid server.
//!
//! Every option overrides the matching setting from the configuration file.

use clap::{value_parser, Arg, ArgMatches, Command};
use std::path::PathBuf;

/// Command line arguments parsed from user input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Optional override for bind address
    pub bind_address: Option<String>,
    /// Optional override for the port only, keeping the configured host
    pub port: Option<u16>,
    /// Optional override for the worker pool size
    pub workers: Option<usize>,
    /// Optional override for the number of reactor threads
    pub reactors: Option<usize>,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
}

impl CliArgs {
    /// Parses the process arguments.
    ///
    /// Exits with a usage message on invalid input, like any clap program.
    pub fn parse() -> Self {
        Self::try_parse_from(std::env::args_os()).unwrap_or_else(|e| e.exit())
    }

    /// Parses an explicit argument list.
    pub fn try_parse_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Ok(Self::from_matches(&command().try_get_matches_from(args)?))
    }

    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("walkgrid.toml")),
            bind_address: matches.get_one::<String>("bind").cloned(),
            port: matches.get_one::<u16>("port").copied(),
            workers: matches.get_one::<usize>("workers").copied(),
            reactors: matches.get_one::<usize>("reactors").copied(),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
        }
    }
}

fn command() -> Command {
    Command::new("walkgrid")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Builds a walk graph from streamed telemetry and answers distance queries")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("walkgrid.toml"),
        )
        .arg(
            Arg::new("bind")
                .short('b')
                .long("bind")
                .value_name("ADDRESS")
                .help("Bind address (e.g., 0.0.0.0:4321)"),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("Port to listen on, keeping the configured host")
                .value_parser(value_parser!(u16)),
        )
        .arg(
            Arg::new("workers")
                .short('w')
                .long("workers")
                .value_name("N")
                .help("Worker threads for path queries")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("reactors")
                .short('r')
                .long("reactors")
                .value_name("N")
                .help("Reactor threads for network I/O")
                .value_parser(value_parser!(usize)),
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
                .action(clap::ArgAction::SetTrue),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = CliArgs::try_parse_from(["walkgrid"]).unwrap();
        assert_eq!(
            args,
            CliArgs {
                config_path: PathBuf::from("walkgrid.toml"),
                ..CliArgs::default()
            }
        );
    }

    #[test]
    fn test_overrides() {
        let args = CliArgs::try_parse_from([
            "walkgrid",
            "--config",
            "custom.toml",
            "--port",
            "9000",
            "-w",
            "8",
            "--reactors",
            "3",
            "--log-level",
            "debug",
            "--json-logs",
        ])
        .unwrap();

        assert_eq!(args.config_path, PathBuf::from("custom.toml"));
        assert_eq!(args.port, Some(9000));
        assert_eq!(args.workers, Some(8));
        assert_eq!(args.reactors, Some(3));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(args.json_logs);
        assert!(args.bind_address.is_none());
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        assert!(CliArgs::try_parse_from(["walkgrid", "--port", "70000"]).is_err());
    }
}
