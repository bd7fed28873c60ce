//! CLI argument parsing

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "argos")]
#[command(version, about = "Concurrent multi-interface packet capture", long_about = None)]
pub struct Cli {
    /// Configuration file (JSON or TOML); ARGOS_* variables are used otherwise
    #[arg(short, long, global = true, value_name = "PATH", env = "ARGOS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Verbose output (-v, -vv, -vvv for increasing verbosity)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List available network interfaces
    Interfaces,

    /// Capture once on one or more interfaces
    Capture {
        /// Interface to capture on (repeatable; defaults to the configured ones)
        #[arg(short, long = "interface", value_name = "NAME")]
        interfaces: Vec<String>,

        /// BPF filter expression
        #[arg(short, long)]
        filter: Option<String>,

        /// Packets per interface
        #[arg(short = 'n', long)]
        count: Option<usize>,

        /// Capture timeout in seconds
        #[arg(short, long, value_name = "SECONDS")]
        timeout: Option<u64>,

        /// Write the raw capture result to the output directory
        #[arg(short, long)]
        save: bool,

        /// File name for --save (default: capture_<timestamp>.<ext>)
        #[arg(short, long, requires = "save")]
        output: Option<String>,
    },

    /// Capture continuously and print extracted records
    Watch {
        /// Interface to capture on (repeatable; defaults to the configured ones)
        #[arg(short, long = "interface", value_name = "NAME")]
        interfaces: Vec<String>,

        /// Stop after this many seconds
        #[arg(short, long, value_name = "SECONDS")]
        duration: Option<u64>,

        /// Run inside the configured bridge
        #[arg(short, long)]
        bridge: bool,
    },

    /// Create or remove a bridge
    Bridge {
        #[command(subcommand)]
        action: BridgeAction,
    },

    /// Inspect or write configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Perform one blocking capture and print packets as JSON on stdout
    #[command(hide = true)]
    CaptureWorker {
        #[arg(long)]
        interface: String,

        #[arg(long, default_value = "", allow_hyphen_values = true)]
        filter: String,

        #[arg(long)]
        count: usize,

        #[arg(long)]
        timeout_ms: u64,
    },
}

#[derive(Subcommand, Debug)]
pub enum BridgeAction {
    /// Create the bridge, attach members and bring it up
    Up {
        /// Bridge name (default: bridge_name from the configuration)
        #[arg(short, long)]
        name: Option<String>,

        /// Member interface (repeatable; defaults to the configured interfaces)
        #[arg(short, long = "member", value_name = "NAME")]
        members: Vec<String>,
    },

    /// Bring the bridge down and delete it
    Down {
        /// Bridge name (default: bridge_name from the configuration)
        #[arg(short, long)]
        name: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show {
        #[arg(short, long, value_enum, default_value_t = ConfigFormat::Toml)]
        format: ConfigFormat,
    },

    /// Write the effective configuration to a file
    Save {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_arguments() {
        let cli = Cli::try_parse_from([
            "argos", "-vv", "capture", "-i", "eth0", "-i", "eth1", "-f", "arp", "-n", "5", "--save",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Capture {
                interfaces,
                filter,
                count,
                timeout,
                save,
                output,
            } => {
                assert_eq!(interfaces, vec!["eth0", "eth1"]);
                assert_eq!(filter.as_deref(), Some("arp"));
                assert_eq!(count, Some(5));
                assert_eq!(timeout, None);
                assert!(save);
                assert!(output.is_none());
            }
            other => panic!("Unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_output_requires_save() {
        assert!(Cli::try_parse_from(["argos", "capture", "-o", "x.json"]).is_err());
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let cli = Cli::try_parse_from(["argos", "watch", "--bridge", "-c", "argos.toml", "-d", "30"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("argos.toml")));
        assert!(matches!(
            cli.command,
            Commands::Watch { bridge: true, duration: Some(30), .. }
        ));
    }

    #[test]
    fn test_capture_worker_accepts_empty_filter() {
        let cli = Cli::try_parse_from([
            "argos", "capture-worker", "--interface", "eth0", "--filter", "", "--count", "3",
            "--timeout-ms", "500",
        ])
        .unwrap();
        match cli.command {
            Commands::CaptureWorker {
                interface,
                filter,
                count,
                timeout_ms,
            } => {
                assert_eq!(interface, "eth0");
                assert_eq!(filter, "");
                assert_eq!(count, 3);
                assert_eq!(timeout_ms, 500);
            }
            other => panic!("Unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_bridge_subcommands() {
        let cli = Cli::try_parse_from(["argos", "bridge", "up", "-n", "br0", "-m", "eth0"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Bridge { action: BridgeAction::Up { name: Some(_), .. } }
        ));

        let cli = Cli::try_parse_from(["argos", "config", "show", "-f", "json"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config { action: ConfigAction::Show { format: ConfigFormat::Json } }
        ));
    }
}
