use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "surety-node", version, about = "Flight surety simulation node")]
pub struct Cli {
    /// Directory the audit log is written to.
    #[arg(long, default_value = "logs", global = true)]
    pub log_dir: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Runs the simulated oracle network through one flight lifecycle.
    Run {
        #[arg(long, default_value = "surety.json")]
        config: PathBuf,
        /// Every oracle reports this status code instead of a random one.
        #[arg(long)]
        status: Option<u8>,
    },
    /// Writes a default configuration file.
    InitConfig {
        #[arg(long, default_value = "surety.json")]
        out: PathBuf,
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_with_fixed_status() {
        let cli = Cli::parse_from(["surety-node", "run", "--config", "a.json", "--status", "20"]);
        match cli.command {
            Command::Run { config, status } => {
                assert_eq!(config, PathBuf::from("a.json"));
                assert_eq!(status, Some(20));
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert_eq!(cli.log_dir, PathBuf::from("logs"));
    }

    #[test]
    fn test_parse_init_config_defaults() {
        let cli = Cli::parse_from(["surety-node", "init-config"]);
        assert!(matches!(cli.command, Command::InitConfig { force: false, .. }));
    }
}
