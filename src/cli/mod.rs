//! CLI argument parsing types.
//!
//! This module provides the command-line interface structure for the
//! sonar-config binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::client::{SonarClient, DEFAULT_URL};
use crate::error::{Result, SonarError};

/// SonarQube configuration export, import and audit.
#[derive(Parser, Debug)]
#[command(name = "sonar-config", about = "SonarQube configuration CLI", version)]
pub struct Cli {
    #[command(flatten)]
    pub connection: Connection,

    /// Increase logging verbosity (-v info, -vv debug).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Platform connection, overriding the environment.
#[derive(Args, Debug, Clone, Default)]
pub struct Connection {
    /// Platform URL.
    #[arg(short = 'u', long, global = true, env = "SONAR_HOST_URL")]
    pub url: Option<String>,

    /// User token.
    #[arg(short = 't', long, global = true, env = "SONAR_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

impl Connection {
    /// Client for this connection. Both fields already fall back to the
    /// environment, the URL then defaults to a local platform.
    pub fn client(&self) -> Result<SonarClient> {
        let token = self.token.as_deref().ok_or_else(|| {
            SonarError::ConfigMissing("no token given with --token or SONAR_TOKEN".to_string())
        })?;
        SonarClient::new(token, self.url.as_deref().unwrap_or(DEFAULT_URL))
    }
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Export the platform configuration as JSON.
    Export {
        /// Also export properties that cannot be imported back.
        #[arg(long)]
        full: bool,

        /// Only export these project and portfolio keys (comma separated).
        #[arg(short, long, value_delimiter = ',')]
        keys: Option<Vec<String>>,

        /// Output file, stdout when absent.
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Number of parallel project exports.
        #[arg(long, default_value_t = 8)]
        threads: usize,
    },

    /// Import a configuration file exported earlier.
    Import {
        /// Configuration file.
        #[arg(short, long)]
        file: PathBuf,

        /// Only import these project and portfolio keys (comma separated).
        #[arg(short, long, value_delimiter = ',')]
        keys: Option<Vec<String>>,
    },

    /// Audit the platform configuration.
    Audit {
        /// Audit policy properties file, layered over the built-in defaults.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Only audit these project and portfolio keys (comma separated).
        #[arg(short, long, value_delimiter = ',')]
        keys: Option<Vec<String>>,

        /// Output problems as JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Export projects as zip dumps.
    ExportZip {
        /// Only export these project keys (comma separated).
        #[arg(short, long, value_delimiter = ',')]
        keys: Option<Vec<String>>,

        /// Seconds to wait for each project export.
        #[arg(long, default_value_t = 180)]
        timeout: u64,

        /// Number of parallel exports.
        #[arg(long, default_value_t = 8)]
        threads: usize,
    },
}
