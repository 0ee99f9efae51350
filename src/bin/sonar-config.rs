//! SonarQube configuration CLI binary.
//!
//! Exports, imports and audits the configuration of a SonarQube platform.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use serde_json::Value;
use sonar_config::cli::{Cli, Command, Connection};
use sonar_config::output::{PrettyPrint, ZipReport};
use sonar_config::{AuditSettings, ExportOptions, Platform, SonarError};
use tracing::Level;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let platform = match connect(&cli.connection) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("Hint: Set SONAR_TOKEN (and SONAR_HOST_URL) or pass --token and --url");
            return ExitCode::from(e.exit_code());
        }
    };

    match run(&platform, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

fn connect(connection: &Connection) -> sonar_config::Result<Platform> {
    Ok(Platform::new(connection.client()?))
}

async fn run(platform: &Platform, command: Command) -> sonar_config::Result<()> {
    match command {
        Command::Export {
            full,
            keys,
            file,
            threads,
        } => {
            let options = ExportOptions { keys, full, threads };
            let doc = sonar_config::export_config(platform, &options).await?;
            let text = serde_json::to_string_pretty(&doc)?;
            match file {
                Some(path) => {
                    std::fs::write(&path, text)?;
                    eprintln!("Configuration exported to {}", path.display());
                }
                None => println!("{text}"),
            }
        }
        Command::Import { file, keys } => {
            let text = std::fs::read_to_string(&file)?;
            let doc: Value = serde_json::from_str(&text)?;
            if !doc.is_object() {
                return Err(SonarError::InvalidData(format!(
                    "{} is not a configuration document",
                    file.display()
                )));
            }
            sonar_config::import_config(platform, &doc, keys.as_deref()).await?;
            eprintln!("Configuration imported from {}", file.display());
        }
        Command::Audit { config, keys, json } => {
            let settings = match config {
                Some(path) => AuditSettings::load(path)?,
                None => AuditSettings::default(),
            };
            let problems = sonar_config::audit_all(platform, &settings, keys.as_deref()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&problems)?);
            } else {
                println!("{}", problems.pretty_print());
            }
        }
        Command::ExportZip {
            keys,
            timeout,
            threads,
        } => {
            let report =
                sonar_config::export_projects_zip(platform, keys.as_deref(), Duration::from_secs(timeout), threads)
                    .await?;
            println!("{}", ZipReport(&report).pretty_print());
        }
    }
    Ok(())
}
