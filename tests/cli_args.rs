//! CLI argument parsing tests.

use std::path::PathBuf;

use clap::Parser;
use sonar_config::cli::{Cli, Command, Connection};
use sonar_config::SonarError;

#[test]
fn test_cli_parses_export_subcommand() {
    let cli = Cli::parse_from(["sonar-config", "export"]);

    assert_eq!(cli.verbose, 0);
    match cli.command {
        Command::Export {
            full,
            keys,
            file,
            threads,
        } => {
            assert!(!full);
            assert!(keys.is_none());
            assert!(file.is_none());
            assert_eq!(threads, 8);
        }
        _ => panic!("Expected Export command"),
    }
}

#[test]
fn test_cli_splits_keys_on_commas() {
    let cli = Cli::parse_from([
        "sonar-config",
        "export",
        "--keys",
        "acme-web,acme-api",
        "--file",
        "config.json",
        "--full",
    ]);

    match cli.command {
        Command::Export { full, keys, file, .. } => {
            assert!(full);
            assert_eq!(keys, Some(vec!["acme-web".to_string(), "acme-api".to_string()]));
            assert_eq!(file, Some(PathBuf::from("config.json")));
        }
        _ => panic!("Expected Export command"),
    }
}

#[test]
fn test_cli_parses_import_subcommand() {
    let cli = Cli::parse_from(["sonar-config", "import", "-f", "config.json", "-k", "ALL"]);

    match cli.command {
        Command::Import { file, keys } => {
            assert_eq!(file, PathBuf::from("config.json"));
            assert_eq!(keys, Some(vec!["ALL".to_string()]));
        }
        _ => panic!("Expected Import command"),
    }
}

#[test]
fn test_cli_import_requires_file() {
    let result = Cli::try_parse_from(["sonar-config", "import"]);

    assert!(result.is_err());
}

#[test]
fn test_cli_parses_audit_subcommand() {
    let cli = Cli::parse_from(["sonar-config", "audit", "--config", "audit.properties", "--json"]);

    match cli.command {
        Command::Audit { config, keys, json } => {
            assert_eq!(config, Some(PathBuf::from("audit.properties")));
            assert!(keys.is_none());
            assert!(json);
        }
        _ => panic!("Expected Audit command"),
    }
}

#[test]
fn test_cli_parses_export_zip_subcommand() {
    let cli = Cli::parse_from(["sonar-config", "export-zip", "--timeout", "30", "--threads", "2"]);

    match cli.command {
        Command::ExportZip {
            keys,
            timeout,
            threads,
        } => {
            assert!(keys.is_none());
            assert_eq!(timeout, 30);
            assert_eq!(threads, 2);
        }
        _ => panic!("Expected ExportZip command"),
    }
}

#[test]
fn test_cli_connection_flags_are_global() {
    let cli = Cli::parse_from([
        "sonar-config",
        "audit",
        "--url",
        "https://sonar.acme.com",
        "--token",
        "squ_abc",
        "-vv",
    ]);

    assert_eq!(cli.connection.url.as_deref(), Some("https://sonar.acme.com"));
    assert_eq!(cli.connection.token.as_deref(), Some("squ_abc"));
    assert_eq!(cli.verbose, 2);
}

#[test]
fn test_cli_rejects_unknown_subcommand() {
    let result = Cli::try_parse_from(["sonar-config", "delete"]);

    assert!(result.is_err());
}

#[test]
fn test_connection_keeps_url_flag() {
    let connection = Connection {
        url: Some("https://sonar.acme.com/".to_string()),
        token: Some("squ_abc".to_string()),
    };

    let client = connection.client().unwrap();

    assert_eq!(client.url(), "https://sonar.acme.com");
}

#[test]
fn test_connection_defaults_to_local_platform() {
    let connection = Connection {
        url: None,
        token: Some("squ_abc".to_string()),
    };

    assert_eq!(connection.client().unwrap().url(), "http://localhost:9000");
}

#[test]
fn test_connection_without_token_is_config_error() {
    let connection = Connection {
        url: Some("https://sonar.acme.com".to_string()),
        token: None,
    };

    let err = connection.client().unwrap_err();

    assert!(matches!(err, SonarError::ConfigMissing(_)));
    assert_eq!(err.exit_code(), 2);
}
