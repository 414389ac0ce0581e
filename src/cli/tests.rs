//! Unit tests for CLI commands

use crate::cli::{resolve_config, route_table, run, Cli, Commands, ConfigCommand};
use crate::config::ServerConfig;
use clap::Parser;
use std::path::Path;

#[test]
fn test_serve_flags_parse() {
    let cli = Cli::try_parse_from([
        "yomu-server",
        "serve",
        "--config",
        "s.yaml",
        "--http-port",
        "8080",
        "--static-dir",
        "web",
    ])
    .unwrap();

    match cli.command {
        Commands::Serve {
            config,
            http_port,
            ws_port,
            static_dir,
        } => {
            assert_eq!(config, Path::new("s.yaml"));
            assert_eq!(http_port, Some(8080));
            assert_eq!(ws_port, None);
            assert_eq!(static_dir.as_deref(), Some(Path::new("web")));
        }
        other => panic!("Expected Serve command, got {other:?}"),
    }
}

#[test]
fn test_config_init_default_path() {
    let cli = Cli::try_parse_from(["yomu-server", "config", "init"]).unwrap();
    match cli.command {
        Commands::Config {
            sub: ConfigCommand::Init { path, force },
        } => {
            assert_eq!(path, Path::new("yomu-server.yaml"));
            assert!(!force);
        }
        other => panic!("Expected Config Init, got {other:?}"),
    }
}

#[test]
fn test_flags_override_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("s.yaml");
    std::fs::write(&path, "http_port: 7000\nws_port: 7001\n").unwrap();

    let config = resolve_config(&path, Some(9000), None, None).unwrap();
    assert_eq!(config.http_port, 9000);
    assert_eq!(config.ws_port, 7001);
}

#[test]
fn test_config_init_writes_defaults_and_refuses_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("yomu.yaml");
    let init = |force: bool| {
        run(Cli {
            command: Commands::Config {
                sub: ConfigCommand::Init {
                    path: path.clone(),
                    force,
                },
            },
        })
    };

    init(false).unwrap();
    assert_eq!(ServerConfig::load(&path).unwrap(), ServerConfig::default());
    assert!(init(false).is_err());
    init(true).unwrap();
}

#[test]
fn test_route_table_order() {
    let lines = route_table().unwrap();
    assert!(lines[0].contains("/api/library/ -> get_library"));
    assert!(lines.last().unwrap().contains("/assets/<file> -> web_asset"));
    let thumbnail = lines.iter().position(|l| l.contains("get_thumbnail")).unwrap();
    let events = lines.iter().position(|l| l.contains("event_stream")).unwrap();
    assert!(thumbnail < events);
}
