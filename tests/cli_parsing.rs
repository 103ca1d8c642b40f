use std::path::PathBuf;

use clap::Parser;
use microloop::cli::commands::config::ConfigCommands;
use microloop::cli::{Cli, Commands};

#[test]
fn test_parse_run_with_workspace_and_backlog() {
    let cli = Cli::try_parse_from([
        "microloop",
        "run",
        "tickets/T-1.yaml",
        "tickets/T-2.yaml",
        "--workspace",
        "/srv/checkout",
        "--backlog",
        "backlog.yaml",
    ])
    .unwrap();

    match cli.command {
        Commands::Run(args) => {
            assert_eq!(
                args.tickets,
                vec![PathBuf::from("tickets/T-1.yaml"), PathBuf::from("tickets/T-2.yaml")]
            );
            assert_eq!(args.workspace, Some(PathBuf::from("/srv/checkout")));
            assert_eq!(args.backlog, Some(PathBuf::from("backlog.yaml")));
        }
        _ => panic!("Wrong top-level command"),
    }
    assert!(!cli.json);
}

#[test]
fn test_run_requires_a_ticket() {
    assert!(Cli::try_parse_from(["microloop", "run"]).is_err());
}

#[test]
fn test_global_flags_after_subcommand() {
    let cli = Cli::try_parse_from([
        "microloop",
        "config",
        "show",
        "--json",
        "--config",
        "ci.yaml",
    ])
    .unwrap();

    assert!(cli.json);
    assert_eq!(cli.config, Some(PathBuf::from("ci.yaml")));
    match cli.command {
        Commands::Config(args) => assert!(matches!(args.command, ConfigCommands::Show)),
        _ => panic!("Wrong top-level command"),
    }
}

#[test]
fn test_parse_score() {
    let cli = Cli::try_parse_from(["microloop", "score", "a.txt", "b.txt", "c.txt"]).unwrap();
    match cli.command {
        Commands::Score(args) => assert_eq!(args.snapshots.len(), 3),
        _ => panic!("Wrong top-level command"),
    }
}

#[test]
fn test_unknown_command_is_rejected() {
    assert!(Cli::try_parse_from(["microloop", "deploy", "now"]).is_err());
}
