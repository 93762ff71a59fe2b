#![cfg_attr(not(test), deny(clippy::panic))]

use std::sync::Arc;

use clap::{Parser, ValueEnum};

use arenaplane::capacity::backend::InMemoryCapacityBackend;
use arenaplane::config::{self, Config};
use arenaplane::ids::resolve_session_id;
use arenaplane::logging;
use arenaplane::metrics::Metrics;
use arenaplane::store::memory::InMemoryStore;
use arenaplane::store::CoordinationStore;
use arenaplane::{capacity, gateway, matchmaker, reaper, session_runner};

/// arenaplane -- distributed matchmaking and session-placement control plane
#[derive(Parser, Debug)]
#[command(name = "arenaplane")]
#[command(about = "A distributed matchmaking and session-placement control plane for a real-time game service")]
#[command(version)]
struct Cli {
    /// Which role(s) this process runs. Defaults to `all` (single-process demo
    /// deployment); production deployments typically run one role per process.
    #[arg(long, value_enum, default_value = "all")]
    role: Role,

    /// Validate configuration and exit without starting any role.
    #[arg(long, short = 'c', conflicts_with = "print_config")]
    validate_config: bool,

    /// Print the loaded configuration to stdout (as JSON) and exit.
    #[arg(long, conflicts_with = "validate_config")]
    print_config: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Role {
    Gateway,
    Matchmaker,
    SessionRunner,
    Reaper,
    CapacityProvider,
    All,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::load();

    if cli.print_config {
        let json = serde_json::to_string_pretty(&cfg)
            .map_err(|e| anyhow::anyhow!("Failed to serialize config: {e}"))?;
        println!("{json}");
        return Ok(());
    }

    let validation_result = config::validate_config(&cfg);

    if cli.validate_config {
        match validation_result {
            Ok(()) => {
                println!("Configuration validation passed");
                println!();
                println!("Configuration summary:");
                println!("  Gateway port: {}", cfg.gateway.gateway_port);
                println!("  Players per game: {}", cfg.matchmaker.players_per_game);
                println!("  Session max slots: {}", cfg.session.session_max_slots);
                println!(
                    "  Capacity pool: {}..={}",
                    cfg.capacity.min_sessions, cfg.capacity.max_sessions
                );
                return Ok(());
            }
            Err(e) => {
                eprintln!("Configuration validation failed:\n{e}");
                std::process::exit(1);
            }
        }
    }

    validation_result?;

    logging::init_with_config(&cfg.logging);

    tracing::info!(role = ?cli.role, "starting arenaplane");

    let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryStore::new());
    let metrics = Arc::new(Metrics::new());
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let mut handles = Vec::new();
    spawn_roles(cli.role, &cfg, store, metrics, shutdown_rx, &mut handles);

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, stopping roles");
    let _ = shutdown_tx.send(true);

    for handle in handles {
        let _ = handle.await;
    }

    Ok(())
}

fn spawn_roles(
    role: Role,
    cfg: &Config,
    store: Arc<dyn CoordinationStore>,
    metrics: Arc<Metrics>,
    shutdown_rx: tokio::sync::watch::Receiver<bool>,
    handles: &mut Vec<tokio::task::JoinHandle<()>>,
) {
    if matches!(role, Role::Gateway | Role::All) {
        let store = store.clone();
        let config = cfg.gateway.clone();
        let shutdown = shutdown_rx.clone();
        handles.push(tokio::spawn(async move {
            if let Err(err) = gateway::run(store, config, shutdown).await {
                tracing::error!(error = %err, "gateway role exited with an error");
            }
        }));
    }

    if matches!(role, Role::Matchmaker | Role::All) {
        let store = store.clone();
        let config = cfg.matchmaker.clone();
        let metrics = metrics.clone();
        let shutdown = shutdown_rx.clone();
        handles.push(tokio::spawn(matchmaker::run(store, config, metrics, shutdown)));
    }

    if matches!(role, Role::SessionRunner | Role::All) {
        let store = store.clone();
        let config = cfg.session.clone();
        let session_id = resolve_session_id(&config);
        let metrics = metrics.clone();
        let shutdown = shutdown_rx.clone();
        handles.push(tokio::spawn(session_runner::run(store, config, session_id, metrics, shutdown)));
    }

    if matches!(role, Role::Reaper | Role::All) {
        let store = store.clone();
        let config = cfg.reaper.clone();
        let metrics = metrics.clone();
        let shutdown = shutdown_rx.clone();
        handles.push(tokio::spawn(reaper::run(store, config, metrics, shutdown)));
    }

    if matches!(role, Role::CapacityProvider | Role::All) {
        let backend: Arc<dyn capacity::backend::CapacityBackend> = Arc::new(InMemoryCapacityBackend::new());
        let config = cfg.capacity.clone();
        let players_per_game = cfg.matchmaker.players_per_game;
        let metrics = metrics.clone();
        handles.push(tokio::spawn(capacity::run(store, backend, config, players_per_game, metrics, shutdown_rx)));
    }
}

#[cfg(test)]
mod cli_tests {
    use super::{Cli, Role};
    use clap::Parser;

    #[test]
    fn test_cli_default_role_is_all() {
        let cli = Cli::try_parse_from(["arenaplane"]).unwrap();
        assert_eq!(cli.role, Role::All);
        assert!(!cli.validate_config);
        assert!(!cli.print_config);
    }

    #[test]
    fn test_cli_role_gateway() {
        let cli = Cli::try_parse_from(["arenaplane", "--role", "gateway"]).unwrap();
        assert_eq!(cli.role, Role::Gateway);
    }

    #[test]
    fn test_cli_role_session_runner() {
        let cli = Cli::try_parse_from(["arenaplane", "--role", "session-runner"]).unwrap();
        assert_eq!(cli.role, Role::SessionRunner);
    }

    #[test]
    fn test_cli_validate_config_short() {
        let cli = Cli::try_parse_from(["arenaplane", "-c"]).unwrap();
        assert!(cli.validate_config);
    }

    #[test]
    fn test_cli_validate_and_print_config_conflict() {
        let result = Cli::try_parse_from(["arenaplane", "--validate-config", "--print-config"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_rejects_unknown_role() {
        let result = Cli::try_parse_from(["arenaplane", "--role", "bogus"]);
        assert!(result.is_err());
    }
}
