//! Process entry point: load configuration, wire every dependency, recover
//! in-flight workflows, and serve the HTTP API until a shutdown signal.
//!
//! Follows a load-config / init-logging / dispatch shape, with shutdown
//! handled by `axum::serve`'s graceful-shutdown future rather than a
//! hand-rolled `tokio::select!` over an inbound channel.

use std::process::ExitCode;
use std::sync::Arc;

use conclave_agents::default_registry;
use conclave_config::{Config, NetworkModeConfig};
use conclave_engine::{Engine, Services};
use conclave_events::EventBus;
use conclave_hitl::HitlBroker;
use conclave_llm::pool_from_config;
use conclave_server::AppState;
use conclave_storage::{FileCheckpointStore, FileConversationStore};
use conclave_tools::{NetworkMode, NetworkPolicy, ToolRegistry};
use conclave_workspace::WorkspaceManager;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::from(2);
        },
    };

    init_logging(&config);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "server exited with an error");
            ExitCode::from(3)
        },
    }
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_new(&config.logging.filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if config.logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind_addr.clone();
    let data_root = config.server.data_root.clone();

    let network_mode = match config.network.mode {
        NetworkModeConfig::Online => NetworkMode::Online,
        NetworkModeConfig::Offline => NetworkMode::Offline,
    };
    let policy = NetworkPolicy::new(network_mode);
    let tools = Arc::new(ToolRegistry::with_defaults(policy));

    let pool = pool_from_config(&config.llm);
    let handlers = default_registry(Arc::new(pool));

    let workspace = Arc::new(WorkspaceManager::new(config.workspace.default_workspace.clone()));
    let events = EventBus::new();
    let hitl = HitlBroker::new(events.clone());

    tokio::fs::create_dir_all(&data_root).await?;
    let checkpoints: Arc<dyn conclave_storage::WorkflowCheckpointStore> =
        Arc::new(FileCheckpointStore::new(data_root.clone()));
    let conversations: Arc<dyn conclave_storage::ConversationStore> =
        Arc::new(FileConversationStore::new(data_root.clone()));

    let services = Services { handlers, tools, workspace, events, hitl, checkpoints, conversations, config };

    let engine = Arc::new(Engine::new(services.clone()));
    match engine.recover_pending().await {
        Ok(recovered) if !recovered.is_empty() => {
            tracing::info!(count = recovered.len(), "recovered in-flight workflows from checkpoints");
        },
        Ok(_) => {},
        Err(e) => {
            tracing::error!(error = %e, "failed to recover pending workflow checkpoints at startup");
            return Err(e.into());
        },
    }

    let app = conclave_server::router(AppState::new(engine, services));
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(%bind_addr, "conclave-server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Waits for either Ctrl-C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let mut signal = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        signal.recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        biased;
        () = terminate => {},
        () = ctrl_c => {},
    }
    tracing::info!("shutdown signal received");
}
