mod api;
mod cli;
mod runtime;
mod state;
mod swarm;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use parking_lot::RwLock;
use swarm_compactor::CompactionEngine;
use swarm_providers::registry::ProviderRegistry;
use swarm_registry::NodeRegistry;
use swarm_sessions::SessionStore;
use swarm_skills::SkillsRegistry;
use tracing_subscriber::EnvFilter;

use crate::runtime::busy_lock::BusyLock;
use crate::runtime::cancel::CancelMap;
use crate::runtime::tool_trait::ToolTable;
use crate::runtime::tools_core::SkillLoadTool;
use crate::state::AppState;
use crate::swarm::batch::DispatchBatchTool;
use crate::swarm::dispatcher::DispatchTaskTool;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).json().init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = cli::Cli::parse();
    let config = cli::load_config(&cli.config)?;

    for issue in config.validate() {
        match issue.severity {
            swarm_domain::config::ConfigSeverity::Error => tracing::error!("{issue}"),
            swarm_domain::config::ConfigSeverity::Warning => tracing::warn!("{issue}"),
        }
    }

    // Node identity (spec.md §6.3): exported into the process environment
    // so any code path (notably the dispatcher tool) can read it.
    std::env::set_var("SWARM_NODE_PORT", cli.port.to_string());
    let self_url = format!("http://{}:{}", config.server.host, cli.port);

    let sessions = Arc::new(SessionStore::open(config.sessions_db_path_for_port(cli.port))?);
    let registry = Arc::new(NodeRegistry::open(config.registry_db_path_for_port(cli.port))?);
    let skills = Arc::new(SkillsRegistry::load(&config.skills.path)?);
    let compactor = Arc::new(CompactionEngine::new(config.compaction.clone()));
    let llm = Arc::new(ProviderRegistry::from_config(&config.llm)?);

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.registry.peer_chat_timeout_secs))
        .build()?;

    let tools = ToolTable::new(vec![
        Arc::new(SkillLoadTool),
        Arc::new(DispatchTaskTool),
        Arc::new(DispatchBatchTool),
    ]);

    let config = Arc::new(config);
    let state = AppState {
        config: config.clone(),
        self_port: cli.port,
        self_url: self_url.clone(),
        llm,
        sessions,
        skills,
        compactor,
        registry: registry.clone(),
        http_client,
        cancel_map: Arc::new(CancelMap::new()),
        busy_lock: BusyLock::new(),
        tools,
        session_tools: Arc::new(RwLock::new(HashMap::new())),
    };

    registry.register(cli.port, &self_url)?;

    spawn_registry_maintenance(state.clone());

    let app = api::router(state);
    let listener = tokio::net::TcpListener::bind((config.server.host.as_str(), cli.port)).await?;
    tracing::info!(port = cli.port, "swarm node listening");

    let shutdown_registry = registry.clone();
    let shutdown_port = cli.port;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down, deregistering from swarm");
            let _ = shutdown_registry.deregister(shutdown_port);
        })
        .await?;

    Ok(())
}

/// Periodic heartbeat (keeps this node's own row fresh) plus a stale-peer
/// sweep, mirroring `spec.md` §5's "staleness is bounded by the next
/// dispatch attempt" but adding a background safety net so long-idle
/// swarms still converge.
fn spawn_registry_maintenance(state: AppState) {
    tokio::spawn(async move {
        let interval = Duration::from_secs(state.config.registry.prune_interval_secs);
        loop {
            tokio::time::sleep(interval).await;
            if let Err(e) = state.registry.heartbeat(state.self_port) {
                tracing::warn!(error = %e, "failed to heartbeat self in registry");
            }
            match state.registry.prune_stale(state.config.registry.stale_after_secs) {
                Ok(0) => {}
                Ok(n) => tracing::info!(pruned = n, "swept stale peers from registry"),
                Err(e) => tracing::warn!(error = %e, "failed to sweep stale peers"),
            }
        }
    });
}
