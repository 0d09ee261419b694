pub mod actions;
pub mod agent_engine;
pub mod config;
pub mod errors;
pub mod llm;
pub mod perception;
pub mod retry;
pub mod server;
pub mod supervisor;
pub mod surface;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::agent_engine::{AgentLoop, AgentSettings};
use crate::errors::PilotResult;
use crate::llm::ProviderRegistry;
use crate::perception::FrameCache;
use crate::server::AppState;
use crate::supervisor::ConnectionSupervisor;
use crate::surface::SurfaceKind;

/// Command-line overrides applied on top of config.toml.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub config_path: Option<PathBuf>,
    pub listen: Option<String>,
    pub surface: Option<SurfaceKind>,
    pub no_autostart: bool,
}

pub async fn run(options: RunOptions) -> PilotResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();

    let mut config = config::load_config(options.config_path.as_deref())?;
    if let Some(listen) = options.listen {
        config.server.listen = listen;
    }
    if let Some(kind) = options.surface {
        config.surface.kind = kind;
    }
    if options.no_autostart {
        config.agent.autostart = false;
    }

    let registry = ProviderRegistry::from_config(&config);
    let decision = registry.get_active()?;
    tracing::info!(
        provider = %decision.name(),
        available = ?registry.list_names(),
        "decision service selected"
    );

    let supervisor = Arc::new(ConnectionSupervisor::new(
        config.build_surface_factory(),
        Arc::new(FrameCache::new()),
    ));
    let agent = Arc::new(AgentLoop::new(
        Arc::clone(&supervisor),
        decision,
        AgentSettings::from(&config.agent),
    ));

    let autostart = config.agent.autostart.then(|| {
        tracing::info!(delay_ms = config.agent.autostart_delay_ms, "agent autostart scheduled");
        tokio::spawn(Arc::clone(&agent).autostart(
            Duration::from_millis(config.agent.autostart_delay_ms),
            Duration::from_millis(config.agent.autostart_retry_ms),
        ))
    });

    let state = Arc::new(AppState {
        agent: Arc::clone(&agent),
        supervisor: Arc::clone(&supervisor),
    });
    let served = server::serve(&config.server.listen, state, async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
    })
    .await;

    if let Some(task) = autostart {
        task.abort();
    }
    agent.stop();
    agent.join().await;
    supervisor.release().await;
    served
}
