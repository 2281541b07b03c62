use std::sync::Arc;

use anyhow::Context;
use onvif_server::config::Config;
use onvif_server::ptz::{self, MemoryPresetStore, PresetStore, PtzService, SimulatedPtz, YamlPresetStore};
use onvif_server::server::{self, AppState};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(cfg.server.worker_count)
        .enable_all()
        .build()
        .context("building runtime")?;

    runtime.block_on(serve(cfg))
}

async fn serve(cfg: Config) -> anyhow::Result<()> {
    let store: Arc<dyn PresetStore> = match &cfg.ptz.presets_path {
        Some(path) => Arc::new(YamlPresetStore::new(path)),
        None => Arc::new(MemoryPresetStore::new()),
    };
    let ptz_service = Arc::new(PtzService::new(Arc::new(SimulatedPtz::new()), store));

    let state = Arc::new(AppState::new(cfg)?);
    state
        .dispatcher
        .register(ptz::handlers::registration(ptz_service))?;

    if state.auth.as_ref().is_some_and(|a| a.credentials().is_empty()) {
        tracing::warn!("Authentication enabled but no users configured; every request will be rejected");
    }

    tokio::select! {
        res = server::listener::run(Arc::clone(&state)) => {
            res?;
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    state.shutdown();
    Ok(())
}
