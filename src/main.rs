use std::sync::Arc;

use zipserve::config::{self, AppState};
use zipserve::handler::ArchiveContentServer;
use zipserve::{logger, server};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Optional first argument: config file path without extension
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| config::DEFAULT_CONFIG_PATH.to_string());
    let cfg = config::Config::load_from(&config_path)?;
    logger::init(&cfg)?;

    // Build the Tokio runtime, sized by `server.workers` when set
    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();
    if let Some(workers) = cfg.server.workers {
        runtime_builder.worker_threads(workers);
    }
    let runtime = runtime_builder.build()?;

    runtime.block_on(async_main(cfg))
}

async fn async_main(cfg: config::Config) -> Result<(), Box<dyn std::error::Error>> {
    let addr = cfg.get_socket_addr()?;

    let content = match ArchiveContentServer::open(
        &cfg.archive.path,
        &cfg.archive.path_prefix,
        &cfg.archive.default_path,
    ) {
        Ok(content) => content,
        Err(e) => {
            logger::log_error(&format!("Failed to open archive '{}': {e}", cfg.archive.path));
            return Err(e.into());
        }
    };
    let entries = content.index().len();

    let listener = server::create_reusable_listener(addr)?;
    let state = Arc::new(AppState::new(cfg, content));
    server::start_signal_handler(Arc::clone(&state))?;
    logger::log_server_start(&addr, &state.config, entries);

    // Connections are served with spawn_local
    let local = tokio::task::LocalSet::new();
    local
        .run_until(server::start_server_loop(listener, Arc::clone(&state)))
        .await;

    state.content.close();
    logger::log_shutdown();
    Ok(())
}
