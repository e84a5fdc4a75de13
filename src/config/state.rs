// Application state module
// Shared by every connection task

use super::types::Config;
use crate::handler::ArchiveContentServer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Application state
pub struct AppState {
    pub config: Config,
    pub content: ArchiveContentServer,
    /// Fired once when the server should stop accepting connections
    pub shutdown_signal: Arc<Notify>,
    shutdown_requested: AtomicBool,
}

impl AppState {
    pub fn new(config: Config, content: ArchiveContentServer) -> Self {
        Self {
            config,
            content,
            shutdown_signal: Arc::new(Notify::new()),
            shutdown_requested: AtomicBool::new(false),
        }
    }

    pub fn access_log_enabled(&self) -> bool {
        self.config.logging.access_log
    }

    /// Ask the accept loop to stop; only the first call has an effect
    pub fn request_shutdown(&self) {
        if !self.shutdown_requested.swap(true, Ordering::SeqCst) {
            self.shutdown_signal.notify_one();
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }
}
