//! Application state shared across handlers.

use std::sync::Arc;

use nbrepo_core::{Clock, Identity, SystemClock};
use nbrepo_store::Store;

use crate::config::ServerConfig;
use crate::context::CoordinationContext;
use crate::events::EventBroadcaster;
use crate::presence::{InMemoryPresence, PresenceMonitor};
use crate::workspace::{FsWorkspace, Workspace};

/// Application state shared across all handlers.
///
/// This is cloneable and can be extracted in handlers using `State<AppState>`.
#[derive(Clone)]
pub struct AppState {
    store: Arc<Store>,
    config: Arc<ServerConfig>,
    clock: Arc<dyn Clock>,
    /// Active-editor tracking for shared notebooks.
    presence: Arc<dyn PresenceMonitor>,
    /// Content copies between user workspaces.
    workspace: Arc<dyn Workspace>,
    /// Event broadcaster for SSE notifications.
    broadcaster: Arc<EventBroadcaster>,
}

impl AppState {
    /// Create application state with the wall clock, in-memory presence and a
    /// filesystem workspace rooted at `config.users_path`.
    pub fn new(store: Store, config: ServerConfig) -> Self {
        let window = chrono::Duration::from_std(config.liveness_window)
            .unwrap_or_else(|_| chrono::Duration::seconds(120));
        let workspace = FsWorkspace::new(config.users_path.clone(), config.workspace_timeout);

        Self {
            store: Arc::new(store),
            config: Arc::new(config),
            clock: Arc::new(SystemClock),
            presence: Arc::new(InMemoryPresence::new(window)),
            workspace: Arc::new(workspace),
            broadcaster: Arc::new(EventBroadcaster::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_presence(mut self, presence: Arc<dyn PresenceMonitor>) -> Self {
        self.presence = presence;
        self
    }

    pub fn with_workspace(mut self, workspace: Arc<dyn Workspace>) -> Self {
        self.workspace = workspace;
        self
    }

    /// Get a reference to the database store.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Get a reference to the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Get a reference to the event broadcaster.
    pub fn broadcaster(&self) -> &Arc<EventBroadcaster> {
        &self.broadcaster
    }

    /// Everything one coordination operation may touch, bound to its caller.
    pub fn context(&self, identity: Option<Identity>) -> CoordinationContext {
        CoordinationContext {
            identity,
            store: Arc::clone(&self.store),
            config: Arc::clone(&self.config),
            clock: Arc::clone(&self.clock),
            presence: Arc::clone(&self.presence),
            workspace: Arc::clone(&self.workspace),
            events: Arc::clone(&self.broadcaster),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}
