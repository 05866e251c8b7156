//! nbrepo-server: coordination service for notebook publication and sharing
//!
//! This crate provides:
//! - The public library of published notebooks (publish, update, copy, preview)
//! - Invitation-based sharing with accept/decline and pull-based sync
//! - Advisory presence: who else has a shared notebook open
//! - Admin-curated tag flags (pinned, protected)
//! - Server-Sent Events so clients refresh instead of polling
//!
//! Each operation runs against a [`context::CoordinationContext`] carrying the
//! caller, the clock, and the collaborator handles; handlers in [`routes`]
//! only translate HTTP into those calls.
//!
//! # Usage
//!
//! ```rust,ignore
//! use nbrepo_server::{AppState, ServerConfig, routes};
//! use nbrepo_store::Store;
//!
//! let config = ServerConfig::from_env()?;
//! let app = routes::build_router(AppState::new(Store::in_memory(), config));
//! ```

pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod extract;
pub mod library;
pub mod middleware;
pub mod presence;
pub mod routes;
pub mod sharing;
pub mod state;
pub mod tags;
pub mod workspace;

// Re-exports for convenience
pub use config::{ConfigError, LogFormat, ServerConfig};
pub use context::CoordinationContext;
pub use error::{ApiError, ApiResult};
pub use events::EventBroadcaster;
pub use presence::{ActiveEditor, InMemoryPresence, PresenceMonitor};
pub use state::AppState;
pub use workspace::{FsWorkspace, Workspace, WorkspaceError};

// Re-export dependent crates
pub use nbrepo_core;
pub use nbrepo_store;
