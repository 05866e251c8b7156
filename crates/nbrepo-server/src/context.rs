//! Per-operation coordination context.
//!
//! Every publication, sharing, tag, and presence operation takes a
//! [`CoordinationContext`] instead of reaching for shared globals. It carries
//! the caller, the clock, and handles to each collaborator.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use nbrepo_core::{Clock, Identity, Username};
use nbrepo_store::Store;

use crate::config::ServerConfig;
use crate::error::{ApiError, ApiResult};
use crate::events::EventBroadcaster;
use crate::presence::PresenceMonitor;
use crate::workspace::Workspace;

#[derive(Clone)]
pub struct CoordinationContext {
    pub(crate) identity: Option<Identity>,
    pub(crate) store: Arc<Store>,
    pub(crate) config: Arc<ServerConfig>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) presence: Arc<dyn PresenceMonitor>,
    pub(crate) workspace: Arc<dyn Workspace>,
    pub(crate) events: Arc<EventBroadcaster>,
}

impl CoordinationContext {
    /// The caller, if the request carried an identity.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// The caller, or `Unauthorized` for anonymous requests.
    pub fn caller(&self) -> ApiResult<&Identity> {
        self.identity
            .as_ref()
            .ok_or_else(|| ApiError::Unauthorized("authentication required".into()))
    }

    /// The caller, who must be an admin.
    pub fn admin(&self) -> ApiResult<&Identity> {
        let caller = self.caller()?;
        if !caller.admin {
            return Err(ApiError::Forbidden("admin privileges required".into()));
        }
        Ok(caller)
    }

    /// Fails with `Forbidden` unless the caller is `owner`.
    pub fn require_owner(&self, owner: &Username, what: &str) -> ApiResult<&Identity> {
        let caller = self.caller()?;
        if !caller.is(owner) {
            return Err(ApiError::Forbidden(format!("only the owner may {what}")));
        }
        Ok(caller)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn presence(&self) -> &dyn PresenceMonitor {
        self.presence.as_ref()
    }

    pub fn workspace(&self) -> &dyn Workspace {
        self.workspace.as_ref()
    }

    pub fn events(&self) -> &EventBroadcaster {
        &self.events
    }
}

impl std::fmt::Debug for CoordinationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinationContext")
            .field("identity", &self.identity)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;

    fn identity(name: &str, admin: bool) -> Identity {
        Identity::new(Username::parse(name).unwrap(), admin)
    }

    fn state() -> AppState {
        AppState::new(Store::in_memory(), ServerConfig::default())
    }

    #[test]
    fn test_anonymous_context_has_no_caller() {
        let ctx = state().context(None);
        assert!(matches!(ctx.caller(), Err(ApiError::Unauthorized(_))));
    }

    #[test]
    fn test_admin_check() {
        let state = state();
        assert!(state.context(Some(identity("root", true))).admin().is_ok());
        assert!(matches!(
            state.context(Some(identity("bob", false))).admin(),
            Err(ApiError::Forbidden(_))
        ));
    }

    #[test]
    fn test_owner_check() {
        let ctx = state().context(Some(identity("bob", false)));
        let alice = Username::parse("alice").unwrap();
        let err = ctx.require_owner(&alice, "unpublish this notebook").unwrap_err();
        assert_eq!(err.to_string(), "forbidden: only the owner may unpublish this notebook");
    }
}
