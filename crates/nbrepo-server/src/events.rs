//! Change notifications for connected clients.
//!
//! Library and sharing views are refreshed by reacting to these events
//! instead of polling. Each user gets one broadcast channel, created lazily
//! on the first subscription and dropped by [`EventBroadcaster::cleanup_empty_channels`]
//! once nobody listens.
//!
//! # Event Types
//!
//! - `library_changed`: a publication was added, edited, removed, or copied
//! - `sharing_changed`: a share the recipient takes part in changed
//! - `heartbeat`: keep-alive on idle streams
//! - `catchup`: the subscriber fell behind and should refetch its views

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use nbrepo_core::{PublicationId, ShareId, Username};
use serde::Serialize;
use tokio::sync::{RwLock, broadcast};

/// Default channel capacity for broadcast channels.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Keep-alive interval of the event stream, in seconds.
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;

// ============================================================================
// Event Types
// ============================================================================

/// An event delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RepoEvent {
    LibraryChanged {
        publication_id: PublicationId,
        action: LibraryAction,
        timestamp: DateTime<Utc>,
    },
    SharingChanged {
        share_id: ShareId,
        action: SharingAction,
        timestamp: DateTime<Utc>,
    },
    Heartbeat {
        timestamp: DateTime<Utc>,
    },
    Catchup {
        events_missed: u64,
        timestamp: DateTime<Utc>,
    },
}

impl RepoEvent {
    /// SSE `event:` name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::LibraryChanged { .. } => "library_changed",
            Self::SharingChanged { .. } => "sharing_changed",
            Self::Heartbeat { .. } => "heartbeat",
            Self::Catchup { .. } => "catchup",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LibraryAction {
    Published,
    Updated,
    Unpublished,
    Copied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SharingAction {
    Shared,
    Accepted,
    Declined,
    Removed,
}

// ============================================================================
// Event Broadcaster
// ============================================================================

/// Per-user broadcast channels.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    channels: Arc<RwLock<HashMap<Username, broadcast::Sender<RepoEvent>>>>,
    capacity: usize,
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            capacity,
        }
    }

    /// Subscribe to events addressed to `user`.
    pub async fn subscribe(&self, user: &Username) -> broadcast::Receiver<RepoEvent> {
        {
            let channels = self.channels.read().await;
            if let Some(sender) = channels.get(user) {
                return sender.subscribe();
            }
        }

        let mut channels = self.channels.write().await;
        // Another task may have created it between the two locks.
        if let Some(sender) = channels.get(user) {
            return sender.subscribe();
        }

        let (sender, receiver) = broadcast::channel(self.capacity);
        channels.insert(user.clone(), sender);
        tracing::debug!(user = %user, capacity = self.capacity, "Created event channel");
        receiver
    }

    /// Deliver an event to each listed user that has a channel.
    ///
    /// Returns the number of receivers reached.
    pub async fn publish_to(&self, users: &[Username], event: RepoEvent) -> usize {
        let channels = self.channels.read().await;
        let mut delivered = 0;
        for user in users {
            if let Some(sender) = channels.get(user) {
                delivered += sender.send(event.clone()).unwrap_or(0);
            }
        }
        tracing::trace!(event = event.name(), receivers = delivered, "Published event");
        delivered
    }

    /// Deliver an event to every subscriber.
    pub async fn publish_all(&self, event: RepoEvent) -> usize {
        let channels = self.channels.read().await;
        let delivered: usize = channels
            .values()
            .map(|sender| sender.send(event.clone()).unwrap_or(0))
            .sum();
        tracing::trace!(event = event.name(), receivers = delivered, "Broadcast event");
        delivered
    }

    pub async fn library_changed(
        &self,
        publication_id: PublicationId,
        action: LibraryAction,
        at: DateTime<Utc>,
    ) -> usize {
        self.publish_all(RepoEvent::LibraryChanged {
            publication_id,
            action,
            timestamp: at,
        })
        .await
    }

    pub async fn sharing_changed(
        &self,
        participants: &[Username],
        share_id: ShareId,
        action: SharingAction,
        at: DateTime<Utc>,
    ) -> usize {
        let event = RepoEvent::SharingChanged {
            share_id,
            action,
            timestamp: at,
        };
        self.publish_to(participants, event).await
    }

    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }

    pub async fn subscriber_count(&self, user: &Username) -> usize {
        let channels = self.channels.read().await;
        channels.get(user).map(|s| s.receiver_count()).unwrap_or(0)
    }

    /// Drop channels nobody listens to. Returns how many were dropped.
    pub async fn cleanup_empty_channels(&self) -> usize {
        let mut channels = self.channels.write().await;
        let before = channels.len();
        channels.retain(|user, sender| {
            let has_receivers = sender.receiver_count() > 0;
            if !has_receivers {
                tracing::debug!(user = %user, "Cleaning up empty event channel");
            }
            has_receivers
        });
        before - channels.len()
    }
}

// ============================================================================
// Tests
// ============================================================================
