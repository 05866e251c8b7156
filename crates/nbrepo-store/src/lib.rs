//! nbrepo-store: storage layer for the notebook publication and sharing service
//!
//! This crate provides:
//! - PostgreSQL storage for users, publications, tags, shares, and invites
//! - An in-process backend with identical semantics for tests and development
//! - Embedded migrations
//!
//! # Usage
//!
//! ```rust,ignore
//! use nbrepo_store::{Store, StoreConfig};
//!
//! let config = StoreConfig::from_env()?;
//! let store = Store::connect(config).await?;
//!
//! let library = store.list_publications().await?;
//! ```

pub mod error;
mod memory;
pub mod models;
mod postgres;
pub mod schema;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use models::*;
pub use store::{Store, StoreConfig};

// Re-export nbrepo-core for downstream crates
pub use nbrepo_core;
