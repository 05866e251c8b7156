//! nbrepo-core: domain types for the notebook publication and sharing service.
//!
//! This crate provides:
//! - Typed identifiers for publications, shares, invites, and tags
//! - Validated names: usernames, tag labels, and workspace-relative notebook paths
//! - Publication quality levels and slug derivation
//! - The `Clock` abstraction used wherever the service reads the time
//!
//! Nothing in here performs I/O; the store and server crates build on it.

pub mod clock;
pub mod names;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use names::{NotebookPath, TagLabel, Username, ValueError, parse_label_list, slugify};
pub use types::{Identity, InviteId, PublicationId, Quality, ShareId, TagId};
