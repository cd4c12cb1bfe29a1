//! Azure Blob bucket provisioner.
//!
//! Provisions Azure Blob containers or whole storage accounts on request,
//! encodes them as opaque bucket IDs, and issues time-limited SAS URLs
//! for access grants.

use std::sync::Arc;

pub mod bucket_id;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod lifecycle;
pub mod metrics;
pub mod parameters;
pub mod provisioner;
pub mod registry;
pub mod sas;
pub mod server;
pub mod storage;

use crate::config::Config;
use crate::provisioner::Provisioner;

/// Shared application state passed to all handlers via `axum::extract::State`.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    pub provisioner: Arc<Provisioner>,
}
