//! Interfaces of the collaborators the engine drives: the stats API, the
//! topology mapping, the metric export sink and the exporter's own counters.

use crate::{
    error::Result,
    metrics::StatRecord,
};
use bytes::Bytes;
use chrono::{
    DateTime,
    Utc,
};
use futures::future::BoxFuture;
use strum::{
    AsRefStr,
    Display,
};

/// Nitro stat resource types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum ObjectKind {
    LbVServer,
    Service,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Return bound child objects inline (`statbindings=yes`).
    pub with_bindings: bool,
}

impl FetchOptions {
    pub fn with_bindings() -> Self {
        Self { with_bindings: true }
    }
}

/// One authenticated API session.
pub trait StatsSource: Send + Sync {
    /// Raw payload listing every object of `kind`.
    fn fetch_all(&self, kind: ObjectKind) -> BoxFuture<'_, Result<Bytes>>;

    /// Raw payload for a single named object.
    fn fetch_one<'a>(&'a self, kind: ObjectKind, name: &'a str, options: FetchOptions) -> BoxFuture<'a, Result<Bytes>>;

    /// Ends the session. Errors are logged by the implementation.
    fn disconnect(&self) -> BoxFuture<'_, ()>;
}

/// Where enrichment metadata comes from on a cache miss.
pub trait TopologySource: Send + Sync {
    /// The virtual server `object_name` is bound to, if known.
    fn lookup<'a>(&'a self, instance: &'a str, object_name: &'a str) -> BoxFuture<'a, Option<String>>;
}

/// Receives every fully enriched record.
pub trait ExportSink: Send + Sync {
    fn export(&self, instance: &str, record: &StatRecord) -> Result<()>;
}

/// Failure counters and liveness of the exporter itself, tagged by instance
/// and subsystem label.
pub trait ExporterMetrics: Send + Sync {
    fn api_collect_failure(&self, instance: &str, subsystem: &str);
    fn target_abandoned(&self, instance: &str, subsystem: &str);
    fn submission_failure(&self, instance: &str, subsystem: &str);
    fn decode_failure(&self, instance: &str, subsystem: &str);
    fn collection_completed(&self, instance: &str, subsystem: &str, at: DateTime<Utc>);
}
