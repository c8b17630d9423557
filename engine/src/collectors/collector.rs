use crate::{
    connection_pool::ConnectionPool,
    dispatch::{
        RawPayload,
        Submitter,
    },
    error::Result,
    metrics::StatRecord,
    retriever::RetryPolicy,
    source::ExporterMetrics,
    subsystem::Subsystem,
};
use futures::future::BoxFuture;
use std::sync::Arc;

/// What one collection cycle produced.
#[derive(Debug)]
pub enum Harvest {
    /// Decoded records, each entering the pipeline at the enrich stage.
    Records(Vec<StatRecord>),
    /// A raw payload still to be decoded by the pipeline.
    Payload(RawPayload),
}

/// Everything a collector may use during a cycle.
pub struct HarvestContext {
    pub instance: String,
    pub connections: Arc<ConnectionPool>,
    pub submitter: Submitter,
    pub metrics: Arc<dyn ExporterMetrics>,
    pub retry: RetryPolicy,
}

/// Trait for retrieving the stats of one subsystem
pub trait Collector: Send + Sync {
    fn subsystem(&self) -> Subsystem;

    /// Runs the retrieval part of a cycle. An error means nothing was
    /// collected and the subsystem backs off.
    fn harvest<'a>(&'a self, ctx: &'a HarvestContext) -> BoxFuture<'a, Result<Harvest>>;
}
