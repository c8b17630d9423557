//! # Collectors
//!
//! One collector per subsystem plus the [`Orchestrator`] that runs their
//! cycles for a load balancer instance.
//!
//! - **`LbVServerCollector`**: lists virtual servers, then fetches each with
//!   its bound services through the batch retriever
//! - **`ServiceCollector`**: fetches all services in a single pooled call
//! - **`Orchestrator`**: guard, backoff and submission of the harvest into
//!   the dispatch pool

mod collector;
mod lbvserver;
mod orchestrator;
mod service;

pub use collector::{
    Collector,
    Harvest,
    HarvestContext,
};
pub use lbvserver::LbVServerCollector;
pub use orchestrator::{
    Collaborators,
    CycleOutcome,
    EngineSettings,
    Orchestrator,
};
pub use service::ServiceCollector;
