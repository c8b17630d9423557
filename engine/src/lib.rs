//! # Nitro Exporter Engine
//!
//! The collection core of the exporter: it polls a NetScaler's Nitro stats
//! API for virtual servers and services and drives every returned object
//! through a staged pipeline into a metric sink.
//!
//! ## Architecture
//!
//! - **`guard`**: per-subsystem "skip, don't queue" reentrancy flag
//! - **`connection_pool`**: round-robin rotation of authenticated API sessions
//! - **`cache`**: lookup cache for topology metadata used during enrichment
//! - **`retriever`**: bounded-parallel per-target fetches with linear retry
//! - **`dispatch`**: fixed worker pool draining a bounded queue of typed tasks
//! - **`pipeline`**: the Fetch, Decode, Enrich and Export stages
//! - **`collectors`**: one collector per subsystem and the `Orchestrator`
//!   running their cycles
//! - **`scheduler`**: per-subsystem tickers honouring the backoff entries
//! - **`nitro`** and **`export`**: the concrete Nitro HTTP client and the
//!   Prometheus sink
//!
//! Each load balancer instance gets its own `Orchestrator` with its own pools.

#[macro_use]
extern crate scopeguard;

#[macro_use]
extern crate tracing;

pub mod backoff;
pub mod cache;
pub mod collectors;
pub mod connection_pool;
pub mod decode;
pub mod dispatch;
pub mod error;
pub mod export;
pub mod guard;
pub mod metrics;
pub mod nitro;
pub mod pipeline;
pub mod retriever;
pub mod scheduler;
pub mod source;
pub mod subsystem;

pub use collectors::{
    Collaborators,
    CycleOutcome,
    EngineSettings,
    Orchestrator,
};
pub use connection_pool::ConnectionPool;
pub use error::{
    EngineError,
    Result,
};
pub use export::PrometheusExporter;
pub use nitro::NitroClient;
pub use subsystem::Subsystem;
