//! # Task Dispatch
//!
//! A bounded queue of typed pipeline tasks worked off by a fixed set of
//! workers. Each worker owns one API session from the connection pool, so
//! the worker count equals the session count.
//!
//! Handlers chain the next stage of a record by submitting a new task with
//! [`Submitter::try_submit`]; they never wait for the chained task.

mod pool;
mod task;

pub use pool::{
    DispatchPool,
    Submitter,
    TaskContext,
    TaskHandler,
};
pub use task::{
    Completion,
    FetchRequest,
    RawPayload,
    Stage,
    Task,
    TaskKind,
    TaskResult,
};
