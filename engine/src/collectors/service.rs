use super::collector::{
    Collector,
    Harvest,
    HarvestContext,
};
use crate::{
    dispatch::{
        FetchRequest,
        RawPayload,
        Stage,
        Task,
        TaskResult,
    },
    error::{
        EngineError,
        Result,
    },
    source::ObjectKind,
    subsystem::Subsystem,
};
use futures::future::BoxFuture;

/// Fetches all services in one call through the dispatch pool and waits for
/// the payload; decoding happens in the pipeline.
#[derive(Debug, Default)]
pub struct ServiceCollector;

impl ServiceCollector {
    async fn collect(&self, ctx: &HarvestContext) -> Result<Harvest> {
        let kind = ObjectKind::Service;
        let (task, result) = Task::with_result(Stage::Fetch(FetchRequest::all(kind)));
        ctx.submitter.submit(task).await?;

        match result.await {
            Ok(TaskResult::Fetched(bytes)) => Ok(Harvest::Payload(RawPayload { kind, bytes })),
            _ => Err(EngineError::FetchFailed { kind }),
        }
    }
}

impl Collector for ServiceCollector {
    fn subsystem(&self) -> Subsystem {
        Subsystem::Service
    }

    fn harvest<'a>(&'a self, ctx: &'a HarvestContext) -> BoxFuture<'a, Result<Harvest>> {
        Box::pin(self.collect(ctx))
    }
}
