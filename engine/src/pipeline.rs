//! The four pipeline stages. Every record moves Fetch -> Decode -> Enrich ->
//! Export, each stage submitting the next one as an independent task. A
//! failing stage logs, counts and ends the record's journey.

use crate::{
    cache::LookupCache,
    decode,
    dispatch::{
        FetchRequest,
        RawPayload,
        Stage,
        Task,
        TaskContext,
        TaskHandler,
        TaskResult,
    },
    metrics::StatRecord,
    source::{
        ExportSink,
        ExporterMetrics,
    },
};
use futures::future::BoxFuture;
use std::sync::Arc;

pub struct Pipeline {
    instance: String,
    cache: Arc<LookupCache>,
    sink: Arc<dyn ExportSink>,
    metrics: Arc<dyn ExporterMetrics>,
}

impl Pipeline {
    pub fn new(
        instance: impl Into<String>,
        cache: Arc<LookupCache>,
        sink: Arc<dyn ExportSink>,
        metrics: Arc<dyn ExporterMetrics>,
    ) -> Self {
        Self {
            instance: instance.into(),
            cache,
            sink,
            metrics,
        }
    }

    /// Hands a follow-up stage to the pool without waiting for capacity.
    fn forward(&self, ctx: &TaskContext, task: Task, subsystem: &str) -> bool {
        let kind = task.kind();
        match ctx.submitter.try_submit(task) {
            Ok(()) => true,
            Err(err) => {
                self.metrics.submission_failure(&self.instance, subsystem);
                warn!(instance = %self.instance, subsystem, task = %kind, error = %err, "failed to submit task");
                false
            }
        }
    }

    async fn fetch(&self, request: FetchRequest, ctx: &TaskContext) -> TaskResult {
        let FetchRequest { kind, targets, options } = request;
        let subsystem = kind.as_ref();

        let single = match targets.as_slice() {
            [] => Some(ctx.session.fetch_all(kind).await),
            [target] => Some(ctx.session.fetch_one(kind, target, options).await),
            _ => None,
        };
        if let Some(fetched) = single {
            return match fetched {
                // a waiting caller takes the payload and decodes it itself
                Ok(bytes) if ctx.awaited => TaskResult::Fetched(bytes),
                Ok(bytes) => {
                    if self.forward(ctx, Task::decode(RawPayload { kind, bytes }), subsystem) {
                        TaskResult::Succeeded
                    } else {
                        TaskResult::Failed
                    }
                }
                Err(err) => {
                    // a waiting caller counts the failure itself
                    if !ctx.awaited {
                        self.metrics.api_collect_failure(&self.instance, subsystem);
                    }
                    warn!(instance = %self.instance, subsystem, error = %err, "fetch failed");
                    TaskResult::Failed
                }
            };
        }

        let mut failed = 0;
        for target in &targets {
            match ctx.session.fetch_one(kind, target, options).await {
                Ok(bytes) => {
                    if !self.forward(ctx, Task::decode(RawPayload { kind, bytes }), subsystem) {
                        failed += 1;
                    }
                }
                Err(err) => {
                    self.metrics.api_collect_failure(&self.instance, subsystem);
                    warn!(instance = %self.instance, subsystem, %target, error = %err, "fetch failed");
                    failed += 1;
                }
            }
        }
        if failed == 0 {
            TaskResult::Succeeded
        } else {
            TaskResult::Failed
        }
    }

    fn decode(&self, payload: RawPayload, ctx: &TaskContext) -> TaskResult {
        let subsystem = payload.kind.as_ref();
        let records = match decode::decode(payload.kind, &payload.bytes) {
            Ok(records) => records,
            Err(err) => {
                self.metrics.decode_failure(&self.instance, subsystem);
                warn!(instance = %self.instance, subsystem, error = %err, "decode failed");
                return TaskResult::Failed;
            }
        };
        debug!(instance = %self.instance, subsystem, records = records.len(), "payload decoded");

        let mut rejected = 0;
        for record in records {
            if !self.forward(ctx, Task::enrich(record), subsystem) {
                rejected += 1;
            }
        }
        if rejected == 0 {
            TaskResult::Succeeded
        } else {
            TaskResult::Failed
        }
    }

    /// Never fails by itself: a value the lookup cannot find is left empty.
    async fn enrich(&self, record: StatRecord, ctx: &TaskContext) -> TaskResult {
        let subsystem = record.subsystem();
        let record = match record {
            StatRecord::VServer(mut server) => {
                for service in &mut server.services {
                    service.vip = server.name.clone();
                }
                StatRecord::VServer(server)
            }
            StatRecord::Service(mut service) => {
                service.vip = self.cache.resolve(&self.instance, &service.name).await.unwrap_or_default();
                StatRecord::Service(service)
            }
        };

        if self.forward(ctx, Task::export(record), subsystem.as_ref()) {
            TaskResult::Succeeded
        } else {
            TaskResult::Failed
        }
    }

    fn export(&self, record: &StatRecord) -> TaskResult {
        match self.sink.export(&self.instance, record) {
            Ok(()) => {
                trace!(instance = %self.instance, subsystem = %record.subsystem(), name = record.name(), "record exported");
                TaskResult::Succeeded
            }
            Err(err) => {
                warn!(
                    instance = %self.instance,
                    subsystem = %record.subsystem(),
                    name = record.name(),
                    error = %err,
                    "export failed"
                );
                TaskResult::Failed
            }
        }
    }
}

impl TaskHandler for Pipeline {
    fn handle(&self, stage: Stage, ctx: TaskContext) -> BoxFuture<'_, TaskResult> {
        Box::pin(async move {
            match stage {
                Stage::Fetch(request) => self.fetch(request, &ctx).await,
                Stage::Decode(payload) => self.decode(payload, &ctx),
                Stage::Enrich(record) => self.enrich(record, &ctx).await,
                Stage::Export(record) => self.export(&record),
            }
        })
    }
}
