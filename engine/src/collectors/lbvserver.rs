use super::collector::{
    Collector,
    Harvest,
    HarvestContext,
};
use crate::{
    decode,
    error::Result,
    retriever::BatchRetriever,
    source::{
        FetchOptions,
        ObjectKind,
    },
    subsystem::{
        Subsystem,
        LBVSERVER_SVC_LABEL,
    },
};
use futures::future::BoxFuture;

/// Lists all virtual servers, then fetches each one with its bound services.
#[derive(Debug, Default)]
pub struct LbVServerCollector;

impl LbVServerCollector {
    async fn collect(&self, ctx: &HarvestContext) -> Result<Harvest> {
        let listing = ctx.connections.next().fetch_all(ObjectKind::LbVServer).await?;
        let names: Vec<String> = decode::lbvservers(&listing)?.into_iter().map(|server| server.name).collect();
        debug!(instance = %ctx.instance, subsystem = "lbvserver", count = names.len(), "virtual servers listed");

        let retriever = BatchRetriever::new(ctx.instance.clone(), LBVSERVER_SVC_LABEL, ctx.retry, ctx.metrics.clone());
        let connections = ctx.connections.clone();
        let outcome = retriever
            .retrieve(names, move |name| {
                let session = connections.next();
                async move {
                    let bytes = session
                        .fetch_one(ObjectKind::LbVServer, &name, FetchOptions::with_bindings())
                        .await?;
                    decode::decode(ObjectKind::LbVServer, &bytes)
                }
            })
            .await;

        if !outcome.abandoned.is_empty() {
            warn!(
                instance = %ctx.instance,
                subsystem = "lbvserver",
                abandoned = ?outcome.abandoned,
                "virtual servers left out of this cycle"
            );
        }
        Ok(Harvest::Records(outcome.records))
    }
}

impl Collector for LbVServerCollector {
    fn subsystem(&self) -> Subsystem {
        Subsystem::LbVServer
    }

    fn harvest<'a>(&'a self, ctx: &'a HarvestContext) -> BoxFuture<'a, Result<Harvest>> {
        Box::pin(self.collect(ctx))
    }
}
