use super::{
    collector::{
        Collector,
        Harvest,
        HarvestContext,
    },
    LbVServerCollector,
    ServiceCollector,
};
use crate::{
    backoff::{
        BackoffEntry,
        BackoffPolicy,
    },
    cache::LookupCache,
    connection_pool::ConnectionPool,
    dispatch::{
        DispatchPool,
        Task,
    },
    error::EngineError,
    guard::ReentrancyGuard,
    pipeline::Pipeline,
    retriever::RetryPolicy,
    source::{
        ExportSink,
        ExporterMetrics,
        TopologySource,
    },
    subsystem::Subsystem,
};
use chrono::Utc;
use nitro_exporter_config::LbServerConfig;
use std::{
    collections::HashMap,
    sync::Arc,
};
use tokio::time::Instant;
use tokio_util::task::TaskTracker;

/// Engine parameters for one load balancer instance.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub instance: String,
    pub queue_size: usize,
    pub retry: RetryPolicy,
    pub backoff: BackoffPolicy,
    pub subsystems: Vec<Subsystem>,
}

impl EngineSettings {
    pub fn from_config(config: &LbServerConfig) -> Self {
        Self {
            instance: config.instance_name(),
            queue_size: config.pool_worker_queue,
            retry: RetryPolicy {
                max_retries: config.max_retries,
                delay_unit: config.retry_delay_unit,
            },
            backoff: BackoffPolicy {
                interval: config.collection_interval,
                max_multiplier: config.backoff_max_multiplier,
            },
            subsystems: Subsystem::resolve(&config.metrics),
        }
    }
}

/// The engine's outbound collaborators.
#[derive(Clone)]
pub struct Collaborators {
    pub topology: Arc<dyn TopologySource>,
    pub sink: Arc<dyn ExportSink>,
    pub metrics: Arc<dyn ExporterMetrics>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Records were handed to the pipeline.
    Collected { submitted: usize },
    /// Another cycle of the same subsystem is still running.
    InProgress,
    /// The engine is shutting down.
    Stopping,
    Failed,
    Unregistered,
}

struct SubsystemSlot {
    collector: Box<dyn Collector>,
    guard: ReentrancyGuard,
    backoff: BackoffEntry,
}

impl SubsystemSlot {
    fn new(collector: Box<dyn Collector>) -> Self {
        Self {
            collector,
            guard: ReentrancyGuard::new(),
            backoff: BackoffEntry::new(),
        }
    }
}

fn collector_for(subsystem: Subsystem) -> Box<dyn Collector> {
    match subsystem {
        Subsystem::LbVServer => Box::new(LbVServerCollector),
        Subsystem::Service => Box::new(ServiceCollector),
    }
}

/// Runs the collection cycles of every registered subsystem of one
/// instance and owns the pools they share.
pub struct Orchestrator {
    instance: String,
    pool: DispatchPool,
    connections: Arc<ConnectionPool>,
    slots: HashMap<Subsystem, SubsystemSlot>,
    context: HarvestContext,
    metrics: Arc<dyn ExporterMetrics>,
    backoff: BackoffPolicy,
    cycles: TaskTracker,
}

impl Orchestrator {
    pub fn new(settings: EngineSettings, connections: ConnectionPool, collaborators: Collaborators) -> Self {
        let EngineSettings {
            instance,
            queue_size,
            retry,
            backoff,
            subsystems,
        } = settings;
        let Collaborators {
            topology,
            sink,
            metrics,
        } = collaborators;

        let connections = Arc::new(connections);
        let cache = Arc::new(LookupCache::new(topology));
        let pipeline = Pipeline::new(instance.clone(), cache, sink, metrics.clone());
        let pool = DispatchPool::start(instance.clone(), queue_size, &connections, Arc::new(pipeline));

        let slots = subsystems
            .into_iter()
            .map(collector_for)
            .map(|collector| (collector.subsystem(), SubsystemSlot::new(collector)))
            .collect();

        let context = HarvestContext {
            instance: instance.clone(),
            connections: connections.clone(),
            submitter: pool.submitter(),
            metrics: metrics.clone(),
            retry,
        };

        Self {
            instance,
            pool,
            connections,
            slots,
            context,
            metrics,
            backoff,
            cycles: TaskTracker::new(),
        }
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn subsystems(&self) -> Vec<Subsystem> {
        let mut subsystems: Vec<_> = self.slots.keys().copied().collect();
        subsystems.sort_by_key(|subsystem| subsystem.to_string());
        subsystems
    }

    /// Whether the subsystem's backoff allows a cycle now.
    pub fn is_due(&self, subsystem: Subsystem) -> bool {
        self.slots
            .get(&subsystem)
            .is_some_and(|slot| slot.backoff.is_ready(&self.backoff, Instant::now()))
    }

    pub fn consecutive_failures(&self, subsystem: Subsystem) -> u32 {
        self.slots
            .get(&subsystem)
            .map_or(0, |slot| slot.backoff.consecutive_failures())
    }

    /// One collection cycle. Returns immediately if the subsystem is already
    /// being collected.
    pub async fn collect(&self, subsystem: Subsystem) -> CycleOutcome {
        let Some(slot) = self.slots.get(&subsystem) else {
            warn!(instance = %self.instance, %subsystem, "subsystem is not registered");
            return CycleOutcome::Unregistered;
        };
        let Some(_permit) = slot.guard.try_acquire() else {
            info!(instance = %self.instance, %subsystem, "subsystem stat collection already in progress");
            return CycleOutcome::InProgress;
        };
        if self.pool.is_stopped() {
            info!(instance = %self.instance, %subsystem, "dispatch pool stopped, skipping collection");
            return CycleOutcome::Stopping;
        }

        debug!(instance = %self.instance, %subsystem, "collecting");
        let harvest = match slot.collector.harvest(&self.context).await {
            Ok(harvest) => harvest,
            Err(EngineError::PoolStopped) => {
                info!(instance = %self.instance, %subsystem, "dispatch pool stopped during collection");
                return CycleOutcome::Stopping;
            }
            Err(err) => {
                self.metrics.api_collect_failure(&self.instance, subsystem.as_ref());
                let consecutive = slot.backoff.record_failure();
                error!(instance = %self.instance, %subsystem, consecutive, error = %err, "stat collection failed");
                return CycleOutcome::Failed;
            }
        };

        let tasks: Vec<Task> = match harvest {
            Harvest::Records(records) => records.into_iter().map(Task::enrich).collect(),
            Harvest::Payload(payload) => vec![Task::decode(payload)],
        };

        let mut submitted = 0;
        for task in tasks {
            match self.pool.submit(task).await {
                Ok(()) => submitted += 1,
                Err(err) => {
                    self.metrics.submission_failure(&self.instance, subsystem.as_ref());
                    warn!(instance = %self.instance, %subsystem, error = %err, "failed to submit task");
                }
            }
        }

        slot.backoff.clear();
        self.metrics.collection_completed(&self.instance, subsystem.as_ref(), Utc::now());
        info!(instance = %self.instance, %subsystem, submitted, "subsystem stat collection completed");
        CycleOutcome::Collected { submitted }
    }

    /// Starts a cycle in the background. Overlapping triggers are skipped by
    /// the subsystem's guard.
    pub fn trigger(self: &Arc<Self>, subsystem: Subsystem) {
        let orchestrator = self.clone();
        self.cycles.spawn(async move {
            orchestrator.collect(subsystem).await;
        });
    }

    /// Resolves once every submitted pipeline task has finished.
    pub async fn wait_idle(&self) {
        self.pool.wait_idle().await;
    }

    pub fn stop(&self) {
        self.pool.stop();
    }

    /// Lets running cycles and queued tasks finish, then stops the workers
    /// and closes all API sessions.
    pub async fn shutdown(&self) {
        self.pool.stop();
        self.cycles.close();
        self.cycles.wait().await;
        self.pool.shutdown().await;
        self.connections.shutdown().await;
        info!(instance = %self.instance, "engine shut down");
    }
}
