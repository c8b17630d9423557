#![allow(dead_code)]

use bytes::Bytes;
use chrono::{
    DateTime,
    Utc,
};
use futures::future::BoxFuture;
use nitro_exporter_engine::{
    backoff::BackoffPolicy,
    error::{
        EngineError,
        Result,
    },
    metrics::StatRecord,
    retriever::RetryPolicy,
    source::{
        ExportSink,
        ExporterMetrics,
        FetchOptions,
        ObjectKind,
        StatsSource,
        TopologySource,
    },
    Collaborators,
    ConnectionPool,
    EngineSettings,
    Orchestrator,
    Subsystem,
};
use std::{
    collections::HashMap,
    sync::{
        atomic::{
            AtomicUsize,
            Ordering,
        },
        Arc,
        Mutex,
    },
    time::Duration,
};
use tokio::sync::{
    Notify,
    Semaphore,
};

type Responder = dyn Fn(ObjectKind, Option<&str>) -> Result<Bytes> + Send + Sync;

/// Holds `fetch_all` calls until opened. An opened gate stays open.
#[derive(Clone)]
pub struct Gate {
    pub entered: Arc<Notify>,
    pub release: Arc<Semaphore>,
}

impl Gate {
    pub fn closed() -> Self {
        Self {
            entered: Arc::new(Notify::new()),
            release: Arc::new(Semaphore::new(0)),
        }
    }

    /// Opens the gate as soon as a call is waiting at it.
    pub async fn open_once_entered(&self) {
        self.entered.notified().await;
        self.release.add_permits(1);
    }
}

/// A stats source answering from a closure. Clones share call counters.
#[derive(Clone)]
pub struct MockSource {
    responder: Arc<Responder>,
    calls: Arc<Mutex<HashMap<String, usize>>>,
    disconnects: Arc<AtomicUsize>,
    gate: Option<Gate>,
}

impl MockSource {
    pub fn new(responder: impl Fn(ObjectKind, Option<&str>) -> Result<Bytes> + Send + Sync + 'static) -> Self {
        Self {
            responder: Arc::new(responder),
            calls: Arc::default(),
            disconnects: Arc::default(),
            gate: None,
        }
    }

    pub fn gated(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Calls for `kind`, or for one object of `kind` when `name` is given.
    pub fn calls(&self, kind: ObjectKind, name: Option<&str>) -> usize {
        self.calls.lock().unwrap().get(&call_key(kind, name)).copied().unwrap_or(0)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    fn respond(&self, kind: ObjectKind, name: Option<&str>) -> Result<Bytes> {
        *self.calls.lock().unwrap().entry(call_key(kind, name)).or_default() += 1;
        (self.responder)(kind, name)
    }
}

fn call_key(kind: ObjectKind, name: Option<&str>) -> String {
    match name {
        Some(name) => format!("{kind}/{name}"),
        None => kind.to_string(),
    }
}

impl StatsSource for MockSource {
    fn fetch_all(&self, kind: ObjectKind) -> BoxFuture<'_, Result<Bytes>> {
        Box::pin(async move {
            if let Some(gate) = &self.gate {
                gate.entered.notify_one();
                let _permit = gate.release.acquire().await.unwrap();
            }
            self.respond(kind, None)
        })
    }

    fn fetch_one<'a>(&'a self, kind: ObjectKind, name: &'a str, _options: FetchOptions) -> BoxFuture<'a, Result<Bytes>> {
        Box::pin(async move { self.respond(kind, Some(name)) })
    }

    fn disconnect(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        })
    }
}

/// Counts every exporter metric event by name and subsystem label.
#[derive(Default)]
pub struct RecordingMetrics {
    events: Mutex<Vec<(&'static str, String, String)>>,
}

impl RecordingMetrics {
    fn record(&self, event: &'static str, instance: &str, subsystem: &str) {
        self.events
            .lock()
            .unwrap()
            .push((event, instance.to_string(), subsystem.to_string()));
    }

    pub fn count(&self, event: &str, subsystem: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(e, _, s)| *e == event && s == subsystem)
            .count()
    }
}

impl ExporterMetrics for RecordingMetrics {
    fn api_collect_failure(&self, instance: &str, subsystem: &str) {
        self.record("api_collect_failure", instance, subsystem);
    }

    fn target_abandoned(&self, instance: &str, subsystem: &str) {
        self.record("target_abandoned", instance, subsystem);
    }

    fn submission_failure(&self, instance: &str, subsystem: &str) {
        self.record("submission_failure", instance, subsystem);
    }

    fn decode_failure(&self, instance: &str, subsystem: &str) {
        self.record("decode_failure", instance, subsystem);
    }

    fn collection_completed(&self, instance: &str, subsystem: &str, _at: DateTime<Utc>) {
        self.record("collection_completed", instance, subsystem);
    }
}

/// Keeps every exported record; fails or panics for the configured names.
#[derive(Default)]
pub struct RecordingSink {
    records: Mutex<Vec<StatRecord>>,
    fail_on: Vec<String>,
    panic_on: Vec<String>,
}

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

impl RecordingSink {
    pub fn failing_on(names: &[&str]) -> Self {
        Self {
            fail_on: owned(names),
            ..Self::default()
        }
    }

    pub fn panicking_on(names: &[&str]) -> Self {
        Self {
            panic_on: owned(names),
            ..Self::default()
        }
    }

    pub fn records(&self) -> Vec<StatRecord> {
        let mut records = self.records.lock().unwrap().clone();
        records.sort_by(|a, b| a.name().cmp(b.name()));
        records
    }

    pub fn names(&self) -> Vec<String> {
        self.records().iter().map(|record| record.name().to_string()).collect()
    }
}

impl ExportSink for RecordingSink {
    fn export(&self, _instance: &str, record: &StatRecord) -> Result<()> {
        if self.panic_on.iter().any(|name| name == record.name()) {
            panic!("sink blew up on {}", record.name());
        }
        if self.fail_on.iter().any(|name| name == record.name()) {
            return Err(EngineError::Export {
                name: record.name().to_string(),
                reason: "sink rejected record".to_string(),
            });
        }
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Fixed service to virtual server bindings that count their queries.
#[derive(Default)]
pub struct CountingTopology {
    bindings: HashMap<String, String>,
    queries: AtomicUsize,
}

impl CountingTopology {
    pub fn with(bindings: &[(&str, &str)]) -> Self {
        Self {
            bindings: bindings
                .iter()
                .map(|(service, vserver)| (service.to_string(), vserver.to_string()))
                .collect(),
            queries: AtomicUsize::new(0),
        }
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl TopologySource for CountingTopology {
    fn lookup<'a>(&'a self, _instance: &'a str, object_name: &'a str) -> BoxFuture<'a, Option<String>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let found = self.bindings.get(object_name).cloned();
        Box::pin(async move { found })
    }
}

pub fn transport_error(target: &str) -> EngineError {
    EngineError::transport(target, "connection reset by peer")
}

pub fn lbvserver_list(names: &[&str]) -> Bytes {
    let servers: Vec<_> = names
        .iter()
        .map(|name| serde_json::json!({ "name": name, "state": "UP" }))
        .collect();
    Bytes::from(serde_json::json!({ "errorcode": 0, "lbvserver": servers }).to_string())
}

pub fn lbvserver_detail(name: &str, services: &[&str]) -> Bytes {
    let services: Vec<_> = services
        .iter()
        .map(|service| serde_json::json!({ "name": service, "state": "UP", "throughput": "7" }))
        .collect();
    Bytes::from(
        serde_json::json!({
            "errorcode": 0,
            "lbvserver": [{ "name": name, "state": "UP", "totalrequests": "42", "service": services }]
        })
        .to_string(),
    )
}

pub fn service_list(services: &[(&str, &str)]) -> Bytes {
    let services: Vec<_> = services
        .iter()
        .map(|(name, state)| serde_json::json!({ "name": name, "state": state, "totalrequests": "3" }))
        .collect();
    Bytes::from(serde_json::json!({ "errorcode": 0, "service": services }).to_string())
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 3,
        delay_unit: Duration::from_millis(1),
    }
}

pub struct Engine {
    pub orchestrator: Arc<Orchestrator>,
    pub source: MockSource,
    pub sink: Arc<RecordingSink>,
    pub metrics: Arc<RecordingMetrics>,
    pub topology: Arc<CountingTopology>,
}

pub struct EngineBuilder {
    source: MockSource,
    sessions: usize,
    subsystems: Vec<Subsystem>,
    interval: Duration,
    sink: RecordingSink,
    topology: CountingTopology,
}

impl EngineBuilder {
    pub fn new(source: MockSource) -> Self {
        Self {
            source,
            sessions: 2,
            subsystems: vec![Subsystem::LbVServer, Subsystem::Service],
            interval: Duration::from_secs(3600),
            sink: RecordingSink::default(),
            topology: CountingTopology::default(),
        }
    }

    pub fn sessions(mut self, sessions: usize) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn subsystems(mut self, subsystems: &[Subsystem]) -> Self {
        self.subsystems = subsystems.to_vec();
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn sink(mut self, sink: RecordingSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn topology(mut self, topology: CountingTopology) -> Self {
        self.topology = topology;
        self
    }

    pub fn build(self) -> Engine {
        let sessions: Vec<Arc<dyn StatsSource>> = (0..self.sessions)
            .map(|_| Arc::new(self.source.clone()) as Arc<dyn StatsSource>)
            .collect();
        let connections = ConnectionPool::new(sessions).unwrap();

        let sink = Arc::new(self.sink);
        let metrics = Arc::new(RecordingMetrics::default());
        let topology = Arc::new(self.topology);
        let settings = EngineSettings {
            instance: "ns1".to_string(),
            queue_size: 64,
            retry: fast_retry(),
            backoff: BackoffPolicy {
                interval: self.interval,
                max_multiplier: 5,
            },
            subsystems: self.subsystems,
        };
        let collaborators = Collaborators {
            topology: topology.clone(),
            sink: sink.clone(),
            metrics: metrics.clone(),
        };

        Engine {
            orchestrator: Arc::new(Orchestrator::new(settings, connections, collaborators)),
            source: self.source,
            sink,
            metrics,
            topology,
        }
    }
}
