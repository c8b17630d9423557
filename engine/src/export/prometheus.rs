use crate::{
    error::{
        EngineError,
        Result,
    },
    metrics::{
        parse_counter,
        LbVServerStats,
        ServiceStats,
        StatRecord,
    },
    source::{
        ExportSink,
        ExporterMetrics,
    },
    subsystem::Subsystem,
};
use chrono::{
    DateTime,
    Utc,
};
use prometheus::{
    core::Collector,
    Encoder,
    GaugeVec,
    IntCounterVec,
    Opts,
    Registry,
    TextEncoder,
};
use std::{
    collections::HashMap,
    sync::{
        Mutex,
        PoisonError,
    },
};

const NAMESPACE: &str = "netscaler";

const LBVSERVER_LABELS: [&str; 2] = ["ns_instance", "lbvserver"];
const SERVICE_LABELS: [&str; 3] = ["ns_instance", "service", "vip"];
const BOUND_SERVICE_LABELS: [&str; 3] = ["ns_instance", "lbvserver", "service"];
const EXPORTER_LABELS: [&str; 2] = ["ns_instance", "subsystem"];

/// A gauge family per counter, in the order the record lists its counters.
struct GaugeFamily {
    state: GaugeVec,
    counters: Vec<GaugeVec>,
}

impl GaugeFamily {
    fn new(subsystem: &str, counters: &[(&str, &str)], labels: &[&str]) -> prometheus::Result<Self> {
        let state = GaugeVec::new(
            Opts::new("state", "Current state: 0 DOWN, 1 UP, 2 OUT OF SERVICE, 3 other")
                .namespace(NAMESPACE)
                .subsystem(subsystem),
            labels,
        )?;
        let counters = counters
            .iter()
            .map(|(name, help)| GaugeVec::new(Opts::new(*name, *help).namespace(NAMESPACE).subsystem(subsystem), labels))
            .collect::<prometheus::Result<Vec<_>>>()?;
        Ok(Self { state, counters })
    }

    fn collectors(&self) -> impl Iterator<Item = Box<dyn Collector>> + '_ {
        std::iter::once(&self.state)
            .chain(&self.counters)
            .map(|gauge| Box::new(gauge.clone()) as Box<dyn Collector>)
    }

    fn set<'a>(
        &self,
        labels: &[&str],
        state: f64,
        values: impl IntoIterator<Item = (&'static str, &'a str)>,
    ) -> prometheus::Result<()> {
        self.state.get_metric_with_label_values(labels)?.set(state);
        for (gauge, (_, raw)) in self.counters.iter().zip(values) {
            if let Some(value) = parse_counter(raw) {
                gauge.get_metric_with_label_values(labels)?.set(value);
            }
        }
        Ok(())
    }

    /// Drops a label set from every gauge of the family. Counters that were
    /// never set for it have nothing to remove.
    fn remove(&self, labels: &[&str]) {
        for gauge in std::iter::once(&self.state).chain(&self.counters) {
            gauge.remove_label_values(labels).ok();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Family {
    LbVServer,
    Service,
    BoundService,
}

impl Family {
    fn subsystem(self) -> Subsystem {
        match self {
            Self::LbVServer | Self::BoundService => Subsystem::LbVServer,
            Self::Service => Subsystem::Service,
        }
    }
}

/// Last export of one label set. The instance is always the first label.
type SeriesKey = (Family, Vec<String>);

/// Completion times of the two most recent cycles of a subsystem.
#[derive(Debug, Clone, Copy)]
struct CycleMarks {
    previous: Option<DateTime<Utc>>,
    latest: DateTime<Utc>,
}

/// Prometheus rendition of the stat records and of the exporter's own
/// failure counters. All instances share one registry.
pub struct PrometheusExporter {
    registry: Registry,
    lbvserver: GaugeFamily,
    service: GaugeFamily,
    bound_service: GaugeFamily,
    api_collect_failures: IntCounterVec,
    processing_failures: IntCounterVec,
    last_collection: GaugeVec,
    exported: Mutex<HashMap<SeriesKey, DateTime<Utc>>>,
    cycles: Mutex<HashMap<(String, String), CycleMarks>>,
}

impl PrometheusExporter {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        let lbvserver = GaugeFamily::new("lbvserver", &LbVServerStats::COUNTERS, &LBVSERVER_LABELS)?;
        let service = GaugeFamily::new("service", &ServiceStats::COUNTERS, &SERVICE_LABELS)?;
        let bound_service = GaugeFamily::new("lbvserver_service", &ServiceStats::COUNTERS, &BOUND_SERVICE_LABELS)?;

        let api_collect_failures = IntCounterVec::new(
            Opts::new("api_collect_failures_total", "Failed calls to the Nitro API")
                .namespace(NAMESPACE)
                .subsystem("exporter"),
            &EXPORTER_LABELS,
        )?;
        let processing_failures = IntCounterVec::new(
            Opts::new(
                "processing_failures_total",
                "Records lost in processing, by reason: abandoned, submission or decode",
            )
            .namespace(NAMESPACE)
            .subsystem("exporter"),
            &["ns_instance", "subsystem", "reason"],
        )?;
        let last_collection = GaugeVec::new(
            Opts::new(
                "last_collection_timestamp_seconds",
                "Unix time of the last successful collection cycle",
            )
            .namespace(NAMESPACE)
            .subsystem("exporter"),
            &EXPORTER_LABELS,
        )?;

        for family in [&lbvserver, &service, &bound_service] {
            for collector in family.collectors() {
                registry.register(collector)?;
            }
        }
        registry.register(Box::new(api_collect_failures.clone()))?;
        registry.register(Box::new(processing_failures.clone()))?;
        registry.register(Box::new(last_collection.clone()))?;

        Ok(Self {
            registry,
            lbvserver,
            service,
            bound_service,
            api_collect_failures,
            processing_failures,
            last_collection,
            exported: Mutex::default(),
            cycles: Mutex::default(),
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// All series in the Prometheus text format.
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|err| prometheus::Error::Msg(err.to_string()))
    }

    fn family(&self, family: Family) -> &GaugeFamily {
        match family {
            Family::LbVServer => &self.lbvserver,
            Family::Service => &self.service,
            Family::BoundService => &self.bound_service,
        }
    }

    fn export_at(&self, instance: &str, record: &StatRecord, at: DateTime<Utc>) -> prometheus::Result<()> {
        match record {
            StatRecord::VServer(server) => self.export_vserver(instance, server, at),
            StatRecord::Service(service) => self.export_service(instance, service, at),
        }
    }

    fn export_vserver(&self, instance: &str, server: &LbVServerStats, at: DateTime<Utc>) -> prometheus::Result<()> {
        let labels = [instance, server.name.as_str()];
        self.lbvserver.set(&labels, server.state.value(), server.counters())?;
        self.touch(Family::LbVServer, &labels, at);
        for service in &server.services {
            let labels = [instance, server.name.as_str(), service.name.as_str()];
            self.bound_service.set(&labels, service.state.value(), service.counters())?;
            self.touch(Family::BoundService, &labels, at);
        }
        Ok(())
    }

    fn export_service(&self, instance: &str, service: &ServiceStats, at: DateTime<Utc>) -> prometheus::Result<()> {
        let labels = [instance, service.name.as_str(), service.vip.as_str()];
        self.service.set(&labels, service.state.value(), service.counters())?;
        self.touch(Family::Service, &labels, at);
        Ok(())
    }

    fn touch(&self, family: Family, labels: &[&str], at: DateTime<Utc>) {
        let key = (family, labels.iter().map(|label| label.to_string()).collect());
        self.exported
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, at);
    }

    /// Marks a finished cycle and removes the subsystem's series that no
    /// export refreshed since the completion before the previous one.
    /// Exports of a cycle may land after its completion.
    fn complete_cycle(&self, instance: &str, subsystem: &str, at: DateTime<Utc>) {
        let threshold = {
            let mut cycles = self.cycles.lock().unwrap_or_else(PoisonError::into_inner);
            let key = (instance.to_string(), subsystem.to_string());
            match cycles.get_mut(&key) {
                Some(marks) => {
                    let threshold = marks.previous;
                    marks.previous = Some(marks.latest);
                    marks.latest = at;
                    threshold
                }
                None => {
                    cycles.insert(key, CycleMarks { previous: None, latest: at });
                    None
                }
            }
        };
        let Some(threshold) = threshold else {
            return;
        };

        let stale: Vec<SeriesKey> = {
            let mut exported = self.exported.lock().unwrap_or_else(PoisonError::into_inner);
            let stale: Vec<SeriesKey> = exported
                .iter()
                .filter(|((family, labels), last)| {
                    family.subsystem().as_ref() == subsystem
                        && labels.first().is_some_and(|first| first == instance)
                        && **last < threshold
                })
                .map(|(key, _)| key.clone())
                .collect();
            for key in &stale {
                exported.remove(key);
            }
            stale
        };
        for (family, labels) in &stale {
            let labels: Vec<&str> = labels.iter().map(String::as_str).collect();
            self.family(*family).remove(&labels);
        }
        if !stale.is_empty() {
            debug!(instance, subsystem, removed = stale.len(), "stale series removed");
        }
    }

    fn count_failure(&self, instance: &str, subsystem: &str, reason: &str) {
        self.processing_failures
            .with_label_values(&[instance, subsystem, reason])
            .inc();
    }
}

impl ExportSink for PrometheusExporter {
    fn export(&self, instance: &str, record: &StatRecord) -> Result<()> {
        self.export_at(instance, record, Utc::now()).map_err(|err| EngineError::Export {
            name: record.name().to_string(),
            reason: err.to_string(),
        })
    }
}

impl ExporterMetrics for PrometheusExporter {
    fn api_collect_failure(&self, instance: &str, subsystem: &str) {
        self.api_collect_failures
            .with_label_values(&[instance, subsystem])
            .inc();
    }

    fn target_abandoned(&self, instance: &str, subsystem: &str) {
        self.count_failure(instance, subsystem, "abandoned");
    }

    fn submission_failure(&self, instance: &str, subsystem: &str) {
        self.count_failure(instance, subsystem, "submission");
    }

    fn decode_failure(&self, instance: &str, subsystem: &str) {
        self.count_failure(instance, subsystem, "decode");
    }

    fn collection_completed(&self, instance: &str, subsystem: &str, at: DateTime<Utc>) {
        self.last_collection
            .with_label_values(&[instance, subsystem])
            .set(at.timestamp_millis() as f64 / 1000.0);
        self.complete_cycle(instance, subsystem, at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::CurState;

    fn service(name: &str, state: &str) -> ServiceStats {
        serde_json::from_value(serde_json::json!({
            "name": name,
            "state": state,
            "throughput": "12",
            "curclntconnections": "",
        }))
        .unwrap()
    }

    #[test]
    fn exports_vserver_with_bound_services() {
        let exporter = PrometheusExporter::new().unwrap();
        let mut server: LbVServerStats = serde_json::from_value(serde_json::json!({
            "name": "vs-web",
            "state": "UP",
            "totalrequests": "120",
        }))
        .unwrap();
        server.services.push(service("svc-a", "DOWN"));

        exporter.export("ns1", &StatRecord::VServer(server)).unwrap();
        let text = exporter.render().unwrap();

        assert!(text.contains(r#"netscaler_lbvserver_state{lbvserver="vs-web",ns_instance="ns1"} 1"#));
        assert!(text.contains(r#"netscaler_lbvserver_total_requests{lbvserver="vs-web",ns_instance="ns1"} 120"#));
        assert!(text.contains(r#"netscaler_lbvserver_service_state{lbvserver="vs-web",ns_instance="ns1",service="svc-a"} 0"#));
        assert!(text.contains(r#"netscaler_lbvserver_service_throughput{lbvserver="vs-web",ns_instance="ns1",service="svc-a"} 12"#));
        // empty counters are not exported
        assert!(!text.contains("netscaler_lbvserver_service_client_connections{"));
    }

    #[test]
    fn exports_service_with_vip_label() {
        let exporter = PrometheusExporter::new().unwrap();
        let mut stats = service("svc-a", "OUT OF SERVICE");
        stats.vip = "vs-web".to_string();
        assert_eq!(stats.state, CurState::OutOfService);

        exporter.export("ns1", &StatRecord::Service(stats)).unwrap();
        let text = exporter.render().unwrap();
        assert!(text.contains(r#"netscaler_service_state{ns_instance="ns1",service="svc-a",vip="vs-web"} 2"#));
    }

    #[test]
    fn series_missing_for_two_cycles_are_removed() {
        let exporter = PrometheusExporter::new().unwrap();
        let at = |seconds: i64| DateTime::<Utc>::from_timestamp(1_700_000_000 + seconds, 0).unwrap();
        let export = |instance: &str, name: &str, seconds: i64| {
            exporter
                .export_at(instance, &StatRecord::Service(service(name, "UP")), at(seconds))
                .unwrap();
        };
        let gauge = |instance: &str, name: &str| {
            format!(r#"netscaler_service_state{{ns_instance="{instance}",service="{name}",vip=""}}"#)
        };

        exporter.collection_completed("ns1", "service", at(0));
        export("ns1", "svc-a", 1);
        export("ns1", "svc-gone", 1);
        export("ns2", "svc-gone", 1);
        exporter.collection_completed("ns1", "service", at(2));
        export("ns1", "svc-a", 3);
        exporter.collection_completed("ns1", "service", at(4));

        // one missed cycle is not enough
        assert!(exporter.render().unwrap().contains(&gauge("ns1", "svc-gone")));

        export("ns1", "svc-a", 5);
        exporter.collection_completed("ns1", "service", at(6));

        let text = exporter.render().unwrap();
        assert!(!text.contains(&gauge("ns1", "svc-gone")));
        assert!(!text.contains(r#"netscaler_service_throughput{ns_instance="ns1",service="svc-gone""#));
        assert!(text.contains(&gauge("ns1", "svc-a")));
        // other instances keep their own series
        assert!(text.contains(&gauge("ns2", "svc-gone")));
    }

    #[test]
    fn failed_cycles_keep_the_last_values() {
        let exporter = PrometheusExporter::new().unwrap();
        exporter.export("ns1", &StatRecord::Service(service("svc-a", "UP"))).unwrap();
        // no completions while the appliance is unreachable, so nothing is swept
        exporter.api_collect_failure("ns1", "service");

        let text = exporter.render().unwrap();
        assert!(text.contains(r#"netscaler_service_state{ns_instance="ns1",service="svc-a",vip=""} 1"#));
    }

    #[test]
    fn counts_exporter_failures() {
        let exporter = PrometheusExporter::new().unwrap();
        exporter.api_collect_failure("ns1", "lbvserver_svc");
        exporter.api_collect_failure("ns1", "lbvserver_svc");
        exporter.target_abandoned("ns1", "lbvserver_svc");
        exporter.decode_failure("ns1", "service");

        let text = exporter.render().unwrap();
        assert!(text.contains(
            r#"netscaler_exporter_api_collect_failures_total{ns_instance="ns1",subsystem="lbvserver_svc"} 2"#
        ));
        assert!(text.contains(
            r#"netscaler_exporter_processing_failures_total{ns_instance="ns1",reason="abandoned",subsystem="lbvserver_svc"} 1"#
        ));
        assert!(text.contains(
            r#"netscaler_exporter_processing_failures_total{ns_instance="ns1",reason="decode",subsystem="service"} 1"#
        ));
    }
}
