mod prometheus;

pub use self::prometheus::PrometheusExporter;
