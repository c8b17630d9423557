use axum::{
    extract::State,
    http::{
        header,
        StatusCode,
    },
    response::{
        IntoResponse,
        Response,
    },
    routing::get,
    Router,
};
use nitro_exporter_engine::PrometheusExporter;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub exporter: Arc<PrometheusExporter>,
}

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Rendering the metrics failed: {0}")]
    Render(#[from] prometheus::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!(error = %self, "scrape failed");
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}

pub fn create_router(exporter: Arc<PrometheusExporter>) -> Router {
    let state = AppState { exporter };

    Router::new()
        .route("/metrics", get(metrics))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn metrics(State(state): State<AppState>) -> Result<Response, AppError> {
    let body = state.exporter.render()?;
    Ok(([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response())
}

async fn healthz() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use nitro_exporter_engine::{
        decode,
        source::{
            ExportSink,
            ExporterMetrics,
            ObjectKind,
        },
    };
    use pretty_assertions::assert_eq;
    use tokio::net::TcpListener;

    async fn serve(exporter: Arc<PrometheusExporter>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, create_router(exporter)).await.unwrap();
        });
        format!("http://{address}")
    }

    #[tokio::test]
    async fn scrape_returns_exported_series() {
        let exporter = Arc::new(PrometheusExporter::new().unwrap());
        let payload = br#"{"errorcode": 0, "service": [{"name": "svc-a", "state": "UP", "totalrequests": "9"}]}"#;
        let record = decode::decode(ObjectKind::Service, payload).unwrap().remove(0);
        exporter.export("ns1", &record).unwrap();
        exporter.api_collect_failure("ns1", "lbvserver");

        let base = serve(exporter).await;
        let response = reqwest::get(format!("{base}/metrics")).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(
            response.headers()[reqwest::header::CONTENT_TYPE],
            prometheus::TEXT_FORMAT
        );

        let body = response.text().await.unwrap();
        assert!(body.contains(r#"netscaler_service_state{ns_instance="ns1",service="svc-a",vip=""} 1"#));
        assert!(body.contains(
            r#"netscaler_exporter_api_collect_failures_total{ns_instance="ns1",subsystem="lbvserver"} 1"#
        ));
    }

    #[tokio::test]
    async fn health_check_answers_ok() {
        let base = serve(Arc::new(PrometheusExporter::new().unwrap())).await;
        let response = reqwest::get(format!("{base}/healthz")).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(response.text().await.unwrap(), "ok");
    }
}
