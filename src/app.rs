use crate::server::create_router;
use color_eyre::{
    eyre::Context,
    Result,
};
use futures::future::join_all;
use nitro_exporter_config::{
    Config,
    LbServerConfig,
};
use nitro_exporter_engine::{
    scheduler,
    Collaborators,
    ConnectionPool,
    EngineSettings,
    NitroClient,
    Orchestrator,
    PrometheusExporter,
};
use std::sync::Arc;
use tokio::{
    net::TcpListener,
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

/// One polled appliance: its engine plus the session used for binding lookups.
struct Instance {
    orchestrator: Arc<Orchestrator>,
    topology: Arc<NitroClient>,
}

impl Instance {
    async fn start(config: &LbServerConfig, exporter: &Arc<PrometheusExporter>) -> Result<Self> {
        let instance = config.instance_name();
        let connections = ConnectionPool::connect(config.pool_workers, |_| NitroClient::connect(config))
            .await
            .wrap_err_with(|| format!("Failed to open the api sessions for {instance}"))?;
        let topology = match NitroClient::connect(config).await {
            Ok(client) => Arc::new(client),
            Err(err) => {
                connections.shutdown().await;
                return Err(err).wrap_err_with(|| format!("Failed to open the lookup session for {instance}"));
            }
        };

        let collaborators = Collaborators {
            topology: topology.clone(),
            sink: exporter.clone(),
            metrics: exporter.clone(),
        };
        let orchestrator = Orchestrator::new(EngineSettings::from_config(config), connections, collaborators);
        info!(%instance, subsystems = ?orchestrator.subsystems(), "engine started");

        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            topology,
        })
    }

    async fn shutdown(&self) {
        self.orchestrator.shutdown().await;
        if let Err(err) = self.topology.logout().await {
            warn!(instance = %self.orchestrator.instance(), error = %err, "logout failed");
        }
    }
}

/// Starts one engine per configured appliance and serves `/metrics` until
/// interrupted.
pub async fn run(config: Config) -> Result<()> {
    let exporter = Arc::new(PrometheusExporter::new().wrap_err("Failed to register the metrics")?);
    let cancel = CancellationToken::new();

    let mut instances: Vec<Instance> = Vec::with_capacity(config.lbservers.len());
    let mut tickers: Vec<JoinHandle<()>> = Vec::new();
    for lbserver in &config.lbservers {
        let instance = match Instance::start(lbserver, &exporter).await {
            Ok(instance) => instance,
            Err(err) => {
                cancel.cancel();
                join_all(tickers).await;
                join_all(instances.iter().map(|instance| instance.shutdown())).await;
                return Err(err);
            }
        };
        tickers.extend(scheduler::spawn(
            &instance.orchestrator,
            lbserver.collection_interval,
            &cancel,
        ));
        instances.push(instance);
    }

    let served = serve(&config, exporter, cancel.clone()).await;

    cancel.cancel();
    join_all(tickers).await;
    join_all(instances.iter().map(|instance| instance.shutdown())).await;
    info!("exporter stopped");
    served
}

async fn serve(config: &Config, exporter: Arc<PrometheusExporter>, cancel: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(config.listen_address)
        .await
        .wrap_err_with(|| format!("Failed to listen on {}", config.listen_address))?;
    info!("listening on {}", config.listen_address);

    axum::serve(listener, create_router(exporter))
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await
        .wrap_err("The metrics server failed")
}

async fn shutdown_signal(cancel: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                error!(error = %err, "failed to listen for ctrl-c");
            }
            info!("shutting down");
        }
        _ = cancel.cancelled() => {}
    }
}
