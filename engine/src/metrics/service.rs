use super::CurState;
use serde::Deserialize;

/// Stats of a service, either from `/stat/service` or bound to a virtual
/// server when fetched with `statbindings=yes`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServiceStats {
    pub name: String,
    pub state: CurState,
    /// Virtual server the service is bound to. Filled in by the enrich stage.
    #[serde(skip)]
    pub vip: String,
    #[serde(default)]
    pub throughput: String,
    #[serde(default, rename = "avgsvrttfb")]
    pub avg_time_to_first_byte: String,
    #[serde(default, rename = "totalrequests")]
    pub total_requests: String,
    #[serde(default, rename = "totalresponses")]
    pub total_responses: String,
    #[serde(default, rename = "totalrequestbytes")]
    pub total_request_bytes: String,
    #[serde(default, rename = "totalresponsebytes")]
    pub total_response_bytes: String,
    #[serde(default, rename = "curclntconnections")]
    pub current_client_connections: String,
    #[serde(default, rename = "surgecount")]
    pub surge_count: String,
    #[serde(default, rename = "cursrvrconnections")]
    pub current_server_connections: String,
    #[serde(default, rename = "svrestablishedconn")]
    pub server_established_connections: String,
    #[serde(default, rename = "curreusepool")]
    pub current_reuse_pool: String,
    #[serde(default, rename = "maxclients")]
    pub max_clients: String,
    #[serde(default, rename = "curload")]
    pub current_load: String,
    #[serde(default, rename = "vsvrservicehits")]
    pub service_hits: String,
    #[serde(default, rename = "activetransactions")]
    pub active_transactions: String,
}

impl ServiceStats {
    pub const COUNTERS: [(&'static str, &'static str); 15] = [
        ("throughput", "Number of bytes received or sent by the service (Mbps)"),
        ("avg_ttfb", "Average time to first byte between the appliance and the server"),
        ("total_requests", "Total number of requests received by the service"),
        ("total_responses", "Total number of responses received by the service"),
        ("total_request_bytes", "Total number of request bytes received by the service"),
        ("total_response_bytes", "Total number of response bytes received by the service"),
        ("client_connections", "Number of current client connections"),
        ("surge_count", "Number of requests in the surge queue"),
        ("server_connections", "Number of current connections to the service"),
        ("server_established_connections", "Number of server connections in established state"),
        ("reuse_pool", "Number of requests in the idle queue/reuse pool"),
        ("max_clients", "Maximum open connections allowed on the service"),
        ("current_load", "Load on the service, calculated from the configured load monitor"),
        ("vserver_service_hits", "Number of times the service has been provided"),
        ("active_transactions", "Number of active transactions handled by the service"),
    ];

    /// Raw counter values in the order of [`Self::COUNTERS`].
    pub fn counters(&self) -> [(&'static str, &str); 15] {
        let values = [
            &self.throughput,
            &self.avg_time_to_first_byte,
            &self.total_requests,
            &self.total_responses,
            &self.total_request_bytes,
            &self.total_response_bytes,
            &self.current_client_connections,
            &self.surge_count,
            &self.current_server_connections,
            &self.server_established_connections,
            &self.current_reuse_pool,
            &self.max_clients,
            &self.current_load,
            &self.service_hits,
            &self.active_transactions,
        ];
        std::array::from_fn(|i| (Self::COUNTERS[i].0, values[i].as_str()))
    }
}
