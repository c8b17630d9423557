use super::{
    CurState,
    ServiceStats,
};
use serde::Deserialize;

/// Stats of a load balancing virtual server from `/stat/lbvserver`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LbVServerStats {
    pub name: String,
    pub state: CurState,
    #[serde(default, rename = "avgcltttlb")]
    pub avg_time_client_ttlb: String,
    #[serde(default, rename = "vslbhealth")]
    pub health: String,
    #[serde(default, rename = "totalrequests")]
    pub total_requests: String,
    #[serde(default, rename = "totalresponses")]
    pub total_responses: String,
    #[serde(default, rename = "totalrequestbytes")]
    pub total_request_bytes: String,
    #[serde(default, rename = "totalresponsebytes")]
    pub total_response_bytes: String,
    #[serde(default, rename = "totcltttlbtransactions")]
    pub total_client_ttlb_transactions: String,
    #[serde(default, rename = "actsvcs")]
    pub active_services: String,
    #[serde(default, rename = "tothits")]
    pub total_hits: String,
    #[serde(default, rename = "totalpktsrecvd")]
    pub total_packets_received: String,
    #[serde(default, rename = "totalpktssent")]
    pub total_packets_sent: String,
    #[serde(default, rename = "surgecount")]
    pub surge_count: String,
    #[serde(default, rename = "svcsurgecount")]
    pub service_surge_count: String,
    #[serde(default, rename = "vsvrsurgecount")]
    pub vserver_surge_count: String,
    /// Bound services, only present when fetched with `statbindings=yes`.
    #[serde(default, rename = "service")]
    pub services: Vec<ServiceStats>,
}

impl LbVServerStats {
    pub const COUNTERS: [(&'static str, &'static str); 14] = [
        ("avg_client_ttlb", "Average time to last byte between the client and the virtual server"),
        ("health", "Percentage of UP services bound to the virtual server"),
        ("total_requests", "Total number of requests received by the virtual server"),
        ("total_responses", "Total number of responses sent by the virtual server"),
        ("total_request_bytes", "Total number of request bytes received by the virtual server"),
        ("total_response_bytes", "Total number of response bytes sent by the virtual server"),
        ("client_ttlb_transactions", "Total transactions where client TTLB was calculated"),
        ("active_services", "Number of ACTIVE services bound to the virtual server"),
        ("total_hits", "Total virtual server hits"),
        ("total_packets_received", "Total number of packets received by the virtual server"),
        ("total_packets_sent", "Total number of packets sent by the virtual server"),
        ("surge_count", "Number of requests waiting on the virtual server"),
        ("service_surge_count", "Total requests in the surge queues of all bound services"),
        ("vserver_surge_count", "Number of requests in the surge queue of the virtual server"),
    ];

    /// Raw counter values in the order of [`Self::COUNTERS`].
    pub fn counters(&self) -> [(&'static str, &str); 14] {
        let values = [
            &self.avg_time_client_ttlb,
            &self.health,
            &self.total_requests,
            &self.total_responses,
            &self.total_request_bytes,
            &self.total_response_bytes,
            &self.total_client_ttlb_transactions,
            &self.active_services,
            &self.total_hits,
            &self.total_packets_received,
            &self.total_packets_sent,
            &self.surge_count,
            &self.service_surge_count,
            &self.vserver_surge_count,
        ];
        std::array::from_fn(|i| (Self::COUNTERS[i].0, values[i].as_str()))
    }
}
