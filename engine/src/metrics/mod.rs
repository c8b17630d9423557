//! # Stat Records
//!
//! Typed records decoded from Nitro stat payloads. A record lives from the
//! decode stage until it is exported and is never persisted.
//!
//! - **`LbVServerStats`**: virtual server counters, optionally with bound services
//! - **`ServiceStats`**: service counters plus the `vip` enrichment field
//! - **`CurState`**: the state enumeration with its numeric gauge mapping

mod lbvserver;
mod service;
mod state;

pub use lbvserver::LbVServerStats;
pub use service::ServiceStats;
pub use state::CurState;

use crate::subsystem::Subsystem;

/// One decoded stat object travelling through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum StatRecord {
    VServer(LbVServerStats),
    Service(ServiceStats),
}

impl StatRecord {
    pub fn name(&self) -> &str {
        match self {
            Self::VServer(stats) => &stats.name,
            Self::Service(stats) => &stats.name,
        }
    }

    pub fn subsystem(&self) -> Subsystem {
        match self {
            Self::VServer(_) => Subsystem::LbVServer,
            Self::Service(_) => Subsystem::Service,
        }
    }
}

/// Nitro reports counters as strings; empty or non-numeric values are skipped.
pub fn parse_counter(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    raw.parse::<f64>().ok().filter(|value| value.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_counters() {
        assert_eq!(parse_counter("42"), Some(42.0));
        assert_eq!(parse_counter(" 1.5 "), Some(1.5));
        assert_eq!(parse_counter(""), None);
        assert_eq!(parse_counter("n/a"), None);
        assert_eq!(parse_counter("NaN"), None);
    }
}
