//! Nitro stat payloads wrap the records in an object keyed by the resource
//! type, next to bookkeeping fields such as `errorcode` that are ignored.

use crate::{
    error::{
        EngineError,
        Result,
    },
    metrics::{
        LbVServerStats,
        ServiceStats,
        StatRecord,
    },
    source::ObjectKind,
};
use serde::Deserialize;

#[derive(Deserialize)]
struct LbVServerEnvelope {
    #[serde(default)]
    lbvserver: Vec<LbVServerStats>,
}

#[derive(Deserialize)]
struct ServiceEnvelope {
    #[serde(default)]
    service: Vec<ServiceStats>,
}

pub fn decode(kind: ObjectKind, bytes: &[u8]) -> Result<Vec<StatRecord>> {
    let records = match kind {
        ObjectKind::LbVServer => lbvservers(bytes)?.into_iter().map(StatRecord::VServer).collect(),
        ObjectKind::Service => services(bytes)?.into_iter().map(StatRecord::Service).collect(),
    };
    Ok(records)
}

pub fn lbvservers(bytes: &[u8]) -> Result<Vec<LbVServerStats>> {
    serde_json::from_slice::<LbVServerEnvelope>(bytes)
        .map(|envelope| envelope.lbvserver)
        .map_err(|source| EngineError::Decode {
            kind: ObjectKind::LbVServer,
            source,
        })
}

pub fn services(bytes: &[u8]) -> Result<Vec<ServiceStats>> {
    serde_json::from_slice::<ServiceEnvelope>(bytes)
        .map(|envelope| envelope.service)
        .map_err(|source| EngineError::Decode {
            kind: ObjectKind::Service,
            source,
        })
}
