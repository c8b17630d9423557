use crate::source::ObjectKind;

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    /// The backend was unreachable or answered with a non-2xx status.
    #[error("request to {endpoint} failed: {reason}")]
    Transport { endpoint: String, reason: String },
    #[error("malformed {kind} payload: {source}")]
    Decode {
        kind: ObjectKind,
        #[source]
        source: serde_json::Error,
    },
    #[error("the dispatch pool is stopped")]
    PoolStopped,
    #[error("the dispatch queue is full")]
    QueueFull,
    #[error("fetch task for {kind} did not return a payload")]
    FetchFailed { kind: ObjectKind },
    #[error("failed to establish API session {index}: {reason}")]
    Connect { index: usize, reason: String },
    #[error("the connection pool needs at least one session")]
    EmptyPool,
    #[error("export of {name} failed: {reason}")]
    Export { name: String, reason: String },
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;

impl EngineError {
    pub fn transport(endpoint: impl ToString, reason: impl ToString) -> Self {
        Self::Transport {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Only transport failures are worth another attempt, a payload that did
    /// not decode once will not decode the next time either.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}
