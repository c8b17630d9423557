use crate::{
    error::{
        EngineError,
        Result,
    },
    source::StatsSource,
};
use futures::future::join_all;
use std::{
    fmt::Display,
    future::Future,
    sync::{
        Arc,
        Mutex,
        PoisonError,
    },
};

/// Fixed rotation of pre-established API sessions.
pub struct ConnectionPool {
    sessions: Vec<Arc<dyn StatsSource>>,
    cursor: Mutex<usize>,
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("sessions", &self.sessions.len())
            .finish_non_exhaustive()
    }
}

impl ConnectionPool {
    pub fn new(sessions: Vec<Arc<dyn StatsSource>>) -> Result<Self> {
        if sessions.is_empty() {
            return Err(EngineError::EmptyPool);
        }
        Ok(Self {
            sessions,
            cursor: Mutex::new(0),
        })
    }

    /// Establishes `size` sessions one after another. If any of them fails,
    /// the ones already established are disconnected again.
    pub async fn connect<F, Fut, S, E>(size: usize, mut factory: F) -> Result<Self>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = std::result::Result<S, E>>,
        S: StatsSource + 'static,
        E: Display,
    {
        let mut sessions: Vec<Arc<dyn StatsSource>> = Vec::with_capacity(size);
        for index in 0..size {
            match factory(index).await {
                Ok(session) => {
                    debug!(index, "api session established");
                    sessions.push(Arc::new(session));
                }
                Err(err) => {
                    join_all(sessions.iter().map(|session| session.disconnect())).await;
                    return Err(EngineError::Connect {
                        index,
                        reason: err.to_string(),
                    });
                }
            }
        }
        Self::new(sessions)
    }

    /// The next session in round-robin order.
    pub fn next(&self) -> Arc<dyn StatsSource> {
        let index = {
            let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
            let index = *cursor;
            *cursor = (index + 1) % self.sessions.len();
            index
        };
        trace!(index, "using api session");
        self.sessions[index].clone()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// All sessions in rotation order.
    pub fn sessions(&self) -> &[Arc<dyn StatsSource>] {
        &self.sessions
    }

    /// Closes every session. Only call once no task holds a session anymore.
    pub async fn shutdown(&self) {
        join_all(self.sessions.iter().map(|session| session.disconnect())).await;
        debug!(sessions = self.sessions.len(), "api sessions closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{
        FetchOptions,
        ObjectKind,
    };
    use bytes::Bytes;
    use futures::future::BoxFuture;
    use std::sync::atomic::{
        AtomicUsize,
        Ordering,
    };

    struct Tagged {
        tag: usize,
        disconnects: Arc<AtomicUsize>,
    }

    impl StatsSource for Tagged {
        fn fetch_all(&self, _kind: ObjectKind) -> BoxFuture<'_, Result<Bytes>> {
            let tag = self.tag;
            Box::pin(async move { Ok(Bytes::from(tag.to_string())) })
        }

        fn fetch_one<'a>(&'a self, kind: ObjectKind, _name: &'a str, _options: FetchOptions) -> BoxFuture<'a, Result<Bytes>> {
            self.fetch_all(kind)
        }

        fn disconnect(&self) -> BoxFuture<'_, ()> {
            Box::pin(async move {
                self.disconnects.fetch_add(1, Ordering::SeqCst);
            })
        }
    }

    fn tagged(tag: usize, disconnects: &Arc<AtomicUsize>) -> Tagged {
        Tagged {
            tag,
            disconnects: disconnects.clone(),
        }
    }

    #[tokio::test]
    async fn rotates_round_robin() {
        let disconnects = Arc::new(AtomicUsize::new(0));
        let pool = ConnectionPool::connect(3, |index| {
            let session = tagged(index, &disconnects);
            async move { Ok::<_, EngineError>(session) }
        })
        .await
        .unwrap();

        let mut seen = Vec::new();
        for _ in 0..7 {
            let bytes = pool.next().fetch_all(ObjectKind::Service).await.unwrap();
            seen.push(String::from_utf8(bytes.to_vec()).unwrap());
        }
        assert_eq!(seen, ["0", "1", "2", "0", "1", "2", "0"]);

        pool.shutdown().await;
        assert_eq!(disconnects.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failed_connect_closes_established_sessions() {
        let disconnects = Arc::new(AtomicUsize::new(0));
        let result = ConnectionPool::connect(4, |index| {
            let session = tagged(index, &disconnects);
            async move {
                if index == 2 {
                    Err("login refused")
                } else {
                    Ok(session)
                }
            }
        })
        .await;

        assert!(matches!(result, Err(EngineError::Connect { index: 2, .. })));
        assert_eq!(disconnects.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn empty_pool_is_rejected() {
        assert!(matches!(ConnectionPool::new(Vec::new()), Err(EngineError::EmptyPool)));
    }
}
