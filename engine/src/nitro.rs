//! HTTP client for the NetScaler Nitro REST API.
//!
//! A client logs in once and keeps the session cookie for all later calls.

use crate::{
    error::{
        EngineError,
        Result,
    },
    source::{
        FetchOptions,
        ObjectKind,
        StatsSource,
        TopologySource,
    },
};
use bytes::Bytes;
use futures::future::BoxFuture;
use nitro_exporter_config::LbServerConfig;
use serde::{
    Deserialize,
    Serialize,
};
use url::Url;

#[derive(Serialize)]
struct LoginRequest<'a> {
    login: Credentials<'a>,
}

#[derive(Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct SvcBindings {
    #[serde(default)]
    svcbindings: Vec<SvcBinding>,
}

#[derive(Deserialize)]
struct SvcBinding {
    #[serde(default)]
    vservername: String,
}

#[derive(Debug, Clone)]
pub struct NitroClient {
    http: reqwest::Client,
    base: Url,
    instance: String,
}

impl NitroClient {
    pub fn new(config: &LbServerConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(config.http_timeout)
            .danger_accept_invalid_certs(config.ignore_cert)
            .build()
            .map_err(|err| EngineError::transport(&config.url, err))?;
        Ok(Self {
            http,
            base: config.url.clone(),
            instance: config.instance_name(),
        })
    }

    /// A client with an authenticated session.
    pub async fn connect(config: &LbServerConfig) -> Result<Self> {
        let client = Self::new(config)?;
        client.login(&config.user, &config.pass).await?;
        Ok(client)
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// `<base>/nitro/v1/<segments...>`, each segment percent-encoded.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.set_query(None);
        url.path_segments_mut()
            .map_err(|()| EngineError::transport(&self.base, "url cannot carry a path"))?
            .pop_if_empty()
            .extend(["nitro", "v1"])
            .extend(segments);
        Ok(url)
    }

    pub async fn login(&self, user: &str, pass: &str) -> Result<()> {
        let endpoint = self.endpoint(&["config", "login"])?;
        let body = LoginRequest {
            login: Credentials {
                username: user,
                password: pass,
            },
        };
        self.send(self.http.post(endpoint.clone()).json(&body), &endpoint).await?;
        debug!(instance = %self.instance, "logged in");
        Ok(())
    }

    pub async fn logout(&self) -> Result<()> {
        let endpoint = self.endpoint(&["config", "logout"])?;
        let body = serde_json::json!({ "logout": {} });
        self.send(self.http.post(endpoint.clone()).json(&body), &endpoint).await?;
        debug!(instance = %self.instance, "logged out");
        Ok(())
    }

    async fn get(&self, endpoint: Url) -> Result<Bytes> {
        self.send(self.http.get(endpoint.clone()), &endpoint).await
    }

    async fn send(&self, request: reqwest::RequestBuilder, endpoint: &Url) -> Result<Bytes> {
        let response = request
            .send()
            .await
            .map_err(|err| EngineError::transport(endpoint, err))?;
        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::transport(endpoint, format!("status {status}")));
        }
        response.bytes().await.map_err(|err| EngineError::transport(endpoint, err))
    }

    async fn stat_all(&self, kind: ObjectKind) -> Result<Bytes> {
        self.get(self.endpoint(&["stat", kind.as_ref()])?).await
    }

    async fn stat_one(&self, kind: ObjectKind, name: &str, options: FetchOptions) -> Result<Bytes> {
        let mut endpoint = self.endpoint(&["stat", kind.as_ref(), name])?;
        if options.with_bindings {
            endpoint.query_pairs_mut().append_pair("statbindings", "yes");
        }
        self.get(endpoint).await
    }

    async fn bound_vserver(&self, service: &str) -> Result<Option<String>> {
        let bytes = self.get(self.endpoint(&["config", "svcbindings", service])?).await?;
        let bindings: SvcBindings = serde_json::from_slice(&bytes).map_err(|source| EngineError::Decode {
            kind: ObjectKind::Service,
            source,
        })?;
        Ok(bindings
            .svcbindings
            .into_iter()
            .map(|binding| binding.vservername)
            .find(|name| !name.is_empty()))
    }
}

impl StatsSource for NitroClient {
    fn fetch_all(&self, kind: ObjectKind) -> BoxFuture<'_, Result<Bytes>> {
        Box::pin(self.stat_all(kind))
    }

    fn fetch_one<'a>(&'a self, kind: ObjectKind, name: &'a str, options: FetchOptions) -> BoxFuture<'a, Result<Bytes>> {
        Box::pin(self.stat_one(kind, name, options))
    }

    fn disconnect(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if let Err(err) = self.logout().await {
                warn!(instance = %self.instance, error = %err, "logout failed");
            }
        })
    }
}

impl TopologySource for NitroClient {
    fn lookup<'a>(&'a self, instance: &'a str, object_name: &'a str) -> BoxFuture<'a, Option<String>> {
        Box::pin(async move {
            match self.bound_vserver(object_name).await {
                Ok(found) => found,
                Err(err) => {
                    debug!(instance, service = object_name, error = %err, "service binding lookup failed");
                    None
                }
            }
        })
    }
}
