//! ProxyManager - lifecycle management for proxy instances.
//!
//! Each proxy binds its own port, forwards to its own target and owns an
//! isolated catalog. The manager is an explicit registry object; nothing is
//! held in process-wide state.

use crate::config::ConnectionPoolConfig;
use crate::notify::RetryPolicy;
use crate::proxy::{
    create_http_client, normalize_target, HttpClient, HttpForwarder, ProxyHandler, ProxyServer,
    ProxyState,
};
use hyper::Uri;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::info;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManagerError {
    #[error("port {0} is already in use by another proxy")]
    PortInUse(u16),
    #[error("no proxy on port {0}")]
    NotFound(u16),
    #[error("failed to bind {address}: {reason}")]
    Bind { address: String, reason: String },
    #[error("invalid server address '{0}'")]
    InvalidAddress(String),
    #[error("invalid target '{0}'")]
    InvalidTarget(String),
}

/// Request to create a proxy.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    /// Listen address, `http://host:port` or `host:port`; port 0 picks a free one
    pub server_address: String,
    /// Base URI matched requests are forwarded to
    pub target: String,
}

/// Description of a running proxy.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProxyInfo {
    pub port: u16,
    pub server_address: String,
    pub target: String,
    pub interactions: usize,
}

struct RunningProxy {
    info: ProxyInfo,
    handler: Arc<ProxyHandler>,
    shutdown_tx: broadcast::Sender<()>,
}

impl RunningProxy {
    fn info(&self) -> ProxyInfo {
        ProxyInfo {
            interactions: self.handler.state().catalog().len(),
            ..self.info.clone()
        }
    }
}

/// Manages the lifecycle of multiple proxies
pub struct ProxyManager {
    proxies: RwLock<HashMap<u16, RunningProxy>>,
    client: HttpClient,
    retry: RetryPolicy,
}

impl ProxyManager {
    pub fn new(pool: &ConnectionPoolConfig, retry: RetryPolicy) -> Self {
        Self {
            proxies: RwLock::new(HashMap::new()),
            client: create_http_client(pool),
            retry,
        }
    }

    /// Bind and start a proxy. Returns its description, including the port
    /// actually bound.
    pub async fn create_proxy(&self, config: ProxyConfig) -> Result<ProxyInfo, ManagerError> {
        let (host, port) = parse_server_address(&config.server_address)?;
        if port != 0 && self.proxies.read().contains_key(&port) {
            return Err(ManagerError::PortInUse(port));
        }

        let target = normalize_target(&config.target)
            .map_err(|_| ManagerError::InvalidTarget(config.target.clone()))?;
        let forwarder = HttpForwarder::new(self.client.clone(), &target)
            .map_err(|_| ManagerError::InvalidTarget(config.target.clone()))?;
        let handler = Arc::new(ProxyHandler::new(
            ProxyState::new(self.retry),
            Arc::new(forwarder),
        ));

        let server = ProxyServer::bind((host.as_str(), port), handler.clone())
            .await
            .map_err(|e| ManagerError::Bind {
                address: config.server_address.clone(),
                reason: e.to_string(),
            })?;
        let local_addr = server.local_addr();
        let port = local_addr.port();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let info = ProxyInfo {
            port,
            server_address: format!("http://{local_addr}"),
            target,
            interactions: 0,
        };

        {
            let mut proxies = self.proxies.write();
            if proxies.contains_key(&port) {
                return Err(ManagerError::PortInUse(port));
            }
            proxies.insert(
                port,
                RunningProxy {
                    info: info.clone(),
                    handler,
                    shutdown_tx,
                },
            );
        }
        server.spawn(shutdown_rx);

        info!("Proxy on port {} forwarding to {}", port, info.target);
        Ok(info)
    }

    /// Stop a proxy and drop its state.
    pub fn delete_proxy(&self, port: u16) -> Result<ProxyInfo, ManagerError> {
        let proxy = self
            .proxies
            .write()
            .remove(&port)
            .ok_or(ManagerError::NotFound(port))?;
        let _ = proxy.shutdown_tx.send(());
        info!("Proxy on port {} deleted", port);
        Ok(proxy.info())
    }

    pub fn delete_all(&self) -> Vec<ProxyInfo> {
        let drained: Vec<RunningProxy> = self.proxies.write().drain().map(|(_, p)| p).collect();
        let mut infos: Vec<ProxyInfo> = drained
            .into_iter()
            .map(|proxy| {
                let _ = proxy.shutdown_tx.send(());
                proxy.info()
            })
            .collect();
        infos.sort_by_key(|info| info.port);
        if !infos.is_empty() {
            info!("Deleted {} proxies", infos.len());
        }
        infos
    }

    pub fn get(&self, port: u16) -> Result<ProxyInfo, ManagerError> {
        self.proxies
            .read()
            .get(&port)
            .map(RunningProxy::info)
            .ok_or(ManagerError::NotFound(port))
    }

    /// Handler of a running proxy, for in-process access to its state.
    pub fn handler(&self, port: u16) -> Result<Arc<ProxyHandler>, ManagerError> {
        self.proxies
            .read()
            .get(&port)
            .map(|proxy| proxy.handler.clone())
            .ok_or(ManagerError::NotFound(port))
    }

    pub fn list(&self) -> Vec<ProxyInfo> {
        let mut infos: Vec<ProxyInfo> = self
            .proxies
            .read()
            .values()
            .map(RunningProxy::info)
            .collect();
        infos.sort_by_key(|info| info.port);
        infos
    }

    pub fn count(&self) -> usize {
        self.proxies.read().len()
    }

    pub fn shutdown(&self) {
        self.delete_all();
    }
}

impl Default for ProxyManager {
    fn default() -> Self {
        Self::new(&ConnectionPoolConfig::default(), RetryPolicy::default())
    }
}

/// Split `http://host:port` or `host:port` into host and port.
fn parse_server_address(address: &str) -> Result<(String, u16), ManagerError> {
    let invalid = || ManagerError::InvalidAddress(address.to_string());
    let with_scheme = if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{address}")
    };
    let uri: Uri = with_scheme.parse().map_err(|_| invalid())?;
    if uri.scheme_str() != Some("http") {
        return Err(invalid());
    }
    let authority = uri.authority().ok_or_else(invalid)?;
    let port = authority.port_u16().ok_or_else(invalid)?;
    let host = authority.host().trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(invalid());
    }
    Ok((host.to_string(), port))
}
