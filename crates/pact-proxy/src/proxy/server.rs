//! ProxyServer: the accept loop of one proxy instance.
//!
//! Each accepted connection is served on its own task, and each request on
//! that connection goes through the shared `ProxyHandler`.

use super::handler::ProxyHandler;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// A bound proxy instance, ready to serve.
pub struct ProxyServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    handler: Arc<ProxyHandler>,
}

impl ProxyServer {
    /// Bind `addr`; port 0 lets the OS pick one.
    pub async fn bind<A: ToSocketAddrs>(addr: A, handler: Arc<ProxyHandler>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
            handler,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn handler(&self) -> &Arc<ProxyHandler> {
        &self.handler
    }

    /// Serve until a message arrives on `shutdown` (or its sender is dropped).
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let port = self.local_addr.port();
        info!("Proxy listening on {}", self.local_addr);
        info!("Proxying to {}", self.handler.target());

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, remote_addr)) => {
                            let handler = Arc::clone(&self.handler);
                            tokio::spawn(async move {
                                let io = TokioIo::new(stream);
                                let service = service_fn(move |req| {
                                    let handler = Arc::clone(&handler);
                                    async move { Ok::<_, Infallible>(handler.handle(req).await) }
                                });
                                if let Err(e) = http1::Builder::new()
                                    .serve_connection(io, service)
                                    .await
                                {
                                    debug!("Connection error from {} on port {}: {}", remote_addr, port, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Accept error on port {}: {}", port, e);
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("Proxy on port {} shutting down", port);
                    break;
                }
            }
        }
    }

    /// Run on a background task.
    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
