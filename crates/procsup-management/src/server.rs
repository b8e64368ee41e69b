//! Worker side of the management channel.

use crate::protocol::{ManagementOp, ReadyResponse, StopResponse};
use async_trait::async_trait;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Operations a worker exposes to its supervisor.
#[async_trait]
pub trait ManagedWorker: Send + Sync + 'static {
    /// Answered on every ping; `false` reports the worker as unresponsive.
    async fn ping(&self) -> bool {
        true
    }

    async fn is_ready(&self) -> bool;

    /// Begin shutting down. Must return promptly; the supervisor observes
    /// the exit itself.
    async fn stop(&self);
}

/// Listens on the management port and dispatches to a [`ManagedWorker`].
pub struct ManagementServer {
    listener: TcpListener,
    object_name: Arc<str>,
    worker: Arc<dyn ManagedWorker>,
}

impl ManagementServer {
    /// Bind `host:port`. Port 0 picks a free port (see [`Self::local_addr`]).
    pub async fn bind(
        host: &str,
        port: u16,
        object_name: impl Into<String>,
        worker: Arc<dyn ManagedWorker>,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind((host, port)).await?;
        let object_name: Arc<str> = Arc::from(object_name.into());
        info!(
            "Management endpoint for {} listening on {}",
            object_name,
            listener.local_addr()?
        );
        Ok(Self {
            listener,
            object_name,
            worker,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until `cancel` fires. Open connections finish their current
    /// exchange and are then closed.
    pub async fn serve(self, cancel: CancellationToken) {
        loop {
            let (stream, peer) = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("Failed to accept management connection: {}", e);
                        continue;
                    }
                },
            };
            debug!("Management connection from {}", peer);

            let io = TokioIo::new(stream);
            let object_name = Arc::clone(&self.object_name);
            let worker = Arc::clone(&self.worker);
            let cancel = cancel.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let object_name = Arc::clone(&object_name);
                    let worker = Arc::clone(&worker);
                    async move { Ok::<_, Infallible>(route(req, &object_name, worker.as_ref()).await) }
                });

                let conn = http1::Builder::new().serve_connection(io, service);
                tokio::pin!(conn);
                let result = tokio::select! {
                    result = conn.as_mut() => result,
                    _ = cancel.cancelled() => {
                        conn.as_mut().graceful_shutdown();
                        conn.as_mut().await
                    }
                };
                if let Err(e) = result {
                    error!("Error serving management connection from {}: {}", peer, e);
                }
            });
        }
        debug!("Management endpoint for {} closed", self.object_name);
    }
}

async fn route(
    req: Request<Incoming>,
    object_name: &str,
    worker: &dyn ManagedWorker,
) -> Response<Full<Bytes>> {
    let Some(op) = ManagementOp::from_path(object_name, req.uri().path()) else {
        return plain(StatusCode::NOT_FOUND, "Unknown management object\n");
    };
    if req.method() != op.method() {
        return plain(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed\n");
    }

    match op {
        ManagementOp::Ping => {
            if worker.ping().await {
                plain(StatusCode::OK, "OK\n")
            } else {
                plain(StatusCode::SERVICE_UNAVAILABLE, "Unresponsive\n")
            }
        }
        ManagementOp::Ready => json(
            StatusCode::OK,
            &ReadyResponse {
                ready: worker.is_ready().await,
            },
        ),
        ManagementOp::Stop => {
            info!("Stop requested through management endpoint for {}", object_name);
            worker.stop().await;
            json(StatusCode::ACCEPTED, &StopResponse { accepted: true })
        }
    }
}

fn plain(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
}

fn json<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(body) {
        Ok(bytes) => {
            let mut response = Response::new(Full::new(Bytes::from(bytes)));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => {
            error!("Cannot encode management response: {}", e);
            plain(StatusCode::INTERNAL_SERVER_ERROR, "Encoding error\n")
        }
    }
}
