//! Supervisor side of the management channel.
//!
//! A `RemoteHandle` owns one persistent HTTP/1.1 connection to the worker.
//! Requests are serialized on it; once the connection breaks every call
//! fails with `ManagementChannel` and the handle is never reconnected.
//!
//! Each exchange runs on its own task. A caller that gives up on a call
//! (timeout, cancelled ping) only stops waiting; the exchange still
//! completes, so the connection is never left with a half-read response.

use crate::protocol::{ManagementEndpoint, ManagementOp, ReadyResponse};
use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::client::conn::http1::{self, SendRequest};
use hyper::header::{HOST, USER_AGENT};
use hyper::{Request, StatusCode};
use hyper_util::rt::TokioIo;
use procsup_common::{ProcessError, ProcessResult};
use procsup_monitoring::LivenessProbe;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const CLIENT_AGENT: &str = concat!("procsup/", env!("CARGO_PKG_VERSION"));

/// Connection to a worker's management object.
pub struct RemoteHandle {
    process_id: String,
    endpoint: ManagementEndpoint,
    sender: Arc<Mutex<SendRequest<Full<Bytes>>>>,
    connection_task: JoinHandle<()>,
}

impl std::fmt::Debug for RemoteHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteHandle")
            .field("process_id", &self.process_id)
            .field("endpoint", &self.endpoint)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl RemoteHandle {
    /// Resolve the endpoint, open the connection and complete the HTTP/1
    /// handshake. Not retried here; the caller owns the retry policy.
    pub async fn connect(
        process_id: impl Into<String>,
        endpoint: ManagementEndpoint,
    ) -> ProcessResult<Self> {
        let process_id = process_id.into();
        let connect_err =
            |reason: String| ProcessError::management_channel(&process_id, "connect", reason);

        let addrs: Vec<_> = tokio::net::lookup_host((endpoint.host.as_str(), endpoint.port))
            .await
            .map_err(|e| connect_err(format!("cannot resolve {}: {}", endpoint.authority(), e)))?
            .collect();
        if addrs.is_empty() {
            return Err(connect_err(format!(
                "no address for {}",
                endpoint.authority()
            )));
        }

        let mut last_error = None;
        let mut stream = None;
        for addr in &addrs {
            match TcpStream::connect(addr).await {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(e) => last_error = Some(e),
            }
        }
        let stream = match stream {
            Some(s) => s,
            None => {
                let reason = last_error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no reachable address".to_string());
                return Err(connect_err(format!("{}: {}", endpoint.authority(), reason)));
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Cannot set TCP_NODELAY for {}: {}", endpoint, e);
        }

        let (sender, connection) = http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| connect_err(format!("handshake failed: {}", e)))?;

        let driver_id = process_id.clone();
        let connection_task = tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!("Management connection for {} closed with error: {}", driver_id, e);
            } else {
                debug!("Management connection for {} closed", driver_id);
            }
        });

        debug!("Management channel for {} connected to {}", process_id, endpoint);

        Ok(Self {
            process_id,
            endpoint,
            sender: Arc::new(Mutex::new(sender)),
            connection_task,
        })
    }

    pub fn endpoint(&self) -> &ManagementEndpoint {
        &self.endpoint
    }

    /// True once the underlying connection has gone away.
    pub fn is_closed(&self) -> bool {
        self.connection_task.is_finished()
    }

    /// Liveness check; any non-200 answer is a failure.
    pub async fn ping(&self) -> ProcessResult<()> {
        let (status, _) = self.call(ManagementOp::Ping).await?;
        self.expect_status(ManagementOp::Ping, status, &[StatusCode::OK])
    }

    /// Whether the worker finished its own initialization.
    pub async fn is_ready(&self) -> ProcessResult<bool> {
        let (status, body) = self.call(ManagementOp::Ready).await?;
        self.expect_status(ManagementOp::Ready, status, &[StatusCode::OK])?;
        let response: ReadyResponse = serde_json::from_slice(&body).map_err(|e| {
            self.channel_error(ManagementOp::Ready, format!("invalid response body: {}", e))
        })?;
        Ok(response.ready)
    }

    /// Ask the worker to shut itself down. Returns once the request is
    /// accepted; the exit itself is observed elsewhere.
    pub async fn stop(&self) -> ProcessResult<()> {
        let (status, _) = self.call(ManagementOp::Stop).await?;
        self.expect_status(
            ManagementOp::Stop,
            status,
            &[StatusCode::OK, StatusCode::ACCEPTED],
        )
    }

    async fn call(&self, op: ManagementOp) -> ProcessResult<(StatusCode, Bytes)> {
        let request = Request::builder()
            .method(op.method())
            .uri(self.endpoint.path(op))
            .header(HOST, self.endpoint.authority())
            .header(USER_AGENT, CLIENT_AGENT)
            .body(Full::new(Bytes::new()))
            .map_err(|e| self.channel_error(op, format!("cannot build request: {}", e)))?;

        let sender = Arc::clone(&self.sender);
        let exchange = tokio::spawn(async move {
            // Held until the body is drained: HTTP/1 allows one exchange at a time
            let mut sender = sender.lock().await;
            sender
                .ready()
                .await
                .map_err(|e| format!("connection unavailable: {}", e))?;

            let response = sender
                .send_request(request)
                .await
                .map_err(|e| e.to_string())?;
            let status = response.status();
            let body = response
                .into_body()
                .collect()
                .await
                .map_err(|e| format!("cannot read response: {}", e))?
                .to_bytes();
            Ok::<_, String>((status, body))
        });

        let (status, body) = exchange
            .await
            .map_err(|e| self.channel_error(op, format!("exchange aborted: {}", e)))?
            .map_err(|reason| self.channel_error(op, reason))?;

        debug!("{} {} -> {}", op, self.endpoint, status);
        Ok((status, body))
    }

    fn expect_status(
        &self,
        op: ManagementOp,
        status: StatusCode,
        accepted: &[StatusCode],
    ) -> ProcessResult<()> {
        if accepted.contains(&status) {
            Ok(())
        } else {
            Err(self.channel_error(op, format!("unexpected status {}", status)))
        }
    }

    fn channel_error(&self, op: ManagementOp, reason: impl Into<String>) -> ProcessError {
        ProcessError::management_channel(&self.process_id, op.to_string(), reason)
    }
}

#[async_trait]
impl LivenessProbe for RemoteHandle {
    async fn probe(&self) -> ProcessResult<()> {
        self.ping().await
    }
}

impl Drop for RemoteHandle {
    fn drop(&mut self) {
        self.connection_task.abort();
    }
}
