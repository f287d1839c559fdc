//! HTTP transport and graceful shutdown.
//!
//! hyper owns the sockets. Each request is read in full and handed to the
//! [`Dispatcher`] on a blocking worker, which owns it until the response.
//!
//! On SIGTERM or Ctrl-C the server stops accepting, lets every in-flight
//! connection finish, then returns from [`Server::serve`]. Keep the pod's
//! `terminationGracePeriodSeconds` above the slowest request.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::dispatcher::Dispatcher;
use crate::error::Error;
use crate::method::Method;
use crate::request::Request;
use crate::response::Response;

/// The HTTP server.
pub struct Server {
    addr: SocketAddr,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    pub fn bind(addr: SocketAddr) -> Self {
        Self { addr }
    }

    /// Starts accepting connections and dispatching them through `dispatcher`.
    ///
    /// Returns only after a full graceful shutdown (SIGTERM or Ctrl-C,
    /// followed by all in-flight requests completing).
    pub async fn serve(self, dispatcher: Dispatcher) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        let dispatcher = Arc::new(dispatcher);

        info!(addr = %self.addr, "paydesk listening");

        // Every connection task is tracked so shutdown can wait for them.
        let mut tasks = tokio::task::JoinSet::new();

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // Check shutdown first so a SIGTERM stops accepting immediately.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let dispatcher = Arc::clone(&dispatcher);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |req| {
                            let dispatcher = Arc::clone(&dispatcher);
                            async move { serve_request(dispatcher, req, remote_addr).await }
                        });

                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet stays small.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("paydesk stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Reads one request off the connection and runs it through the dispatcher
/// on a blocking worker. Never returns an error to hyper.
async fn serve_request(
    dispatcher: Arc<Dispatcher>,
    req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
) -> Result<http::Response<Full<Bytes>>, std::convert::Infallible> {
    let Ok(method) = Method::try_from(req.method()) else {
        return Ok(Response::status(StatusCode::METHOD_NOT_ALLOWED).into_http());
    };
    let request = match read_request(method, req).await {
        Ok(r) => r,
        Err(e) => {
            warn!(peer = %remote_addr, "failed to read request body: {e}");
            return Ok(Response::status(StatusCode::BAD_REQUEST).into_http());
        }
    };

    // The dispatcher is synchronous; one blocking worker owns the request
    // from here to the response.
    let response = match tokio::task::spawn_blocking(move || dispatcher.handle(request)).await {
        Ok(response) => response,
        Err(e) => {
            error!(severity = "critical", peer = %remote_addr, "dispatch worker failed: {e}");
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .text("500 Internal Server Error")
        }
    };
    Ok(response.into_http())
}

async fn read_request(method: Method, req: hyper::Request<Incoming>) -> Result<Request, hyper::Error> {
    let (parts, body) = req.into_parts();
    let body = body.collect().await?.to_bytes();

    let mut request = Request::new(method, parts.uri.path());
    if let Some(query) = parts.uri.query() {
        request = request.with_query(query);
    }
    for (name, value) in &parts.headers {
        match value.to_str() {
            Ok(v) => request = request.with_header(name.as_str(), v),
            Err(_) => warn!(header = %name, "skipping non-ASCII request header"),
        }
    }
    Ok(request.with_body(body.to_vec()))
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** (sent by `kubectl` and the
/// Kubernetes control plane) and **SIGINT** (Ctrl-C, for local dev).
/// On Windows only Ctrl-C is available.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    // `pending()` never resolves, so on non-Unix platforms the SIGTERM arm
    // is disabled.
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
