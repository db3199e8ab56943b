//! The HTTP render server
//!
//! Accepts form-encoded POST requests, hands each decoded request to the
//! render worker and writes the encoded result back. Connections are served
//! one at a time and carry exactly one request: every answer is sent with
//! `Connection: close` and the socket is closed after it. Other methods are
//! dropped without a response.

use std::net::{SocketAddr, TcpListener as StdTcpListener};

use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONNECTION, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use log::{debug, info, warn};
use tokio::net::TcpListener;
use tokio::sync::Notify;

use crate::worker::RenderWorker;
use crate::{Error, RenderRequest, Result};

/// Where and how the server listens
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Larger request bodies are refused with 413
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8888,
            max_body_bytes: 8 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A bound render server
pub struct RenderServer {
    listener: StdTcpListener,
    worker: RenderWorker,
    config: ServerConfig,
    stop: Notify,
}

impl RenderServer {
    /// Bind the listening socket. Port 0 picks a free port.
    pub fn bind(config: ServerConfig, worker: RenderWorker) -> Result<Self> {
        let listener = StdTcpListener::bind(config.address())
            .map_err(|e| Error::NetworkError(format!("Failed to listen on {}: {}", config.address(), e)))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| Error::NetworkError(format!("Failed to configure listener: {}", e)))?;
        Ok(Self {
            listener,
            worker,
            config,
            stop: Notify::new(),
        })
    }

    /// The address actually bound
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr().ok()
    }

    /// Serve requests until `shutdown` is called
    pub fn run(&self) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::InitializationError(format!("Failed to start server runtime: {}", e)))?;
        runtime.block_on(self.serve())
    }

    /// Make `run` return once the current connection is done
    pub fn shutdown(&self) {
        self.stop.notify_one();
    }

    async fn serve(&self) -> Result<()> {
        let listener = self
            .listener
            .try_clone()
            .and_then(TcpListener::from_std)
            .map_err(|e| Error::NetworkError(format!("Failed to register listener: {}", e)))?;

        info!(
            "Render server listening on {}",
            self.local_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|| self.config.address())
        );

        let mut counter: u64 = 0;
        loop {
            let (stream, peer) = tokio::select! {
                _ = self.stop.notified() => break,
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                        continue;
                    }
                },
            };

            counter += 1;
            let number = counter;
            let service = service_fn(move |request| self.handle(request, number));
            if let Err(e) = http1::Builder::new()
                .keep_alive(false)
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                debug!("Connection {} from {} closed: {}", number, peer, e);
            }
        }

        info!("Render server stopped after {} requests", counter);
        Ok(())
    }

    async fn handle(&self, request: Request<Incoming>, number: u64) -> Result<Response<String>> {
        if request.method() != hyper::Method::POST {
            debug!("Ignoring {} {} (request {})", request.method(), request.uri(), number);
            // A service error makes hyper drop the connection without answering.
            return Err(Error::NetworkError(format!(
                "{} requests are not served",
                request.method()
            )));
        }

        debug!("Got request {}", number);

        let body = match Limited::new(request.into_body(), self.config.max_body_bytes)
            .collect()
            .await
        {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                info!(
                    "Rejecting request {}: body exceeds {} bytes",
                    number, self.config.max_body_bytes
                );
                return Ok(text_response(StatusCode::PAYLOAD_TOO_LARGE, "request body too large".to_string()));
            }
            Err(e) => {
                warn!("Failed to read request {}: {}", number, e);
                return Ok(text_response(
                    StatusCode::BAD_REQUEST,
                    format!("unreadable request body: {}", e),
                ));
            }
        };

        let render_request = match RenderRequest::from_form(&body) {
            Ok(r) => r,
            Err(e) => {
                info!("Rejecting request {}: {}", number, e);
                return Ok(text_response(StatusCode::BAD_REQUEST, e.to_string()));
            }
        };

        debug!(
            "Request {}: {} {} (headers: {}, cookies: {}, provokePageEvents: {})",
            number,
            render_request.method,
            render_request.url,
            render_request.headers.as_ref().map_or(0, |h| h.len()),
            render_request.cookies.as_ref().map_or(0, |c| c.len()),
            render_request.provoke_events
        );

        match self.worker.render(render_request).await {
            Ok(result) => {
                debug!(
                    "Request {} rendered ({:?}, {} bytes, {} alerts)",
                    number,
                    result.status,
                    result.html.len(),
                    result.alerts.len()
                );
                Ok(response(StatusCode::OK, "application/json", result.to_wire()))
            }
            Err(e) => {
                warn!("Render for request {} failed: {}", number, e);
                Ok(text_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
            }
        }
    }
}

fn response(status: StatusCode, content_type: &'static str, body: String) -> Response<String> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(CONNECTION, HeaderValue::from_static("close"));
    response
}

fn text_response(status: StatusCode, message: String) -> Response<String> {
    response(status, "text/plain; charset=utf-8", message)
}
