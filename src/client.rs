//! Blocking client for a running render server

use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::debug;
use reqwest::blocking::Client;
use url::Url;

use crate::{Error, Method, RenderRequest, RenderResult, Result};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Sends render requests to a render server and decodes its answers
pub struct RenderClient {
    address: Url,
    http: Client,
}

impl RenderClient {
    /// Client for the server at `address` (e.g. `http://127.0.0.1:8888/`)
    pub fn new(address: &str) -> Result<Self> {
        // Renders may take the full load timeout plus settling.
        Self::with_timeout(address, Duration::from_secs(60))
    }

    pub fn with_timeout(address: &str, timeout: Duration) -> Result<Self> {
        let address = Url::parse(address)
            .map_err(|e| Error::ConfigError(format!("Invalid render server address '{}': {}", address, e)))?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::InitializationError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { address, http })
    }

    pub fn address(&self) -> &str {
        self.address.as_str()
    }

    /// Fail fast when nothing is listening at the server address
    pub fn ensure_service_up(&self) -> Result<()> {
        let host = self
            .address
            .host_str()
            .ok_or_else(|| Error::ConfigError(format!("No host in '{}'", self.address)))?;
        let port = self
            .address
            .port_or_known_default()
            .ok_or_else(|| Error::ConfigError(format!("No port in '{}'", self.address)))?;

        let addrs = (host, port)
            .to_socket_addrs()
            .map_err(|e| Error::NetworkError(format!("Failed to resolve {}:{}: {}", host, port, e)))?;

        for addr in addrs {
            if TcpStream::connect_timeout(&addr, Duration::from_secs(2)).is_ok() {
                return Ok(());
            }
        }
        Err(Error::NetworkError(format!(
            "Render server does not seem to be running at {}",
            self.address
        )))
    }

    /// Render `request` on the server
    pub fn render(&self, request: &RenderRequest) -> Result<RenderResult> {
        let request = with_form_content_type(request);
        debug!("Submitting {} {} to {}", request.method, request.url, self.address);

        let response = self
            .http
            .post(self.address.clone())
            .header(reqwest::header::CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(request.to_form())
            .send()
            .map_err(|e| Error::NetworkError(format!("Render request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| Error::NetworkError(format!("Failed to read render response: {}", e)))?;

        if !status.is_success() {
            return Err(Error::NetworkError(format!(
                "Render server answered {}: {}",
                status,
                body.trim()
            )));
        }

        RenderResult::from_wire(&body)
    }
}

/// POST navigations are sent as form submissions unless the caller chose a
/// content type.
fn with_form_content_type(request: &RenderRequest) -> RenderRequest {
    let mut request = request.clone();
    if request.method == Method::Post {
        let headers = request.headers.get_or_insert_with(Default::default);
        if !headers.keys().any(|k| k.eq_ignore_ascii_case("content-type")) {
            headers.insert("Content-Type".to_string(), FORM_CONTENT_TYPE.to_string());
        }
    }
    request
}
