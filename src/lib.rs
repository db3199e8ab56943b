//! render-proxy
//!
//! An HTTP rendering proxy for reflected-XSS detection. A caller describes an
//! HTTP request (URL, method, body, headers, cookies); the proxy performs that
//! navigation in a headless browser, records what the loaded page does
//! (uncaught errors, console output, `alert`/`confirm`/`prompt` dialogs) and
//! answers with the final document plus the captured side effects.
//!
//! # Features
//!
//! - **CDP Backend** (default): Chrome driven over the DevTools protocol
//! - **Adapter-based engine**: sessions only talk to the [`Engine`] and
//!   [`Page`] traits, so tests and other backends can stand in for Chrome
//! - **Permissive on purpose**: pages run with web security and injection
//!   auditing disabled so injected payloads execute instead of being filtered
//!
//! # Example
//!
//! ```no_run
//! use render_proxy::{EngineConfig, RenderRequest, SessionOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = render_proxy::new_engine(EngineConfig::default())?;
//! let request = RenderRequest::get("http://127.0.0.1/demo?html=%3Cscript%3Ealert(1)%3C/script%3E");
//! let result = render_proxy::render(&engine, &request, &SessionOptions::default())?;
//! println!("alerts: {:?}", result.alerts);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

pub mod error;
pub use error::{DecodeError, Error, Result};

pub mod capture;
pub mod codec;
pub mod provoke;
pub mod request;
pub mod response;
pub mod server;
pub mod session;
pub mod worker;

#[cfg(feature = "cdp")]
pub mod cdp;

#[cfg(feature = "client")]
pub mod client;

pub use capture::{Captured, EventLog, Observer, Observers, PageEventKind};
pub use request::{CookieExpiry, CookieRecord, Method, RenderRequest};
pub use response::{RenderResult, RenderStatus};
pub use server::{RenderServer, ServerConfig};
pub use session::{render, RenderSession, SessionOptions, SessionState};
pub use worker::RenderWorker;

#[cfg(feature = "client")]
pub use client::RenderClient;

/// Security-relevant page settings.
///
/// The defaults are deliberately permissive: the proxy exists to find out
/// whether an injected value executes, and every engine-side mitigation left
/// on turns a real finding into a false negative.
///
/// # Examples
///
/// ```
/// let settings = render_proxy::PageSettings::default();
/// assert!(settings.scripts_enabled);
/// assert!(!settings.web_security_enabled);
/// assert!(!settings.injection_auditing_enabled);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSettings {
    /// Execute page scripts
    pub scripts_enabled: bool,
    /// Load images (payloads often hang off `<img onerror>`)
    pub images_enabled: bool,
    /// Allow local documents to load remote resources
    pub cross_origin_enabled: bool,
    /// Enforce same-origin policy and CSP
    pub web_security_enabled: bool,
    /// Run the engine's reflected-script auditor, if it has one
    pub injection_auditing_enabled: bool,
}

impl PageSettings {
    /// Every mitigation off, scripts and subresources on
    pub const fn permissive() -> Self {
        Self {
            scripts_enabled: true,
            images_enabled: true,
            cross_origin_enabled: true,
            web_security_enabled: false,
            injection_auditing_enabled: false,
        }
    }
}

impl Default for PageSettings {
    fn default() -> Self {
        Self::permissive()
    }
}

/// Configuration for the headless engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Settings applied to every page; process-level ones are fixed at launch
    pub settings: PageSettings,
    /// Viewport dimensions
    pub viewport: Viewport,
    /// User agent override; the engine default is kept when `None`
    pub user_agent: Option<String>,
    /// Browser executable; discovered automatically when `None`
    pub chrome_path: Option<PathBuf>,
    /// Run the browser inside its own sandbox
    pub sandbox: bool,
    /// Empty the browser cookie store when each session starts and ends, so
    /// cookies installed for one render never reach another
    pub isolate_cookies: bool,
    /// How long the browser connection may sit idle between renders
    pub browser_idle_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            settings: PageSettings::permissive(),
            viewport: Viewport::default(),
            user_agent: None,
            chrome_path: None,
            sandbox: true,
            isolate_cookies: true,
            browser_idle_timeout_ms: 24 * 60 * 60 * 1000,
        }
    }
}

/// Viewport dimensions
#[derive(Debug, Clone, Copy)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// The navigation a page is asked to perform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub url: String,
    pub method: Method,
    /// Request body; `Some` exactly when `method` is POST
    pub payload: Option<String>,
}

impl Navigation {
    pub fn from_request(request: &RenderRequest) -> Self {
        Self {
            url: request.url.clone(),
            method: request.method,
            payload: request.payload().map(str::to_string),
        }
    }
}

/// How a page load ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    /// The document finished loading
    Success,
    /// The engine reported a failed load; content may still be partial
    Fail(String),
}

/// Result of JavaScript execution
///
/// `value` is the serialized result of the evaluation (usually a JSON-like
/// string). `is_error` indicates whether the script threw an exception.
#[derive(Debug, Clone)]
pub struct ScriptResult {
    /// Serialized result value
    pub value: String,
    /// Whether the script threw an error
    pub is_error: bool,
}

/// A headless browser able to hand out isolated pages
pub trait Engine {
    type Page: Page;

    /// Create a fresh page configured with `settings`
    fn new_page(&self, settings: &PageSettings) -> Result<Self::Page>;
}

/// One browser page, used for exactly one navigation
pub trait Page {
    /// Register the observer for one kind of page event, replacing any
    /// previous one. Observers may be called from engine threads.
    fn observe(&mut self, kind: PageEventKind, observer: Observer);

    /// Observe uncaught script errors
    fn on_error(&mut self, observer: Observer) {
        self.observe(PageEventKind::Error, observer)
    }

    /// Observe console messages
    fn on_console(&mut self, observer: Observer) {
        self.observe(PageEventKind::Console, observer)
    }

    /// Observe `alert` dialogs. The page must not block on the dialog.
    fn on_alert(&mut self, observer: Observer) {
        self.observe(PageEventKind::Alert, observer)
    }

    /// Observe `confirm` dialogs. The page must not block on the dialog.
    fn on_confirm(&mut self, observer: Observer) {
        self.observe(PageEventKind::Confirm, observer)
    }

    /// Observe `prompt` dialogs. The page must not block on the dialog.
    fn on_prompt(&mut self, observer: Observer) {
        self.observe(PageEventKind::Prompt, observer)
    }

    /// Send `headers` with every request the page makes
    fn set_headers(&mut self, headers: &HashMap<String, String>) -> Result<()>;

    /// Install a cookie before navigating. A cookie carrying neither `url`
    /// nor `domain` is bound to `target_url`.
    fn add_cookie(&mut self, cookie: &CookieRecord, target_url: &str) -> Result<()>;

    /// Issue the navigation without waiting for it to finish
    fn open(&mut self, navigation: &Navigation) -> Result<()>;

    /// Block until the engine reports the load finished.
    ///
    /// Returns `Error::Timeout` when `timeout` expires first.
    fn wait_for_load(&mut self, timeout: Duration) -> Result<LoadStatus>;

    /// Evaluate JavaScript in the page's global context
    fn evaluate(&mut self, script: &str) -> Result<ScriptResult>;

    /// The serialized document as it stands now
    fn content(&self) -> Result<String>;

    /// Release the page and everything the engine holds for it
    fn close(self) -> Result<()>;
}

/// Create the default (CDP) engine
#[cfg(feature = "cdp")]
pub fn new_engine(config: EngineConfig) -> Result<cdp::CdpEngine> {
    cdp::CdpEngine::new(config)
}
