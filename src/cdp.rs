//! Chrome DevTools Protocol adapter implementation
//!
//! One Chrome process serves every session and each page gets its own tab.
//! Renders are serialized by the worker, so with `isolate_cookies` on the
//! browser cookie store is emptied when a page opens and again when it closes;
//! cookies installed for one render never reach another. Settings that Chrome
//! only honours per process (web security, site isolation, images) are turned
//! into launch flags; the rest are applied per tab.

use crate::capture::{Observers, PageEventKind};
use crate::{
    CookieExpiry, CookieRecord, Engine, EngineConfig, Error, LoadStatus, Navigation, Observer, PageSettings,
    Result, ScriptResult,
};
use base64::Engine as Base64Engine;
use headless_chrome::browser::tab::Tab;
use headless_chrome::browser::tab::{RequestInterceptor, RequestPausedDecision};
use headless_chrome::browser::transport::{SessionId, Transport};
use headless_chrome::protocol::cdp::types::Event;
use headless_chrome::protocol::cdp::Emulation;
use headless_chrome::protocol::cdp::Fetch::events::RequestPausedEvent;
use headless_chrome::protocol::cdp::Fetch::ContinueRequest;
use headless_chrome::protocol::cdp::Network::{self, CookieParam as NetCookieParam, CookieSameSite};
use headless_chrome::protocol::cdp::Page::{self as CdpPageDomain, DialogType};
use headless_chrome::protocol::cdp::Runtime::{RemoteObject, RemoteObjectSubtype};
use headless_chrome::{Browser, LaunchOptions};
use log::{debug, warn};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

/// Chrome launch flags implementing the process-level part of `settings`
pub(crate) fn launch_args(settings: &PageSettings) -> Vec<&'static str> {
    let mut args = Vec::new();
    if !settings.web_security_enabled {
        args.push("--disable-web-security");
    }
    if settings.cross_origin_enabled {
        args.push("--allow-file-access-from-files");
        args.push("--allow-running-insecure-content");
        args.push("--disable-site-isolation-trials");
    }
    if !settings.injection_auditing_enabled {
        // Removed from current Chrome; still honoured by older builds.
        args.push("--disable-xss-auditor");
    }
    if !settings.images_enabled {
        args.push("--blink-settings=imagesEnabled=false");
    }
    args
}

/// CDP-based headless engine implementation (uses the `headless_chrome` crate)
pub struct CdpEngine {
    browser: Browser,
    config: EngineConfig,
}

impl CdpEngine {
    /// Launch Chrome configured for `config`
    pub fn new(config: EngineConfig) -> Result<Self> {
        let args: Vec<&OsStr> = launch_args(&config.settings).into_iter().map(OsStr::new).collect();

        let launch_options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(config.sandbox)
            .path(config.chrome_path.clone())
            .window_size(Some((config.viewport.width, config.viewport.height)))
            .idle_browser_timeout(Duration::from_millis(config.browser_idle_timeout_ms))
            .args(args)
            .build()
            .map_err(|e| Error::InitializationError(format!("Failed to build launch options: {}", e)))?;

        let browser = Browser::new(launch_options)
            .map_err(|e| Error::InitializationError(format!("Failed to launch browser: {}", e)))?;

        debug!("Launched headless Chrome with {:?}", config.settings);
        Ok(Self { browser, config })
    }
}

impl Engine for CdpEngine {
    type Page = CdpPage;

    fn new_page(&self, settings: &PageSettings) -> Result<CdpPage> {
        let launched = &self.config.settings;
        if settings.web_security_enabled != launched.web_security_enabled
            || settings.cross_origin_enabled != launched.cross_origin_enabled
            || settings.images_enabled != launched.images_enabled
            || settings.injection_auditing_enabled != launched.injection_auditing_enabled
        {
            warn!("Chrome applies security and image settings per process; using the launch settings");
        }

        let tab = self
            .browser
            .new_tab()
            .map_err(|e| Error::InitializationError(format!("Failed to create tab: {}", e)))?;
        let mut page = CdpPage {
            tab,
            isolate_cookies: self.config.isolate_cookies,
            observers: Arc::new(Mutex::new(Observers::default())),
            load_failure: None,
        };

        if let Err(e) = page.configure(settings, self.config.user_agent.as_deref()) {
            let _ = page.release();
            return Err(e);
        }
        Ok(page)
    }
}

/// A tab dedicated to one render session
pub struct CdpPage {
    tab: Arc<Tab>,
    isolate_cookies: bool,
    observers: Arc<Mutex<Observers>>,
    load_failure: Option<String>,
}

impl CdpPage {
    fn configure(&mut self, settings: &PageSettings, user_agent: Option<&str>) -> Result<()> {
        if self.isolate_cookies {
            self.clear_cookies()
                .map_err(|e| Error::InitializationError(format!("Failed to clear cookies: {}", e)))?;
        }

        if let Some(ua) = user_agent {
            self.tab
                .set_user_agent(ua, None, None)
                .map_err(|e| Error::InitializationError(format!("Failed to set user agent: {}", e)))?;
        }

        self.tab
            .call_method(Emulation::SetScriptExecutionDisabled {
                value: !settings.scripts_enabled,
            })
            .map_err(|e| Error::InitializationError(format!("Failed to configure scripts: {}", e)))?;

        if !settings.web_security_enabled {
            self.tab
                .call_method(CdpPageDomain::SetBypassCSP { enabled: true })
                .map_err(|e| Error::InitializationError(format!("Failed to bypass CSP: {}", e)))?;
        }

        self.tab
            .enable_runtime()
            .map_err(|e| Error::InitializationError(format!("Failed to enable runtime: {}", e)))?;

        // The listener holds the tab weakly; the tab owns the listener.
        let observers = self.observers.clone();
        let weak_tab: Weak<Tab> = Arc::downgrade(&self.tab);
        self.tab
            .add_event_listener(Arc::new(move |event: &Event| handle_event(event, &observers, &weak_tab)))
            .map_err(|e| Error::InitializationError(format!("Failed to register event listener: {}", e)))?;

        Ok(())
    }

    /// Rewrite the first request of the navigation into a POST carrying `payload`
    fn arm_post(&self, payload: &str) -> Result<()> {
        let pending = AtomicBool::new(true);
        let post_data = base64::engine::general_purpose::STANDARD.encode(payload.as_bytes());

        let interceptor: Arc<dyn RequestInterceptor + Send + Sync> = Arc::new(
            move |_transport: Arc<Transport>, _session_id: SessionId, event: RequestPausedEvent| {
                if !pending.swap(false, Ordering::SeqCst) {
                    return RequestPausedDecision::Continue(None);
                }
                debug!("Sending navigation to {} as POST", event.params.request.url);
                RequestPausedDecision::Continue(Some(ContinueRequest {
                    request_id: event.params.request_id.clone(),
                    url: None,
                    method: Some("POST".to_string()),
                    post_data: Some(post_data.clone()),
                    headers: None,
                    intercept_response: None,
                }))
            },
        );

        self.tab
            .enable_fetch(None, Some(false))
            .map_err(|e| Error::LoadError(format!("Failed to enable fetch domain: {}", e)))?;
        self.tab
            .enable_request_interception(interceptor)
            .map_err(|e| Error::LoadError(format!("Failed to enable request interception: {}", e)))?;
        Ok(())
    }

    fn clear_cookies(&self) -> anyhow::Result<()> {
        self.tab.call_method(Network::ClearBrowserCookies(None))?;
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        if let Ok(mut observers) = self.observers.lock() {
            observers.clear();
        }

        if self.isolate_cookies {
            if let Err(e) = self.clear_cookies() {
                warn!("Failed to clear cookies after render: {}", e);
            }
        }

        self.tab
            .close(true)
            .map(|_| ())
            .map_err(|e| Error::CdpError(format!("Failed to close tab: {}", e)))
    }
}

impl crate::Page for CdpPage {
    fn observe(&mut self, kind: PageEventKind, observer: Observer) {
        match self.observers.lock() {
            Ok(mut observers) => observers.set(kind, observer),
            Err(e) => e.into_inner().set(kind, observer),
        }
    }

    fn set_headers(&mut self, headers: &HashMap<String, String>) -> Result<()> {
        // headless_chrome expects a HashMap<&str, &str>
        let headers: HashMap<&str, &str> = headers.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();

        self.tab
            .set_extra_http_headers(headers)
            .map_err(|e| Error::CdpError(format!("Failed to set headers: {}", e)))?;
        Ok(())
    }

    fn add_cookie(&mut self, cookie: &CookieRecord, target_url: &str) -> Result<()> {
        let param = to_cookie_param(cookie, target_url);
        self.tab
            .set_cookies(vec![param])
            .map_err(|e| Error::CdpError(format!("Failed to set cookie: {}", e)))?;
        Ok(())
    }

    fn open(&mut self, navigation: &Navigation) -> Result<()> {
        self.load_failure = None;
        if let Some(payload) = &navigation.payload {
            self.arm_post(payload)?;
        }

        // Chrome refuses some navigations outright (DNS, refused connection);
        // that is a failed load, reported when the load is awaited.
        if let Err(e) = self.tab.navigate_to(&navigation.url) {
            self.load_failure = Some(e.to_string());
        }
        Ok(())
    }

    fn wait_for_load(&mut self, timeout: Duration) -> Result<LoadStatus> {
        if let Some(reason) = self.load_failure.take() {
            return Ok(LoadStatus::Fail(reason));
        }

        self.tab.set_default_timeout(timeout);
        match self.tab.wait_until_navigated() {
            Ok(_) => Ok(LoadStatus::Success),
            Err(e) => {
                debug!("Waiting for navigation failed: {}", e);
                Err(Error::Timeout(timeout.as_millis() as u64))
            }
        }
    }

    fn evaluate(&mut self, script: &str) -> Result<ScriptResult> {
        let result = self
            .tab
            .evaluate(script, false)
            .map_err(|e| Error::ScriptError(format!("Evaluation failed: {}", e)))?;

        Ok(script_result(&result))
    }

    fn content(&self) -> Result<String> {
        self.tab
            .get_content()
            .map_err(|e| Error::RenderError(format!("Failed to read document: {}", e)))
    }

    fn close(mut self) -> Result<()> {
        self.release()
    }
}

/// A thrown exception comes back as the evaluation result, an `Error` object
fn script_result(result: &RemoteObject) -> ScriptResult {
    if result.subtype == Some(RemoteObjectSubtype::Error) {
        return ScriptResult {
            value: remote_object_text(result),
            is_error: true,
        };
    }
    ScriptResult {
        value: result
            .value
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_else(|| "null".to_string()),
        is_error: false,
    }
}

/// Which collection a dialog goes to, and whether it is accepted.
///
/// Alerts are acknowledged; confirm/prompt are dismissed (false/null);
/// beforeunload is dismissed unrecorded.
fn dialog_policy(kind: &DialogType) -> (Option<PageEventKind>, bool) {
    match kind {
        DialogType::Alert => (Some(PageEventKind::Alert), true),
        DialogType::Confirm => (Some(PageEventKind::Confirm), false),
        DialogType::Prompt => (Some(PageEventKind::Prompt), false),
        DialogType::Beforeunload => (None, false),
    }
}

fn dispatch(observers: &Mutex<Observers>, kind: PageEventKind, message: &str) {
    // Clone the observer out so it never runs under the lock.
    let observer = match observers.lock() {
        Ok(o) => o.get(kind).cloned(),
        Err(e) => e.into_inner().get(kind).cloned(),
    };
    if let Some(cb) = observer {
        cb(message);
    }
}

fn handle_event(event: &Event, observers: &Mutex<Observers>, tab: &Weak<Tab>) {
    match event {
        Event::PageJavascriptDialogOpening(ev) => {
            let (kind, accept) = dialog_policy(&ev.params.Type);
            if let Some(kind) = kind {
                dispatch(observers, kind, &ev.params.message);
            }

            if let Some(tab) = tab.upgrade() {
                if let Err(e) = tab.call_method(CdpPageDomain::HandleJavaScriptDialog {
                    accept,
                    prompt_text: None,
                }) {
                    warn!("Failed to dismiss dialog: {}", e);
                }
            }
        }
        Event::RuntimeExceptionThrown(ev) => {
            let details = &ev.params.exception_details;
            // Non-Error throws (`throw "x"`) carry only a value.
            let message = details
                .exception
                .as_ref()
                .and_then(|ex| ex.description.clone().or_else(|| ex.value.as_ref().map(json_text)))
                .unwrap_or_else(|| details.text.clone());
            dispatch(observers, PageEventKind::Error, &message);
        }
        Event::RuntimeConsoleAPICalled(ev) => {
            let text = ev
                .params
                .args
                .iter()
                .map(remote_object_text)
                .collect::<Vec<_>>()
                .join(" ");
            dispatch(observers, PageEventKind::Console, &text);
        }
        _ => {}
    }
}

fn json_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        v => v.to_string(),
    }
}

fn remote_object_text(obj: &RemoteObject) -> String {
    match &obj.value {
        Some(v) => json_text(v),
        None => obj
            .unserializable_value
            .clone()
            .or_else(|| obj.description.clone())
            .unwrap_or_else(|| "undefined".to_string()),
    }
}

fn to_cookie_param(cookie: &CookieRecord, target_url: &str) -> NetCookieParam {
    let url = match (&cookie.url, &cookie.domain) {
        (None, None) => Some(target_url.to_string()),
        (url, _) => url.clone(),
    };

    let expires = match &cookie.expires {
        Some(CookieExpiry::Timestamp(secs)) => Some(*secs),
        Some(CookieExpiry::Text(text)) => {
            warn!("Ignoring textual expiry '{}' for cookie '{}'", text, cookie.name);
            None
        }
        None => None,
    };

    NetCookieParam {
        name: cookie.name.clone(),
        value: cookie.value.clone(),
        url,
        domain: cookie.domain.clone(),
        path: cookie.path.clone(),
        secure: cookie.secure,
        http_only: cookie.httponly,
        same_site: cookie.samesite.as_deref().and_then(|s| match s {
            "Strict" | "strict" => Some(CookieSameSite::Strict),
            "Lax" | "lax" => Some(CookieSameSite::Lax),
            "None" | "none" => Some(CookieSameSite::None),
            _ => None,
        }),
        expires,
        priority: None,
        same_party: None,
        source_scheme: None,
        source_port: None,
        partition_key: None,
    }
}
