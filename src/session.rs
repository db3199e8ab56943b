//! Render sessions
//!
//! A session owns one engine page for one request. It registers the five
//! observers, applies headers and cookies, issues the navigation, waits for
//! the load, optionally provokes inline pointer handlers and finally reads the
//! document back:
//!
//! `Idle -> Configuring -> Navigating -> AwaitingLoad -> (ProvokingEvents) ->
//! Finalizing -> Closed`
//!
//! `Closed` is entered exactly once, on success and on every error path, and
//! the page is closed exactly once along with it.

use std::time::Duration;

use log::{debug, warn};

use crate::capture::{EventLog, PageEventKind};
use crate::provoke::provocation_script;
use crate::request::RenderRequest;
use crate::response::{RenderResult, RenderStatus};
use crate::{Engine, Error, LoadStatus, Navigation, Page, PageSettings, Result};

/// Per-session timing and page settings
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Settings applied to the session's page
    pub settings: PageSettings,
    /// Upper bound on waiting for the load to finish
    pub load_timeout_ms: u64,
    /// Pause before reading the document so late console/error events land
    pub settle_ms: u64,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            settings: PageSettings::permissive(),
            load_timeout_ms: 30_000,
            settle_ms: 250,
        }
    }
}

/// Where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Configuring,
    Navigating,
    AwaitingLoad,
    ProvokingEvents,
    Finalizing,
    Closed,
}

/// Closes the wrapped page exactly once, even if the session unwinds
struct PageGuard<P: Page> {
    page: Option<P>,
}

impl<P: Page> PageGuard<P> {
    fn new(page: P) -> Self {
        Self { page: Some(page) }
    }

    fn get_mut(&mut self) -> Result<&mut P> {
        self.page
            .as_mut()
            .ok_or_else(|| Error::Other("page already closed".into()))
    }

    fn close(mut self) -> Result<()> {
        match self.page.take() {
            Some(page) => page.close(),
            None => Ok(()),
        }
    }
}

impl<P: Page> Drop for PageGuard<P> {
    fn drop(&mut self) {
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close() {
                warn!("Failed to close page while unwinding: {}", e);
            }
        }
    }
}

/// One navigation and everything captured while performing it
pub struct RenderSession<'e, E: Engine> {
    engine: &'e E,
    options: SessionOptions,
    log: EventLog,
    history: Vec<SessionState>,
}

impl<'e, E: Engine> RenderSession<'e, E> {
    pub fn new(engine: &'e E, options: SessionOptions) -> Self {
        Self {
            engine,
            options,
            log: EventLog::new(),
            history: vec![SessionState::Idle],
        }
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.history.last().copied().unwrap_or(SessionState::Idle)
    }

    /// Every state visited so far, in order
    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    fn enter(&mut self, state: SessionState) {
        debug!("Render session {:?} -> {:?}", self.state(), state);
        self.history.push(state);
    }

    /// Perform the navigation described by `request`.
    ///
    /// Failed loads still produce a result (with `RenderStatus::Fail`); an
    /// expired load timeout produces an empty `RenderStatus::Timeout` result.
    /// Only engine faults are returned as errors.
    pub fn run(&mut self, request: &RenderRequest) -> Result<RenderResult> {
        if self.state() != SessionState::Idle {
            return Err(Error::Other("render session already used".into()));
        }

        self.enter(SessionState::Configuring);
        let page = match self.engine.new_page(&self.options.settings) {
            Ok(page) => page,
            Err(e) => {
                self.enter(SessionState::Closed);
                return Err(e);
            }
        };

        let mut guard = PageGuard::new(page);
        let outcome = match guard.get_mut() {
            Ok(page) => self.drive(page, request),
            Err(e) => Err(e),
        };

        let closed = guard.close();
        self.enter(SessionState::Closed);
        if let Err(e) = closed {
            warn!("Failed to close page for {}: {}", request.url, e);
        }

        outcome
    }

    fn drive(&mut self, page: &mut E::Page, request: &RenderRequest) -> Result<RenderResult> {
        for kind in PageEventKind::ALL {
            page.observe(kind, self.log.observer(kind));
        }

        if let Some(headers) = &request.headers {
            page.set_headers(headers)?;
        }

        if let Some(cookies) = &request.cookies {
            for cookie in cookies {
                if let Err(e) = page.add_cookie(cookie, &request.url) {
                    warn!("Failed to install cookie '{}': {}", cookie.name, e);
                }
            }
        }

        self.enter(SessionState::Navigating);
        let navigation = Navigation::from_request(request);
        debug!(
            "Opening {} {} (payload: {} bytes)",
            navigation.method,
            navigation.url,
            navigation.payload.as_ref().map_or(0, |p| p.len())
        );
        page.open(&navigation)?;

        self.enter(SessionState::AwaitingLoad);
        let status = match page.wait_for_load(Duration::from_millis(self.options.load_timeout_ms)) {
            Ok(status) => status,
            Err(Error::Timeout(ms)) => {
                warn!("Load of {} did not finish within {}ms", request.url, ms);
                self.log.take();
                return Ok(RenderResult::timed_out());
            }
            Err(e) => return Err(e),
        };
        if let LoadStatus::Fail(reason) = &status {
            warn!("Load of {} failed: {}", request.url, reason);
        }

        if request.provoke_events {
            self.enter(SessionState::ProvokingEvents);
            match page.evaluate(&provocation_script()) {
                Ok(res) if res.is_error => warn!("Event provocation threw: {}", res.value),
                Ok(res) => debug!("Provoked {} inline handlers", res.value),
                Err(e) => warn!("Event provocation failed: {}", e),
            }
        }

        self.enter(SessionState::Finalizing);
        if self.options.settle_ms > 0 {
            std::thread::sleep(Duration::from_millis(self.options.settle_ms));
        }

        let html = match page.content() {
            Ok(html) => html,
            Err(e) => {
                warn!("Failed to read document content: {}", e);
                String::new()
            }
        };

        Ok(RenderResult::from_capture(
            html,
            self.log.take(),
            RenderStatus::from(&status),
        ))
    }
}

/// Run one render session for `request`
pub fn render<E: Engine>(engine: &E, request: &RenderRequest, options: &SessionOptions) -> Result<RenderResult> {
    RenderSession::new(engine, options.clone()).run(request)
}
