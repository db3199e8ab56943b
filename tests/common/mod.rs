//! Shared test helpers: a scripted engine and a reflecting fixture server
#![allow(dead_code)]

pub mod fixture;

use render_proxy::provoke::{handler_selectors, provocation_script, POINTER_EVENTS};
use render_proxy::{
    CookieRecord, Engine, Error, LoadStatus, Navigation, Observer, Observers, Page, PageEventKind, PageSettings,
    Result, ScriptResult,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How a scripted load ends
#[derive(Debug, Clone)]
pub enum Outcome {
    Loaded,
    Failed(String),
    TimedOut,
    /// `open` itself errors, as if the engine process died
    Crashed,
}

/// An element carrying an inline handler, and what the handler does when run
#[derive(Debug, Clone)]
pub struct InlineHandler {
    pub event: &'static str,
    pub effect: (PageEventKind, String),
}

/// What a page does for one navigation
#[derive(Debug, Clone)]
pub struct Script {
    pub outcome: Outcome,
    /// Delivered while the load is awaited, in order
    pub load_events: Vec<(PageEventKind, String)>,
    pub handlers: Vec<InlineHandler>,
    pub html: String,
}

impl Script {
    pub fn loaded(html: &str) -> Self {
        Self {
            outcome: Outcome::Loaded,
            load_events: Vec::new(),
            handlers: Vec::new(),
            html: html.to_string(),
        }
    }

    pub fn event(mut self, kind: PageEventKind, message: &str) -> Self {
        self.load_events.push((kind, message.to_string()));
        self
    }

    pub fn handler(mut self, event: &'static str, kind: PageEventKind, message: &str) -> Self {
        self.handlers.push(InlineHandler {
            event,
            effect: (kind, message.to_string()),
        });
        self
    }

    pub fn outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = outcome;
        self
    }
}

/// Everything the engine was asked to do
#[derive(Debug, Default)]
pub struct Calls {
    pub pages_created: usize,
    pub pages_closed: usize,
    pub settings: Vec<PageSettings>,
    pub observers_registered: Vec<PageEventKind>,
    pub headers: Vec<HashMap<String, String>>,
    pub cookies: Vec<(CookieRecord, String)>,
    pub opened: Vec<Navigation>,
    pub evaluated: Vec<String>,
    /// Synthetic events dispatched by provocation, as `(event, handler index)`
    pub dispatched: Vec<(String, usize)>,
}

type Behavior = Arc<dyn Fn(&Navigation) -> Script + Send + Sync>;

/// Engine whose pages follow a script chosen per navigation
#[derive(Clone)]
pub struct MockEngine {
    calls: Arc<Mutex<Calls>>,
    behavior: Behavior,
    fail_new_page: bool,
}

impl MockEngine {
    pub fn new<F>(behavior: F) -> Self
    where
        F: Fn(&Navigation) -> Script + Send + Sync + 'static,
    {
        Self {
            calls: Arc::new(Mutex::new(Calls::default())),
            behavior: Arc::new(behavior),
            fail_new_page: false,
        }
    }

    /// Every navigation loads `script`
    pub fn always(script: Script) -> Self {
        Self::new(move |_| script.clone())
    }

    pub fn failing_new_page() -> Self {
        Self {
            fail_new_page: true,
            ..Self::always(Script::loaded(""))
        }
    }

    pub fn calls(&self) -> Arc<Mutex<Calls>> {
        self.calls.clone()
    }
}

impl Engine for MockEngine {
    type Page = MockPage;

    fn new_page(&self, settings: &PageSettings) -> Result<MockPage> {
        if self.fail_new_page {
            return Err(Error::InitializationError("no browser".into()));
        }
        let mut calls = self.calls.lock().unwrap();
        calls.pages_created += 1;
        calls.settings.push(*settings);
        Ok(MockPage {
            calls: self.calls.clone(),
            behavior: self.behavior.clone(),
            observers: Arc::new(Mutex::new(Observers::default())),
            script: None,
        })
    }
}

pub struct MockPage {
    calls: Arc<Mutex<Calls>>,
    behavior: Behavior,
    observers: Arc<Mutex<Observers>>,
    script: Option<Script>,
}

impl MockPage {
    /// Deliver events from another thread, the way engine callbacks arrive
    fn deliver(&self, events: Vec<(PageEventKind, String)>) {
        let observers = self.observers.clone();
        std::thread::spawn(move || {
            let observers = observers.lock().unwrap().clone();
            for (kind, message) in events {
                observers.dispatch(kind, &message);
            }
        })
        .join()
        .unwrap();
    }
}

impl Page for MockPage {
    fn observe(&mut self, kind: PageEventKind, observer: Observer) {
        self.calls.lock().unwrap().observers_registered.push(kind);
        self.observers.lock().unwrap().set(kind, observer);
    }

    fn set_headers(&mut self, headers: &HashMap<String, String>) -> Result<()> {
        self.calls.lock().unwrap().headers.push(headers.clone());
        Ok(())
    }

    fn add_cookie(&mut self, cookie: &CookieRecord, target_url: &str) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .cookies
            .push((cookie.clone(), target_url.to_string()));
        Ok(())
    }

    fn open(&mut self, navigation: &Navigation) -> Result<()> {
        let script = (self.behavior)(navigation);
        if let Outcome::Crashed = script.outcome {
            return Err(Error::Other("engine crashed".into()));
        }
        self.calls.lock().unwrap().opened.push(navigation.clone());
        self.script = Some(script);
        Ok(())
    }

    fn wait_for_load(&mut self, timeout: Duration) -> Result<LoadStatus> {
        let script = self.script.clone().expect("open not called");
        self.deliver(script.load_events.clone());
        match script.outcome {
            Outcome::Loaded => Ok(LoadStatus::Success),
            Outcome::Failed(reason) => Ok(LoadStatus::Fail(reason)),
            Outcome::TimedOut => Err(Error::Timeout(timeout.as_millis() as u64)),
            Outcome::Crashed => unreachable!(),
        }
    }

    fn evaluate(&mut self, script: &str) -> Result<ScriptResult> {
        self.calls.lock().unwrap().evaluated.push(script.to_string());
        if script != provocation_script() {
            return Ok(ScriptResult {
                value: "null".into(),
                is_error: false,
            });
        }

        let page = self.script.clone().unwrap_or_else(|| Script::loaded(""));
        let mut effects = Vec::new();
        let mut dispatched = Vec::new();
        for (kind, selector) in POINTER_EVENTS.iter().zip(handler_selectors()) {
            for (index, handler) in page.handlers.iter().enumerate() {
                if selector == format!("[on{}]", handler.event) {
                    dispatched.push((kind.to_string(), index));
                    effects.push(handler.effect.clone());
                }
            }
        }
        let count = dispatched.len();
        self.calls.lock().unwrap().dispatched.extend(dispatched);
        self.deliver(effects);

        Ok(ScriptResult {
            value: count.to_string(),
            is_error: false,
        })
    }

    fn content(&self) -> Result<String> {
        Ok(self.script.as_ref().map(|s| s.html.clone()).unwrap_or_default())
    }

    fn close(self) -> Result<()> {
        self.calls.lock().unwrap().pages_closed += 1;
        // Anything the page does after closing must not reach the result.
        self.observers
            .lock()
            .unwrap()
            .dispatch(PageEventKind::Alert, "after close");
        Ok(())
    }
}
