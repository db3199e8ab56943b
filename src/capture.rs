//! Per-session capture of page side effects
//!
//! A page reports errors, console output and dialogs through five observer
//! callbacks. `EventLog` hands out one observer per channel; each appends to
//! its own collection in arrival order. A log belongs to exactly one session
//! and is consumed when the session finalizes.

use std::sync::{Arc, Mutex, MutexGuard};

/// Callback receiving the message of one observed page event
pub type Observer = Arc<dyn Fn(&str) + Send + Sync>;

/// The kinds of page side effects a session captures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageEventKind {
    /// An uncaught script error
    Error,
    /// A console API call
    Console,
    /// `window.alert`
    Alert,
    /// `window.confirm`
    Confirm,
    /// `window.prompt`
    Prompt,
}

impl PageEventKind {
    pub const ALL: [PageEventKind; 5] = [
        PageEventKind::Error,
        PageEventKind::Console,
        PageEventKind::Alert,
        PageEventKind::Confirm,
        PageEventKind::Prompt,
    ];
}

/// Everything a session captured, in arrival order per kind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captured {
    pub errors: Vec<String>,
    pub console_messages: Vec<String>,
    pub alerts: Vec<String>,
    pub confirms: Vec<String>,
    pub prompts: Vec<String>,
}

impl Captured {
    fn channel_mut(&mut self, kind: PageEventKind) -> &mut Vec<String> {
        match kind {
            PageEventKind::Error => &mut self.errors,
            PageEventKind::Console => &mut self.console_messages,
            PageEventKind::Alert => &mut self.alerts,
            PageEventKind::Confirm => &mut self.confirms,
            PageEventKind::Prompt => &mut self.prompts,
        }
    }

    pub fn channel(&self, kind: PageEventKind) -> &[String] {
        match kind {
            PageEventKind::Error => &self.errors,
            PageEventKind::Console => &self.console_messages,
            PageEventKind::Alert => &self.alerts,
            PageEventKind::Confirm => &self.confirms,
            PageEventKind::Prompt => &self.prompts,
        }
    }
}

/// Append-only capture log shared between a session and its observers
#[derive(Clone, Default)]
pub struct EventLog {
    inner: Arc<Mutex<Captured>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Captured> {
        // Observers only push strings; a poisoned lock still holds valid data.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a message to the collection for `kind`
    pub fn record(&self, kind: PageEventKind, message: &str) {
        self.lock().channel_mut(kind).push(message.to_string());
    }

    /// An observer that appends to the collection for `kind`
    pub fn observer(&self, kind: PageEventKind) -> Observer {
        let log = self.clone();
        Arc::new(move |message: &str| log.record(kind, message))
    }

    /// Copy of what has been captured so far
    pub fn snapshot(&self) -> Captured {
        self.lock().clone()
    }

    /// Take the captured collections, leaving the log empty.
    ///
    /// Observers still registered with a page keep appending to the emptied
    /// log, so late events can never reach a result that was already taken.
    pub fn take(&self) -> Captured {
        std::mem::take(&mut *self.lock())
    }
}

/// Observer slots for an engine page.
///
/// Engine adapters keep one of these behind a lock and call `dispatch` from
/// whatever thread delivers engine events.
#[derive(Clone, Default)]
pub struct Observers {
    error: Option<Observer>,
    console: Option<Observer>,
    alert: Option<Observer>,
    confirm: Option<Observer>,
    prompt: Option<Observer>,
}

impl Observers {
    pub fn set(&mut self, kind: PageEventKind, observer: Observer) {
        let slot = match kind {
            PageEventKind::Error => &mut self.error,
            PageEventKind::Console => &mut self.console,
            PageEventKind::Alert => &mut self.alert,
            PageEventKind::Confirm => &mut self.confirm,
            PageEventKind::Prompt => &mut self.prompt,
        };
        *slot = Some(observer);
    }

    pub fn get(&self, kind: PageEventKind) -> Option<&Observer> {
        match kind {
            PageEventKind::Error => self.error.as_ref(),
            PageEventKind::Console => self.console.as_ref(),
            PageEventKind::Alert => self.alert.as_ref(),
            PageEventKind::Confirm => self.confirm.as_ref(),
            PageEventKind::Prompt => self.prompt.as_ref(),
        }
    }

    /// Deliver `message` to the observer for `kind`, if one is registered
    pub fn dispatch(&self, kind: PageEventKind, message: &str) {
        if let Some(cb) = self.get(kind) {
            cb(message);
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
