//! Test doubles for the page and the operator channel
//!
//! `FakePage` is scripted by locator strings (their `Display` form), so tests
//! describe a page the way the extractor queries it.

#![allow(dead_code)]

use async_trait::async_trait;
use joinwatch_common::{Error, Result as CommonResult};
use joinwatch_monitor::driver::{DriverError, DriverResult, Locator, Page};
use joinwatch_monitor::ledger::StateSnapshot;
use joinwatch_monitor::notify::{Notification, NotificationKind, Notifier, NotifyError};
use joinwatch_monitor::store::StateStore;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Items of the first member-list container candidate
pub const MEMBER_ITEMS: &str = "role=list[name*=\"members\" i] >> nth=0 >> role=listitem";
/// Page-wide fallback when no container resolves
pub const FALLBACK_ITEMS: &str = "role=listitem";
pub const MESSAGES: &str = "[class*=\"messageContent\" i]";
pub const DIALOG: &str = "[role=\"dialog\"]";

/// Elements visible while one entry's profile popover is open
#[derive(Debug, Default, Clone)]
pub struct Popover {
    counts: HashMap<String, usize>,
    texts: HashMap<String, String>,
}

impl Popover {
    /// Dialog with a `username` field
    pub fn with_username(text: &str) -> Self {
        Self::default().field("[class*=\"username\" i]", text)
    }

    /// Dialog with separate name and discriminator nodes
    pub fn with_name_and_discriminator(name: &str, discriminator: &str) -> Self {
        Self::default()
            .field("[class*=\"name\" i]", name)
            .field("[class*=\"discriminator\" i]", discriminator)
    }

    /// Any field inside the dialog, by query string
    pub fn field(mut self, query: &str, text: &str) -> Self {
        self.counts.insert(DIALOG.to_string(), 1);
        let node = format!("{} >> nth=0 >> {}", DIALOG, query);
        self.counts.insert(node.clone(), 1);
        self.texts.insert(format!("{} >> nth=0", node), text.to_string());
        self
    }
}

#[derive(Debug, Default)]
struct FakeState {
    title: String,
    counts: HashMap<String, usize>,
    texts: HashMap<String, String>,
    failing: HashSet<String>,
    entries: Option<String>,
    popovers: HashMap<usize, Popover>,
    open_popover: Option<usize>,
    goto_fails: bool,
    visited: Vec<String>,
    clicks: Vec<String>,
    reloads: usize,
    escapes: usize,
}

/// Scripted page
#[derive(Debug, Default)]
pub struct FakePage {
    state: Mutex<FakeState>,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    fn edit(self, f: impl FnOnce(&mut FakeState)) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    pub fn with_title(self, title: &str) -> Self {
        self.edit(|s| s.title = title.to_string())
    }

    pub fn with_count(self, locator: &str, count: usize) -> Self {
        self.edit(|s| {
            s.counts.insert(locator.to_string(), count);
        })
    }

    pub fn with_text(self, locator: &str, text: &str) -> Self {
        self.edit(|s| {
            s.texts.insert(locator.to_string(), text.to_string());
        })
    }

    /// Every call on this locator fails
    pub fn with_failing(self, locator: &str) -> Self {
        self.edit(|s| {
            s.failing.insert(locator.to_string());
        })
    }

    pub fn with_goto_failure(self) -> Self {
        self.edit(|s| s.goto_fails = true)
    }

    /// Message blocks in render order
    pub fn with_messages(self, messages: &[&str]) -> Self {
        self.with_entries(MESSAGES, messages, false)
    }

    /// Member list inside the "members" container
    pub fn with_members(self, entries: &[&str]) -> Self {
        self.with_count("role=list[name*=\"members\" i]", 1)
            .with_entries(MEMBER_ITEMS, entries, true)
    }

    /// Member list with no recognisable container
    pub fn with_loose_members(self, entries: &[&str]) -> Self {
        self.with_entries(FALLBACK_ITEMS, entries, true)
    }

    fn with_entries(self, items: &str, entries: &[&str], members: bool) -> Self {
        self.edit(|s| {
            s.counts.insert(items.to_string(), entries.len());
            for (i, text) in entries.iter().enumerate() {
                s.texts.insert(format!("{} >> nth={}", items, i), text.to_string());
            }
            if members {
                s.entries = Some(items.to_string());
            }
        })
    }

    /// Popover shown after clicking member entry `index`
    pub fn with_popover(self, index: usize, popover: Popover) -> Self {
        self.edit(|s| {
            s.popovers.insert(index, popover);
        })
    }

    pub fn escapes(&self) -> usize {
        self.state.lock().unwrap().escapes
    }

    pub fn clicks(&self) -> Vec<String> {
        self.state.lock().unwrap().clicks.clone()
    }

    pub fn visited(&self) -> Vec<String> {
        self.state.lock().unwrap().visited.clone()
    }

    pub fn reloads(&self) -> usize {
        self.state.lock().unwrap().reloads
    }
}

fn failure(key: &str) -> DriverError {
    DriverError::Protocol("scripted failure".to_string(), key.to_string())
}

#[async_trait]
impl Page for FakePage {
    async fn goto(&self, url: &str, _timeout: Duration) -> DriverResult<()> {
        let mut s = self.state.lock().unwrap();
        s.visited.push(url.to_string());
        if s.goto_fails {
            return Err(DriverError::Timeout(url.to_string()));
        }
        Ok(())
    }

    async fn reload(&self) -> DriverResult<()> {
        self.state.lock().unwrap().reloads += 1;
        Ok(())
    }

    async fn title(&self) -> DriverResult<String> {
        Ok(self.state.lock().unwrap().title.clone())
    }

    async fn count(&self, locator: &Locator) -> DriverResult<usize> {
        let key = locator.to_string();
        let s = self.state.lock().unwrap();
        if s.failing.contains(&key) {
            return Err(failure(&key));
        }
        if let Some(popover) = s.open_popover.and_then(|i| s.popovers.get(&i)) {
            if let Some(n) = popover.counts.get(&key) {
                return Ok(*n);
            }
        }
        Ok(s.counts.get(&key).copied().unwrap_or(0))
    }

    async fn inner_text(&self, locator: &Locator) -> DriverResult<String> {
        let key = locator.to_string();
        let s = self.state.lock().unwrap();
        if s.failing.contains(&key) {
            return Err(failure(&key));
        }
        if let Some(popover) = s.open_popover.and_then(|i| s.popovers.get(&i)) {
            if let Some(text) = popover.texts.get(&key) {
                return Ok(text.clone());
            }
        }
        s.texts
            .get(&key)
            .cloned()
            .ok_or(DriverError::NoMatch(key))
    }

    async fn click(&self, locator: &Locator) -> DriverResult<()> {
        let key = locator.to_string();
        let mut s = self.state.lock().unwrap();
        if s.failing.contains(&key) {
            return Err(failure(&key));
        }
        s.clicks.push(key.clone());

        let clicked_entry = s.entries.as_ref().and_then(|items| {
            key.strip_prefix(&format!("{} >> nth=", items))
                .and_then(|i| i.parse::<usize>().ok())
        });
        if let Some(i) = clicked_entry {
            if s.popovers.contains_key(&i) {
                s.open_popover = Some(i);
            }
        }
        Ok(())
    }

    async fn press_escape(&self) -> DriverResult<()> {
        let mut s = self.state.lock().unwrap();
        s.escapes += 1;
        s.open_popover = None;
        Ok(())
    }
}

/// Notifier that records what was sent and can be told to fail
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    fail_info: AtomicBool,
    fail_all: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject informational sends; error reports still go through
    pub fn fail_info(&self) {
        self.fail_info.store(true, Ordering::SeqCst);
    }

    pub fn fail_all(&self) {
        self.fail_all.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn bodies(&self) -> Vec<String> {
        self.sent().into_iter().map(|n| n.body).collect()
    }

    pub fn errors(&self) -> Vec<Notification> {
        self.sent()
            .into_iter()
            .filter(|n| n.kind == NotificationKind::Error)
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        if self.fail_all.load(Ordering::SeqCst)
            || (notification.kind == NotificationKind::Info && self.fail_info.load(Ordering::SeqCst))
        {
            return Err(NotifyError::ApiError(503, "scripted outage".to_string()));
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// Store whose first `failures` saves fail, then delegates
pub struct FailFirstSaves<S> {
    inner: S,
    failures_left: AtomicUsize,
}

impl<S: StateStore> FailFirstSaves<S> {
    pub fn new(inner: S, failures: usize) -> Self {
        Self {
            inner,
            failures_left: AtomicUsize::new(failures),
        }
    }
}

impl<S: StateStore> StateStore for FailFirstSaves<S> {
    fn load(&self) -> CommonResult<StateSnapshot> {
        self.inner.load()
    }

    fn save(&self, snapshot: &StateSnapshot) -> CommonResult<()> {
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::Internal("scripted disk failure".to_string()));
        }
        self.inner.save(snapshot)
    }
}
