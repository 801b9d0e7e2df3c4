//! Roster extraction
//!
//! Best-effort scraping of the rendered member list. Locator failures and
//! unreadable entries are skipped; a partial list is a normal result.

use crate::driver::{DriverError, Locator, Page, Query};
use crate::identity::normalize_handle;
use joinwatch_common::time::millis_to_duration;
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

/// Upper bound on entries read by the display-name sweep
pub const MAX_ROSTER_ENTRIES: usize = 500;

/// Longest accepted display name, in characters
pub const MAX_NAME_CHARS: usize = 64;

/// Default number of entries probed for canonical handles
pub const DEFAULT_HANDLE_PROBE_LIMIT: usize = 20;

/// Presence lines rendered above or beside a member's name
pub const STATUS_NOISE: &[&str] = &["online", "offline", "idle", "do not disturb", "streaming"];

/// Fixed waits after UI interactions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterTiming {
    /// After clicking "Show Member List" before the name sweep
    pub toggle_settle: Duration,
    /// After clicking "Show Member List" before the handle probe
    pub probe_toggle_settle: Duration,
    /// After clicking an entry, before looking for its popover
    pub popover_settle: Duration,
    /// Extra wait when no popover appeared
    pub popover_retry: Duration,
    /// After dismissing a popover
    pub escape_settle: Duration,
}

impl Default for RosterTiming {
    fn default() -> Self {
        Self {
            toggle_settle: millis_to_duration(1000),
            probe_toggle_settle: millis_to_duration(500),
            popover_settle: millis_to_duration(400),
            popover_retry: millis_to_duration(300),
            escape_settle: millis_to_duration(200),
        }
    }
}

impl RosterTiming {
    /// No waits at all (tests, pre-rendered pages)
    pub fn immediate() -> Self {
        Self {
            toggle_settle: Duration::ZERO,
            probe_toggle_settle: Duration::ZERO,
            popover_settle: Duration::ZERO,
            popover_retry: Duration::ZERO,
            escape_settle: Duration::ZERO,
        }
    }
}

/// Outcome of trying one candidate locator
enum Probe {
    Found(Locator),
    NotFound,
    Failed(DriverError),
}

async fn probe(page: &dyn Page, candidate: &Locator) -> Probe {
    match page.count(candidate).await {
        Ok(n) if n > 0 => Probe::Found(candidate.first()),
        Ok(_) => Probe::NotFound,
        Err(e) => Probe::Failed(e),
    }
}

/// First candidate that matches anything, narrowed to its first match
async fn first_present(page: &dyn Page, candidates: &[Locator]) -> Option<Locator> {
    for candidate in candidates {
        match probe(page, candidate).await {
            Probe::Found(found) => return Some(found),
            Probe::NotFound => {}
            Probe::Failed(e) => debug!("Locator {} failed: {}", candidate, e),
        }
    }
    None
}

async fn settle(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// Member list containers, most specific first
pub fn container_candidates() -> Vec<Locator> {
    vec![
        Locator::new(Query::role_named("list", "members")),
        Locator::new(Query::attr_contains("aria-label", "Members")),
        Locator::new(Query::css("[role=\"list\"][aria-label]")),
    ]
}

/// Profile popover containers, most specific first
pub fn popover_candidates() -> Vec<Locator> {
    vec![
        Locator::new(Query::css("[role=\"dialog\"]")),
        Locator::new(Query::class_contains("userPopout")),
        Locator::new(Query::attr_contains("aria-label", "User")),
    ]
}

/// Handle fields inside a popover, most specific first
fn handle_fields() -> [Query; 3] {
    [
        Query::class_contains("username"),
        Query::class_contains("userTag"),
        Query::text_prefix("@"),
    ]
}

/// Candidate display name from one entry's rendered text
///
/// Takes the first non-blank line; a presence word is replaced by the line
/// after it when there is one.
pub fn name_from_entry_text(text: &str) -> Option<String> {
    let mut lines = text.lines().map(str::trim).filter(|line| !line.is_empty());
    let mut candidate = lines.next()?;

    if STATUS_NOISE.contains(&candidate.to_lowercase().as_str()) {
        if let Some(next) = lines.next() {
            candidate = next;
        }
    }

    if candidate.chars().count() > MAX_NAME_CHARS {
        return None;
    }
    Some(candidate.to_string())
}

/// Order-preserving dedupe
pub fn dedupe(names: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .into_iter()
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

/// Reads names and handles from the member list of the current page
#[derive(Debug, Clone, Default)]
pub struct RosterExtractor {
    timing: RosterTiming,
}

impl RosterExtractor {
    pub fn new(timing: RosterTiming) -> Self {
        Self { timing }
    }

    /// Click "Show Member List" if the toggle is present
    pub async fn open_member_list(&self, page: &dyn Page, delay: Duration) -> bool {
        let toggle = Locator::new(Query::label("Show Member List"));
        match page.count(&toggle).await {
            Ok(n) if n > 0 => match page.click(&toggle.first()).await {
                Ok(()) => {
                    settle(delay).await;
                    true
                }
                Err(e) => {
                    debug!("Member list toggle click failed: {}", e);
                    false
                }
            },
            Ok(_) => false,
            Err(e) => {
                debug!("Member list toggle lookup failed: {}", e);
                false
            }
        }
    }

    /// Locator for the member entries, with the entry count
    ///
    /// Falls back to every list item on the page when no container resolves.
    async fn entries(&self, page: &dyn Page) -> (Locator, usize) {
        let items = match first_present(page, &container_candidates()).await {
            Some(container) => container.locate(Query::role("listitem")),
            None => {
                debug!("No member list container, scanning all list items");
                Locator::new(Query::role("listitem"))
            }
        };

        let total = match page.count(&items).await {
            Ok(n) => n,
            Err(e) => {
                debug!("Counting {} failed: {}", items, e);
                0
            }
        };
        (items, total)
    }

    /// Display names from the member list, deduplicated in first-seen order
    pub async fn display_names(&self, page: &dyn Page) -> Vec<String> {
        self.open_member_list(page, self.timing.toggle_settle).await;
        let (items, total) = self.entries(page).await;

        let mut names = Vec::new();
        for i in 0..total.min(MAX_ROSTER_ENTRIES) {
            let text = match page.inner_text(&items.nth(i)).await {
                Ok(text) => text,
                Err(e) => {
                    debug!("Skipping member entry {}: {}", i, e);
                    continue;
                }
            };
            if let Some(name) = name_from_entry_text(&text) {
                names.push(name);
            }
        }
        dedupe(names)
    }

    /// Canonical handles read from each entry's profile popover
    ///
    /// Probes at most `limit` entries. Escape is pressed after every entry,
    /// whether or not a handle was found.
    pub async fn canonical_handles(&self, page: &dyn Page, limit: usize) -> Vec<String> {
        self.open_member_list(page, self.timing.probe_toggle_settle).await;
        let (items, total) = self.entries(page).await;

        let mut handles = Vec::new();
        for i in 0..total.min(limit) {
            if let Some(handle) = self.probe_entry(page, &items.nth(i)).await {
                handles.push(handle);
            }
            match page.press_escape().await {
                Ok(()) => settle(self.timing.escape_settle).await,
                Err(e) => debug!("Escape after entry {} failed: {}", i, e),
            }
        }
        dedupe(handles)
    }

    async fn probe_entry(&self, page: &dyn Page, entry: &Locator) -> Option<String> {
        if let Err(e) = page.click(entry).await {
            debug!("Clicking {} failed: {}", entry, e);
            return None;
        }
        settle(self.timing.popover_settle).await;

        let Some(popover) = first_present(page, &popover_candidates()).await else {
            settle(self.timing.popover_retry).await;
            return None;
        };

        let raw = match self.read_handle_field(page, &popover).await {
            Some(raw) => raw,
            None => self.read_name_and_discriminator(page, &popover).await?,
        };
        Some(normalize_handle(&raw))
    }

    async fn read_handle_field(&self, page: &dyn Page, popover: &Locator) -> Option<String> {
        for field in handle_fields() {
            let node = popover.locate(field);
            if let Probe::Found(first) = probe(page, &node).await {
                if let Ok(text) = page.inner_text(&first).await {
                    let text = text.trim();
                    if !text.is_empty() {
                        return Some(text.to_string());
                    }
                }
            }
        }
        None
    }

    /// Older profiles render `name` and `#1234` separately
    async fn read_name_and_discriminator(&self, page: &dyn Page, popover: &Locator) -> Option<String> {
        let name_node = popover.locate(Query::class_contains("name"));
        let Probe::Found(name_node) = probe(page, &name_node).await else {
            return None;
        };
        let base = page.inner_text(&name_node).await.ok()?.trim().to_string();

        let disc_node = popover.locate(Query::class_contains("discriminator"));
        let discriminator = match probe(page, &disc_node).await {
            Probe::Found(disc_node) => page
                .inner_text(&disc_node)
                .await
                .map(|text| text.trim().to_string())
                .unwrap_or_default(),
            _ => String::new(),
        };

        let combined = format!("{}{}", base, discriminator);
        if combined.is_empty() {
            None
        } else {
            Some(combined)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_line_is_name() {
        assert_eq!(name_from_entry_text("alice\nPlaying a game"), Some("alice".to_string()));
    }

    #[test]
    fn test_blank_lines_skipped() {
        assert_eq!(name_from_entry_text("\n   \n  bob  \n"), Some("bob".to_string()));
        assert_eq!(name_from_entry_text("  \n\n"), None);
    }

    #[test]
    fn test_noise_line_promotes_next() {
        assert_eq!(name_from_entry_text("online\ndave"), Some("dave".to_string()));
        assert_eq!(name_from_entry_text("Do Not Disturb\neve"), Some("eve".to_string()));
    }

    #[test]
    fn test_noise_line_alone_is_kept() {
        assert_eq!(name_from_entry_text("idle"), Some("idle".to_string()));
    }

    #[test]
    fn test_long_names_rejected() {
        let exactly = "a".repeat(MAX_NAME_CHARS);
        let over = "a".repeat(MAX_NAME_CHARS + 1);
        assert_eq!(name_from_entry_text(&exactly), Some(exactly.clone()));
        assert_eq!(name_from_entry_text(&over), None);
    }

    #[test]
    fn test_length_counts_characters() {
        let name = "é".repeat(MAX_NAME_CHARS);
        assert!(name.len() > MAX_NAME_CHARS);
        assert!(name_from_entry_text(&name).is_some());
    }

    #[test]
    fn test_dedupe_keeps_first_seen_order() {
        let names = vec!["b", "a", "b", "c", "a"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(dedupe(names), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_candidate_order() {
        let rendered: Vec<String> = container_candidates().iter().map(|l| l.to_string()).collect();
        assert_eq!(
            rendered,
            vec![
                "role=list[name*=\"members\" i]",
                "[aria-label*=\"Members\" i]",
                "[role=\"list\"][aria-label]",
            ]
        );
    }
}
