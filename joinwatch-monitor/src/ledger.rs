//! Membership ledger and reported-event record
//!
//! Both only ever grow. An identity recorded for a community stays known for
//! the life of the process and, through the state file, across restarts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Per-community set of identities already seen
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipLedger {
    known: BTreeMap<String, BTreeSet<String>>,
}

impl MembershipLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_known(&self, community: &str, identity: &str) -> bool {
        self.known
            .get(community)
            .is_some_and(|set| set.contains(identity))
    }

    /// Insert `identity`; returns true if it was not known before
    pub fn record(&mut self, community: &str, identity: &str) -> bool {
        self.known
            .entry(community.to_string())
            .or_default()
            .insert(identity.to_string())
    }

    pub fn community_count(&self) -> usize {
        self.known.len()
    }

    pub fn known_in(&self, community: &str) -> usize {
        self.known.get(community).map_or(0, BTreeSet::len)
    }

    pub fn snapshot(&self) -> BTreeMap<String, BTreeSet<String>> {
        self.known.clone()
    }

    pub fn restore(known: BTreeMap<String, BTreeSet<String>>) -> Self {
        Self { known }
    }
}

/// Composite key guarding one report per identity, community and channel
pub fn event_key(identity: &str, community: &str, channel: &str) -> String {
    format!("{}_{}_{}", identity, community, channel)
}

/// Keys of detections already reported
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportedEvents {
    keys: BTreeSet<String>,
}

impl ReportedEvents {
    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Returns true if the key was not present
    pub fn insert(&mut self, key: String) -> bool {
        self.keys.insert(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Persisted form of [`MonitorState`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    #[serde(default)]
    pub processed_messages: BTreeSet<String>,
    #[serde(default)]
    pub known_users: BTreeMap<String, BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
}

/// Everything the detection pipeline remembers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorState {
    pub ledger: MembershipLedger,
    pub events: ReportedEvents,
}

impl MonitorState {
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            processed_messages: self.events.keys.clone(),
            known_users: self.ledger.snapshot(),
            saved_at: Some(joinwatch_common::time::now()),
        }
    }

    pub fn restore(snapshot: StateSnapshot) -> Self {
        Self {
            ledger: MembershipLedger::restore(snapshot.known_users),
            events: ReportedEvents {
                keys: snapshot.processed_messages,
            },
        }
    }
}
