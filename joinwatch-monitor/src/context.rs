//! Channel context inferred from the page
//!
//! Page titles usually read `#channel-name - Server Name - Discord`. When the
//! title cannot be split, the sentinel pair is used instead of an error.

use std::fmt;

pub const UNKNOWN_COMMUNITY: &str = "Current Server";
pub const UNKNOWN_CHANNEL: &str = "Current Channel";

/// The `(community, channel)` pair a detection is attributed to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelContext {
    pub community: String,
    pub channel: String,
}

impl ChannelContext {
    pub fn new(community: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            community: community.into(),
            channel: channel.into(),
        }
    }

    pub fn unknown() -> Self {
        Self::new(UNKNOWN_COMMUNITY, UNKNOWN_CHANNEL)
    }

    /// Parse a page title into a context
    pub fn from_title(title: &str) -> Self {
        if title.trim().is_empty() {
            return Self::unknown();
        }

        let parts: Vec<&str> = title.split('-').map(str::trim).collect();
        if parts.len() >= 2 {
            let channel = parts[0].trim_start_matches('#').trim();
            let community = parts[1];
            if !channel.is_empty() {
                let community = if community.is_empty() {
                    UNKNOWN_COMMUNITY
                } else {
                    community
                };
                return Self::new(community, channel);
            }
        }

        Self::unknown()
    }

    pub fn is_unknown(&self) -> bool {
        self.community == UNKNOWN_COMMUNITY && self.channel == UNKNOWN_CHANNEL
    }
}

impl fmt::Display for ChannelContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / #{}", self.community, self.channel)
    }
}
