//! Notification text
//!
//! Pure functions: the same inputs always produce the same message.

use crate::context::ChannelContext;
use std::fmt::Display;

/// Communities with a bespoke welcome tone
pub const FEATURED_COMMUNITIES: &[&str] = &["melonly", "midjourney", "BASI AI", "roblox"];

/// Channel names that usually carry join traffic
pub const WELCOME_CHANNEL_KEYWORDS: &[&str] = &[
    "general",
    "welcome",
    "new-users",
    "introductions",
    "announcements",
    "new-members",
    "greetings",
    "hello",
    "join",
    "arrivals",
    "newcomers",
    "intros",
    "meet",
    "say-hi",
    "first-time",
    "beginners",
];

/// Characters of the triggering text quoted in a detection report
pub const EXCERPT_CHARS: usize = 100;

/// Welcome message tailored to the community, then the channel
///
/// Community names are matched first (case-insensitive substring), then the
/// channel name; anything else gets the generic message.
pub fn welcome_message(identity: &str, community: &str, channel: &str) -> String {
    let community_lower = community.to_lowercase();
    let channel_lower = channel.to_lowercase();

    if community_lower.contains("melonly") {
        format!(
            "🌟 Welcome {} to Melonly! Great to have you join our community! \
             Feel free to introduce yourself and ask any questions. \
             We're excited to see what you'll bring to the server! 🚀",
            identity
        )
    } else if community_lower.contains("midjourney") {
        format!(
            "🎨 Welcome {} to the Midjourney community! \
             Ready to explore the world of AI-generated art? \
             Share your creations, get inspired, and connect with fellow artists. \
             Let's create something amazing together! ✨",
            identity
        )
    } else if community_lower.contains("basi") || community_lower.contains("ai") {
        format!(
            "🤖 Welcome {} to the AI community! \
             Excited to have another AI enthusiast join {}! \
             Whether you're building, learning, or exploring AI, \
             this is the perfect place to connect and grow. \
             Let's push the boundaries of what's possible! 🚀",
            identity, community
        )
    } else if community_lower.contains("roblox") {
        format!(
            "🎮 Welcome {} to the Roblox community! \
             Ready to build, play, and create amazing experiences? \
             Connect with fellow developers and gamers. \
             Let's make some incredible games together! 🎯",
            identity
        )
    } else if channel_lower.contains("general") {
        format!(
            "👋 Hey {}! Welcome to {}! \
             Great to have you here. Feel free to introduce yourself and ask any questions! 🚀",
            identity, community
        )
    } else if channel_lower.contains("welcome") {
        format!(
            "🎉 Welcome {} to {}! We're so excited you've joined us! \
             Take a look around, introduce yourself, and make some new friends. \
             This community is amazing and you're going to love it here! 💫",
            identity, community
        )
    } else if channel_lower.contains("introductions") {
        format!(
            "🌟 Welcome {} to {}! \
             This is the perfect place to introduce yourself to the community. \
             Tell us a bit about yourself and what brings you here. \
             We can't wait to get to know you better! 🤝",
            identity, community
        )
    } else {
        format!(
            "🎊 Welcome {} to {}! You're joining an amazing community of people. \
             Feel free to explore, ask questions, and connect with fellow members. \
             We're glad you're here and can't wait to see what you'll contribute! 🚀",
            identity, community
        )
    }
}

/// First `max` characters of `text`, with `...` when cut
pub fn excerpt(text: &str, max: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

/// Operator report for one detection
pub fn detection_report(identity: &str, ctx: &ChannelContext, trigger: &str, welcome: &str) -> String {
    format!(
        "🎯 **NEW USER DETECTED!**\n\n\
         **Username:** {}\n\
         **Server:** {}\n\
         **Channel:** #{}\n\
         **Message:** {}\n\n\
         📤 **Generated Welcome Message:**\n{}",
        identity,
        ctx.community,
        ctx.channel,
        excerpt(trigger, EXCERPT_CHARS),
        welcome
    )
}

/// Confirmation that a welcome message is ready to send
pub fn ready_report(identity: &str, ctx: &ChannelContext, welcome: &str) -> String {
    format!(
        "✅ **WELCOME MESSAGE READY!**\n\n\
         **To:** {}\n\
         **In Server:** {}\n\
         **Channel:** #{}\n\
         **Message:** {}\n\n\
         **Note:** Welcome message generated and ready to send!",
        identity, ctx.community, ctx.channel, welcome
    )
}

/// Report sent when dispatching a detection failed
pub fn failure_report(identity: &str, error: &dyn Display) -> String {
    format!(
        "❌ **FAILED TO PROCESS WELCOME**\n\n\
         **Username:** {}\n\
         **Error:** {}\n\
         **Possible reasons:**\n\
         • User not found in server\n\
         • Bot permissions\n\
         • Server settings",
        identity, error
    )
}

/// Figures shown in the startup announcement
#[derive(Debug, Clone)]
pub struct StartupSummary {
    pub pattern_count: usize,
    pub channel_count: usize,
    pub rate_limit_delay_seconds: u64,
    pub max_operations_per_hour: u32,
    pub member_scan_enabled: bool,
}

pub fn startup_report(summary: &StartupSummary) -> String {
    let keyword_preview: Vec<&str> = WELCOME_CHANNEL_KEYWORDS.iter().take(5).copied().collect();
    format!(
        "🚀 **JOIN MONITOR IS ONLINE!**\n\n\
         **Monitoring Method:** Browser automation\n\
         **Channels Monitored:** {}\n\
         **Welcome Channels:** {} keywords\n\
         **Join Patterns:** {} patterns\n\
         **Member List Scan:** {}\n\
         **Rate Limit:** {}s between channels, {} visits/hour\n\n\
         **Target Servers:** {}\n\
         **Welcome Channel Keywords:** {}...",
        summary.channel_count,
        WELCOME_CHANNEL_KEYWORDS.len(),
        summary.pattern_count,
        if summary.member_scan_enabled { "ON" } else { "OFF" },
        summary.rate_limit_delay_seconds,
        summary.max_operations_per_hour,
        FEATURED_COMMUNITIES.join(", "),
        keyword_preview.join(", ")
    )
}
