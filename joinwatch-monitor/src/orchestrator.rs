//! Poll orchestrator
//!
//! One cooperative flow of control visits every configured channel in order,
//! then sleeps until the next cycle:
//!
//! ```text
//! NAVIGATE -> SETTLE -> EXTRACT_CONTEXT -> SCAN_TEXT -> (SCAN_ROSTER)
//!   -> RATE_LIMIT_WAIT -> next channel ... -> POLL_INTERVAL_WAIT -> repeat
//! ```
//!
//! Cancellation is checked at the top of the cycle and channel loops and
//! interrupts any wait. Nothing is rolled back: detections already dispatched
//! or persisted stand.

use crate::context::ChannelContext;
use crate::detection::DetectionPipeline;
use crate::driver::{Locator, Page, Query};
use crate::error::{MonitorError, MonitorResult};
use crate::roster::RosterExtractor;
use futures::FutureExt;
use governor::{Quota, RateLimiter};
use joinwatch_common::config::MonitorConfig;
use joinwatch_common::time::secs_to_duration;
use std::any::Any;
use std::fmt;
use std::num::NonZeroU32;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Names printed in the member-list preview
const ROSTER_PREVIEW: usize = 20;

type VisitLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Timed yields in the polling flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suspension {
    /// Wait after a failed navigation and reload
    Navigate,
    /// Wait for the channel to render
    Settle,
    /// Spacing between channel visits
    RateLimit,
    /// Hourly visit budget exhausted
    Budget,
    /// Spacing between cycles
    PollInterval,
    /// After a failed cycle
    Backoff,
}

impl fmt::Display for Suspension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Suspension::Navigate => "navigate",
            Suspension::Settle => "settle",
            Suspension::RateLimit => "rate-limit",
            Suspension::Budget => "budget",
            Suspension::PollInterval => "poll-interval",
            Suspension::Backoff => "backoff",
        };
        write!(f, "{}", name)
    }
}

/// Pacing and scope of the polling loop
#[derive(Debug, Clone)]
pub struct PollSettings {
    pub channel_urls: Vec<String>,
    pub poll_interval: Duration,
    pub rate_limit_delay: Duration,
    pub navigation_timeout: Duration,
    pub navigation_retry: Duration,
    pub settle: Duration,
    pub cycle_backoff: Duration,
    pub messages_per_channel_scan: usize,
    pub member_scan_enabled: bool,
    pub handle_probe_limit: usize,
    /// Channel visits per hour; `None` disables the budget
    pub max_operations_per_hour: Option<NonZeroU32>,
}

impl PollSettings {
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            channel_urls: config.channel_urls.clone(),
            poll_interval: secs_to_duration(config.poll_interval_seconds),
            rate_limit_delay: secs_to_duration(config.rate_limit_delay_seconds),
            navigation_timeout: secs_to_duration(config.navigation_timeout_seconds),
            navigation_retry: secs_to_duration(config.navigation_retry_seconds),
            settle: secs_to_duration(config.settle_seconds),
            cycle_backoff: secs_to_duration(config.cycle_backoff_seconds),
            messages_per_channel_scan: config.messages_per_channel_scan,
            member_scan_enabled: config.member_scan_enabled,
            handle_probe_limit: config.handle_probe_limit,
            max_operations_per_hour: NonZeroU32::new(config.max_operations_per_hour),
        }
    }
}

/// What one channel visit observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelReport {
    pub url: String,
    pub context: ChannelContext,
    pub messages_scanned: usize,
    pub text_detections: Vec<String>,
    pub roster_names: usize,
    pub roster_detections: Vec<String>,
    pub handles: Vec<String>,
}

impl ChannelReport {
    fn new(url: &str, context: ChannelContext) -> Self {
        Self {
            url: url.to_string(),
            context,
            messages_scanned: 0,
            text_detections: Vec::new(),
            roster_names: 0,
            roster_detections: Vec::new(),
            handles: Vec::new(),
        }
    }
}

/// Drives the page through the configured channels and feeds the pipeline
pub struct PollOrchestrator {
    page: Arc<dyn Page>,
    pipeline: DetectionPipeline,
    roster: RosterExtractor,
    settings: PollSettings,
    limiter: Option<VisitLimiter>,
    cancel: CancellationToken,
}

impl PollOrchestrator {
    pub fn new(
        page: Arc<dyn Page>,
        pipeline: DetectionPipeline,
        roster: RosterExtractor,
        settings: PollSettings,
        cancel: CancellationToken,
    ) -> Self {
        let limiter = settings
            .max_operations_per_hour
            .map(|per_hour| RateLimiter::direct(Quota::per_hour(per_hour)));
        Self {
            page,
            pipeline,
            roster,
            settings,
            limiter,
            cancel,
        }
    }

    pub fn pipeline(&self) -> &DetectionPipeline {
        &self.pipeline
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Poll until cancelled, then flush state
    pub async fn run(&mut self) -> MonitorResult<()> {
        if self.settings.channel_urls.is_empty() {
            warn!("No channel URLs configured; set monitor.channel_urls or JOINWATCH_CHANNEL_URLS");
        }
        info!(
            channels = self.settings.channel_urls.len(),
            "Starting channel monitoring"
        );

        let mut cycle: u64 = 0;
        while !self.cancel.is_cancelled() {
            cycle += 1;
            let outcome = AssertUnwindSafe(self.run_cycle()).catch_unwind().await;
            let pause = match outcome {
                Ok(reports) => {
                    let detections: usize = reports
                        .iter()
                        .map(|r| r.text_detections.len() + r.roster_detections.len())
                        .sum();
                    info!(cycle, channels = reports.len(), detections, "Cycle complete");
                    (Suspension::PollInterval, self.settings.poll_interval)
                }
                Err(panic) => {
                    let e = MonitorError::Cycle(panic_message(panic.as_ref()));
                    error!(cycle, "Monitoring loop error: {}", e);
                    (Suspension::Backoff, self.settings.cycle_backoff)
                }
            };
            if !self.wait(pause.0, pause.1).await {
                break;
            }
        }

        info!("Monitoring stopped");
        self.pipeline.flush()
    }

    /// Visit every channel once, in configured order
    ///
    /// Per-channel failures are logged and the cycle moves on.
    pub async fn run_cycle(&mut self) -> Vec<ChannelReport> {
        let urls = self.settings.channel_urls.clone();
        let mut reports = Vec::with_capacity(urls.len());

        for url in &urls {
            if self.cancel.is_cancelled() {
                info!("Cancelled; stopping cycle before {}", url);
                break;
            }
            if !self.acquire_visit().await {
                break;
            }

            match self.scan_channel(url).await {
                Ok(report) => reports.push(report),
                Err(MonitorError::Cancelled) => {
                    info!("Cancelled while visiting {}", url);
                    break;
                }
                Err(e) => warn!("Channel navigation/scan error for {}: {}", url, e),
            }

            if !self.wait(Suspension::RateLimit, self.settings.rate_limit_delay).await {
                break;
            }
        }
        reports
    }

    /// One channel: navigate, settle, read context, scan text and roster
    ///
    /// Returns [`MonitorError::Cancelled`] if cancelled before scanning began.
    pub async fn scan_channel(&mut self, url: &str) -> MonitorResult<ChannelReport> {
        info!("Navigating to channel: {}", url);
        if let Err(e) = self.page.goto(url, self.settings.navigation_timeout).await {
            warn!("Initial load of {} failed ({}); retrying with reload", url, e);
            if let Err(e) = self.page.reload().await {
                debug!("Reload failed: {}", e);
            }
            if !self.wait(Suspension::Navigate, self.settings.navigation_retry).await {
                return Err(MonitorError::Cancelled);
            }
        }
        if !self.wait(Suspension::Settle, self.settings.settle).await {
            return Err(MonitorError::Cancelled);
        }

        let context = match self.page.title().await {
            Ok(title) => ChannelContext::from_title(&title),
            Err(e) => {
                debug!("Title unavailable: {}", e);
                ChannelContext::unknown()
            }
        };
        info!("Now at: {}", context);

        let mut report = ChannelReport::new(url, context.clone());
        self.scan_messages(&context, &mut report).await?;
        if self.settings.member_scan_enabled {
            self.scan_roster(&context, &mut report).await?;
        }
        Ok(report)
    }

    /// Run the newest message blocks through the pattern matcher
    async fn scan_messages(&mut self, context: &ChannelContext, report: &mut ChannelReport) -> MonitorResult<()> {
        let messages = Locator::new(Query::class_contains("messageContent"));
        let count = match self.page.count(&messages).await {
            Ok(n) => n,
            Err(e) => {
                debug!("Counting messages failed: {}", e);
                0
            }
        };
        debug!("Visible messages: {}", count);

        let start = count.saturating_sub(self.settings.messages_per_channel_scan);
        for i in start..count {
            let text = match self.page.inner_text(&messages.nth(i)).await {
                Ok(text) if !text.is_empty() => text,
                Ok(_) => continue,
                Err(e) => {
                    debug!("Skipping message {}: {}", i, e);
                    continue;
                }
            };
            report.messages_scanned += 1;
            if let Some(identity) = self.pipeline.on_text(&text, context).await? {
                report.text_detections.push(identity);
            }
        }
        Ok(())
    }

    async fn scan_roster(&mut self, context: &ChannelContext, report: &mut ChannelReport) -> MonitorResult<()> {
        let names = self.roster.display_names(self.page.as_ref()).await;
        report.roster_names = names.len();
        if names.is_empty() {
            return Ok(());
        }

        let preview = &names[..names.len().min(ROSTER_PREVIEW)];
        info!("Member preview ({} of {}): {}", preview.len(), names.len(), preview.join(", "));

        // Handles are logged only; novelty is decided on display names.
        let handles = self
            .roster
            .canonical_handles(self.page.as_ref(), self.settings.handle_probe_limit)
            .await;
        if !handles.is_empty() {
            info!("Member handles ({}): {}", handles.len(), handles.join(", "));
        }
        report.handles = handles;

        report.roster_detections = self.pipeline.on_roster(&names, context).await?;
        Ok(())
    }

    /// Take one permit from the hourly budget; false if cancelled meanwhile
    async fn acquire_visit(&self) -> bool {
        let Some(limiter) = &self.limiter else {
            return true;
        };
        if limiter.check().is_ok() {
            return true;
        }
        info!("Hourly visit budget exhausted; waiting");
        debug!(point = %Suspension::Budget, "Suspending");
        tokio::select! {
            _ = limiter.until_ready() => true,
            _ = self.cancel.cancelled() => false,
        }
    }

    /// Sleep unless cancelled; returns false if cancelled
    async fn wait(&self, point: Suspension, duration: Duration) -> bool {
        if duration.is_zero() {
            return !self.cancel.is_cancelled();
        }
        debug!(point = %point, "Suspending for {:?}", duration);
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.cancel.cancelled() => false,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
