//! Detection pipeline
//!
//! Two entry points feed the same reporting step:
//! - [`DetectionPipeline::on_text`]: a join announcement matched in a message
//! - [`DetectionPipeline::on_roster`]: names from the member list not yet in
//!   the ledger
//!
//! Reporting is guarded by the reported-event key
//! `identity_community_channel`, so a detection is dispatched at most once per
//! key. State is mutated before the fallible dispatch and persisted after
//! each committed detection.
//!
//! Nothing maps one person's forms onto each other: a mention seen as
//! `User ID: 123` and the same person's display name in the roster are two
//! identities and are reported separately.

use crate::compose;
use crate::context::ChannelContext;
use crate::error::MonitorResult;
use crate::identity::{Normalizer, Verbatim};
use crate::ledger::{event_key, MonitorState};
use crate::matcher::PatternMatcher;
use crate::notify::{Notification, Notifier, NotifyError};
use crate::store::StateStore;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Trigger text quoted in reports for roster detections
pub const ROSTER_TRIGGER: &str = "Detected via member list UI";

/// Owns the ledger and event set and decides novelty
pub struct DetectionPipeline {
    matcher: PatternMatcher,
    normalizer: Box<dyn Normalizer>,
    state: MonitorState,
    store: Arc<dyn StateStore>,
    notifier: Arc<dyn Notifier>,
    send_message_to_users: bool,
}

impl DetectionPipeline {
    /// Pipeline with empty state; call [`load`](Self::load) to restore
    pub fn new(
        matcher: PatternMatcher,
        store: Arc<dyn StateStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            matcher,
            normalizer: Box::new(Verbatim),
            state: MonitorState::default(),
            store,
            notifier,
            send_message_to_users: false,
        }
    }

    pub fn with_normalizer(mut self, normalizer: Box<dyn Normalizer>) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn with_direct_messages(mut self, enabled: bool) -> Self {
        if enabled {
            warn!("send_message_to_users is on, but direct messages are not implemented; welcomes are reported only");
        }
        self.send_message_to_users = enabled;
        self
    }

    /// Replace in-memory state with what the store holds
    pub fn load(&mut self) -> MonitorResult<()> {
        self.state = MonitorState::restore(self.store.load()?);
        info!(
            "State restored: {} reported events, {} communities",
            self.state.events.len(),
            self.state.ledger.community_count()
        );
        Ok(())
    }

    /// Write the full state to the store
    pub fn flush(&self) -> MonitorResult<()> {
        self.store.save(&self.state.snapshot())?;
        Ok(())
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    pub fn matcher(&self) -> &PatternMatcher {
        &self.matcher
    }

    /// Handle one message block
    ///
    /// Returns the identity if this call reported it, `None` if nothing
    /// matched or the detection was already reported.
    pub async fn on_text(&mut self, text: &str, ctx: &ChannelContext) -> MonitorResult<Option<String>> {
        let Some(identity) = self.matcher.find_join_identity(text) else {
            return Ok(None);
        };
        debug!(identity = %identity, "Join pattern matched: {}", compose::excerpt(text, 120));

        if !self.report(&identity, ctx, text).await {
            return Ok(None);
        }
        self.flush()?;
        Ok(Some(identity))
    }

    /// Handle one roster sweep
    ///
    /// Names missing from the ledger are recorded before anything is
    /// dispatched, so a slow or failed dispatch cannot re-trigger them on the
    /// next poll. Returns the names that were new.
    pub async fn on_roster(&mut self, names: &[String], ctx: &ChannelContext) -> MonitorResult<Vec<String>> {
        let mut newly_detected = Vec::new();
        for name in names {
            let key = self.normalizer.canonical(name);
            if self.state.ledger.record(&ctx.community, &key) {
                newly_detected.push(name.clone());
            }
        }

        if newly_detected.is_empty() {
            return Ok(newly_detected);
        }

        info!(
            "{} new member(s) in {}: {}",
            newly_detected.len(),
            ctx,
            newly_detected.join(", ")
        );
        for name in &newly_detected {
            self.report(name, ctx, ROSTER_TRIGGER).await;
        }
        self.flush()?;
        Ok(newly_detected)
    }

    /// Report a detection once per event key; returns false if suppressed
    async fn report(&mut self, identity: &str, ctx: &ChannelContext, trigger: &str) -> bool {
        let key = event_key(&self.normalizer.canonical(identity), &ctx.community, &ctx.channel);
        if self.state.events.contains(&key) {
            debug!(key = %key, "Already reported");
            return false;
        }

        info!("🎯 New user detected: '{}' in {}", identity, ctx);
        self.state.events.insert(key);

        if let Err(e) = self.dispatch(identity, ctx, trigger).await {
            warn!("Failed to process welcome for {}: {}", identity, e);
            let report = Notification::error(compose::failure_report(identity, &e));
            if let Err(report_err) = self.notifier.send(&report).await {
                error!("Could not report dispatch failure for {}: {}", identity, report_err);
            }
        }
        true
    }

    async fn dispatch(&self, identity: &str, ctx: &ChannelContext, trigger: &str) -> Result<(), NotifyError> {
        let welcome = compose::welcome_message(identity, &ctx.community, &ctx.channel);

        let detection = compose::detection_report(identity, ctx, trigger, &welcome);
        self.notifier.send(&Notification::info(detection)).await?;

        if self.send_message_to_users {
            debug!("Direct message to {} skipped (not implemented)", identity);
        }

        info!("Welcome message ready for {}: {}", identity, welcome);
        let ready = compose::ready_report(identity, ctx, &welcome);
        self.notifier.send(&Notification::info(ready)).await?;
        Ok(())
    }
}
