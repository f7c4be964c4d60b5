//! Per-event processing for inbound text messages.
//!
//! Ordering is load-bearing: commands are honored before the pause gate
//! (so "start" still works while paused) and before the allow-list check,
//! which means any sender can pause or resume the assistant. That is kept
//! from the source behavior rather than restricted to an owner identity;
//! see the open-question notes in DESIGN.md.

use crate::access::AccessFilter;
use crate::commands::ControlCommand;
use crate::orchestrator::ResponseOrchestrator;
use crate::store::Store;
use anyhow::Result;
use dm_channels::{DmChannel, SenderAction};
use std::sync::Arc;

pub struct MessagePipeline {
    store: Store,
    channel: Arc<dyn DmChannel>,
    access: AccessFilter,
    orchestrator: ResponseOrchestrator,
}

impl MessagePipeline {
    pub fn new(
        store: Store,
        channel: Arc<dyn DmChannel>,
        access: AccessFilter,
        orchestrator: ResponseOrchestrator,
    ) -> Self {
        Self {
            store,
            channel,
            access,
            orchestrator,
        }
    }

    /// Run one inbound text message through the full sequence: command
    /// interpretation, pause gate, allow-list, presence signals, reply
    /// generation, delivery.
    ///
    /// Returns `Err` only for failures the webhook should surface as a 500
    /// (settings reads/writes); transport failures are best-effort and
    /// swallowed after logging.
    #[tracing::instrument(level = "info", skip_all, fields(sender_id = %sender_id))]
    pub async fn handle_message(&self, sender_id: &str, text: &str) -> Result<()> {
        if let Some(command) = ControlCommand::parse(text) {
            self.store.set_ai_active(command.activates()).await?;
            tracing::info!(?command, "control command applied");
            self.send_text_best_effort(sender_id, command.acknowledgement())
                .await;
            return Ok(());
        }

        if !self.store.is_ai_active().await? {
            tracing::info!("auto-reply is toggled off; ignoring message");
            return Ok(());
        }

        if !self.access.permits(sender_id).await {
            return Ok(());
        }

        // The typing affordance brackets the possibly multi-second
        // generation call; the reply send implicitly clears it.
        self.send_action_best_effort(sender_id, SenderAction::MarkSeen)
            .await;
        self.send_action_best_effort(sender_id, SenderAction::TypingOn)
            .await;

        let reply = self.orchestrator.respond(sender_id, text).await;
        self.send_text_best_effort(sender_id, &reply).await;
        Ok(())
    }

    async fn send_text_best_effort(&self, recipient_id: &str, text: &str) {
        if let Err(e) = self.channel.send_text(recipient_id, text).await {
            tracing::warn!(%e, recipient_id, "reply delivery failed");
        }
    }

    async fn send_action_best_effort(&self, recipient_id: &str, action: SenderAction) {
        if let Err(e) = self.channel.send_action(recipient_id, action).await {
            tracing::warn!(
                %e,
                recipient_id,
                action = action.as_str(),
                "presence signal failed"
            );
        }
    }
}
