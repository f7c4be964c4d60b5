use crate::error::Result;
use crate::types::SenderAction;
use async_trait::async_trait;

/// Outbound surface of a direct-messaging platform.
///
/// All three operations are network calls; whether a failure matters is the
/// caller's decision (presence signals are typically logged and dropped,
/// reply delivery is logged but never retried).
#[async_trait]
pub trait DmChannel: Send + Sync {
    /// Deliver a text reply to a conversation partner.
    async fn send_text(&self, recipient_id: &str, text: &str) -> Result<()>;

    /// Emit a presence signal (seen / typing) for a conversation partner.
    async fn send_action(&self, recipient_id: &str, action: SenderAction) -> Result<()>;

    /// Resolve a sender's public handle. `Ok(None)` means the platform has
    /// no handle for this sender; `Err` means the lookup itself failed.
    async fn fetch_username(&self, sender_id: &str) -> Result<Option<String>>;
}
