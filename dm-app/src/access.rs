//! Sender allow-list filtering.
//!
//! When an allowed handle is configured, every sender's handle is resolved
//! through the platform's profile lookup and compared case-insensitively.
//! Resolutions are cached for the life of the process and never refreshed —
//! staleness is accepted in exchange for staying under the lookup API's
//! rate limits.

use dashmap::DashMap;
use dm_channels::DmChannel;
use std::sync::Arc;

pub struct AccessFilter {
    allowed_username: Option<String>,
    channel: Arc<dyn DmChannel>,
    username_cache: DashMap<String, String>,
}

impl AccessFilter {
    pub fn new(allowed_username: Option<String>, channel: Arc<dyn DmChannel>) -> Self {
        Self {
            allowed_username: allowed_username
                .as_deref()
                .map(str::trim)
                .filter(|handle| !handle.is_empty())
                .map(ToOwned::to_owned),
            channel,
            username_cache: DashMap::new(),
        }
    }

    /// Decide whether a message from `sender_id` should be processed.
    ///
    /// A failed lookup fails open: dropping real messages because the
    /// profile API is flaky would be worse than occasionally replying to a
    /// stranger.
    pub async fn permits(&self, sender_id: &str) -> bool {
        let Some(allowed) = self.allowed_username.as_deref() else {
            return true;
        };

        match self.resolve_username(sender_id).await {
            Ok(Some(username)) => {
                if username.eq_ignore_ascii_case(allowed) {
                    true
                } else {
                    tracing::info!(
                        sender_id,
                        username = %username,
                        "sender is not the allow-listed handle; dropping message"
                    );
                    false
                }
            }
            Ok(None) => {
                tracing::info!(sender_id, "sender has no resolvable handle; dropping message");
                false
            }
            Err(e) => {
                tracing::warn!(
                    %e,
                    sender_id,
                    "username lookup failed; proceeding without allow-list check"
                );
                true
            }
        }
    }

    async fn resolve_username(&self, sender_id: &str) -> dm_channels::Result<Option<String>> {
        if let Some(cached) = self.username_cache.get(sender_id) {
            return Ok(Some(cached.clone()));
        }

        let resolved = self.channel.fetch_username(sender_id).await?;
        if let Some(username) = resolved.as_deref() {
            // Only successful, non-empty resolutions are cached; failures
            // retry on the next message.
            self.username_cache
                .insert(sender_id.to_string(), username.to_string());
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dm_channels::{ChannelError, SenderAction};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeLookup {
        username: Option<&'static str>,
        fail: bool,
        fetches: AtomicUsize,
    }

    impl FakeLookup {
        fn returning(username: Option<&'static str>) -> Self {
            Self {
                username,
                fail: false,
                fetches: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                username: None,
                fail: true,
                fetches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DmChannel for FakeLookup {
        async fn send_text(&self, _recipient_id: &str, _text: &str) -> dm_channels::Result<()> {
            Ok(())
        }

        async fn send_action(
            &self,
            _recipient_id: &str,
            _action: SenderAction,
        ) -> dm_channels::Result<()> {
            Ok(())
        }

        async fn fetch_username(&self, _sender_id: &str) -> dm_channels::Result<Option<String>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ChannelError::Http("lookup unavailable".into()));
            }
            Ok(self.username.map(ToOwned::to_owned))
        }
    }

    fn filter(
        allowed: Option<&str>,
        channel: Arc<FakeLookup>,
    ) -> AccessFilter {
        AccessFilter::new(allowed.map(ToOwned::to_owned), channel)
    }

    #[tokio::test]
    async fn no_allow_list_means_everyone_is_permitted() {
        let channel = Arc::new(FakeLookup::returning(Some("whoever")));
        let filter = filter(None, Arc::clone(&channel));
        assert!(filter.permits("U1").await);
        // No lookup should even be attempted.
        assert_eq!(channel.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn blank_allow_list_is_treated_as_unset() {
        let channel = Arc::new(FakeLookup::returning(Some("whoever")));
        let filter = filter(Some("   "), Arc::clone(&channel));
        assert!(filter.permits("U1").await);
        assert_eq!(channel.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn handle_match_is_case_insensitive() {
        let channel = Arc::new(FakeLookup::returning(Some("Alice")));
        let filter = filter(Some("alice"), channel);
        assert!(filter.permits("U1").await);
    }

    #[tokio::test]
    async fn mismatched_handle_is_dropped() {
        let channel = Arc::new(FakeLookup::returning(Some("bob")));
        let filter = filter(Some("alice"), channel);
        assert!(!filter.permits("U1").await);
    }

    #[tokio::test]
    async fn unresolvable_handle_is_dropped() {
        let channel = Arc::new(FakeLookup::returning(None));
        let filter = filter(Some("alice"), channel);
        assert!(!filter.permits("U1").await);
    }

    #[tokio::test]
    async fn lookup_error_fails_open() {
        let channel = Arc::new(FakeLookup::failing());
        let filter = filter(Some("alice"), channel);
        assert!(filter.permits("U1").await);
    }

    #[tokio::test]
    async fn resolved_handles_are_cached_for_the_process_lifetime() {
        let channel = Arc::new(FakeLookup::returning(Some("alice")));
        let filter = filter(Some("alice"), Arc::clone(&channel));

        assert!(filter.permits("U1").await);
        assert!(filter.permits("U1").await);
        assert!(filter.permits("U1").await);
        assert_eq!(channel.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_lookups_are_not_cached() {
        let channel = Arc::new(FakeLookup::failing());
        let filter = filter(Some("alice"), Arc::clone(&channel));

        assert!(filter.permits("U1").await);
        assert!(filter.permits("U1").await);
        assert_eq!(channel.fetches.load(Ordering::SeqCst), 2);
    }
}
