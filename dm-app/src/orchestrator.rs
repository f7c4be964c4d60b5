//! Reply generation: prompt assembly and the ordered provider fallback.
//!
//! The orchestrator never fails. Provider errors fall through the priority
//! chain, exhaustion yields a fixed apology, and a failed history write is
//! logged without touching the already-decided reply.

use crate::config::AssistantConfig;
use crate::store::{HistoryRole, SETTING_CURRENT_STATUS, Store};
use dm_llm::{ChatMessage, CompletionProvider};
use std::sync::Arc;

pub struct ResponseOrchestrator {
    assistant: AssistantConfig,
    providers: Vec<Arc<dyn CompletionProvider>>,
    store: Store,
}

impl ResponseOrchestrator {
    /// `providers` is the startup-computed priority chain, tried in order.
    pub fn new(
        assistant: AssistantConfig,
        providers: Vec<Arc<dyn CompletionProvider>>,
        store: Store,
    ) -> Self {
        Self {
            assistant,
            providers,
            store,
        }
    }

    /// Produce a reply for a sender's message. Always returns non-empty
    /// text; the worst case is the configured apology.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn respond(&self, sender_id: &str, user_text: &str) -> String {
        let messages = self.build_context(sender_id, user_text).await;

        let mut reply = None;
        for provider in &self.providers {
            tracing::debug!(provider = provider.name(), sender_id, "trying provider");
            match provider.complete(&messages).await {
                Ok(text) => {
                    tracing::info!(provider = provider.name(), "provider produced the reply");
                    reply = Some(text);
                    break;
                }
                Err(e) => {
                    tracing::warn!(
                        provider = provider.name(),
                        %e,
                        "provider failed; advancing to the next one"
                    );
                }
            }
        }

        let reply = reply.unwrap_or_else(|| {
            tracing::error!(
                providers = self.providers.len(),
                "every provider failed; falling back to the apology reply"
            );
            self.assistant.apology.clone()
        });

        // The reply is already decided; losing the history write must not
        // change or block it.
        if let Err(e) = self.store.append_exchange(sender_id, user_text, &reply).await {
            tracing::error!(%e, sender_id, "failed to persist conversation turn");
        }

        reply
    }

    /// System instruction, then the windowed history oldest-first, then the
    /// new user message.
    async fn build_context(&self, sender_id: &str, user_text: &str) -> Vec<ChatMessage> {
        let status = self
            .store
            .setting_or(SETTING_CURRENT_STATUS, &self.assistant.status_fallback)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(%e, "status read failed; using the configured fallback");
                self.assistant.status_fallback.clone()
            });

        let history = self
            .store
            .recent_history(sender_id, self.assistant.history_window)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(%e, sender_id, "history read failed; replying without context");
                Vec::new()
            });

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(build_system_instruction(
            &self.assistant.persona,
            &status,
        )));
        for entry in history {
            messages.push(match entry.role {
                HistoryRole::User => ChatMessage::user(entry.message),
                HistoryRole::Assistant => ChatMessage::assistant(entry.message),
            });
        }
        messages.push(ChatMessage::user(user_text));
        messages
    }
}

fn build_system_instruction(persona: &str, status: &str) -> String {
    format!(
        "{persona}\n\nThe account owner's current status: {status}. Work this \
         into the conversation in your own words. Never quote the status text \
         back verbatim when someone first writes in, and once you have \
         mentioned it, do not bring the status up again on later turns."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dm_llm::{LlmError, Role};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedProvider {
        name: &'static str,
        reply: Option<&'static str>,
        calls: AtomicUsize,
        seen_messages: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedProvider {
        fn succeeding(name: &'static str, reply: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                reply: Some(reply),
                calls: AtomicUsize::new(0),
                seen_messages: Mutex::new(Vec::new()),
            })
        }

        fn failing(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                reply: None,
                calls: AtomicUsize::new(0),
                seen_messages: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn last_messages(&self) -> Vec<ChatMessage> {
            self.seen_messages
                .lock()
                .expect("seen_messages lock")
                .last()
                .cloned()
                .expect("provider was called")
        }
    }

    #[async_trait]
    impl CompletionProvider for ScriptedProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn complete(&self, messages: &[ChatMessage]) -> dm_llm::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen_messages
                .lock()
                .expect("seen_messages lock")
                .push(messages.to_vec());
            match self.reply {
                Some(reply) => Ok(reply.to_string()),
                None => Err(LlmError::Http("quota exceeded".into())),
            }
        }
    }

    fn orchestrator(
        providers: Vec<Arc<dyn CompletionProvider>>,
        store: &Store,
    ) -> ResponseOrchestrator {
        ResponseOrchestrator::new(AssistantConfig::default(), providers, store.clone())
    }

    #[tokio::test]
    async fn first_successful_provider_wins() {
        let store = Store::open_in_memory().expect("store");
        let a = ScriptedProvider::failing("a");
        let b = ScriptedProvider::succeeding("b", "reply from b");
        let c = ScriptedProvider::succeeding("c", "reply from c");
        let orch = orchestrator(
            vec![
                a.clone() as Arc<dyn CompletionProvider>,
                b.clone(),
                c.clone(),
            ],
            &store,
        );

        let reply = orch.respond("U1", "hello").await;
        assert_eq!(reply, "reply from b");
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 1);
        assert_eq!(c.calls(), 0);
    }

    #[tokio::test]
    async fn exhaustion_yields_the_apology_and_still_persists_the_pair() {
        let store = Store::open_in_memory().expect("store");
        let a = ScriptedProvider::failing("a");
        let b = ScriptedProvider::failing("b");
        let orch = orchestrator(
            vec![a.clone() as Arc<dyn CompletionProvider>, b.clone()],
            &store,
        );

        let reply = orch.respond("U1", "hello").await;
        assert_eq!(reply, AssistantConfig::default().apology);
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 1);

        let history = store.recent_history("U1", 10).await.expect("history");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].message, "hello");
        assert_eq!(history[1].message, reply);
    }

    #[tokio::test]
    async fn no_providers_configured_still_returns_the_apology() {
        let store = Store::open_in_memory().expect("store");
        let orch = orchestrator(Vec::new(), &store);
        let reply = orch.respond("U1", "hello").await;
        assert_eq!(reply, AssistantConfig::default().apology);
    }

    #[tokio::test]
    async fn context_is_system_then_window_then_new_message() {
        let store = Store::open_in_memory().expect("store");
        for i in 0..8 {
            store
                .append_exchange("U1", &format!("q{i}"), &format!("a{i}"))
                .await
                .expect("seed history");
        }
        let provider = ScriptedProvider::succeeding("p", "ok");
        let orch = orchestrator(
            vec![provider.clone() as Arc<dyn CompletionProvider>],
            &store,
        );

        orch.respond("U1", "the new message").await;

        // 8 exchanges = 16 rows; the window keeps the 10 most recent.
        let messages = provider.last_messages();
        assert_eq!(messages.len(), 12);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1], ChatMessage::user("q3"));
        assert_eq!(messages[10], ChatMessage::assistant("a7"));
        assert_eq!(messages[11], ChatMessage::user("the new message"));
    }

    #[tokio::test]
    async fn system_instruction_carries_persona_and_status() {
        let store = Store::open_in_memory().expect("store");
        store
            .set_setting(SETTING_CURRENT_STATUS, "hiking all weekend")
            .await
            .expect("set status");
        let provider = ScriptedProvider::succeeding("p", "ok");
        let mut assistant = AssistantConfig::default();
        assistant.persona = "You are the test persona.".to_string();
        let orch = ResponseOrchestrator::new(
            assistant,
            vec![provider.clone() as Arc<dyn CompletionProvider>],
            store.clone(),
        );

        orch.respond("U1", "hi").await;

        let system = provider.last_messages()[0].content.clone();
        assert!(system.starts_with("You are the test persona."));
        assert!(system.contains("hiking all weekend"));
        assert!(system.contains("Never quote the status text back verbatim"));
    }

    #[tokio::test]
    async fn status_falls_back_when_never_set() {
        let store = Store::open_in_memory().expect("store");
        let provider = ScriptedProvider::succeeding("p", "ok");
        let orch = orchestrator(
            vec![provider.clone() as Arc<dyn CompletionProvider>],
            &store,
        );

        orch.respond("U1", "hi").await;

        let system = provider.last_messages()[0].content.clone();
        assert!(system.contains(&AssistantConfig::default().status_fallback));
    }
}
