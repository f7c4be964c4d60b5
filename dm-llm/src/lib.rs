//! Generation-provider clients for dmpilot.
//!
//! Pure HTTP clients, one per wire schema: `OpenAiCompatClient` covers the
//! chat-completions providers, `GeminiClient` covers Google's
//! `generateContent` API. Both sit behind the `CompletionProvider` trait so
//! the orchestrator (and tests) never name a concrete provider.

mod client;
mod error;
mod gemini;
mod openai_compat;
mod types;

pub use client::CompletionProvider;
pub use error::{LlmError, Result};
pub use gemini::GeminiClient;
pub use openai_compat::OpenAiCompatClient;
pub use types::{ChatMessage, Role};
