pub mod fallback;
pub mod format;
pub mod openrouter;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::types::Completion;

pub use fallback::{FallbackOrchestrator, NetworkStatus, SlotId};
pub use format::{format_messages, ContentPart, MessageContent, ProviderPayload, WireMessage};
pub use openrouter::OpenRouterClient;

/// Trait for LLM providers.
///
/// One call is one HTTP round trip; implementations never retry.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Send already-formatted messages to `model` using `credential`.
    async fn send(
        &self,
        messages: &[WireMessage],
        credential: &str,
        model: &str,
    ) -> Result<Completion, ProviderError>;
}
