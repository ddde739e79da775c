/// Core error types for drasa.
#[derive(Debug, thiserror::Error)]
pub enum DrasaError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Chat error: {0}")]
    Chat(#[from] ChatError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Outcome of a single failed provider call.
///
/// `RateLimited` is kept apart from every other failure because it is the only
/// kind that puts a slot into cooldown.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Rate limit reached. Please wait a moment and try again. Consider using a different model or upgrading your API plan.")]
    RateLimited,

    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("No API key configured for provider")]
    NoApiKey,
}

impl ProviderError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ProviderError::RateLimited)
    }
}

/// Terminal failures of a chat turn. The `Display` text is what the user sees.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("You appear to be offline. Please check your internet connection and try again.")]
    NoConnectivity,

    #[error("No API key configured. Add your OpenRouter API key (drasa login <KEY>) to enable AI responses.")]
    NoCredential,

    #[error("{}", all_limited_message(.wait_secs))]
    AllRateLimited { wait_secs: Option<u64> },

    #[error("API error: {0}")]
    Provider(#[from] ProviderError),
}

fn all_limited_message(wait_secs: &Option<u64>) -> String {
    match wait_secs {
        Some(secs) => format!(
            "All models are currently rate-limited. Please wait {} seconds and try again.",
            secs
        ),
        None => "All models are currently rate-limited. Please try again shortly.".to_string(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to read store: {0}")]
    Read(String),

    #[error("Failed to write store: {0}")]
    Write(String),

    #[error("Invalid chat data: {0}")]
    InvalidData(String),

    #[error("Attachment {name} is too large ({size} bytes, max {max})")]
    AttachmentTooLarge { name: String, size: u64, max: u64 },
}

pub type Result<T> = std::result::Result<T, DrasaError>;
