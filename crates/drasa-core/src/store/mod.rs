pub mod file_store;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

use crate::chat::Chat;
use crate::error::StoreError;

pub use file_store::FileStore;

/// Keys used in the key/value store.
pub mod keys {
    pub const CHATS: &str = "drasaAI_chats";
    pub const CURRENT_CHAT_ID: &str = "drasaAI_currentChatId";
    pub const IS_DARK_THEME: &str = "drasaAI_isDarkTheme";
    pub const API_KEY: &str = "drasaAI_apiKey";

    pub const ALL: [&str; 4] = [CHATS, CURRENT_CHAT_ID, IS_DARK_THEME, API_KEY];
}

/// Trait for string key/value storage backends.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a key. Returns whether it existed.
    fn remove(&mut self, key: &str) -> Result<bool, StoreError>;
}

/// In-memory store, used for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<bool, StoreError> {
        Ok(self.entries.remove(key).is_some())
    }
}

/// Everything the front-end persists between runs, apart from the credential.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    pub chats: Vec<Chat>,
    pub current_chat_id: Option<String>,
    pub is_dark_theme: bool,
}

pub fn save_state(kv: &mut dyn KeyValueStore, state: &AppState) -> Result<(), StoreError> {
    let chats =
        serde_json::to_string(&state.chats).map_err(|e| StoreError::Write(e.to_string()))?;
    kv.set(keys::CHATS, &chats)?;
    match &state.current_chat_id {
        Some(id) => kv.set(keys::CURRENT_CHAT_ID, id)?,
        None => {
            kv.remove(keys::CURRENT_CHAT_ID)?;
        }
    }
    kv.set(keys::IS_DARK_THEME, if state.is_dark_theme { "true" } else { "false" })
}

/// Load persisted state. Unreadable chat data yields an empty state.
pub fn load_state(kv: &dyn KeyValueStore) -> AppState {
    let chats = match kv.get(keys::CHATS) {
        Some(raw) => match serde_json::from_str::<Vec<Chat>>(&raw) {
            Ok(chats) => chats,
            Err(e) => {
                warn!("Error loading chats from store: {}", e);
                return AppState::default();
            }
        },
        None => Vec::new(),
    };

    AppState {
        chats,
        current_chat_id: kv.get(keys::CURRENT_CHAT_ID).filter(|id| !id.is_empty()),
        is_dark_theme: kv.get(keys::IS_DARK_THEME).as_deref() == Some("true"),
    }
}

pub fn save_api_key(kv: &mut dyn KeyValueStore, api_key: &str) -> Result<(), StoreError> {
    kv.set(keys::API_KEY, api_key.trim())
}

pub fn api_key(kv: &dyn KeyValueStore) -> Option<String> {
    kv.get(keys::API_KEY).filter(|k| !k.is_empty())
}

/// Remove every drasa key, including the credential.
pub fn clear(kv: &mut dyn KeyValueStore) -> Result<(), StoreError> {
    for key in keys::ALL {
        kv.remove(key)?;
    }
    Ok(())
}

/// Write chats as a pretty-printed JSON array.
pub fn export_chats(chats: &[Chat], path: &Path) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(chats).map_err(|e| StoreError::Write(e.to_string()))?;
    std::fs::write(path, json).map_err(|e| StoreError::Write(e.to_string()))
}

/// Read chats exported by [`export_chats`]. The file must hold a JSON array.
pub fn import_chats(path: &Path) -> Result<Vec<Chat>, StoreError> {
    let text = std::fs::read_to_string(path).map_err(|e| StoreError::Read(e.to_string()))?;
    let value: serde_json::Value =
        serde_json::from_str(&text).map_err(|e| StoreError::InvalidData(e.to_string()))?;
    if !value.is_array() {
        return Err(StoreError::InvalidData("Invalid chat format".to_string()));
    }
    serde_json::from_value(value).map_err(|e| StoreError::InvalidData(e.to_string()))
}
