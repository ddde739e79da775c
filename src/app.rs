use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use drasa_core::chat::ChatManager;
use drasa_core::config::Config;
use drasa_core::provider::{FallbackOrchestrator, NetworkStatus};
use drasa_core::store::{self, FileStore, KeyValueStore};
use drasa_core::types::{Attachment, ResponseResult, Role};

/// Everything one CLI invocation works with: chats, persistence and the
/// fallback orchestrator.
pub struct App {
    pub config: Config,
    pub store: FileStore,
    pub chats: ChatManager,
    pub orchestrator: FallbackOrchestrator,
    is_dark_theme: bool,
}

impl App {
    pub fn open(config: Config, online: bool) -> Result<Self> {
        let store = FileStore::open(&config.data_dir())?;
        let state = store::load_state(&store);
        let is_dark_theme = state.is_dark_theme;
        let chats = ChatManager::from_state(state);

        let mut orchestrator =
            FallbackOrchestrator::from_config(&config, Arc::new(NetworkStatus::new(online)));
        orchestrator.apply_stored_credential(&store);

        debug!(
            "Opened store at {} ({} chats)",
            store.path().display(),
            chats.chats().len()
        );

        Ok(Self {
            config,
            store,
            chats,
            orchestrator,
            is_dark_theme,
        })
    }

    /// Make sure there is a current chat to append to.
    pub fn ensure_chat(&mut self, new_chat: bool) {
        if new_chat || self.chats.current_chat().is_none() {
            self.chats.create_chat();
        }
    }

    /// Run one turn: record the user message, ask the orchestrator and record
    /// the reply. Failures are returned for display but never stored, so they
    /// do not reach the model as assistant turns later.
    pub async fn send(&mut self, text: &str, attachments: Vec<Attachment>) -> Result<ResponseResult> {
        let attachments_present = !attachments.is_empty();
        self.chats.add_message(Role::User, text, Some(attachments));
        self.persist()?;

        self.chats.set_typing(true);
        let result = self
            .orchestrator
            .get_response(self.chats.messages(), text, attachments_present)
            .await;
        self.chats.set_typing(false);

        if result.success {
            self.chats.add_message(Role::Assistant, &result.text, None);
            self.persist()?;
        }
        Ok(result)
    }

    pub fn persist(&mut self) -> Result<()> {
        let state = self.chats.to_state(self.is_dark_theme);
        store::save_state(&mut self.store, &state)?;
        Ok(())
    }

    /// Replace every chat with the ones in an export file.
    pub fn import(&mut self, path: &Path) -> Result<usize> {
        let chats = store::import_chats(path)?;
        let count = chats.len();
        let current = chats.first().map(|c| c.id.clone());
        self.chats = ChatManager::new(chats, current);
        self.persist()?;
        Ok(count)
    }

    pub fn export(&self, path: &Path) -> Result<()> {
        store::export_chats(self.chats.chats(), path)?;
        Ok(())
    }

    pub fn stored_api_key(&self) -> Option<String> {
        store::api_key(&self.store)
    }

    pub fn save_api_key(&mut self, key: &str) -> Result<()> {
        store::save_api_key(&mut self.store, key)?;
        Ok(())
    }

    pub fn forget_api_key(&mut self) -> Result<bool> {
        Ok(self.store.remove(store::keys::API_KEY)?)
    }

    /// Wipe chats and the stored credential.
    pub fn reset(&mut self) -> Result<()> {
        store::clear(&mut self.store)?;
        self.chats.clear_all();
        Ok(())
    }
}
