use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::AppState;
use crate::types::{Attachment, Message, Role};
use crate::util::truncate_string;

const NEW_CHAT_TITLE: &str = "New Chat";
const FILE_ONLY_TITLE: &str = "Shared a file";
const TITLE_MAX_CHARS: usize = 50;

/// A conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: String,
    pub title: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
}

impl Chat {
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: NEW_CHAT_TITLE.to_string(),
            messages: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

impl Default for Chat {
    fn default() -> Self {
        Self::new()
    }
}

/// Sidebar-style summary of a chat.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub message_count: usize,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub chat_id: String,
    pub chat_title: String,
    pub message: Message,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatStatistics {
    pub total_chats: usize,
    pub total_messages: usize,
    pub user_messages: usize,
    pub ai_messages: usize,
}

/// Ordered list of chats (newest first) plus the current selection.
#[derive(Debug, Default)]
pub struct ChatManager {
    chats: Vec<Chat>,
    current_chat_id: Option<String>,
    is_typing: bool,
}

impl ChatManager {
    pub fn new(chats: Vec<Chat>, current_chat_id: Option<String>) -> Self {
        Self {
            chats,
            current_chat_id,
            is_typing: false,
        }
    }

    pub fn from_state(state: AppState) -> Self {
        Self::new(state.chats, state.current_chat_id)
    }

    pub fn into_chats(self) -> Vec<Chat> {
        self.chats
    }

    pub fn chats(&self) -> &[Chat] {
        &self.chats
    }

    pub fn current_chat_id(&self) -> Option<&str> {
        self.current_chat_id.as_deref()
    }

    /// Create an empty chat, put it first and make it current.
    pub fn create_chat(&mut self) -> String {
        let chat = Chat::new();
        let id = chat.id.clone();
        self.chats.insert(0, chat);
        self.current_chat_id = Some(id.clone());
        id
    }

    pub fn chat(&self, id: &str) -> Option<&Chat> {
        self.chats.iter().find(|c| c.id == id)
    }

    pub fn current_chat(&self) -> Option<&Chat> {
        self.current_chat_id.as_deref().and_then(|id| self.chat(id))
    }

    fn current_chat_mut(&mut self) -> Option<&mut Chat> {
        let id = self.current_chat_id.as_deref()?;
        self.chats.iter_mut().find(|c| c.id == id)
    }

    pub fn set_current_chat(&mut self, id: &str) -> bool {
        if self.chat(id).is_some() {
            self.current_chat_id = Some(id.to_string());
            true
        } else {
            false
        }
    }

    /// Append to the current chat. The first user message names the chat.
    pub fn add_message(
        &mut self,
        role: Role,
        text: &str,
        attachments: Option<Vec<Attachment>>,
    ) -> Option<&Message> {
        let chat = self.current_chat_mut()?;
        chat.messages.push(Message {
            role,
            text: text.to_string(),
            attachments: attachments.filter(|a| !a.is_empty()),
        });

        if chat.messages.len() == 1 && role == Role::User {
            let title = if text.is_empty() { FILE_ONLY_TITLE } else { text };
            chat.title = truncate_string(title, TITLE_MAX_CHARS, "...");
        }

        chat.messages.last()
    }

    pub fn messages(&self) -> &[Message] {
        self.current_chat()
            .map(|c| c.messages.as_slice())
            .unwrap_or_default()
    }

    pub fn delete_chat(&mut self, id: &str) -> bool {
        let Some(index) = self.chats.iter().position(|c| c.id == id) else {
            return false;
        };
        self.chats.remove(index);
        if self.current_chat_id.as_deref() == Some(id) {
            self.current_chat_id = None;
        }
        true
    }

    pub fn clear_all(&mut self) {
        self.chats.clear();
        self.current_chat_id = None;
    }

    pub fn update_chat_title(&mut self, id: &str, title: &str) -> bool {
        match self.chats.iter_mut().find(|c| c.id == id) {
            Some(chat) => {
                chat.title = title.to_string();
                true
            }
            None => false,
        }
    }

    pub fn chat_history(&self) -> Vec<ChatSummary> {
        self.chats
            .iter()
            .map(|c| ChatSummary {
                id: c.id.clone(),
                title: c.title.clone(),
                created_at: c.created_at,
                message_count: c.messages.len(),
                is_active: self.current_chat_id.as_deref() == Some(c.id.as_str()),
            })
            .collect()
    }

    /// Case-insensitive substring search over every message.
    pub fn search_messages(&self, query: &str) -> Vec<SearchHit> {
        let query = query.to_lowercase();
        self.chats
            .iter()
            .flat_map(|chat| {
                chat.messages
                    .iter()
                    .filter(|m| m.text.to_lowercase().contains(&query))
                    .map(|m| SearchHit {
                        chat_id: chat.id.clone(),
                        chat_title: chat.title.clone(),
                        message: m.clone(),
                    })
            })
            .collect()
    }

    pub fn statistics(&self) -> ChatStatistics {
        let count = |role: Role| {
            self.chats
                .iter()
                .flat_map(|c| &c.messages)
                .filter(|m| m.role == role)
                .count()
        };
        ChatStatistics {
            total_chats: self.chats.len(),
            total_messages: self.chats.iter().map(|c| c.messages.len()).sum(),
            user_messages: count(Role::User),
            ai_messages: count(Role::Assistant),
        }
    }

    pub fn set_typing(&mut self, typing: bool) {
        self.is_typing = typing;
    }

    pub fn is_typing(&self) -> bool {
        self.is_typing
    }

    pub fn to_state(&self, is_dark_theme: bool) -> AppState {
        AppState {
            chats: self.chats.clone(),
            current_chat_id: self.current_chat_id.clone(),
            is_dark_theme,
        }
    }
}
