use crate::error::AppError;
use crate::model::{ChatMessage, ChatRole};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Role as the language model sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
}

impl From<&ChatMessage> for Turn {
    fn from(message: &ChatMessage) -> Self {
        let role = match message.role {
            ChatRole::User => TurnRole::User,
            ChatRole::Assistant => TurnRole::Model,
        };
        Self {
            role,
            text: message.message.clone(),
        }
    }
}

/// A conversation seeded with prior turns. Built fresh for every request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversation {
    pub history: Vec<Turn>,
}

pub trait ModelProvider {
    fn start_conversation(&self, history: Vec<Turn>) -> Conversation {
        Conversation { history }
    }

    /// Sends `prompt` as the next user turn. `Ok(None)` means the model
    /// answered without any candidate text.
    fn send(
        &self,
        conversation: &Conversation,
        prompt: &str,
        timeout: Duration,
    ) -> Result<Option<String>, AppError>;
}
