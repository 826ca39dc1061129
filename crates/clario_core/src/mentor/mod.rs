//! Mentor chat: builds a bounded context from the user's tasks and recent
//! turns, asks the model for a reply and records the exchange.

use crate::calendar::now_in;
use crate::error::AppError;
use crate::model::UserId;
use crate::storage::{HistoryStore, TaskStore};
use log::{error, info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use time::{OffsetDateTime, UtcOffset};

pub mod context;
pub mod gemini;
pub mod provider;

pub use context::{ContextWarning, MentorContextWindow, TaskStats, assemble_context};
pub use gemini::GeminiClient;
pub use provider::{Conversation, ModelProvider, Turn, TurnRole};

pub const DEFAULT_HISTORY_LIMIT: usize = 20;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MentorSettings {
    pub history_limit: usize,
    pub timeout: Duration,
}

impl Default for MentorSettings {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MentorReply {
    pub text: String,
    pub stats: TaskStats,
    pub warnings: Vec<ContextWarning>,
}

impl MentorReply {
    /// The model answered without content; nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// One mutex per user so a user's exchanges never interleave.
#[derive(Default)]
struct UserLocks {
    inner: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl UserLocks {
    fn lock_for(&self, user_id: UserId) -> Arc<Mutex<()>> {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.entry(user_id).or_default().clone()
    }

    /// Drops the user's entry once no request holds or awaits it.
    fn release(&self, user_id: UserId, gate: Arc<Mutex<()>>) {
        drop(gate);
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if guard
            .get(&user_id)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            guard.remove(&user_id);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        match self.inner.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

pub struct MentorService<'a> {
    tasks: &'a (dyn TaskStore + Sync),
    history: &'a (dyn HistoryStore + Sync),
    model: &'a (dyn ModelProvider + Sync),
    settings: MentorSettings,
    offset: UtcOffset,
    locks: UserLocks,
}

impl<'a> MentorService<'a> {
    pub fn new(
        tasks: &'a (dyn TaskStore + Sync),
        history: &'a (dyn HistoryStore + Sync),
        model: &'a (dyn ModelProvider + Sync),
        settings: MentorSettings,
        offset: UtcOffset,
    ) -> Self {
        Self {
            tasks,
            history,
            model,
            settings,
            offset,
            locks: UserLocks::default(),
        }
    }

    pub fn reply(&self, user_id: UserId, utterance: &str) -> Result<MentorReply, AppError> {
        self.reply_within(user_id, utterance, self.settings.timeout)
    }

    pub fn reply_within(
        &self,
        user_id: UserId,
        utterance: &str,
        timeout: Duration,
    ) -> Result<MentorReply, AppError> {
        self.reply_at(user_id, utterance, now_in(self.offset), timeout)
    }

    pub fn reply_at(
        &self,
        user_id: UserId,
        utterance: &str,
        now: OffsetDateTime,
        timeout: Duration,
    ) -> Result<MentorReply, AppError> {
        if user_id <= 0 {
            return Err(AppError::invalid_input("user id must be positive"));
        }
        let utterance = utterance.trim();
        if utterance.is_empty() {
            return Err(AppError::invalid_input("message is required"));
        }

        let gate = self.locks.lock_for(user_id);
        let outcome = {
            let _serialized = match gate.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            self.exchange(user_id, utterance, now, timeout)
        };
        self.locks.release(user_id, gate);
        outcome
    }

    fn exchange(
        &self,
        user_id: UserId,
        utterance: &str,
        now: OffsetDateTime,
        timeout: Duration,
    ) -> Result<MentorReply, AppError> {
        let window = assemble_context(
            self.tasks,
            self.history,
            user_id,
            utterance,
            now,
            self.settings.history_limit,
        );
        let mut warnings = window.warnings.clone();

        let conversation = self.model.start_conversation(window.history.clone());
        let completion = self
            .model
            .send(&conversation, &window.prompt, timeout)
            .inspect_err(|err| error!("mentor model call failed for user {user_id}: {err}"))?;

        let text = match completion.filter(|text| !text.trim().is_empty()) {
            Some(text) => text,
            None => {
                warn!("mentor model returned no content for user {user_id}");
                warnings.push(ContextWarning::EmptyCompletion);
                return Ok(MentorReply {
                    text: String::new(),
                    stats: window.stats,
                    warnings,
                });
            }
        };

        if let Err(err) = self.history.append_exchange(user_id, utterance, &text) {
            error!("mentor reply for user {user_id} not recorded: {err}");
            return Err(AppError::HistoryOutOfSync {
                reply: text,
                message: format!("reply was produced but not saved: {err}"),
            });
        }

        info!(
            "mentor exchange recorded for user {user_id} ({} prior turns, {} warnings)",
            window.history.len(),
            warnings.len()
        );

        Ok(MentorReply {
            text,
            stats: window.stats,
            warnings,
        })
    }
}
