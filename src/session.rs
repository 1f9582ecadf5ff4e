//! Inbox session: load cycle, read-state reconciliation, and views
//!
//! [`InboxSession`] is the explicit context object behind the inbox widget:
//! it owns the active data source, the persisted read-state fallback, the
//! loaded messages, and the view mode. Each session is independent, so hosts
//! can run several side by side and tests stay deterministic.
//!
//! Read-state reconciliation merges two sources of truth: a server-held
//! per-message flag (authoritative when present) and the client-persisted
//! `lastCheckedAt` timestamp (fallback when it is not). After every load the
//! fallback is advanced to the newest read message so a later load with a
//! missing server field still reconstructs correct state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::composer::compose_reply;
use crate::config::InboxConfig;
use crate::errors::{AppError, AppResult};
use crate::mapper::map_record;
use crate::models::{LoadOutcome, Message, ReplyOutcome};
use crate::read_state::{
    ReadStateStore, advance_last_checked, clear_last_checked, load_last_checked,
};
use crate::source::MessageSource;

/// Which slice of the inbox is shown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    /// Unread messages only
    Active,
    /// Read (archived) messages only
    Archived,
}

/// One independent inbox instance
///
/// All operations take `&self`, so a session can be shared (behind an `Arc`,
/// say) and a host can start a new load while an earlier one is still in
/// flight. Loads are guarded by a generation counter: a load overtaken by a
/// newer one discards its results instead of overwriting fresher state.
pub struct InboxSession {
    config: Arc<InboxConfig>,
    source: MessageSource,
    store: Box<dyn ReadStateStore>,
    state: Mutex<SessionState>,
    load_generation: AtomicU64,
}

/// Loaded messages and the current view; the lock guarding this is never
/// held across a suspension point.
struct SessionState {
    messages: Vec<Message>,
    view: ViewMode,
}

impl InboxSession {
    /// Create a session over a selected source and read-state store
    pub fn new(
        config: Arc<InboxConfig>,
        source: MessageSource,
        store: Box<dyn ReadStateStore>,
    ) -> Self {
        Self {
            config,
            source,
            store,
            state: Mutex::new(SessionState {
                messages: Vec::new(),
                view: ViewMode::Active,
            }),
            load_generation: AtomicU64::new(0),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run a full fetch, map, and reconcile cycle
    ///
    /// Fetch and mapping failures surface as a single error state; the
    /// previously loaded messages are left untouched (no partial rendering
    /// of a half-loaded list). A load overtaken by a newer `load_messages`
    /// call returns [`LoadOutcome::Stale`] and discards its batch.
    ///
    /// # Errors
    ///
    /// - `SourceUnavailable` / `AuthUnavailable` / `RemoteError` /
    ///   `OperationDisabled` from the active source
    /// - `Mapping` when a record violates the required-field contract
    pub async fn load_messages(&self) -> AppResult<LoadOutcome> {
        let generation = self.load_generation.fetch_add(1, Ordering::SeqCst) + 1;

        let records = self.source.fetch_records().await?;

        let mut messages = records
            .iter()
            .map(|record| map_record(record, &self.config))
            .collect::<AppResult<Vec<Message>>>()?;

        let last_checked = load_last_checked(self.store.as_ref());
        for message in &mut messages {
            message.read = derive_read(message, last_checked);
        }

        // Install under the lock: only the most recently started load may
        // publish its batch, however the fetches interleave.
        let mut state = self.lock_state();
        if generation != self.load_generation.load(Ordering::SeqCst) {
            debug!(generation, "discarding stale load result");
            return Ok(LoadOutcome::Stale);
        }

        // Keep the local fallback consistent with server truth: a later
        // load with a missing server field must still derive these as read.
        if let Some(newest_read) = messages
            .iter()
            .filter(|message| message.read)
            .map(|message| message.date)
            .max()
        {
            advance_last_checked(self.store.as_ref(), newest_read);
        }

        state.messages = messages;
        let total = state.messages.len();
        let unread = state.messages.iter().filter(|m| !m.read).count();
        debug!(total, unread, "load cycle complete");
        Ok(LoadOutcome::Loaded { total, unread })
    }

    /// Mark one message as read
    ///
    /// No-op for an unknown id or an already-read message. The local flag is
    /// flipped optimistically and `lastCheckedAt` advanced before the remote
    /// update; a remote failure is logged but never reverts the local state.
    /// On the snapshot source the change stays local.
    pub async fn mark_as_read(&self, id: &str) -> AppResult<()> {
        let date = {
            let mut state = self.lock_state();
            let Some(message) = state.messages.iter_mut().find(|m| m.id == id) else {
                return Ok(());
            };
            if message.read {
                return Ok(());
            }
            message.read = true;
            message.date
        };
        advance_last_checked(self.store.as_ref(), date);

        if let Err(e) = self.source.update_read_flag(id, true).await {
            warn!(id, error = %e, "remote read-flag update failed; keeping optimistic local state");
        }
        Ok(())
    }

    /// Mark every loaded message as read
    ///
    /// Bulk local-only operation: `lastCheckedAt` is set to the current
    /// instant and no per-message remote update is issued. The server learns
    /// of it indirectly on the next reconciliation.
    pub fn mark_all_as_read(&self) {
        advance_last_checked(self.store.as_ref(), Utc::now());
        for message in &mut self.lock_state().messages {
            message.read = true;
        }
    }

    /// Flip between the unread and archived views
    pub fn toggle_view(&self) {
        let mut state = self.lock_state();
        state.view = match state.view {
            ViewMode::Active => ViewMode::Archived,
            ViewMode::Archived => ViewMode::Active,
        };
    }

    /// Current view mode
    pub fn view(&self) -> ViewMode {
        self.lock_state().view
    }

    /// Messages matching the current view mode
    ///
    /// Returns clones: the loaded list can change under a shared session, so
    /// no references into it escape the lock.
    pub fn filtered_messages(&self) -> Vec<Message> {
        let state = self.lock_state();
        let archived = state.view == ViewMode::Archived;
        state
            .messages
            .iter()
            .filter(|message| message.read == archived)
            .cloned()
            .collect()
    }

    /// All loaded messages
    pub fn messages(&self) -> Vec<Message> {
        self.lock_state().messages.clone()
    }

    /// Count of messages deriving `read == false`
    pub fn unread_count(&self) -> usize {
        self.lock_state()
            .messages
            .iter()
            .filter(|message| !message.read)
            .count()
    }

    /// Compose and send a reply to a loaded message
    ///
    /// A remote failure surfaces as `ReplyOutcome { success: false }` so the
    /// host can prompt the user to retry manually; there is no automatic
    /// retry. Composition failures (missing identities) and disabled
    /// operations propagate as errors.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` for an unknown message id
    /// - `Compose` when the original lacks a required identity
    /// - `OperationDisabled` / `AuthUnavailable` from the source
    pub async fn create_reply(&self, id: &str, reply_text: &str) -> AppResult<ReplyOutcome> {
        let original = self
            .lock_state()
            .messages
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| AppError::invalid(format!("no loaded message with id '{id}'")))?;
        let payload = compose_reply(&original, reply_text, &self.config)?;

        match self.source.create_reply(&payload).await {
            Ok(()) => Ok(ReplyOutcome {
                success: true,
                message: "reply created".to_owned(),
            }),
            Err(e @ (AppError::RemoteError { .. } | AppError::SourceUnavailable(_))) => {
                warn!(id, error = %e, "reply creation failed");
                Ok(ReplyOutcome {
                    success: false,
                    message: e.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Testing utility: delete the persisted read state and reload
    pub async fn clear_read_status(&self) -> AppResult<LoadOutcome> {
        clear_last_checked(self.store.as_ref());
        self.load_messages().await
    }
}

/// Derive one message's read flag
///
/// The server-held flag wins verbatim whenever present; otherwise the
/// message is read iff it is dated at or before the persisted fallback.
fn derive_read(message: &Message, last_checked: DateTime<Utc>) -> bool {
    message
        .has_read_value
        .unwrap_or(message.date <= last_checked)
}
