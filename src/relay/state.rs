use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use call_relay_types::{CallIdentifier, ClientEvent};

use crate::call::events::EventFactory;
use crate::error::RelayError;
use crate::relay::publisher::CreditPublisher;

/// Names one utterance. Echoed back by the telephony side once the caller
/// has heard all of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlaybackLabel(String);

impl PlaybackLabel {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PlaybackLabel {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for PlaybackLabel {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for PlaybackLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkOutcome {
    /// Playback completion was reported to the agent.
    Completed,
    /// The last prompt of a closed dialog has been heard.
    HangUp,
    /// The mark does not name the outstanding label.
    Stale,
}

/// Per-call dialog state: call identity, whether the agent has closed the
/// dialog, and the label of the utterance currently awaiting its mark.
pub struct SessionStateMachine {
    call: CallIdentifier,
    dialog_closed: AtomicBool,
    label: Mutex<Option<PlaybackLabel>>,
    torn_down: AtomicBool,
    publisher: Arc<CreditPublisher<ClientEvent>>,
    events: Arc<EventFactory>,
}

impl SessionStateMachine {
    pub fn new(
        call: CallIdentifier,
        publisher: Arc<CreditPublisher<ClientEvent>>,
        events: Arc<EventFactory>,
    ) -> Self {
        Self {
            call,
            dialog_closed: AtomicBool::new(false),
            label: Mutex::new(None),
            torn_down: AtomicBool::new(false),
            publisher,
            events,
        }
    }

    fn label(&self) -> MutexGuard<'_, Option<PlaybackLabel>> {
        self.label.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn call(&self) -> &CallIdentifier {
        &self.call
    }

    /// Mints the label for a finished utterance. Returns `None` while another
    /// label is still waiting for its mark.
    pub fn mint_label(&self) -> Option<PlaybackLabel> {
        let mut label = self.label();
        if let Some(outstanding) = label.as_ref() {
            tracing::warn!(
                "call {}: label {} still outstanding, skipping mark",
                self.call, outstanding
            );
            return None;
        }
        let minted = PlaybackLabel::new();
        *label = Some(minted.clone());
        Some(minted)
    }

    pub fn clear_label(&self) -> Option<PlaybackLabel> {
        self.label().take()
    }

    /// Clears the outstanding label only if it is still `minted`.
    pub fn release_label(&self, minted: &PlaybackLabel) -> bool {
        let mut label = self.label();
        if label.as_ref() == Some(minted) {
            *label = None;
            return true;
        }
        false
    }

    pub fn outstanding_label(&self) -> Option<PlaybackLabel> {
        self.label().clone()
    }

    pub fn on_mark_acknowledged(&self, name: &str) -> Result<MarkOutcome, RelayError> {
        {
            let mut label = self.label();
            match label.as_ref() {
                Some(outstanding) if outstanding.as_str() == name => {
                    *label = None;
                }
                _ => {
                    tracing::debug!("call {}: ignoring stale mark {}", self.call, name);
                    return Ok(MarkOutcome::Stale);
                }
            }
        }

        if self.is_dialog_closed() {
            tracing::info!("call {}: final prompt played", self.call);
            return Ok(MarkOutcome::HangUp);
        }
        self.publisher.enqueue(self.events.playback_completion())?;
        Ok(MarkOutcome::Completed)
    }

    pub fn on_dialog_closed(&self) {
        if !self.dialog_closed.swap(true, Ordering::SeqCst) {
            tracing::info!("call {}: dialog closed by agent", self.call);
        }
    }

    pub fn is_dialog_closed(&self) -> bool {
        self.dialog_closed.load(Ordering::SeqCst)
    }

    pub fn should_hang_up(&self, has_pending_message: bool) -> bool {
        self.is_dialog_closed() && !has_pending_message
    }

    /// True for exactly one caller per call.
    pub fn begin_teardown(&self) -> bool {
        !self.torn_down.swap(true, Ordering::SeqCst)
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }
}
