//! Confirmation Coordinator - the approve/decline handshake for note creation
//!
//! At most one proposal is pending. A new CONFIRM replaces the current one
//! (last proposal wins, nothing is queued). Resolving always clears the
//! proposal, whether the request succeeded or not, because a stale proposal
//! has no retry path in the UI.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::sync::Arc;

use super::errors::ResolutionError;
use super::traits::{NotesApi, NotesObserver};

/// Structured note fields suggested by the assistant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteSuggestion {
    #[serde(default, deserialize_with = "lenient_text")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub description: Option<String>,
    /// Reminder time kept verbatim from the wire: ISO-8601 or epoch millis
    #[serde(default, deserialize_with = "lenient_text")]
    pub remind_at: Option<String>,
}

/// Strings and numbers are kept as text; any other value reads as absent
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => Some(text),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

impl NoteSuggestion {
    /// Interpret a `requestedSchema` payload as a suggestion, if it has any
    /// recognizable field
    pub fn from_schema(schema: &Value) -> Option<Self> {
        let suggestion: Self = serde_json::from_value(schema.clone()).ok()?;
        (!suggestion.is_blank()).then_some(suggestion)
    }

    pub fn is_blank(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.remind_at.is_none()
    }

    pub fn display_title(&self) -> &str {
        non_empty(self.title.as_deref()).unwrap_or("Untitled")
    }

    pub fn display_description(&self) -> &str {
        non_empty(self.description.as_deref()).unwrap_or("No description")
    }

    /// Reminder in local time, the raw value if it does not parse, or a
    /// placeholder when there is none
    pub fn display_reminder(&self) -> String {
        match non_empty(self.remind_at.as_deref()) {
            None => "No reminder".to_string(),
            Some(raw) => {
                let at = raw.parse::<DateTime<Utc>>().ok().or_else(|| {
                    raw.parse::<i64>()
                        .ok()
                        .and_then(DateTime::from_timestamp_millis)
                });
                match at {
                    Some(at) => at
                        .with_timezone(&Local)
                        .format("%-d %B %Y, %H:%M")
                        .to_string(),
                    None => raw.to_string(),
                }
            }
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Payload of a CONFIRM frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfirmRequest {
    pub note_suggestion: Option<NoteSuggestion>,
    pub requested_schema: Option<Value>,
    /// Free-text rationale, shown when no structured fields are available
    pub content: Option<String>,
}

/// A side-effecting action waiting for the user's decision
#[derive(Debug, Clone, PartialEq)]
pub struct PendingProposal {
    /// Identity key the resolution is correlated with
    pub chat_id: String,
    pub suggestion: Option<NoteSuggestion>,
    pub rationale: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl PendingProposal {
    pub fn from_request(chat_id: &str, request: ConfirmRequest) -> Self {
        let suggestion = request
            .note_suggestion
            .filter(|s| !s.is_blank())
            .or_else(|| request.requested_schema.as_ref().and_then(NoteSuggestion::from_schema));
        Self {
            chat_id: chat_id.to_string(),
            suggestion,
            rationale: request.content,
            received_at: Utc::now(),
        }
    }

    /// Text shown when there is no structured suggestion
    pub fn fallback_text(&self) -> &str {
        non_empty(self.rationale.as_deref()).unwrap_or("Confirm action?")
    }
}

/// How a resolve call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// There was no proposal to resolve
    NothingPending,
    Accepted,
    Declined,
}

#[derive(Default)]
pub struct ConfirmationCoordinator {
    pending: Option<PendingProposal>,
    observer: Option<Arc<dyn NotesObserver>>,
}

impl ConfirmationCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_observer(observer: Arc<dyn NotesObserver>) -> Self {
        Self {
            pending: None,
            observer: Some(observer),
        }
    }

    pub fn set_observer(&mut self, observer: Option<Arc<dyn NotesObserver>>) {
        self.observer = observer;
    }

    pub fn pending(&self) -> Option<&PendingProposal> {
        self.pending.as_ref()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Store a new proposal, replacing any pending one
    pub fn on_confirm(&mut self, chat_id: &str, request: ConfirmRequest) -> &PendingProposal {
        let proposal = PendingProposal::from_request(chat_id, request);
        if self.pending.is_some() {
            tracing::info!(chat_id, "replacing pending note proposal");
        }
        self.pending.insert(proposal)
    }

    /// Send the user's decision and clear the proposal
    ///
    /// The notes observer is only told about an accepted proposal whose
    /// confirmation request went through.
    pub async fn resolve(
        &mut self,
        api: &dyn NotesApi,
        accepted: bool,
    ) -> Result<Resolution, ResolutionError> {
        let Some(proposal) = self.pending.take() else {
            return Ok(Resolution::NothingPending);
        };

        if let Err(err) = api.confirm_creation(&proposal.chat_id, accepted).await {
            tracing::error!(chat_id = %proposal.chat_id, accepted, "confirmation failed: {:#}", err);
            return Err(ResolutionError::RequestFailed(format!("{:#}", err)));
        }

        if !accepted {
            return Ok(Resolution::Declined);
        }
        if let Some(observer) = &self.observer {
            observer.notes_changed();
        }
        Ok(Resolution::Accepted)
    }

    /// Closing the proposal without choosing counts as a decline
    pub async fn dismiss(&mut self, api: &dyn NotesApi) -> Result<Resolution, ResolutionError> {
        self.resolve(api, false).await
    }

    /// Drop the proposal without telling the backend
    pub fn discard(&mut self) -> Option<PendingProposal> {
        self.pending.take()
    }
}

impl std::fmt::Debug for ConfirmationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfirmationCoordinator")
            .field("pending", &self.pending)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}
