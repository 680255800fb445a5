// libs/session-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use shared_utils::token::MediaToken;

/// Events fanned out to every connected participant of a session.
///
/// `seq` is assigned under the session's lock, so every participant observes
/// the same strictly increasing, gap-free order.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    ParticipantJoined { seq: u64, user_id: Uuid },
    ParticipantLeft { seq: u64, user_id: Uuid },
    SessionStarted { seq: u64 },
    Signal { seq: u64, from: Uuid, payload: Value },
    SessionEnded { seq: u64, reason: String },
}

impl SessionEvent {
    pub fn seq(&self) -> u64 {
        match self {
            SessionEvent::ParticipantJoined { seq, .. }
            | SessionEvent::ParticipantLeft { seq, .. }
            | SessionEvent::SessionStarted { seq }
            | SessionEvent::Signal { seq, .. }
            | SessionEvent::SessionEnded { seq, .. } => *seq,
        }
    }
}

/// What a participant gets back from a successful join: a media token scoped
/// to the appointment. Session events queue in the participant's bounded
/// inbox and are collected through the events endpoint.
#[derive(Debug)]
pub struct SessionHandle {
    pub appointment_id: Uuid,
    pub user_id: Uuid,
    pub media_token: MediaToken,
}

/// Point-in-time view of a session, for the HTTP surface.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub appointment_id: Uuid,
    pub last_seq: u64,
    pub participants: Vec<ParticipantView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParticipantView {
    pub user_id: Uuid,
    pub connected: bool,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublishRequest {
    pub payload: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum SessionError {
    #[error("Appointment not found")]
    UnknownAppointment,

    #[error("Not a participant in this appointment")]
    NotAParticipant,

    #[error("Session not joinable: {0}")]
    NotJoinable(String),

    #[error("No active session for this appointment")]
    NoActiveSession,

    #[error("A participant queue is full")]
    BackpressureExceeded,

    #[error("Media token issuance failed: {0}")]
    TokenIssuance(String),
}
