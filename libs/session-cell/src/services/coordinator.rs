// libs/session-cell/src/services/coordinator.rs
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use appointment_cell::models::{AppointmentEvent, TransitionError};
use appointment_cell::services::lifecycle::LifecycleService;
use shared_config::CoreConfig;
use shared_models::auth::AuthUser;
use shared_store::{Appointment, AppointmentStatus, AppointmentStore};
use shared_utils::token::issue_media_token;

use crate::models::{
    ParticipantView, SessionError, SessionEvent, SessionHandle, SessionSnapshot,
};

struct Presence {
    connected: bool,
    last_seen: DateTime<Utc>,
    sender: mpsc::Sender<SessionEvent>,
    /// The participant's bounded inbox, drained through the events endpoint.
    /// Held here so backpressure reflects how far the client has read.
    inbox: mpsc::Receiver<SessionEvent>,
}

/// All mutable session state lives under one mutex per appointment, so
/// sequence assignment and fan-out are a single serialization point and every
/// receiver observes the same order.
struct SessionInner {
    seq: u64,
    participants: HashMap<Uuid, Presence>,
    /// Set when the consultation has ended; the state is kept until every
    /// inbox has been drained so closing events still reach their readers.
    ended: bool,
}

impl SessionInner {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    /// Best-effort fan-out of a presence event. A full queue only costs that
    /// participant this copy.
    fn broadcast(&mut self, event: SessionEvent, skip: Option<Uuid>) {
        for (user_id, presence) in &self.participants {
            if Some(*user_id) == skip || !presence.connected {
                continue;
            }
            match presence.sender.try_send(event.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!("Dropped session event {} for participant {}", event.seq(), user_id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Participant {} receiver gone, skipping event", user_id);
                }
            }
        }
    }

    fn both_disconnected(&self, appointment: &Appointment) -> bool {
        [appointment.doctor_id, appointment.patient_id]
            .iter()
            .all(|id| {
                self.participants
                    .get(id)
                    .is_some_and(|presence| !presence.connected)
            })
    }

    fn both_connected(&self, appointment: &Appointment) -> bool {
        [appointment.doctor_id, appointment.patient_id]
            .iter()
            .all(|id| {
                self.participants
                    .get(id)
                    .is_some_and(|presence| presence.connected)
            })
    }
}

/// Coordinates the live consultation attached to a committed appointment.
///
/// State here is ephemeral and process-local; the appointment record remains
/// the durable source of truth, and every status change goes through the
/// lifecycle service's versioned transition.
pub struct SessionCoordinator {
    store: Arc<AppointmentStore>,
    lifecycle: LifecycleService,
    sessions: RwLock<HashMap<Uuid, Arc<Mutex<SessionInner>>>>,
    queue_capacity: usize,
    join_window: Duration,
    min_session: Duration,
    token_secret: String,
    token_ttl_secs: u64,
}

impl SessionCoordinator {
    pub fn new(
        store: Arc<AppointmentStore>,
        lifecycle: LifecycleService,
        config: &CoreConfig,
    ) -> Self {
        Self {
            store,
            lifecycle,
            sessions: RwLock::new(HashMap::new()),
            queue_capacity: config.session_queue_capacity,
            join_window: Duration::minutes(config.join_window_minutes),
            min_session: Duration::minutes(config.min_session_minutes),
            token_secret: config.media_token_secret.clone(),
            token_ttl_secs: config.media_token_ttl_secs,
        }
    }

    /// Admit a participant into the session for an appointment.
    ///
    /// Admission requires the consultation to be in progress, or confirmed
    /// with the current time inside the early-join window. Rejoining after a
    /// disconnect starts a fresh inbox; the session's sequence counter is
    /// never reset.
    pub async fn join(
        &self,
        appointment_id: Uuid,
        user: &AuthUser,
    ) -> Result<SessionHandle, SessionError> {
        let appointment = self.participant_appointment(appointment_id, user)?;
        self.check_joinable(&appointment)?;

        let media_token = issue_media_token(
            &self.token_secret,
            appointment_id,
            user.id,
            self.token_ttl_secs,
        )
        .map_err(SessionError::TokenIssuance)?;

        let session = self.session_for(appointment_id);
        let should_start = {
            let mut inner = session.lock().expect("session state poisoned");
            let (sender, inbox) = mpsc::channel(self.queue_capacity);
            inner.participants.insert(
                user.id,
                Presence {
                    connected: true,
                    last_seen: Utc::now(),
                    sender,
                    inbox,
                },
            );
            let seq = inner.next_seq();
            inner.broadcast(
                SessionEvent::ParticipantJoined {
                    seq,
                    user_id: user.id,
                },
                Some(user.id),
            );
            appointment.status == AppointmentStatus::Confirmed
                && inner.both_connected(&appointment)
        };

        if should_start {
            self.start_session(&appointment).await;
        }

        info!(
            "Participant {} joined session for appointment {}",
            user.id, appointment_id
        );
        Ok(SessionHandle {
            appointment_id,
            user_id: user.id,
            media_token,
        })
    }

    /// Collect the participant's queued events, in session order.
    ///
    /// Inboxes are bounded, so a participant that stops collecting
    /// eventually stalls and publishers observe the backpressure. Once the
    /// session has ended and every inbox is empty the state is dropped.
    pub fn drain_events(
        &self,
        appointment_id: Uuid,
        user: &AuthUser,
    ) -> Result<Vec<SessionEvent>, SessionError> {
        self.participant_appointment(appointment_id, user)?;
        let session = self.session(appointment_id)?;

        let (events, discard) = {
            let mut inner = session.lock().expect("session state poisoned");
            let presence = inner
                .participants
                .get_mut(&user.id)
                .ok_or(SessionError::NoActiveSession)?;
            let mut events = Vec::new();
            while let Ok(event) = presence.inbox.try_recv() {
                events.push(event);
            }
            let discard = inner.ended
                && inner
                    .participants
                    .values()
                    .all(|presence| presence.inbox.is_empty());
            (events, discard)
        };

        if discard {
            self.sessions
                .write()
                .expect("session registry poisoned")
                .remove(&appointment_id);
        }
        Ok(events)
    }

    /// Relay a signaling payload to every connected participant.
    ///
    /// The sequence number is consumed even when a queue is full: delivery to
    /// healthy participants stands, and only the sender learns about the
    /// overflow.
    pub fn publish(
        &self,
        appointment_id: Uuid,
        user: &AuthUser,
        payload: serde_json::Value,
    ) -> Result<u64, SessionError> {
        let appointment = self.participant_appointment(appointment_id, user)?;
        if appointment.status != AppointmentStatus::InProgress {
            return Err(SessionError::NoActiveSession);
        }
        let session = self.session(appointment_id)?;

        let mut inner = session.lock().expect("session state poisoned");
        let joined = inner
            .participants
            .get(&user.id)
            .is_some_and(|presence| presence.connected);
        if !joined {
            return Err(SessionError::NoActiveSession);
        }

        let seq = inner.next_seq();
        let event = SessionEvent::Signal {
            seq,
            from: user.id,
            payload,
        };
        let mut overflowed = false;
        for (user_id, presence) in &inner.participants {
            if !presence.connected {
                continue;
            }
            match presence.sender.try_send(event.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(
                        "Participant {} queue full, dropping signal {}",
                        user_id, seq
                    );
                    overflowed = true;
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Participant {} receiver gone, skipping signal {}", user_id, seq);
                }
            }
        }
        if overflowed {
            return Err(SessionError::BackpressureExceeded);
        }
        Ok(seq)
    }

    /// Mark a participant disconnected.
    ///
    /// Once both participants have left an in-progress consultation that ran
    /// at least the minimum duration, the coordinator completes the
    /// appointment and discards the session. Shorter sessions are left to an
    /// explicit end or the scheduler's sweep.
    pub async fn leave(
        &self,
        appointment_id: Uuid,
        user: &AuthUser,
    ) -> Result<(), SessionError> {
        let appointment = self.participant_appointment(appointment_id, user)?;
        let session = self.session(appointment_id)?;

        let now = Utc::now();
        let should_complete = {
            let mut inner = session.lock().expect("session state poisoned");
            let presence = inner
                .participants
                .get_mut(&user.id)
                .ok_or(SessionError::NoActiveSession)?;
            presence.connected = false;
            presence.last_seen = now;

            let seq = inner.next_seq();
            inner.broadcast(
                SessionEvent::ParticipantLeft {
                    seq,
                    user_id: user.id,
                },
                Some(user.id),
            );

            appointment.status == AppointmentStatus::InProgress
                && inner.both_disconnected(&appointment)
                && now - appointment.start_time >= self.min_session
        };

        debug!(
            "Participant {} left session for appointment {}",
            user.id, appointment_id
        );
        if should_complete {
            self.complete_session(appointment.id, "both participants left")
                .await;
        }
        Ok(())
    }

    /// Explicitly end the consultation. Completes the appointment regardless
    /// of elapsed duration and discards the session.
    pub async fn end_call(
        &self,
        appointment_id: Uuid,
        user: &AuthUser,
        reason: Option<String>,
    ) -> Result<(), SessionError> {
        let appointment = self.participant_appointment(appointment_id, user)?;
        if appointment.status != AppointmentStatus::InProgress {
            return Err(SessionError::NoActiveSession);
        }
        let session = self.session(appointment_id)?;

        let reason = reason.unwrap_or_else(|| "ended by participant".to_string());
        {
            let mut inner = session.lock().expect("session state poisoned");
            let seq = inner.next_seq();
            inner.broadcast(
                SessionEvent::SessionEnded {
                    seq,
                    reason: reason.clone(),
                },
                None,
            );
        }

        info!(
            "Participant {} ended the session for appointment {}: {}",
            user.id, appointment_id, reason
        );
        self.complete_session(appointment.id, &reason).await;
        Ok(())
    }

    /// Point-in-time view for a participant.
    pub fn snapshot(
        &self,
        appointment_id: Uuid,
        user: &AuthUser,
    ) -> Result<SessionSnapshot, SessionError> {
        self.participant_appointment(appointment_id, user)?;
        let session = self.session(appointment_id)?;
        let inner = session.lock().expect("session state poisoned");
        Ok(SessionSnapshot {
            appointment_id,
            last_seq: inner.seq,
            participants: inner
                .participants
                .iter()
                .map(|(user_id, presence)| ParticipantView {
                    user_id: *user_id,
                    connected: presence.connected,
                    last_seen: presence.last_seen,
                })
                .collect(),
        })
    }

    fn participant_appointment(
        &self,
        appointment_id: Uuid,
        user: &AuthUser,
    ) -> Result<Appointment, SessionError> {
        let appointment = self
            .store
            .get(appointment_id)
            .map_err(|_| SessionError::UnknownAppointment)?;
        if user.id != appointment.doctor_id && user.id != appointment.patient_id {
            return Err(SessionError::NotAParticipant);
        }
        Ok(appointment)
    }

    fn check_joinable(&self, appointment: &Appointment) -> Result<(), SessionError> {
        match appointment.status {
            AppointmentStatus::InProgress => Ok(()),
            AppointmentStatus::Confirmed => {
                let now = Utc::now();
                if now < appointment.start_time - self.join_window {
                    Err(SessionError::NotJoinable(
                        "Too early to join this consultation".to_string(),
                    ))
                } else if now >= appointment.end_time {
                    Err(SessionError::NotJoinable(
                        "The consultation window has passed".to_string(),
                    ))
                } else {
                    Ok(())
                }
            }
            other => Err(SessionError::NotJoinable(format!(
                "Appointment is {}, not joinable",
                other
            ))),
        }
    }

    /// Both parties are present inside the window: drive Confirmed to
    /// InProgress. Losing the version race to a concurrent start is fine.
    async fn start_session(&self, appointment: &Appointment) {
        match self
            .lifecycle
            .transition(
                appointment.id,
                appointment.version,
                AppointmentEvent::Start { forced: false },
            )
            .await
        {
            Ok(_) => {
                if let Some(session) = self.sessions_get(appointment.id) {
                    let mut inner = session.lock().expect("session state poisoned");
                    let seq = inner.next_seq();
                    inner.broadcast(SessionEvent::SessionStarted { seq }, None);
                }
            }
            Err(TransitionError::StaleVersion { .. }) => {
                debug!(
                    "Appointment {} already moved on, skipping session start",
                    appointment.id
                );
            }
            Err(err) => {
                warn!("Could not start session for {}: {}", appointment.id, err);
            }
        }
    }

    /// Drive the Completed transition at the record's current version,
    /// re-reading once if a concurrent transition got there first, then mark
    /// the session ended so remaining events can still be drained.
    async fn complete_session(&self, appointment_id: Uuid, reason: &str) {
        for _ in 0..2 {
            let current = match self.store.get(appointment_id) {
                Ok(current) => current,
                Err(_) => break,
            };
            if current.status != AppointmentStatus::InProgress {
                break;
            }
            match self
                .lifecycle
                .transition(
                    appointment_id,
                    current.version,
                    AppointmentEvent::Complete { abnormal: false },
                )
                .await
            {
                Ok(_) => {
                    info!("Appointment {} completed: {}", appointment_id, reason);
                    break;
                }
                Err(TransitionError::StaleVersion { .. }) => {
                    debug!(
                        "Appointment {} version moved, re-reading before completing",
                        appointment_id
                    );
                }
                Err(err) => {
                    warn!("Could not complete appointment {}: {}", appointment_id, err);
                    break;
                }
            }
        }
        if let Some(session) = self.sessions_get(appointment_id) {
            session.lock().expect("session state poisoned").ended = true;
        }
    }

    fn session_for(&self, appointment_id: Uuid) -> Arc<Mutex<SessionInner>> {
        if let Some(session) = self.sessions_get(appointment_id) {
            return session;
        }
        let mut sessions = self.sessions.write().expect("session registry poisoned");
        Arc::clone(sessions.entry(appointment_id).or_insert_with(|| {
            Arc::new(Mutex::new(SessionInner {
                seq: 0,
                participants: HashMap::new(),
                ended: false,
            }))
        }))
    }

    fn session(&self, appointment_id: Uuid) -> Result<Arc<Mutex<SessionInner>>, SessionError> {
        self.sessions_get(appointment_id)
            .ok_or(SessionError::NoActiveSession)
    }

    fn sessions_get(&self, appointment_id: Uuid) -> Option<Arc<Mutex<SessionInner>>> {
        self.sessions
            .read()
            .expect("session registry poisoned")
            .get(&appointment_id)
            .cloned()
    }
}
