use std::env;
use tracing::warn;

/// Runtime configuration for the scheduling and session core.
///
/// Every value has a usable default so the services can start in a
/// development environment without a fully populated `.env`.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Secret used to sign short-lived media-channel tokens.
    pub media_token_secret: String,
    /// Lifetime of an issued media token, in seconds.
    pub media_token_ttl_secs: u64,
    /// Maximum slot-generation range, in days.
    pub slot_horizon_days: i64,
    /// Capacity of each participant's session event queue.
    pub session_queue_capacity: usize,
    /// Minutes after the scheduled start before a no-show is declared.
    pub no_show_grace_minutes: i64,
    /// Minutes past the scheduled end before an in-progress session is force-completed.
    pub auto_complete_grace_minutes: i64,
    /// Minutes a consultation must run before both participants leaving completes it.
    pub min_session_minutes: i64,
    /// Minutes before the scheduled start at which participants may join.
    pub join_window_minutes: i64,
    /// Default booking deadline, in milliseconds, when the caller supplies none.
    pub booking_deadline_ms: u64,
}

impl CoreConfig {
    pub fn from_env() -> Self {
        let config = Self {
            media_token_secret: env::var("MEDIA_TOKEN_SECRET").unwrap_or_else(|_| {
                warn!("MEDIA_TOKEN_SECRET not set, using empty value");
                String::new()
            }),
            media_token_ttl_secs: read_u64("MEDIA_TOKEN_TTL_SECS", 3600),
            slot_horizon_days: read_i64("SLOT_HORIZON_DAYS", 60),
            session_queue_capacity: read_u64("SESSION_QUEUE_CAPACITY", 64) as usize,
            no_show_grace_minutes: read_i64("NO_SHOW_GRACE_MINUTES", 30),
            auto_complete_grace_minutes: read_i64("AUTO_COMPLETE_GRACE_MINUTES", 30),
            min_session_minutes: read_i64("MIN_SESSION_MINUTES", 5),
            join_window_minutes: read_i64("JOIN_WINDOW_MINUTES", 15),
            booking_deadline_ms: read_u64("BOOKING_DEADLINE_MS", 5000),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.media_token_secret.is_empty()
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            media_token_secret: "development-only-secret".to_string(),
            media_token_ttl_secs: 3600,
            slot_horizon_days: 60,
            session_queue_capacity: 64,
            no_show_grace_minutes: 30,
            auto_complete_grace_minutes: 30,
            min_session_minutes: 5,
            join_window_minutes: 15,
            booking_deadline_ms: 5000,
        }
    }
}

fn read_u64(key: &str, default: u64) -> u64 {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} is not a valid integer, using default {}", key, default);
            default
        }),
        Err(_) => default,
    }
}

fn read_i64(key: &str, default: i64) -> i64 {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} is not a valid integer, using default {}", key, default);
            default
        }),
        Err(_) => default,
    }
}
