use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Serialize, Deserialize)]
struct TokenHeader {
    alg: String,
    typ: String,
}

/// Claims carried by a media-channel token.
///
/// A token is scoped to exactly one appointment and one participant; the
/// media provider verifies the signature and the expiry, nothing else.
#[derive(Debug, Serialize, Deserialize)]
pub struct MediaTokenClaims {
    pub sub: Uuid,
    pub appointment_id: Uuid,
    pub exp: i64,
    pub iat: i64,
    pub nonce: String,
}

/// An issued media token plus its expiry, handed to a joining participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Issue a short-lived media token for one participant of one appointment.
pub fn issue_media_token(
    secret: &str,
    appointment_id: Uuid,
    user_id: Uuid,
    ttl_secs: u64,
) -> Result<MediaToken, String> {
    if secret.is_empty() {
        return Err("Media token secret is not set".to_string());
    }

    let now = Utc::now();
    let expires_at = now + Duration::seconds(ttl_secs as i64);

    let mut nonce_bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);

    let header = TokenHeader {
        alg: "HS256".to_string(),
        typ: "JWT".to_string(),
    };
    let claims = MediaTokenClaims {
        sub: user_id,
        appointment_id,
        exp: expires_at.timestamp(),
        iat: now.timestamp(),
        nonce: URL_SAFE_NO_PAD.encode(nonce_bytes),
    };

    let header_b64 = URL_SAFE_NO_PAD.encode(
        serde_json::to_vec(&header).map_err(|e| format!("Failed to encode header: {}", e))?,
    );
    let claims_b64 = URL_SAFE_NO_PAD.encode(
        serde_json::to_vec(&claims).map_err(|e| format!("Failed to encode claims: {}", e))?,
    );

    let signing_input = format!("{}.{}", header_b64, claims_b64);
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| "Failed to create HMAC".to_string())?;
    mac.update(signing_input.as_bytes());
    let signature_b64 = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(MediaToken {
        token: format!("{}.{}", signing_input, signature_b64),
        expires_at,
    })
}

/// Validate a media token and return its claims.
pub fn validate_media_token(token: &str, secret: &str) -> Result<MediaTokenClaims, String> {
    if secret.is_empty() {
        return Err("Media token secret is not set".to_string());
    }

    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err("Invalid token format".to_string());
    }

    let signature = match URL_SAFE_NO_PAD.decode(parts[2]) {
        Ok(sig) => sig,
        Err(e) => {
            debug!("Failed to decode signature: {}", e);
            return Err("Invalid signature encoding".to_string());
        }
    };

    let signing_input = format!("{}.{}", parts[0], parts[1]);
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| "Failed to create HMAC".to_string())?;
    mac.update(signing_input.as_bytes());

    if mac.verify_slice(&signature).is_err() {
        debug!("Media token signature verification failed");
        return Err("Invalid token signature".to_string());
    }

    let claims_bytes = URL_SAFE_NO_PAD
        .decode(parts[1])
        .map_err(|_| "Invalid claims encoding".to_string())?;
    let claims: MediaTokenClaims =
        serde_json::from_slice(&claims_bytes).map_err(|_| "Invalid claims payload".to_string())?;

    if claims.exp < Utc::now().timestamp() {
        return Err("Token has expired".to_string());
    }

    Ok(claims)
}
