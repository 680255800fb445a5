use assert_matches::assert_matches;
use uuid::Uuid;

use shared_utils::token::{issue_media_token, validate_media_token};

const SECRET: &str = "test-secret";

#[test]
fn issued_token_validates_and_carries_its_scope() {
    let appointment_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();

    let token = issue_media_token(SECRET, appointment_id, user_id, 3600).unwrap();
    let claims = validate_media_token(&token.token, SECRET).unwrap();

    assert_eq!(claims.appointment_id, appointment_id);
    assert_eq!(claims.sub, user_id);
    assert!(claims.exp > claims.iat);
}

#[test]
fn token_signed_with_other_secret_is_rejected() {
    let token = issue_media_token(SECRET, Uuid::new_v4(), Uuid::new_v4(), 3600).unwrap();
    assert_matches!(validate_media_token(&token.token, "other-secret"), Err(_));
}

#[test]
fn expired_token_is_rejected() {
    let token = issue_media_token(SECRET, Uuid::new_v4(), Uuid::new_v4(), 0).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(1100));
    assert_matches!(validate_media_token(&token.token, SECRET), Err(msg) if msg.contains("expired"));
}

#[test]
fn garbage_token_is_rejected() {
    assert_matches!(validate_media_token("not-a-token", SECRET), Err(_));
    assert_matches!(validate_media_token("a.b.c", SECRET), Err(_));
}

#[test]
fn empty_secret_refuses_to_issue() {
    assert_matches!(issue_media_token("", Uuid::new_v4(), Uuid::new_v4(), 60), Err(_));
}
