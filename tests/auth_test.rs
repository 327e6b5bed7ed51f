//! Integration test for credential validation and caller resolution.
//!
//! Tokens are minted locally with the same HS256 secret the server would use
//! and run through `validate_token` and `identify`.
//!
//! Run with: `cargo test --test auth_test`
mod common;

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use uuid::Uuid;

use common::{TEST_SECRET, mint_token, seed_user, setup_db};
use depot_chat::auth::jwt::{Claims, validate_token};
use depot_chat::auth::{TokenVerifier, identify};
use depot_chat::error::ApiError;

fn claims_for(sub: &str, email: Option<&str>, exp_offset: i64) -> Claims {
    let now = Utc::now().timestamp();
    Claims {
        sub: sub.to_string(),
        exp: (now + exp_offset) as usize,
        iat: Some(now as usize),
        email: email.map(str::to_string),
        name: Some("Alice Smith".to_string()),
        picture: Some("https://example.com/avatar.png".to_string()),
    }
}

fn sign(claims: &Claims, secret: &str) -> String {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("Failed to encode test JWT")
}

#[test]
fn test_valid_token_decodes_correctly() {
    let user_id = Uuid::new_v4();
    let token = sign(
        &claims_for(&user_id.to_string(), Some(" Alice@Example.com "), 3600),
        TEST_SECRET,
    );

    let claims = validate_token(&token, TEST_SECRET).expect("Token should be valid");

    assert_eq!(claims.sub, user_id.to_string());
    assert_eq!(claims.user_email().unwrap(), "alice@example.com");
    assert_eq!(claims.name.as_deref(), Some("Alice Smith"));
    assert_eq!(claims.user_id().unwrap(), user_id);
}

#[test]
fn test_expired_token_is_rejected() {
    // Well past the 60s default leeway
    let claims = claims_for(&Uuid::new_v4().to_string(), Some("expired@example.com"), -300);
    let token = sign(&claims, TEST_SECRET);

    let result = validate_token(&token, TEST_SECRET);
    assert!(result.is_err());
    assert!(result.unwrap_err().contains("ExpiredSignature"));
}

#[test]
fn test_wrong_secret_is_rejected() {
    let token = mint_token(Uuid::new_v4(), Some("bob@example.com"));

    let result = validate_token(&token, "completely-wrong-secret-xxxxxxxxxxxxxxxxxxx");
    assert!(result.is_err());
    assert!(result.unwrap_err().contains("InvalidSignature"));
}

#[test]
fn test_garbage_token_is_rejected() {
    let result = validate_token("not.a.valid.jwt", TEST_SECRET);
    assert!(result.is_err());
}

#[test]
fn test_non_uuid_subject_is_reported() {
    let claims = claims_for("service-account", None, 3600);
    assert!(claims.user_id().is_err());
    assert!(claims.user_email().is_none());
}

#[tokio::test]
async fn test_identify_returns_existing_user() {
    let db = setup_db().await;
    let alice = seed_user(&db, "alice@example.com").await;
    let verifier = TokenVerifier::Secret(TEST_SECRET.to_string());

    // Directory row wins over claim contents
    let token = sign(&claims_for(&alice.id.to_string(), None, 3600), TEST_SECRET);
    let user = identify(&verifier, &db, &token).await.unwrap();
    assert_eq!(user.id, alice.id);
    assert_eq!(user.email, "alice@example.com");
}

#[tokio::test]
async fn test_identify_mirrors_unknown_user_from_claims() {
    let db = setup_db().await;
    let verifier = TokenVerifier::Secret(TEST_SECRET.to_string());
    let user_id = Uuid::new_v4();

    let token = sign(
        &claims_for(&user_id.to_string(), Some("New.Hire@Example.com"), 3600),
        TEST_SECRET,
    );
    let user = identify(&verifier, &db, &token).await.unwrap();
    assert_eq!(user.id, user_id);
    assert_eq!(user.email, "new.hire@example.com");
    assert_eq!(user.display_name.as_deref(), Some("Alice Smith"));

    // Second sight resolves the same row
    let again = identify(&verifier, &db, &token).await.unwrap();
    assert_eq!(again.id, user_id);
}

#[tokio::test]
async fn test_identify_rejects_bad_credentials() {
    let db = setup_db().await;
    let verifier = TokenVerifier::Secret(TEST_SECRET.to_string());

    let unknown_without_email = sign(&claims_for(&Uuid::new_v4().to_string(), None, 3600), TEST_SECRET);
    let err = identify(&verifier, &db, &unknown_without_email)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized(_)));

    let forged = sign(
        &claims_for(&Uuid::new_v4().to_string(), Some("eve@example.com"), 3600),
        "completely-wrong-secret-xxxxxxxxxxxxxxxxxxx",
    );
    let err = identify(&verifier, &db, &forged).await.unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized(_)));
}
