pub mod authorization;
pub mod jwks;
pub mod jwt;
pub mod middleware;

use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::config::AuthConfig;
use crate::db::users as user_db;
use crate::error::ApiError;
use crate::models::users::{self, CreateUserFromAuth};

use jwks::JwksCache;
use jwt::Claims;

/// The identity collaborator: turns an opaque credential into claims or a
/// rejection. Issuance lives elsewhere.
#[derive(Clone)]
pub enum TokenVerifier {
    Secret(String),
    Jwks(Arc<JwksCache>),
}

impl TokenVerifier {
    pub fn from_config(config: &AuthConfig) -> Self {
        match config {
            AuthConfig::Secret(secret) => TokenVerifier::Secret(secret.clone()),
            AuthConfig::Jwks { url, api_key } => {
                TokenVerifier::Jwks(Arc::new(JwksCache::new(url, api_key.clone())))
            }
        }
    }

    pub async fn verify(&self, token: &str) -> Result<Claims, String> {
        match self {
            TokenVerifier::Secret(secret) => jwt::validate_token(token, secret),
            TokenVerifier::Jwks(cache) => cache.validate_token(token).await,
        }
    }
}

/// Verify `token` and resolve the caller in the local user directory,
/// mirroring them from the claims on first sight.
pub async fn identify(
    verifier: &TokenVerifier,
    db: &DatabaseConnection,
    token: &str,
) -> Result<users::Model, ApiError> {
    let claims = verifier
        .verify(token)
        .await
        .map_err(|e| ApiError::Unauthorized(format!("Invalid token: {e}")))?;

    let user_id = claims.user_id().map_err(ApiError::Unauthorized)?;

    let user = user_db::find_or_create_from_auth(
        db,
        CreateUserFromAuth {
            id: user_id,
            email: claims.user_email(),
            display_name: claims.name.clone(),
            avatar_url: claims.picture.clone(),
        },
    )
    .await?;

    user.ok_or_else(|| ApiError::Unauthorized("No email in token claims".to_string()))
}
