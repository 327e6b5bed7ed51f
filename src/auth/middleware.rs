use actix_web::FromRequest;
use actix_web::{Error, HttpRequest, dev::Payload, web};
use sea_orm::DatabaseConnection;
use std::future::Future;
use std::pin::Pin;

use crate::auth::{TokenVerifier, identify};
use crate::error::ApiError;
use crate::models::users;

/// Extractor for REST handlers: the caller behind `Authorization: Bearer`.
pub struct AuthenticatedUser(pub users::Model);

impl AuthenticatedUser {
    pub fn id(&self) -> uuid::Uuid {
        self.0.id
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let req = req.clone();

        Box::pin(async move {
            let auth_header = req
                .headers()
                .get("Authorization")
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".into()))?;

            let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
                ApiError::Unauthorized("Authorization header must be: Bearer <token>".into())
            })?;

            let verifier = req.app_data::<web::Data<TokenVerifier>>().ok_or_else(|| {
                ApiError::Internal("Token verifier not configured".into())
            })?;

            let db = req
                .app_data::<web::Data<DatabaseConnection>>()
                .ok_or_else(|| ApiError::Internal("Database not configured".into()))?;

            let user = identify(verifier.get_ref(), db.get_ref(), token).await?;
            Ok(AuthenticatedUser(user))
        })
    }
}
