use actix_web::{HttpResponse, web};

use crate::auth::middleware::AuthenticatedUser;
use crate::cache::{CacheData, USER_LOOKUP_TTL, keys};
use crate::chat::rate_limit::RateLimiter;
use crate::db::users as user_db;
use crate::error::{ApiError, ApiResult};
use crate::models::users::{LookupQuery, UserResponse};

/// GET /api/users/lookup?email=: exact-match directory lookup used to start
/// a direct conversation. Rate limited per caller.
pub async fn lookup_user(
    user: AuthenticatedUser,
    db: web::Data<sea_orm::DatabaseConnection>,
    cache: web::Data<CacheData>,
    limiter: web::Data<RateLimiter>,
    query: web::Query<LookupQuery>,
) -> ApiResult<HttpResponse> {
    if !limiter.check(user.id()).await {
        return Err(ApiError::TooManyRequests);
    }

    let email = user_db::normalize_email(&query.email);
    if email.is_empty() {
        return Err(ApiError::BadRequest("email required".into()));
    }
    let cache_key = keys::user_by_email(&email);

    if let Some(cache) = cache.get_ref() {
        match cache.get::<UserResponse>(&cache_key).await {
            Ok(Some(cached)) => return Ok(HttpResponse::Ok().json(cached)),
            Ok(None) => {}
            Err(e) => tracing::warn!("Cache error: {}", e),
        }
    }

    let found = user_db::get_user_by_email(db.get_ref(), &email)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;
    let response = UserResponse::from(found);

    if let Some(cache) = cache.get_ref() {
        if let Err(e) = cache.set(&cache_key, &response, USER_LOOKUP_TTL).await {
            tracing::warn!("Cache error: {}", e);
        }
    }

    Ok(HttpResponse::Ok().json(response))
}
