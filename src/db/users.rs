use sea_orm::*;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::is_unique_violation;
use crate::models::users::{self, CreateUserFromAuth};

/// Find the user mirrored from the identity provider, creating the row the
/// first time they are seen. Returns `None` when the user is unknown and the
/// claims carry no email to create them with.
pub async fn find_or_create_from_auth(
    db: &DatabaseConnection,
    input: CreateUserFromAuth,
) -> Result<Option<users::Model>, DbErr> {
    if let Some(existing) = users::Entity::find_by_id(input.id).one(db).await? {
        return Ok(Some(existing));
    }

    let Some(email) = input.email else {
        return Ok(None);
    };

    let new_user = users::ActiveModel {
        id: Set(input.id),
        email: Set(email),
        username: Set(None),
        display_name: Set(input.display_name),
        avatar_url: Set(input.avatar_url),
        created_at: Set(chrono::Utc::now()),
        updated_at: Set(None),
    };

    match new_user.insert(db).await {
        Ok(user) => Ok(Some(user)),
        // Two first requests raced; the other one created the row.
        Err(e) if is_unique_violation(&e) => users::Entity::find_by_id(input.id).one(db).await,
        Err(e) => Err(e),
    }
}

/// Fetch a single user by ID.
pub async fn get_user_by_id(
    db: &DatabaseConnection,
    id: Uuid,
) -> Result<Option<users::Model>, DbErr> {
    users::Entity::find_by_id(id).one(db).await
}

/// Exact, case-insensitive email lookup.
pub async fn get_user_by_email(
    db: &DatabaseConnection,
    email: &str,
) -> Result<Option<users::Model>, DbErr> {
    users::Entity::find()
        .filter(users::Column::Email.eq(normalize_email(email)))
        .one(db)
        .await
}

/// Fetch many users in one query and return an id -> user map.
pub async fn get_users_by_ids(
    db: &DatabaseConnection,
    ids: Vec<Uuid>,
) -> Result<HashMap<Uuid, users::Model>, DbErr> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = users::Entity::find()
        .filter(users::Column::Id.is_in(ids))
        .all(db)
        .await?;

    Ok(rows.into_iter().map(|u| (u.id, u)).collect())
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
