use sea_orm::*;
use uuid::Uuid;

use crate::models::reactions;

/// Record a reaction. A user may react to the same message with several
/// distinct emoji; the same emoji twice is a unique violation.
pub async fn add_reaction(
    db: &DatabaseConnection,
    message_id: Uuid,
    user_id: Uuid,
    emoji: String,
) -> Result<reactions::Model, DbErr> {
    let reaction = reactions::Model {
        message_id,
        user_id,
        emoji,
        created_at: chrono::Utc::now(),
    };
    reactions::Entity::insert(reaction.clone().into_active_model())
        .exec_without_returning(db)
        .await?;
    Ok(reaction)
}

/// Remove the caller's own reaction. Returns the number of rows removed.
pub async fn remove_reaction(
    db: &DatabaseConnection,
    message_id: Uuid,
    user_id: Uuid,
    emoji: &str,
) -> Result<u64, DbErr> {
    let result = reactions::Entity::delete_by_id((message_id, user_id, emoji.to_string()))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

/// All reactions on a message, oldest first.
pub async fn get_reactions(
    db: &DatabaseConnection,
    message_id: Uuid,
) -> Result<Vec<reactions::Model>, DbErr> {
    reactions::Entity::find()
        .filter(reactions::Column::MessageId.eq(message_id))
        .order_by_asc(reactions::Column::CreatedAt)
        .all(db)
        .await
}
