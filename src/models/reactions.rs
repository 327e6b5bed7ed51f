use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// SeaORM entity for the `message_reactions` table.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "message_reactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub message_id: Uuid,
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: Uuid,
    #[sea_orm(primary_key, auto_increment = false)]
    pub emoji: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::messages::Entity",
        from = "Column::MessageId",
        to = "super::messages::Column::Id",
        on_delete = "Cascade"
    )]
    Message,
}

impl Related<super::messages::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Message.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

// ── DTOs ──

pub const MAX_EMOJI_CHARS: usize = 32;

#[derive(Debug, Clone, Deserialize)]
pub struct AddReaction {
    pub emoji: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionResponse {
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub emoji: String,
    pub created_at: DateTimeUtc,
}

impl From<Model> for ReactionResponse {
    fn from(m: Model) -> Self {
        Self {
            message_id: m.message_id,
            user_id: m.user_id,
            emoji: m.emoji,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionCount {
    pub emoji: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionSummary {
    pub message_id: Uuid,
    pub reactions: Vec<ReactionResponse>,
    pub counts: Vec<ReactionCount>,
}

/// Collapse individual reactions into per-emoji counts, most used first and
/// ties in first-seen order.
pub fn count_by_emoji(reactions: &[Model]) -> Vec<ReactionCount> {
    let mut counts: Vec<ReactionCount> = Vec::new();
    for r in reactions {
        match counts.iter_mut().find(|c| c.emoji == r.emoji) {
            Some(c) => c.count += 1,
            None => counts.push(ReactionCount {
                emoji: r.emoji.clone(),
                count: 1,
            }),
        }
    }
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn reaction(emoji: &str) -> Model {
        Model {
            message_id: Uuid::nil(),
            user_id: Uuid::new_v4(),
            emoji: emoji.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn counts_group_by_emoji() {
        let rows = vec![reaction("👍"), reaction("❤️"), reaction("👍")];
        let counts = count_by_emoji(&rows);
        assert_eq!(
            counts,
            vec![
                ReactionCount { emoji: "👍".to_string(), count: 2 },
                ReactionCount { emoji: "❤️".to_string(), count: 1 },
            ]
        );
    }
}
