use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(DeriveIden)]
enum MessageReactions {
    Table,
    MessageId,
    UserId,
    Emoji,
    CreatedAt,
}

#[derive(DeriveIden)]
enum PinnedMessages {
    Table,
    ConversationId,
    MessageId,
    PinnedBy,
    PinnedAt,
}

#[derive(DeriveIden)]
enum Messages {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Conversations {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // The composite key is the uniqueness rule: one row per
        // (message, user, emoji).
        manager
            .create_table(
                Table::create()
                    .table(MessageReactions::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(MessageReactions::MessageId).uuid().not_null())
                    .col(ColumnDef::new(MessageReactions::UserId).uuid().not_null())
                    .col(ColumnDef::new(MessageReactions::Emoji).string().not_null())
                    .col(
                        ColumnDef::new(MessageReactions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(MessageReactions::MessageId)
                            .col(MessageReactions::UserId)
                            .col(MessageReactions::Emoji),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_message_reactions_message_id")
                            .from(MessageReactions::Table, MessageReactions::MessageId)
                            .to(Messages::Table, Messages::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_message_reactions_user_id")
                            .from(MessageReactions::Table, MessageReactions::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_message_reactions_message_id")
                    .table(MessageReactions::Table)
                    .col(MessageReactions::MessageId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PinnedMessages::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PinnedMessages::ConversationId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(PinnedMessages::MessageId).uuid().not_null())
                    .col(ColumnDef::new(PinnedMessages::PinnedBy).uuid().not_null())
                    .col(
                        ColumnDef::new(PinnedMessages::PinnedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(PinnedMessages::ConversationId)
                            .col(PinnedMessages::MessageId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_pinned_messages_conversation_id")
                            .from(PinnedMessages::Table, PinnedMessages::ConversationId)
                            .to(Conversations::Table, Conversations::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_pinned_messages_message_id")
                            .from(PinnedMessages::Table, PinnedMessages::MessageId)
                            .to(Messages::Table, Messages::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PinnedMessages::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(MessageReactions::Table).to_owned())
            .await
    }
}
