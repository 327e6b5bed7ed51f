use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(DeriveIden)]
enum Messages {
    Table,
    ConversationId,
    CreatedAt,
    Id,
}

#[derive(DeriveIden)]
enum MessageReceipts {
    Table,
    UserId,
    ReadAt,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Cursor pagination walks (conversation_id, created_at, id).
        manager
            .create_index(
                Index::create()
                    .name("idx_messages_conversation_created_id")
                    .table(Messages::Table)
                    .col(Messages::ConversationId)
                    .col(Messages::CreatedAt)
                    .col(Messages::Id)
                    .to_owned(),
            )
            .await?;

        // Unread counting per user.
        manager
            .create_index(
                Index::create()
                    .name("idx_message_receipts_user_read")
                    .table(MessageReceipts::Table)
                    .col(MessageReceipts::UserId)
                    .col(MessageReceipts::ReadAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_message_receipts_user_read")
                    .table(MessageReceipts::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_messages_conversation_created_id")
                    .table(Messages::Table)
                    .to_owned(),
            )
            .await
    }
}
