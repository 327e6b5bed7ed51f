pub use sea_orm_migration::prelude::*;

mod m20260105_000001_create_users_table;
mod m20260105_000002_create_conversations_tables;
mod m20260105_000003_create_messages_tables;
mod m20260110_000001_create_reactions_and_pins;
mod m20260112_000001_add_chat_indexes;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260105_000001_create_users_table::Migration),
            Box::new(m20260105_000002_create_conversations_tables::Migration),
            Box::new(m20260105_000003_create_messages_tables::Migration),
            Box::new(m20260110_000001_create_reactions_and_pins::Migration),
            Box::new(m20260112_000001_add_chat_indexes::Migration),
        ]
    }
}
