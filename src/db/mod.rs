pub mod conversations;
pub mod messages;
pub mod pins;
pub mod reactions;
pub mod users;

use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection, DbErr};

/// Open a SeaORM connection pool for `database_url` and bring the schema up
/// to date.
pub async fn create_pool(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let db = Database::connect(database_url).await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}
