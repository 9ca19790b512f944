// Database connection and schema bootstrap.

use std::time::Duration;

use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, EntityTrait, Schema,
};

use crate::config::AppConfig;
use crate::models::{
    admins, order_items, orders, payment_transactions, products, refresh_tokens, users,
};

pub async fn establish_connection(config: &AppConfig) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(config.database_url().to_owned());
    options
        .max_connections(20)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(8))
        .sqlx_logging(false);

    Database::connect(options).await
}

/// Create every table (and its indexes) that does not exist yet.
///
/// Tables are created parents first so foreign keys always resolve.
pub async fn init_schema<C>(db: &C) -> Result<(), DbErr>
where
    C: ConnectionTrait,
{
    create_table(db, users::Entity).await?;
    create_table(db, admins::Entity).await?;
    create_table(db, products::Entity).await?;
    create_table(db, orders::Entity).await?;
    create_table(db, order_items::Entity).await?;
    create_table(db, payment_transactions::Entity).await?;
    create_table(db, refresh_tokens::Entity).await?;
    Ok(())
}

async fn create_table<C, E>(db: &C, entity: E) -> Result<(), DbErr>
where
    C: ConnectionTrait,
    E: EntityTrait,
{
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let mut table = schema.create_table_from_entity(entity);
    table.if_not_exists();
    db.execute(backend.build(&table)).await?;

    for mut index in schema.create_index_from_entity(entity) {
        index.if_not_exists();
        db.execute(backend.build(&index)).await?;
    }

    tracing::debug!(table = %entity.table_name(), "Table ready");
    Ok(())
}
