use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::{ConnectionTrait, DatabaseBackend};
use sea_orm_migration::sea_query::{ColumnDef, Table};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(Iden)]
enum CounterRows {
    Table,
    Id,
    Value,
}

// Single-row table whose row lock serialises increments on MySQL/MariaDB.
#[derive(Iden)]
enum CounterRowsLock {
    Table,
    Id,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CounterRows::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CounterRows::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(CounterRows::Value).big_integer().not_null())
                    .to_owned(),
            )
            .await?;

        if manager.get_database_backend() == DatabaseBackend::MySql {
            manager
                .create_table(
                    Table::create()
                        .table(CounterRowsLock::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CounterRowsLock::Id)
                                .integer()
                                .not_null()
                                .primary_key(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .get_connection()
                .execute_unprepared("INSERT IGNORE INTO counter_rows_lock (id) VALUES (1)")
                .await?;
        }

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        if manager.get_database_backend() == DatabaseBackend::MySql {
            manager
                .drop_table(
                    Table::drop()
                        .table(CounterRowsLock::Table)
                        .if_exists()
                        .to_owned(),
                )
                .await?;
        }

        manager
            .drop_table(Table::drop().table(CounterRows::Table).if_exists().to_owned())
            .await
    }
}
