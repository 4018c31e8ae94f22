use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // SQLite requires separate ALTER TABLE statements for each column
        manager
            .alter_table(
                Table::alter()
                    .table(Visits::Table)
                    .add_column(date_time_null(Visits::ProposedDateTime))
                    .to_owned(),
            )
            .await?;

        manager
            .alter_table(
                Table::alter()
                    .table(Visits::Table)
                    .add_column(
                        ColumnDef::new(Visits::RescheduleStatus)
                            .string()
                            .not_null()
                            .default("NONE"),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .alter_table(
                Table::alter()
                    .table(Visits::Table)
                    .drop_column(Visits::RescheduleStatus)
                    .to_owned(),
            )
            .await?;

        manager
            .alter_table(
                Table::alter()
                    .table(Visits::Table)
                    .drop_column(Visits::ProposedDateTime)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Visits {
    Table,
    ProposedDateTime,
    RescheduleStatus,
}
