use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create visit_messages table
        manager
            .create_table(
                Table::create()
                    .table(VisitMessages::Table)
                    .if_not_exists()
                    .col(pk_auto(VisitMessages::Id))
                    .col(integer(VisitMessages::VisitId))
                    .col(string(VisitMessages::SenderRole))
                    .col(string_len(VisitMessages::Message, 2000))
                    .col(date_time(VisitMessages::CreatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_visit_messages_visit")
                            .from(VisitMessages::Table, VisitMessages::VisitId)
                            .to(Visits::Table, Visits::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_visit_messages_visit")
                    .table(VisitMessages::Table)
                    .col(VisitMessages::VisitId)
                    .col(VisitMessages::CreatedAt)
                    .to_owned(),
            )
            .await?;

        // Create lease_messages table
        manager
            .create_table(
                Table::create()
                    .table(LeaseMessages::Table)
                    .if_not_exists()
                    .col(pk_auto(LeaseMessages::Id))
                    .col(integer(LeaseMessages::LeaseId))
                    .col(string(LeaseMessages::SenderRole))
                    .col(string_len(LeaseMessages::Message, 2000))
                    .col(date_time(LeaseMessages::CreatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_lease_messages_lease")
                            .from(LeaseMessages::Table, LeaseMessages::LeaseId)
                            .to(Leases::Table, Leases::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_lease_messages_lease")
                    .table(LeaseMessages::Table)
                    .col(LeaseMessages::LeaseId)
                    .col(LeaseMessages::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(LeaseMessages::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(VisitMessages::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Visits {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Leases {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum VisitMessages {
    Table,
    Id,
    VisitId,
    SenderRole,
    Message,
    CreatedAt,
}

#[derive(DeriveIden)]
enum LeaseMessages {
    Table,
    Id,
    LeaseId,
    SenderRole,
    Message,
    CreatedAt,
}
