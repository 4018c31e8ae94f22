use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Enable foreign keys for SQLite
        if manager.get_database_backend() == sea_orm::DatabaseBackend::Sqlite {
            manager
                .get_connection()
                .execute_unprepared("PRAGMA foreign_keys = ON")
                .await?;
        }

        // Create users table
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(pk_auto(Users::Id))
                    .col(string(Users::Name))
                    .col(
                        ColumnDef::new(Users::Email)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(string(Users::PasswordHash))
                    .col(string(Users::Role))
                    .col(big_integer(Users::CreatedAt))
                    .to_owned(),
            )
            .await?;

        // Create properties table
        manager
            .create_table(
                Table::create()
                    .table(Properties::Table)
                    .if_not_exists()
                    .col(pk_auto(Properties::Id))
                    .col(string(Properties::Title))
                    .col(string_len(Properties::Description, 2000))
                    .col(string(Properties::Address))
                    .col(string(Properties::City))
                    .col(double(Properties::Price))
                    .col(string(Properties::PropertyType))
                    .col(boolean(Properties::Available).default(true))
                    .col(integer_null(Properties::OwnerId))
                    .col(big_integer(Properties::CreatedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_properties_owner")
                            .from(Properties::Table, Properties::OwnerId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_properties_owner")
                    .table(Properties::Table)
                    .col(Properties::OwnerId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_properties_city")
                    .table(Properties::Table)
                    .col(Properties::City)
                    .to_owned(),
            )
            .await?;

        // Create visits table
        manager
            .create_table(
                Table::create()
                    .table(Visits::Table)
                    .if_not_exists()
                    .col(pk_auto(Visits::Id))
                    .col(integer(Visits::PropertyId))
                    .col(string(Visits::TenantName))
                    .col(string(Visits::TenantEmail))
                    .col(date_time(Visits::VisitDateTime))
                    .col(string(Visits::Status))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_visits_property")
                            .from(Visits::Table, Visits::PropertyId)
                            .to(Properties::Table, Properties::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_visits_tenant_email")
                    .table(Visits::Table)
                    .col(Visits::TenantEmail)
                    .to_owned(),
            )
            .await?;

        // Create leases table
        manager
            .create_table(
                Table::create()
                    .table(Leases::Table)
                    .if_not_exists()
                    .col(pk_auto(Leases::Id))
                    .col(integer(Leases::PropertyId))
                    .col(string(Leases::TenantName))
                    .col(string(Leases::TenantEmail))
                    .col(date(Leases::StartDate))
                    .col(date(Leases::EndDate))
                    .col(double(Leases::MonthlyRent))
                    .col(string(Leases::Status))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_leases_property")
                            .from(Leases::Table, Leases::PropertyId)
                            .to(Properties::Table, Properties::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_leases_tenant_email")
                    .table(Leases::Table)
                    .col(Leases::TenantEmail)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Leases::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Visits::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Properties::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    Name,
    Email,
    PasswordHash,
    Role,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Properties {
    Table,
    Id,
    Title,
    Description,
    Address,
    City,
    Price,
    PropertyType,
    Available,
    OwnerId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Visits {
    Table,
    Id,
    PropertyId,
    TenantName,
    TenantEmail,
    VisitDateTime,
    Status,
}

#[derive(DeriveIden)]
enum Leases {
    Table,
    Id,
    PropertyId,
    TenantName,
    TenantEmail,
    StartDate,
    EndDate,
    MonthlyRent,
    Status,
}
