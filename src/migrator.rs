use anyhow::Result;
use sea_orm::{ConnectOptions, Database};
use sea_orm_migration::prelude::*;
use std::time::Duration;
use tracing::{error, info};

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261001_000001_create_inventory_units_table::Migration),
            Box::new(m20261001_000002_create_buyer_tables::Migration),
            Box::new(m20261001_000003_create_sales_table::Migration),
            Box::new(m20261001_000004_create_audit_entries_table::Migration),
        ]
    }
}

// Migration implementations

mod m20261001_000001_create_inventory_units_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20261001_000001_create_inventory_units_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Aligned with entities::inventory_unit Model
            manager
                .create_table(
                    Table::create()
                        .table(InventoryUnits::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InventoryUnits::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryUnits::SerialNumber).string().null())
                        .col(ColumnDef::new(InventoryUnits::WarehouseId).uuid().null())
                        .col(
                            ColumnDef::new(InventoryUnits::BasePrice)
                                .decimal_len(14, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryUnits::Status)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryUnits::StatusChangedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryUnits::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryUnits::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_units_status")
                        .table(InventoryUnits::Table)
                        .col(InventoryUnits::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_units_warehouse_id")
                        .table(InventoryUnits::Table)
                        .col(InventoryUnits::WarehouseId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(InventoryUnits::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum InventoryUnits {
        Table,
        Id,
        SerialNumber,
        WarehouseId,
        BasePrice,
        Status,
        StatusChangedAt,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20261001_000002_create_buyer_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20261001_000002_create_buyer_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Owned by the customer subsystem; this service only reads discount tiers
            manager
                .create_table(
                    Table::create()
                        .table(Customers::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Customers::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Customers::FullName).string().not_null())
                        .col(
                            ColumnDef::new(Customers::DiscountPercent)
                                .decimal_len(5, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Customers::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(CorporateClients::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CorporateClients::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CorporateClients::CompanyName)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(CorporateClients::DiscountPercent)
                                .decimal_len(5, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(CorporateClients::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CorporateClients::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Customers::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Customers {
        Table,
        Id,
        FullName,
        DiscountPercent,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum CorporateClients {
        Table,
        Id,
        CompanyName,
        DiscountPercent,
        CreatedAt,
    }
}

mod m20261001_000003_create_sales_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20261001_000003_create_sales_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Sales::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Sales::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Sales::UnitId).uuid().not_null())
                        .col(ColumnDef::new(Sales::CustomerId).uuid().null())
                        .col(ColumnDef::new(Sales::CorporateClientId).uuid().null())
                        .col(ColumnDef::new(Sales::EmployeeId).uuid().not_null())
                        .col(
                            ColumnDef::new(Sales::SoldAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Sales::BasePrice).decimal_len(14, 2).not_null())
                        .col(
                            ColumnDef::new(Sales::DiscountAmount)
                                .decimal_len(14, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Sales::FinalPrice)
                                .decimal_len(14, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Sales::DiscountPercent)
                                .decimal_len(5, 2)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Sales::PaymentType).string_len(32).not_null())
                        .col(ColumnDef::new(Sales::Status).string_len(32).not_null())
                        .col(ColumnDef::new(Sales::ContractNumber).string().null())
                        .col(ColumnDef::new(Sales::Notes).text().null())
                        .col(
                            ColumnDef::new(Sales::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Sales::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_sales_unit_id")
                        .table(Sales::Table)
                        .col(Sales::UnitId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_sales_sold_at")
                        .table(Sales::Table)
                        .col(Sales::SoldAt)
                        .to_owned(),
                )
                .await?;

            // At most one completed sale per unit, enforced by the store as well
            manager
                .get_connection()
                .execute_unprepared(
                    "CREATE UNIQUE INDEX IF NOT EXISTS ux_sales_active_unit \
                     ON sales (unit_id) WHERE status = 'completed'",
                )
                .await
                .map(|_| ())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Sales::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Sales {
        Table,
        Id,
        UnitId,
        CustomerId,
        CorporateClientId,
        EmployeeId,
        SoldAt,
        BasePrice,
        DiscountAmount,
        FinalPrice,
        DiscountPercent,
        PaymentType,
        Status,
        ContractNumber,
        Notes,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20261001_000004_create_audit_entries_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20261001_000004_create_audit_entries_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(AuditEntries::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(AuditEntries::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(AuditEntries::SubjectId).uuid().not_null())
                        .col(
                            ColumnDef::new(AuditEntries::SubjectKind)
                                .string_len(16)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(AuditEntries::Operation)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(ColumnDef::new(AuditEntries::OldValue).json().null())
                        .col(ColumnDef::new(AuditEntries::NewValue).json().null())
                        .col(ColumnDef::new(AuditEntries::Actor).string().not_null())
                        .col(
                            ColumnDef::new(AuditEntries::RecordedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_audit_entries_subject_id")
                        .table(AuditEntries::Table)
                        .col(AuditEntries::SubjectId)
                        .col(AuditEntries::Id)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(AuditEntries::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum AuditEntries {
        Table,
        Id,
        SubjectId,
        SubjectKind,
        Operation,
        OldValue,
        NewValue,
        Actor,
        RecordedAt,
    }
}

// Database migration CLI runner
pub async fn run_migration(db_url: &str) -> Result<()> {
    info!("Setting up database connection for migrations");

    let mut opt = ConnectOptions::new(db_url);
    opt.max_connections(4)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(30))
        .sqlx_logging(true);

    let db = Database::connect(opt).await?;

    info!("Running database migrations");

    match Migrator::up(&db, None).await {
        Ok(_) => {
            info!("Migrations completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Migration failed: {}", e);
            Err(e.into())
        }
    }
}
