use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create cost_ledger_entries table (append-only)
        manager
            .create_table(
                Table::create()
                    .table(CostLedgerEntries::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CostLedgerEntries::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(CostLedgerEntries::JobType).string().not_null())
                    .col(ColumnDef::new(CostLedgerEntries::Model).string().not_null())
                    .col(
                        ColumnDef::new(CostLedgerEntries::PromptTokens)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(CostLedgerEntries::CompletionTokens)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(CostLedgerEntries::CostCents)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(CostLedgerEntries::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_cost_ledger_created_at")
                    .table(CostLedgerEntries::Table)
                    .col(CostLedgerEntries::CreatedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CostLedgerEntries::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum CostLedgerEntries {
    Table,
    Id,
    JobType,
    Model,
    PromptTokens,
    CompletionTokens,
    CostCents,
    CreatedAt,
}
