use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Claim query scans by (status, next_run_at) restricted to queue names
        manager
            .create_index(
                Index::create()
                    .name("idx_jobs_status_next_run_at")
                    .table(Jobs::Table)
                    .col(Jobs::Status)
                    .col(Jobs::NextRunAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_jobs_queue_status")
                    .table(Jobs::Table)
                    .col(Jobs::Queue)
                    .col(Jobs::Status)
                    .to_owned(),
            )
            .await?;

        // Reclaimer scans locked rows by lock age
        manager
            .create_index(
                Index::create()
                    .name("idx_jobs_locked_at")
                    .table(Jobs::Table)
                    .col(Jobs::LockedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_jobs_status_next_run_at").table(Jobs::Table).to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_jobs_queue_status").table(Jobs::Table).to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_jobs_locked_at").table(Jobs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Jobs {
    Table,
    Status,
    Queue,
    NextRunAt,
    LockedAt,
}
