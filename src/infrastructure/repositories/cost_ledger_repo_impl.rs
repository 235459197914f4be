// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::cost_ledger::CostLedgerEntry;
use crate::domain::repositories::cost_ledger_repository::CostLedgerRepository;
use crate::domain::repositories::job_repository::RepositoryError;
use crate::infrastructure::database::entities::cost_ledger_entry as ledger_entity;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, TimeZone, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QuerySelect, Set,
};
use std::sync::Arc;

/// 成本台账仓库实现
///
/// 台账只追加；月度聚合用一条SUM查询完成
#[derive(Clone)]
pub struct CostLedgerRepositoryImpl {
    db: Arc<DatabaseConnection>,
}

impl CostLedgerRepositoryImpl {
    /// 创建新的成本台账仓库实例
    ///
    /// # 参数
    ///
    /// * `db` - 数据库连接
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl From<&CostLedgerEntry> for ledger_entity::ActiveModel {
    fn from(entry: &CostLedgerEntry) -> Self {
        Self {
            id: Set(entry.id),
            job_type: Set(entry.job_type.to_string()),
            model: Set(entry.model.clone()),
            prompt_tokens: Set(entry.prompt_tokens),
            completion_tokens: Set(entry.completion_tokens),
            cost_cents: Set(entry.cost_cents),
            created_at: Set(entry.created_at),
        }
    }
}

#[async_trait]
impl CostLedgerRepository for CostLedgerRepositoryImpl {
    async fn append(&self, entry: &CostLedgerEntry) -> Result<(), RepositoryError> {
        let model: ledger_entity::ActiveModel = entry.into();
        model.insert(self.db.as_ref()).await?;
        Ok(())
    }

    async fn month_to_date(&self, now: DateTime<Utc>) -> Result<i64, RepositoryError> {
        // UTC下自然月起点总是唯一的
        let month_start = Utc
            .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
            .single()
            .unwrap_or(now);

        let total: Option<Option<i64>> = ledger_entity::Entity::find()
            .select_only()
            .column_as(ledger_entity::Column::CostCents.sum(), "total")
            .filter(ledger_entity::Column::CreatedAt.gte(month_start))
            .filter(ledger_entity::Column::CreatedAt.lte(now))
            .into_tuple()
            .one(self.db.as_ref())
            .await?;

        Ok(total.flatten().unwrap_or(0))
    }
}
