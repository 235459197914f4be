// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::cost_ledger::CostLedgerEntry;
use crate::domain::repositories::job_repository::RepositoryError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// 成本台账仓库特质
///
/// 台账只追加不修改，写入无需加锁；月度聚合只要求
/// 一次一致性读取，允许读到稍旧的值
#[async_trait]
pub trait CostLedgerRepository: Send + Sync {
    /// 追加一条台账记录
    async fn append(&self, entry: &CostLedgerEntry) -> Result<(), RepositoryError>;

    /// 当月（自然月，UTC）已支出总额，单位为美分
    async fn month_to_date(&self, now: DateTime<Utc>) -> Result<i64, RepositoryError>;
}
