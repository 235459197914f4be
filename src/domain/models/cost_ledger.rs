// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::models::job::JobType;

/// 成本台账条目
///
/// 每次AI调用后由AI类处理器追加一条记录，记录后不再修改。
/// 按自然月聚合得到当月支出，驱动成本治理状态机。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostLedgerEntry {
    pub id: Uuid,
    /// 产生该笔支出的作业类型
    pub job_type: JobType,
    /// 实际调用的模型名称
    pub model: String,
    pub prompt_tokens: i32,
    pub completion_tokens: i32,
    /// 折算后的成本，单位为美分
    pub cost_cents: i32,
    pub created_at: DateTime<FixedOffset>,
}

impl CostLedgerEntry {
    pub fn new(
        job_type: JobType,
        model: String,
        prompt_tokens: i32,
        completion_tokens: i32,
        cost_cents: i32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_type,
            model,
            prompt_tokens,
            completion_tokens,
            cost_cents,
            created_at: Utc::now().into(),
        }
    }
}

/// 当月支出快照
///
/// 成本治理状态机的唯一输入。快照由台账当月聚合得到，
/// 每次AI调用前重新读取，不做缓存。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpendSnapshot {
    /// 当月已支出，单位为美分
    pub spent_cents: i64,
    /// 月度支出上限，单位为美分
    pub ceiling_cents: i64,
}

impl SpendSnapshot {
    pub fn new(spent_cents: i64, ceiling_cents: i64) -> Self {
        Self {
            spent_cents,
            ceiling_cents,
        }
    }

    /// 当月支出占上限的比例
    ///
    /// 上限非正时返回f64::INFINITY，由状态机按硬停处理
    pub fn ratio(&self) -> f64 {
        if self.ceiling_cents <= 0 {
            return f64::INFINITY;
        }
        self.spent_cents as f64 / self.ceiling_cents as f64
    }
}
