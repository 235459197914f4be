// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument};

use crate::domain::models::cost_ledger::{CostLedgerEntry, SpendSnapshot};
use crate::domain::models::job::JobType;
use crate::domain::repositories::cost_ledger_repository::CostLedgerRepository;
use crate::domain::services::cost_governor::{self, GovernanceState};
use crate::domain::services::llm_service::LlmServiceTrait;
use crate::handlers::traits::{HandlerError, JobHandler, JobOutcome};
use crate::utils::retry_policy::is_retryable_error;

/// AI打标处理器配置
///
/// 取自Settings的llm和budget段；模型与批量的两档取值
/// 对应治理状态机的Normal和Reduce档
#[derive(Debug, Clone)]
pub struct AiTagConfig {
    pub model: String,
    pub reduced_model: String,
    pub cost_per_mtok_cents: i64,
    pub reduced_cost_per_mtok_cents: i64,
    pub full_batch: usize,
    pub reduced_batch: usize,
    pub monthly_ceiling_cents: i64,
    pub defer_delay: Duration,
}

/// AI打标负载
#[derive(Debug, Deserialize)]
struct TagRequestPayload {
    listing_id: uuid::Uuid,
    title: String,
    #[serde(default)]
    description: String,
}

/// AI打标处理器
///
/// 为分类信息条目生成标签。属于AI消费类作业：每次外部
/// 调用前先查询成本治理状态，并按Reduce/Queue/HardStop
/// 约定降级、延迟或拒绝执行；每次调用后追加成本台账。
pub struct AiTagHandler {
    llm: Arc<dyn LlmServiceTrait>,
    ledger: Arc<dyn CostLedgerRepository>,
    config: AiTagConfig,
}

impl AiTagHandler {
    /// 创建新的AI打标处理器实例
    ///
    /// # 参数
    ///
    /// * `llm` - LLM服务
    /// * `ledger` - 成本台账仓库
    /// * `config` - 处理器配置
    pub fn new(
        llm: Arc<dyn LlmServiceTrait>,
        ledger: Arc<dyn CostLedgerRepository>,
        config: AiTagConfig,
    ) -> Self {
        Self {
            llm,
            ledger,
            config,
        }
    }

    /// 将令牌用量折算为美分，向上取整
    fn cost_cents(total_tokens: u32, rate_per_mtok_cents: i64) -> i32 {
        let cents = (total_tokens as i64 * rate_per_mtok_cents + 999_999) / 1_000_000;
        cents as i32
    }
}

#[async_trait]
impl JobHandler for AiTagHandler {
    fn job_type(&self) -> JobType {
        JobType::AiTag
    }

    #[instrument(skip(self, payload))]
    async fn execute(&self, payload: &serde_json::Value) -> Result<JobOutcome, HandlerError> {
        let request: TagRequestPayload = serde_json::from_value(payload.clone())
            .map_err(|e| HandlerError::Permanent(format!("invalid tag payload: {}", e)))?;

        // 支出持续变化，治理状态必须在每次调用前重新计算
        let spent = self
            .ledger
            .month_to_date(Utc::now())
            .await
            .map_err(|e| HandlerError::Transient(e.to_string()))?;
        let snapshot = SpendSnapshot::new(spent, self.config.monthly_ceiling_cents);

        let (model, batch, rate) = match cost_governor::evaluate(&snapshot) {
            GovernanceState::HardStop => {
                info!(listing_id = %request.listing_id, "AI tagging refused, spend ceiling reached");
                return Err(HandlerError::BudgetExceeded);
            }
            GovernanceState::Queue => {
                info!(listing_id = %request.listing_id, "AI tagging deferred to spread remaining budget");
                return Ok(JobOutcome::Deferred {
                    delay: self.config.defer_delay,
                });
            }
            GovernanceState::Reduce => (
                self.config.reduced_model.as_str(),
                self.config.reduced_batch,
                self.config.reduced_cost_per_mtok_cents,
            ),
            GovernanceState::Normal => (
                self.config.model.as_str(),
                self.config.full_batch,
                self.config.cost_per_mtok_cents,
            ),
        };

        let text = format!("{}\n{}", request.title, request.description);
        let (tags, usage) = self.llm.suggest_tags(&text, model, batch).await.map_err(|e| {
            if is_retryable_error(&e) {
                HandlerError::Transient(e.to_string())
            } else {
                HandlerError::Permanent(e.to_string())
            }
        })?;

        let entry = CostLedgerEntry::new(
            JobType::AiTag,
            model.to_string(),
            usage.prompt_tokens as i32,
            usage.completion_tokens as i32,
            Self::cost_cents(usage.total_tokens, rate),
        );
        // 台账写失败不回滚已产生的支出；重试会重复调用模型，
        // 治理阈值本身是粗粒度的，少记一笔比双倍支出可取
        if let Err(e) = self.ledger.append(&entry).await {
            error!(listing_id = %request.listing_id, "Failed to append cost ledger entry: {}", e);
            metrics::counter!("cost_ledger_append_failed_total").increment(1);
        }

        info!(
            listing_id = %request.listing_id,
            model,
            tags = tags.len(),
            total_tokens = usage.total_tokens,
            "Listing tagged"
        );

        Ok(JobOutcome::Completed)
    }
}
