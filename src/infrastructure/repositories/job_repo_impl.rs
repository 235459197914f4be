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

use crate::domain::models::job::{Job, JobStatus, QueueFamily};
use crate::domain::repositories::job_repository::{JobRepository, RepositoryError};
use crate::infrastructure::database::entities::job as job_entity;
use crate::queue::registry::QueueRegistry;
use crate::utils::retry_policy::RetryPolicy;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use std::sync::Arc;
use uuid::Uuid;

/// 每轮认领尝试读取的候选行数
///
/// CAS丢失竞争时在候选批次内顺延，避免每次竞争都重新查询
const CLAIM_CANDIDATES: u64 = 5;

/// 锁回收时记录的失败原因
const RECLAIM_ERROR: &str = "lock expired: worker presumed crashed";

/// 作业仓库实现
///
/// 基于SeaORM实现的作业数据访问层。认领采用条件更新形式的
/// 原子CAS（`WHERE id = ? AND status = 'pending'`），不依赖
/// 任何数据库专有的锁定语法，Postgres和SQLite行为一致。
#[derive(Clone)]
pub struct JobRepositoryImpl {
    /// 数据库连接
    db: Arc<DatabaseConnection>,
    /// 重试退避策略
    retry_policy: RetryPolicy,
}

impl JobRepositoryImpl {
    /// 创建新的作业仓库实例
    ///
    /// # 参数
    ///
    /// * `db` - 数据库连接
    ///
    /// # 返回值
    ///
    /// 返回新的作业仓库实例
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            db,
            retry_policy: RetryPolicy::standard(),
        }
    }

    /// 使用指定重试策略创建作业仓库实例
    pub fn with_retry_policy(db: Arc<DatabaseConnection>, retry_policy: RetryPolicy) -> Self {
        Self { db, retry_policy }
    }
}

impl From<job_entity::Model> for Job {
    fn from(model: job_entity::Model) -> Self {
        Self {
            id: model.id,
            queue: model.queue.parse().unwrap_or_default(),
            job_type: model.job_type.parse().unwrap_or_default(),
            status: model.status.parse().unwrap_or_default(),
            payload: model.payload,
            attempt_count: model.attempt_count,
            max_attempts: model.max_attempts,
            next_run_at: model.next_run_at,
            locked_at: model.locked_at,
            locked_by: model.locked_by,
            last_error: model.last_error,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

impl From<Job> for job_entity::ActiveModel {
    fn from(job: Job) -> Self {
        Self {
            id: Set(job.id),
            queue: Set(job.queue.to_string()),
            job_type: Set(job.job_type.to_string()),
            status: Set(job.status.to_string()),
            // 行内优先级从注册表冗余写入，保证认领排序稳定
            priority: Set(QueueRegistry::priority(job.queue)),
            payload: Set(job.payload.clone()),
            attempt_count: Set(job.attempt_count),
            max_attempts: Set(job.max_attempts),
            next_run_at: Set(job.next_run_at),
            locked_at: Set(job.locked_at),
            locked_by: Set(job.locked_by),
            last_error: Set(job.last_error.clone()),
            created_at: Set(job.created_at),
            updated_at: Set(job.updated_at),
        }
    }
}

#[async_trait]
impl JobRepository for JobRepositoryImpl {
    async fn create(&self, job: &Job) -> Result<Job, RepositoryError> {
        let model: job_entity::ActiveModel = job.clone().into();

        model.insert(self.db.as_ref()).await?;
        Ok(job.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Job>, RepositoryError> {
        let model = job_entity::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?;

        Ok(model.map(Into::into))
    }

    async fn claim_next(
        &self,
        worker_id: Uuid,
        queues: &[QueueFamily],
    ) -> Result<Option<Job>, RepositoryError> {
        if queues.is_empty() {
            return Ok(None);
        }

        let queue_names: Vec<String> = queues.iter().map(|q| q.to_string()).collect();

        let candidates = job_entity::Entity::find()
            .filter(job_entity::Column::Status.eq(JobStatus::Pending.to_string()))
            .filter(job_entity::Column::NextRunAt.lte(Utc::now()))
            .filter(job_entity::Column::Queue.is_in(queue_names))
            .order_by_asc(job_entity::Column::Priority)
            .order_by_asc(job_entity::Column::NextRunAt)
            .limit(CLAIM_CANDIDATES)
            .all(self.db.as_ref())
            .await?;

        for candidate in candidates {
            let now: DateTime<FixedOffset> = Utc::now().into();

            // Conditional update is the claim primitive: the row is ours
            // only if it was still pending when the update ran.
            let result = job_entity::Entity::update_many()
                .col_expr(
                    job_entity::Column::Status,
                    Expr::value(JobStatus::Locked.to_string()),
                )
                .col_expr(job_entity::Column::LockedAt, Expr::value(Some(now)))
                .col_expr(job_entity::Column::LockedBy, Expr::value(Some(worker_id)))
                .col_expr(job_entity::Column::UpdatedAt, Expr::value(now))
                .filter(job_entity::Column::Id.eq(candidate.id))
                .filter(job_entity::Column::Status.eq(JobStatus::Pending.to_string()))
                .exec(self.db.as_ref())
                .await?;

            if result.rows_affected == 1 {
                let model = job_entity::Entity::find_by_id(candidate.id)
                    .one(self.db.as_ref())
                    .await?
                    .ok_or(RepositoryError::NotFound)?;
                return Ok(Some(model.into()));
            }
            // Another worker won this row; fall through to the next candidate
        }

        Ok(None)
    }

    async fn resolve_success(&self, id: Uuid) -> Result<(), RepositoryError> {
        let job = self
            .find_by_id(id)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        let mut updated = job.clone();
        updated.status = JobStatus::Succeeded;
        updated.locked_at = None;
        updated.locked_by = None;
        updated.last_error = None;
        updated.updated_at = Utc::now().into();

        let active: job_entity::ActiveModel = updated.into();
        active.update(self.db.as_ref()).await?;
        Ok(())
    }

    async fn resolve_failure(
        &self,
        id: Uuid,
        error: &str,
        retry: bool,
    ) -> Result<Job, RepositoryError> {
        let job = self
            .find_by_id(id)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        // 刚结束的这次执行计入额度
        let attempt = job.attempt_count + 1;

        let mut updated = job.clone();
        updated.attempt_count = attempt;
        updated.last_error = Some(error.to_string());
        updated.locked_at = None;
        updated.locked_by = None;
        updated.updated_at = Utc::now().into();

        if retry && attempt < job.max_attempts {
            updated.status = JobStatus::Pending;
            updated.next_run_at = self
                .retry_policy
                .next_retry_time(attempt as u32, Utc::now())
                .into();
        } else {
            updated.status = JobStatus::Dead;
        }

        let active: job_entity::ActiveModel = updated.clone().into();
        active.update(self.db.as_ref()).await?;
        Ok(updated)
    }

    async fn defer(&self, id: Uuid, delay: chrono::Duration) -> Result<(), RepositoryError> {
        let job = self
            .find_by_id(id)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        let mut updated = job.clone();
        updated.status = JobStatus::Pending;
        updated.next_run_at = (Utc::now() + delay).into();
        updated.locked_at = None;
        updated.locked_by = None;
        updated.updated_at = Utc::now().into();

        let active: job_entity::ActiveModel = updated.into();
        active.update(self.db.as_ref()).await?;
        Ok(())
    }

    async fn reclaim_stale_locks(&self, timeout: chrono::Duration) -> Result<u64, RepositoryError> {
        let threshold = Utc::now() - timeout;
        let now: DateTime<FixedOffset> = Utc::now().into();

        // 额度已耗尽的遗弃行直接进入死信
        let dead = job_entity::Entity::update_many()
            .col_expr(
                job_entity::Column::Status,
                Expr::value(JobStatus::Dead.to_string()),
            )
            .col_expr(
                job_entity::Column::AttemptCount,
                Expr::col(job_entity::Column::AttemptCount).add(1),
            )
            .col_expr(
                job_entity::Column::LockedAt,
                Expr::value(Option::<DateTime<FixedOffset>>::None),
            )
            .col_expr(
                job_entity::Column::LockedBy,
                Expr::value(Option::<Uuid>::None),
            )
            .col_expr(
                job_entity::Column::LastError,
                Expr::value(Some(RECLAIM_ERROR.to_string())),
            )
            .col_expr(job_entity::Column::UpdatedAt, Expr::value(now))
            .filter(job_entity::Column::Status.eq(JobStatus::Locked.to_string()))
            .filter(job_entity::Column::LockedAt.lte(threshold))
            .filter(Expr::cust("attempt_count + 1 >= max_attempts"))
            .exec(self.db.as_ref())
            .await?;

        // 其余遗弃行回到待执行并立即可被认领，回收本身计一次执行
        let requeued = job_entity::Entity::update_many()
            .col_expr(
                job_entity::Column::Status,
                Expr::value(JobStatus::Pending.to_string()),
            )
            .col_expr(
                job_entity::Column::AttemptCount,
                Expr::col(job_entity::Column::AttemptCount).add(1),
            )
            .col_expr(job_entity::Column::NextRunAt, Expr::value(now))
            .col_expr(
                job_entity::Column::LockedAt,
                Expr::value(Option::<DateTime<FixedOffset>>::None),
            )
            .col_expr(
                job_entity::Column::LockedBy,
                Expr::value(Option::<Uuid>::None),
            )
            .col_expr(
                job_entity::Column::LastError,
                Expr::value(Some(RECLAIM_ERROR.to_string())),
            )
            .col_expr(job_entity::Column::UpdatedAt, Expr::value(now))
            .filter(job_entity::Column::Status.eq(JobStatus::Locked.to_string()))
            .filter(job_entity::Column::LockedAt.lte(threshold))
            .filter(Expr::cust("attempt_count + 1 < max_attempts"))
            .exec(self.db.as_ref())
            .await?;

        Ok(dead.rows_affected + requeued.rows_affected)
    }

    async fn mark_failed(&self, id: Uuid) -> Result<(), RepositoryError> {
        let now: DateTime<FixedOffset> = Utc::now().into();

        // 仅允许取消尚未被认领的行
        let result = job_entity::Entity::update_many()
            .col_expr(
                job_entity::Column::Status,
                Expr::value(JobStatus::Failed.to_string()),
            )
            .col_expr(job_entity::Column::UpdatedAt, Expr::value(now))
            .filter(job_entity::Column::Id.eq(id))
            .filter(job_entity::Column::Status.eq(JobStatus::Pending.to_string()))
            .exec(self.db.as_ref())
            .await?;

        if result.rows_affected == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn pending_depth(&self, queue: QueueFamily) -> Result<u64, RepositoryError> {
        let count = job_entity::Entity::find()
            .filter(job_entity::Column::Queue.eq(queue.to_string()))
            .filter(job_entity::Column::Status.eq(JobStatus::Pending.to_string()))
            .count(self.db.as_ref())
            .await?;
        Ok(count)
    }

    async fn dead_letters(&self, limit: u64) -> Result<Vec<Job>, RepositoryError> {
        let models = job_entity::Entity::find()
            .filter(job_entity::Column::Status.eq(JobStatus::Dead.to_string()))
            .order_by_desc(job_entity::Column::UpdatedAt)
            .limit(limit)
            .all(self.db.as_ref())
            .await?;

        Ok(models.into_iter().map(Job::from).collect())
    }
}
