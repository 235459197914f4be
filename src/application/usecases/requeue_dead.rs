// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::domain::models::job::{Job, JobStatus};
use crate::domain::repositories::job_repository::{JobRepository, RepositoryError};
use crate::queue::job_queue::{JobQueue, QueueError};

/// 运维用例错误类型
#[derive(Error, Debug)]
pub enum RequeueError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Job {0} is not in the dead letter state")]
    NotDead(Uuid),
}

// === Section: Use Case Definition ===

/// 死信重投用例
///
/// 运维界面背后的薄封装：查看死信列表并把选中的死信作为
/// 全新的Pending行重新入队。原死信行保持不动，便于审计。
pub struct RequeueDeadUseCase<R: JobRepository> {
    repository: Arc<R>,
    queue: Arc<dyn JobQueue>,
}

// === Section: Implementation ===

impl<R: JobRepository> RequeueDeadUseCase<R> {
    pub fn new(repository: Arc<R>, queue: Arc<dyn JobQueue>) -> Self {
        Self { repository, queue }
    }

    /// 列出死信作业
    ///
    /// 治理硬停的死信通过其`budget:`错误前缀与真实失败区分
    pub async fn list(&self, limit: u64) -> Result<Vec<Job>, RequeueError> {
        Ok(self.repository.dead_letters(limit).await?)
    }

    /// 重投一个死信作业
    ///
    /// # 参数
    ///
    /// * `job_id` - 死信作业ID
    ///
    /// # 返回值
    ///
    /// * `Ok(Job)` - 新入队的作业（全新ID，额度清零）
    /// * `Err(RequeueError)` - 作业不存在或不是死信
    pub async fn requeue(&self, job_id: Uuid) -> Result<Job, RequeueError> {
        let dead = self
            .repository
            .find_by_id(job_id)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        if dead.status != JobStatus::Dead {
            return Err(RequeueError::NotDead(job_id));
        }

        let mut replacement = Job::new(dead.queue, dead.job_type, dead.payload.clone());
        replacement.max_attempts = dead.max_attempts;

        let created = self.queue.enqueue(replacement).await?;
        info!(
            "Dead job {} requeued as {} on queue {}",
            job_id, created.id, created.queue
        );
        Ok(created)
    }
}
