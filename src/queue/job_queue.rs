// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::job::{Job, QueueFamily};
use crate::domain::repositories::job_repository::JobRepository;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// 队列错误类型
#[derive(Error, Debug)]
pub enum QueueError {
    /// 仓库错误
    #[error("Repository error: {0}")]
    Repository(#[from] crate::domain::repositories::job_repository::RepositoryError),

    /// 队列为空
    #[error("Queue empty")]
    Empty,
}

/// 作业队列特质
///
/// 生产者与调度器共用的队列门面。入队失败必须向调用方传播，
/// 静默丢失作业属于正确性缺陷。
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// 入队作业
    async fn enqueue(&self, job: Job) -> Result<Job, QueueError>;

    /// 出队作业：在给定队列集合内认领下一个可执行作业
    async fn dequeue(
        &self,
        worker_id: Uuid,
        queues: &[QueueFamily],
    ) -> Result<Option<Job>, QueueError>;

    /// 完成作业
    async fn complete(&self, job_id: Uuid) -> Result<(), QueueError>;
    /// 结算失败的作业执行
    async fn fail(&self, job_id: Uuid, error: &str, retry: bool) -> Result<Job, QueueError>;
}

/// PostgreSQL作业队列实现
pub struct PostgresJobQueue<R: JobRepository> {
    /// 作业仓库
    repository: Arc<R>,
}

impl<R: JobRepository> PostgresJobQueue<R> {
    /// 创建新的PostgreSQL作业队列实例
    ///
    /// # 参数
    ///
    /// * `repository` - 作业仓库
    ///
    /// # 返回值
    ///
    /// 返回新的PostgreSQL作业队列实例
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl<R: JobRepository> JobQueue for PostgresJobQueue<R> {
    /// 入队作业
    ///
    /// # 参数
    ///
    /// * `job` - 要入队的作业
    ///
    /// # 返回值
    ///
    /// * `Ok(Job)` - 入队成功的作业
    /// * `Err(QueueError)` - 入队失败
    async fn enqueue(&self, job: Job) -> Result<Job, QueueError> {
        let created = self.repository.create(&job).await?;
        Ok(created)
    }

    /// 出队作业
    ///
    /// # 参数
    ///
    /// * `worker_id` - 工作者ID
    /// * `queues` - 本轮可认领的队列集合
    ///
    /// # 返回值
    ///
    /// * `Ok(Some(Job))` - 成功出队的作业
    /// * `Ok(None)` - 没有可出队的作业
    /// * `Err(QueueError)` - 出队失败
    async fn dequeue(
        &self,
        worker_id: Uuid,
        queues: &[QueueFamily],
    ) -> Result<Option<Job>, QueueError> {
        let job = self.repository.claim_next(worker_id, queues).await?;
        Ok(job)
    }

    /// 完成作业
    ///
    /// # 参数
    ///
    /// * `job_id` - 作业ID
    ///
    /// # 返回值
    ///
    /// * `Ok(())` - 成功
    /// * `Err(QueueError)` - 失败
    async fn complete(&self, job_id: Uuid) -> Result<(), QueueError> {
        self.repository.resolve_success(job_id).await?;
        Ok(())
    }

    /// 结算失败的作业执行
    ///
    /// # 参数
    ///
    /// * `job_id` - 作业ID
    /// * `error` - 失败原因
    /// * `retry` - 是否允许重试
    ///
    /// # 返回值
    ///
    /// * `Ok(Job)` - 结算后的作业
    /// * `Err(QueueError)` - 失败
    async fn fail(&self, job_id: Uuid, error: &str, retry: bool) -> Result<Job, QueueError> {
        let job = self.repository.resolve_failure(job_id, error, retry).await?;
        Ok(job)
    }
}

#[async_trait]
impl<T: JobQueue + ?Sized> JobQueue for Arc<T> {
    async fn enqueue(&self, job: Job) -> Result<Job, QueueError> {
        (**self).enqueue(job).await
    }

    async fn dequeue(
        &self,
        worker_id: Uuid,
        queues: &[QueueFamily],
    ) -> Result<Option<Job>, QueueError> {
        (**self).dequeue(worker_id, queues).await
    }

    async fn complete(&self, job_id: Uuid) -> Result<(), QueueError> {
        (**self).complete(job_id).await
    }

    async fn fail(&self, job_id: Uuid, error: &str, retry: bool) -> Result<Job, QueueError> {
        (**self).fail(job_id, error, retry).await
    }
}
