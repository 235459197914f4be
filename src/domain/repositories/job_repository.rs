// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::job::{Job, QueueFamily};
use async_trait::async_trait;
use sea_orm::DbErr;
use thiserror::Error;
use uuid::Uuid;

/// 仓库错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// 数据库错误
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
    /// 记录未找到
    #[error("Record not found")]
    NotFound,
}

/// 作业仓库特质
///
/// 作业记录存储是整个调度子系统唯一的共享可变状态，
/// 并发安全完全依赖claim_next的原子认领原语。
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// 创建新作业
    async fn create(&self, job: &Job) -> Result<Job, RepositoryError>;
    /// 根据ID查找作业
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Job>, RepositoryError>;
    /// 原子认领下一个可执行作业
    ///
    /// 在给定队列集合内按（优先级升序、next_run_at升序）选取最早的
    /// 可执行行并将其置为Locked。两个Worker绝不会认领到同一行。
    async fn claim_next(
        &self,
        worker_id: Uuid,
        queues: &[QueueFamily],
    ) -> Result<Option<Job>, RepositoryError>;
    /// 将作业标记为成功终态，清除锁定字段和错误
    async fn resolve_success(&self, id: Uuid) -> Result<(), RepositoryError>;
    /// 结算一次失败的执行
    ///
    /// 本次执行计入attempt_count；若retry为true且额度未耗尽则回到
    /// Pending并按指数退避设置next_run_at，否则进入Dead。
    /// 返回结算后的作业，供调用方区分重试与死信。
    async fn resolve_failure(
        &self,
        id: Uuid,
        error: &str,
        retry: bool,
    ) -> Result<Job, RepositoryError>;
    /// 延迟执行作业（治理排队结果），不消耗执行额度
    async fn defer(&self, id: Uuid, delay: chrono::Duration) -> Result<(), RepositoryError>;
    /// 回收过期锁定
    ///
    /// 锁定超过timeout的行视为Worker崩溃遗留：重试额度已耗尽的
    /// 进入Dead，其余回到Pending并计一次执行
    async fn reclaim_stale_locks(&self, timeout: chrono::Duration) -> Result<u64, RepositoryError>;
    /// 运维取消待执行作业
    async fn mark_failed(&self, id: Uuid) -> Result<(), RepositoryError>;
    /// 统计队列当前待执行深度
    async fn pending_depth(&self, queue: QueueFamily) -> Result<u64, RepositoryError>;
    /// 列出死信作业，按更新时间倒序
    async fn dead_letters(&self, limit: u64) -> Result<Vec<Job>, RepositoryError>;
}
