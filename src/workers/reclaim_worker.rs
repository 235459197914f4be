// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use tokio::time::interval;
use tracing::{error, info};

use crate::domain::repositories::job_repository::JobRepository;
use crate::utils::errors::WorkerError;

/// 锁回收Worker
///
/// 独立于调度循环周期性运行，将锁定超时的作业行恢复为
/// 可认领状态。崩溃Worker持有的截图许可也经由该路径间接
/// 恢复：行解锁后重新认领会获取新的许可。
pub struct ReclaimWorker {
    repository: Arc<dyn JobRepository>,
    /// 扫描间隔
    run_interval: Duration,
    /// 锁定超时阈值，超过后锁定被视为遗弃
    lock_timeout: chrono::Duration,
}

impl ReclaimWorker {
    pub fn new(
        repository: Arc<dyn JobRepository>,
        run_interval: Duration,
        lock_timeout: chrono::Duration,
    ) -> Self {
        Self {
            repository,
            run_interval,
            lock_timeout,
        }
    }

    /// 执行一轮回收
    async fn reclaim_once(&self) -> Result<u64, WorkerError> {
        self.repository
            .reclaim_stale_locks(self.lock_timeout)
            .await
            .map_err(|e| WorkerError::RepositoryError(e.to_string()))
    }
}

#[async_trait]
impl crate::workers::Worker for ReclaimWorker {
    async fn run(&self) -> Result<(), WorkerError> {
        info!("锁回收Worker启动");

        let mut interval = interval(self.run_interval);

        loop {
            interval.tick().await;

            match self.reclaim_once().await {
                Ok(count) => {
                    if count > 0 {
                        counter!("jobs_reclaimed_total").increment(count);
                        info!("回收 {} 个锁定过期的作业", count);
                    }
                }
                Err(e) => {
                    error!("回收锁定过期作业失败: {}", e);
                }
            }
        }
    }

    fn name(&self) -> &str {
        "reclaim-worker"
    }
}
