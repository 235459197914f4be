// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::repositories::job_repository::JobRepository;
use crate::handlers::registry::HandlerRegistry;
use crate::queue::permit_pool::PermitPools;
use crate::workers::dispatch_worker::DispatchWorker;
use crate::workers::reclaim_worker::ReclaimWorker;
use crate::workers::Worker;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// 工作管理器
pub struct WorkerManager<R>
where
    R: JobRepository + 'static,
{
    repository: Arc<R>,
    handlers: Arc<HandlerRegistry>,
    permits: PermitPools,
    poll_interval: Duration,
    error_backoff: Duration,
    handles: Vec<JoinHandle<()>>,
}

impl<R> WorkerManager<R>
where
    R: JobRepository + Send + Sync,
{
    pub fn new(
        repository: Arc<R>,
        handlers: Arc<HandlerRegistry>,
        permits: PermitPools,
        poll_interval: Duration,
        error_backoff: Duration,
    ) -> Self {
        Self {
            repository,
            handlers,
            permits,
            poll_interval,
            error_backoff,
            handles: Vec::new(),
        }
    }

    /// 启动调度Worker
    ///
    /// 创建并启动指定数量的调度Worker。许可池在所有Worker间
    /// 共享，截图并发上限对整个进程生效。
    ///
    /// # 参数
    ///
    /// * `count` - 要启动的Worker数量
    pub async fn start_workers(&mut self, count: usize) {
        for _ in 0..count {
            let worker = DispatchWorker::new(
                self.repository.clone(),
                self.handlers.clone(),
                self.permits.clone(),
                self.poll_interval,
                self.error_backoff,
            );

            // We spawn the worker loop on a separate task to avoid blocking
            // the main thread or the loop that spawns workers.
            let handle = tokio::spawn(async move {
                worker.run().await;
            });
            self.handles.push(handle);
        }
    }

    /// 启动锁回收Worker
    ///
    /// # 参数
    ///
    /// * `run_interval` - 扫描间隔
    /// * `lock_timeout` - 锁定超时阈值
    pub fn start_reclaimer(&mut self, run_interval: Duration, lock_timeout: chrono::Duration) {
        let repository: Arc<dyn JobRepository> = self.repository.clone();
        let worker = ReclaimWorker::new(repository, run_interval, lock_timeout);

        let handle = tokio::spawn(async move {
            if let Err(e) = worker.run().await {
                error!("Reclaim worker exited with error: {}", e);
            }
        });
        self.handles.push(handle);
    }

    /// 等待关闭信号并关闭工作进程
    ///
    /// 监听关闭信号并优雅地关闭所有工作进程
    pub async fn wait_for_shutdown(&mut self) {
        match signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(err) => error!("Unable to listen for shutdown signal: {}", err),
        }

        info!("Shutting down workers...");
        for handle in &self.handles {
            handle.abort();
        }

        info!("Workers shut down successfully");
    }
}
