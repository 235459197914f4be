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

use futures::FutureExt;
use metrics::{counter, histogram};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OwnedSemaphorePermit;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::models::job::{Job, JobStatus, JobType, QueueFamily};
use crate::domain::repositories::job_repository::JobRepository;
use crate::handlers::registry::HandlerRegistry;
use crate::handlers::traits::JobOutcome;
use crate::queue::permit_pool::PermitPools;
use crate::queue::registry::QueueRegistry;
use crate::utils::errors::WorkerError;

/// 调度Worker
///
/// 每个实例独立轮询作业记录存储：按优先级遍历队列注册表，
/// 为带上限的队列预取许可，认领一个可执行作业并执行其处理器，
/// 最后按结果结算。并发安全完全由仓库的原子认领保证，
/// Worker之间没有其他协调。
pub struct DispatchWorker<R>
where
    R: JobRepository + Send + Sync,
{
    repository: Arc<R>,
    handlers: Arc<HandlerRegistry>,
    permits: PermitPools,
    poll_interval: Duration,
    error_backoff: Duration,
    worker_id: Uuid,
}

impl<R> DispatchWorker<R>
where
    R: JobRepository + Send + Sync,
{
    /// 创建新的调度Worker实例
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
            worker_id: Uuid::new_v4(),
        }
    }

    /// 运行调度Worker
    ///
    /// 空轮询休眠poll_interval；存储故障记录日志并退避后继续，
    /// 单次存储抖动不会终止Worker进程
    pub async fn run(&self) {
        info!("Dispatch worker {} started", self.worker_id);

        loop {
            match self.poll_once().await {
                Ok(processed) => {
                    if !processed {
                        sleep(self.poll_interval).await;
                    }
                }
                Err(e) => {
                    error!("Error polling for jobs: {}", e);
                    sleep(self.error_backoff).await;
                }
            }
        }
    }

    /// 执行一轮调度
    ///
    /// # 返回值
    ///
    /// * `Ok(true)` - 认领并执行了一个作业
    /// * `Ok(false)` - 本轮没有可执行作业
    /// * `Err(WorkerError)` - 存储访问失败
    pub async fn poll_once(&self) -> Result<bool, WorkerError> {
        let mut eligible: Vec<QueueFamily> = Vec::new();
        let mut held: Vec<(QueueFamily, OwnedSemaphorePermit)> = Vec::new();

        for spec in QueueRegistry::in_priority_order() {
            if spec.ceiling.is_some() {
                match self.permits.try_acquire(spec.family) {
                    Some(permit) => {
                        held.push((spec.family, permit));
                        eligible.push(spec.family);
                    }
                    // Pool exhausted: skip this queue for this cycle instead
                    // of blocking the polling loop
                    None => {}
                }
            } else {
                eligible.push(spec.family);
            }
        }

        let claimed = self
            .repository
            .claim_next(self.worker_id, &eligible)
            .await
            .map_err(|e| WorkerError::RepositoryError(e.to_string()))?;

        let Some(job) = claimed else {
            // Unused permits drop here and return to their pools
            return Ok(false);
        };

        // Keep only the permit backing the claimed job's queue; the rest
        // drop immediately so other workers can claim those queues
        let _permit = held
            .into_iter()
            .find(|(family, _)| *family == job.queue)
            .map(|(_, permit)| permit);

        self.execute(job).await;
        Ok(true)
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, job_type = %job.job_type, queue = %job.queue))]
    async fn execute(&self, job: Job) {
        let job_id = job.id;
        let job_type = job.job_type;

        let Some(handler) = self.handlers.get(job_type) else {
            warn!("No handler registered for job type {}", job_type);
            self.settle_failure(
                job_id,
                job_type,
                &format!("no handler registered for type {}", job_type),
                false,
            )
            .await;
            return;
        };

        let started = Instant::now();

        // A panicking handler must never leave the job permanently locked
        let result = AssertUnwindSafe(handler.execute(&job.payload))
            .catch_unwind()
            .await;

        histogram!("job_duration_seconds", "job_type" => job_type.to_string())
            .record(started.elapsed().as_secs_f64());

        match result {
            Err(_) => {
                error!("Handler panicked while processing job");
                self.settle_failure(job_id, job_type, "handler panicked", true)
                    .await;
            }
            Ok(Ok(JobOutcome::Completed)) => match self.repository.resolve_success(job_id).await {
                Ok(()) => {
                    counter!("jobs_succeeded_total", "job_type" => job_type.to_string())
                        .increment(1);
                    info!("Job completed");
                }
                Err(e) => {
                    // Row stays locked; the reclaimer will recover it
                    error!("Failed to resolve job as succeeded: {}", e);
                }
            },
            Ok(Ok(JobOutcome::Deferred { delay })) => {
                let delay = chrono::Duration::from_std(delay)
                    .unwrap_or_else(|_| chrono::Duration::seconds(3600));
                match self.repository.defer(job_id, delay).await {
                    Ok(()) => info!("Job deferred for {}s", delay.num_seconds()),
                    Err(e) => error!("Failed to defer job: {}", e),
                }
            }
            Ok(Err(e)) => {
                let retry = e.is_retryable();
                self.settle_failure(job_id, job_type, &e.to_string(), retry)
                    .await;
            }
        }
    }

    /// 结算一次失败的执行，按结果更新计数器
    async fn settle_failure(&self, job_id: Uuid, job_type: JobType, error: &str, retry: bool) {
        match self.repository.resolve_failure(job_id, error, retry).await {
            Ok(updated) => {
                if updated.status == JobStatus::Dead {
                    counter!("jobs_dead_total", "job_type" => job_type.to_string()).increment(1);
                    warn!(
                        "Job moved to dead letter after {} attempts: {}",
                        updated.attempt_count, error
                    );
                } else {
                    counter!("jobs_retried_total", "job_type" => job_type.to_string()).increment(1);
                    info!(
                        "Job failed, retry {}/{} scheduled: {}",
                        updated.attempt_count, updated.max_attempts, error
                    );
                }
            }
            Err(e) => {
                // Row stays locked; the reclaimer will recover it
                error!("Failed to settle job failure: {}", e);
            }
        }
    }
}
