// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::domain::models::job::{Job, JobType, QueueFamily};
use crate::queue::job_queue::{JobQueue, QueueError};

// === Section: Use Case Definition ===

/// 作业入队用例
///
/// 生产者（REST资源、其他后台流程）提交延迟工作的入口。
/// 入队失败原样向调用方传播。
pub struct EnqueueJobUseCase {
    queue: Arc<dyn JobQueue>,
}

// === Section: Implementation ===

impl EnqueueJobUseCase {
    pub fn new(queue: Arc<dyn JobQueue>) -> Self {
        Self { queue }
    }

    /// 入队一个新作业
    ///
    /// # 参数
    ///
    /// * `queue` - 目标队列族
    /// * `job_type` - 作业类型，必须有已注册的处理器
    /// * `payload` - 作业负载
    /// * `max_attempts` - 最大执行次数
    /// * `delay` - 延迟执行时间
    ///
    /// # 返回值
    ///
    /// * `Ok(Uuid)` - 新作业的ID
    /// * `Err(QueueError)` - 入队失败
    pub async fn enqueue(
        &self,
        queue: QueueFamily,
        job_type: JobType,
        payload: serde_json::Value,
        max_attempts: i32,
        delay: chrono::Duration,
    ) -> Result<Uuid, QueueError> {
        let mut job = Job::new(queue, job_type, payload);
        job.max_attempts = max_attempts.max(1);
        job.next_run_at = (Utc::now() + delay).into();

        let created = self.queue.enqueue(job).await?;
        Ok(created.id)
    }
}
