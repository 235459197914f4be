// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use portalq::domain::models::job::{Job, JobStatus, QueueFamily};
use portalq::domain::repositories::job_repository::{JobRepository, RepositoryError};
use portalq::queue::registry::QueueRegistry;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// 内存作业仓库
///
/// 调度器测试用的仓库实现：一把互斥锁模拟存储的原子认领，
/// 重试不做退避延迟，作业立即重新可认领，便于测试驱动轮次
pub struct MemoryJobRepository {
    jobs: Mutex<HashMap<Uuid, Job>>,
}

impl MemoryJobRepository {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// 直接读取作业当前状态
    pub fn get(&self, id: Uuid) -> Option<Job> {
        self.jobs.lock().unwrap().get(&id).cloned()
    }
}

impl Default for MemoryJobRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobRepository for MemoryJobRepository {
    async fn create(&self, job: &Job) -> Result<Job, RepositoryError> {
        self.jobs.lock().unwrap().insert(job.id, job.clone());
        Ok(job.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Job>, RepositoryError> {
        Ok(self.jobs.lock().unwrap().get(&id).cloned())
    }

    async fn claim_next(
        &self,
        worker_id: Uuid,
        queues: &[QueueFamily],
    ) -> Result<Option<Job>, RepositoryError> {
        let mut jobs = self.jobs.lock().unwrap();

        let mut candidates: Vec<Uuid> = jobs
            .values()
            .filter(|job| job.is_eligible(Utc::now()) && queues.contains(&job.queue))
            .map(|job| job.id)
            .collect();
        candidates.sort_by_key(|id| {
            let job = &jobs[id];
            (QueueRegistry::priority(job.queue), job.next_run_at)
        });

        let Some(id) = candidates.first().copied() else {
            return Ok(None);
        };

        let job = jobs.remove(&id).expect("candidate exists");
        let locked = job.lock(worker_id).expect("eligible job is pending");
        jobs.insert(id, locked.clone());
        Ok(Some(locked))
    }

    async fn resolve_success(&self, id: Uuid) -> Result<(), RepositoryError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.remove(&id).ok_or(RepositoryError::NotFound)?;
        let succeeded = job.succeed().expect("resolved job was locked");
        jobs.insert(id, succeeded);
        Ok(())
    }

    async fn resolve_failure(
        &self,
        id: Uuid,
        error: &str,
        retry: bool,
    ) -> Result<Job, RepositoryError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(&id).ok_or(RepositoryError::NotFound)?;

        let attempt = job.attempt_count + 1;
        job.attempt_count = attempt;
        job.last_error = Some(error.to_string());
        job.locked_at = None;
        job.locked_by = None;
        job.updated_at = Utc::now().into();

        if retry && attempt < job.max_attempts {
            job.status = JobStatus::Pending;
            // 测试中不退避，作业立即重新可认领
            job.next_run_at = Utc::now().into();
        } else {
            job.status = JobStatus::Dead;
        }
        Ok(job.clone())
    }

    async fn defer(&self, id: Uuid, delay: chrono::Duration) -> Result<(), RepositoryError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        job.status = JobStatus::Pending;
        job.next_run_at = (Utc::now() + delay).into();
        job.locked_at = None;
        job.locked_by = None;
        job.updated_at = Utc::now().into();
        Ok(())
    }

    async fn reclaim_stale_locks(&self, timeout: chrono::Duration) -> Result<u64, RepositoryError> {
        let threshold: DateTime<FixedOffset> = (Utc::now() - timeout).into();
        let now: DateTime<FixedOffset> = Utc::now().into();
        let mut jobs = self.jobs.lock().unwrap();

        let mut reclaimed = 0;
        for job in jobs.values_mut() {
            let stale = job.status == JobStatus::Locked
                && job.locked_at.is_some_and(|locked_at| locked_at <= threshold);
            if !stale {
                continue;
            }

            job.attempt_count += 1;
            job.locked_at = None;
            job.locked_by = None;
            job.last_error = Some("lock expired: worker presumed crashed".to_string());
            job.status = if job.can_retry() {
                job.next_run_at = now;
                JobStatus::Pending
            } else {
                JobStatus::Dead
            };
            job.updated_at = now;
            reclaimed += 1;
        }
        Ok(reclaimed)
    }

    async fn mark_failed(&self, id: Uuid) -> Result<(), RepositoryError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        if job.status != JobStatus::Pending {
            return Err(RepositoryError::NotFound);
        }
        job.status = JobStatus::Failed;
        job.updated_at = Utc::now().into();
        Ok(())
    }

    async fn pending_depth(&self, queue: QueueFamily) -> Result<u64, RepositoryError> {
        let jobs = self.jobs.lock().unwrap();
        Ok(jobs
            .values()
            .filter(|job| job.queue == queue && job.status == JobStatus::Pending)
            .count() as u64)
    }

    async fn dead_letters(&self, limit: u64) -> Result<Vec<Job>, RepositoryError> {
        let jobs = self.jobs.lock().unwrap();
        let mut dead: Vec<Job> = jobs
            .values()
            .filter(|job| job.status == JobStatus::Dead)
            .cloned()
            .collect();
        dead.sort_by_key(|job| std::cmp::Reverse(job.updated_at));
        dead.truncate(limit as usize);
        Ok(dead)
    }
}
