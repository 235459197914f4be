// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{Duration, Utc};
use portalq::application::usecases::enqueue_job::EnqueueJobUseCase;
use portalq::application::usecases::requeue_dead::{RequeueDeadUseCase, RequeueError};
use portalq::domain::models::job::{JobStatus, JobType, QueueFamily};
use portalq::domain::repositories::job_repository::JobRepository;
use portalq::infrastructure::repositories::job_repo_impl::JobRepositoryImpl;
use portalq::queue::job_queue::{JobQueue, PostgresJobQueue};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use super::helpers::create_test_db;

fn build_usecases(
    repo: Arc<JobRepositoryImpl>,
) -> (EnqueueJobUseCase, RequeueDeadUseCase<JobRepositoryImpl>) {
    let queue: Arc<dyn JobQueue> = Arc::new(PostgresJobQueue::new(repo.clone()));
    (
        EnqueueJobUseCase::new(queue.clone()),
        RequeueDeadUseCase::new(repo, queue),
    )
}

#[tokio::test]
async fn test_enqueue_creates_pending_row_with_delay() {
    let (db, _guard) = create_test_db().await;
    let repo = Arc::new(JobRepositoryImpl::new(db));
    let (enqueue, _) = build_usecases(repo.clone());

    let job_id = enqueue
        .enqueue(
            QueueFamily::Bulk,
            JobType::EmailRelay,
            json!({"to": "member@example.com"}),
            5,
            Duration::minutes(10),
        )
        .await
        .unwrap();

    let job = repo.find_by_id(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.queue, QueueFamily::Bulk);
    assert_eq!(job.max_attempts, 5);
    assert_eq!(job.attempt_count, 0);
    let now: chrono::DateTime<chrono::FixedOffset> = Utc::now().into();
    assert!(job.next_run_at > now);

    assert_eq!(repo.pending_depth(QueueFamily::Bulk).await.unwrap(), 1);
}

#[tokio::test]
async fn test_requeue_dead_inserts_fresh_pending_row() {
    let (db, _guard) = create_test_db().await;
    let repo = Arc::new(JobRepositoryImpl::new(db));
    let (enqueue, requeue) = build_usecases(repo.clone());

    let job_id = enqueue
        .enqueue(
            QueueFamily::Default,
            JobType::AiTag,
            json!({"listing_id": Uuid::new_v4(), "title": "lamp"}),
            3,
            Duration::zero(),
        )
        .await
        .unwrap();
    repo.resolve_failure(job_id, "malformed payload", false)
        .await
        .unwrap();

    let dead = requeue.list(10).await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].id, job_id);

    let replacement = requeue.requeue(job_id).await.unwrap();
    assert_ne!(replacement.id, job_id);
    assert_eq!(replacement.status, JobStatus::Pending);
    assert_eq!(replacement.attempt_count, 0);
    assert_eq!(replacement.queue, QueueFamily::Default);

    // 原死信行原样保留
    let original = repo.find_by_id(job_id).await.unwrap().unwrap();
    assert_eq!(original.status, JobStatus::Dead);
}

#[tokio::test]
async fn test_requeue_rejects_jobs_that_are_not_dead() {
    let (db, _guard) = create_test_db().await;
    let repo = Arc::new(JobRepositoryImpl::new(db));
    let (enqueue, requeue) = build_usecases(repo.clone());

    let job_id = enqueue
        .enqueue(
            QueueFamily::Default,
            JobType::FeedRefresh,
            json!({"feed_url": "https://example.com"}),
            3,
            Duration::zero(),
        )
        .await
        .unwrap();

    let result = requeue.requeue(job_id).await;
    assert!(matches!(result, Err(RequeueError::NotDead(id)) if id == job_id));
}
