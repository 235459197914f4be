// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{Duration, Utc};
use portalq::domain::models::cost_ledger::CostLedgerEntry;
use portalq::domain::models::job::{Job, JobStatus, JobType, QueueFamily};
use portalq::domain::repositories::cost_ledger_repository::CostLedgerRepository;
use portalq::domain::repositories::job_repository::JobRepository;
use portalq::infrastructure::repositories::cost_ledger_repo_impl::CostLedgerRepositoryImpl;
use portalq::infrastructure::repositories::job_repo_impl::JobRepositoryImpl;
use portalq::utils::retry_policy::RetryPolicy;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use super::helpers::create_test_db;

fn pending_job(queue: QueueFamily, job_type: JobType) -> Job {
    Job::new(queue, job_type, json!({}))
}

#[tokio::test]
async fn test_claim_orders_by_priority_then_age() {
    let (db, _guard) = create_test_db().await;
    let repo = JobRepositoryImpl::new(db);
    let worker = Uuid::new_v4();

    let past = Utc::now() - Duration::minutes(5);

    let mut bulk = pending_job(QueueFamily::Bulk, JobType::EmailRelay);
    bulk.next_run_at = past.into();
    let mut high_old = pending_job(QueueFamily::High, JobType::EmailRelay);
    high_old.next_run_at = (past - Duration::minutes(1)).into();
    let mut high_new = pending_job(QueueFamily::High, JobType::EmailRelay);
    high_new.next_run_at = past.into();

    repo.create(&bulk).await.unwrap();
    repo.create(&high_new).await.unwrap();
    repo.create(&high_old).await.unwrap();

    let all = [
        QueueFamily::High,
        QueueFamily::Default,
        QueueFamily::Low,
        QueueFamily::Bulk,
        QueueFamily::Screenshot,
    ];

    // 高优先级队列先于批量队列；同队列内按next_run_at近似FIFO
    let first = repo.claim_next(worker, &all).await.unwrap().unwrap();
    assert_eq!(first.id, high_old.id);
    let second = repo.claim_next(worker, &all).await.unwrap().unwrap();
    assert_eq!(second.id, high_new.id);
    let third = repo.claim_next(worker, &all).await.unwrap().unwrap();
    assert_eq!(third.id, bulk.id);
    assert!(repo.claim_next(worker, &all).await.unwrap().is_none());
}

#[tokio::test]
async fn test_claim_sets_lock_fields() {
    let (db, _guard) = create_test_db().await;
    let repo = JobRepositoryImpl::new(db);
    let worker = Uuid::new_v4();

    let job = pending_job(QueueFamily::Default, JobType::FeedRefresh);
    repo.create(&job).await.unwrap();

    let claimed = repo
        .claim_next(worker, &[QueueFamily::Default])
        .await
        .unwrap()
        .unwrap();

    assert_eq!(claimed.status, JobStatus::Locked);
    assert_eq!(claimed.locked_by, Some(worker));
    assert!(claimed.locked_at.is_some());
}

#[tokio::test]
async fn test_concurrent_claims_yield_exactly_one_winner() {
    let (db, _guard) = create_test_db().await;
    let repo = Arc::new(JobRepositoryImpl::new(db));

    let job = pending_job(QueueFamily::Default, JobType::FeedRefresh);
    repo.create(&job).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let repo = repo.clone();
        handles.push(tokio::spawn(async move {
            repo.claim_next(Uuid::new_v4(), &[QueueFamily::Default])
                .await
                .unwrap()
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap().is_some() {
            winners += 1;
        }
    }

    assert_eq!(winners, 1, "exactly one concurrent claim may succeed");
}

#[tokio::test]
async fn test_claim_ignores_future_and_restricted_queues() {
    let (db, _guard) = create_test_db().await;
    let repo = JobRepositoryImpl::new(db);
    let worker = Uuid::new_v4();

    let mut future = pending_job(QueueFamily::Default, JobType::FeedRefresh);
    future.next_run_at = (Utc::now() + Duration::minutes(10)).into();
    repo.create(&future).await.unwrap();

    let screenshot = pending_job(QueueFamily::Screenshot, JobType::ScreenshotCapture);
    repo.create(&screenshot).await.unwrap();

    // 延迟作业未到期；截图队列不在本轮集合内
    let claimed = repo
        .claim_next(worker, &[QueueFamily::Default])
        .await
        .unwrap();
    assert!(claimed.is_none());

    // 空队列集合永远认领不到
    assert!(repo.claim_next(worker, &[]).await.unwrap().is_none());
}

#[tokio::test]
async fn test_resolve_success_clears_lock_and_error() {
    let (db, _guard) = create_test_db().await;
    let repo = JobRepositoryImpl::new(db);
    let worker = Uuid::new_v4();

    let mut job = pending_job(QueueFamily::Default, JobType::FeedRefresh);
    job.last_error = Some("previous failure".to_string());
    repo.create(&job).await.unwrap();

    let claimed = repo
        .claim_next(worker, &[QueueFamily::Default])
        .await
        .unwrap()
        .unwrap();
    repo.resolve_success(claimed.id).await.unwrap();

    let settled = repo.find_by_id(claimed.id).await.unwrap().unwrap();
    assert_eq!(settled.status, JobStatus::Succeeded);
    assert!(settled.locked_at.is_none());
    assert!(settled.locked_by.is_none());
    assert!(settled.last_error.is_none());
}

#[tokio::test]
async fn test_resolve_failure_retries_then_dies() {
    let (db, _guard) = create_test_db().await;
    let repo = JobRepositoryImpl::with_retry_policy(db, RetryPolicy::fast());

    let mut job = pending_job(QueueFamily::Default, JobType::AiTag);
    job.max_attempts = 2;
    repo.create(&job).await.unwrap();

    // 第一次失败：还有额度，回到待执行并带退避
    let after_first = repo.resolve_failure(job.id, "boom", true).await.unwrap();
    assert_eq!(after_first.status, JobStatus::Pending);
    assert_eq!(after_first.attempt_count, 1);
    assert_eq!(after_first.last_error.as_deref(), Some("boom"));
    let now: chrono::DateTime<chrono::FixedOffset> = Utc::now().into();
    assert!(after_first.next_run_at > now, "retry must be delayed by backoff");

    // 第二次失败：额度耗尽，进入死信
    let after_second = repo.resolve_failure(job.id, "boom again", true).await.unwrap();
    assert_eq!(after_second.status, JobStatus::Dead);
    assert_eq!(after_second.attempt_count, 2);
    assert_eq!(after_second.last_error.as_deref(), Some("boom again"));
}

#[tokio::test]
async fn test_non_retryable_failure_dies_with_attempts_remaining() {
    let (db, _guard) = create_test_db().await;
    let repo = JobRepositoryImpl::new(db);

    let job = pending_job(QueueFamily::Default, JobType::EmailRelay);
    repo.create(&job).await.unwrap();

    let settled = repo
        .resolve_failure(job.id, "malformed payload", false)
        .await
        .unwrap();

    assert_eq!(settled.status, JobStatus::Dead);
    assert_eq!(settled.attempt_count, 1);
}

#[tokio::test]
async fn test_defer_does_not_consume_attempts() {
    let (db, _guard) = create_test_db().await;
    let repo = JobRepositoryImpl::new(db);
    let worker = Uuid::new_v4();

    let job = pending_job(QueueFamily::Default, JobType::AiTag);
    repo.create(&job).await.unwrap();
    repo.claim_next(worker, &[QueueFamily::Default])
        .await
        .unwrap()
        .unwrap();

    repo.defer(job.id, Duration::hours(1)).await.unwrap();

    let deferred = repo.find_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(deferred.status, JobStatus::Pending);
    assert_eq!(deferred.attempt_count, 0);
    assert!(deferred.locked_at.is_none());

    // 延迟中的作业不可认领
    assert!(repo
        .claim_next(worker, &[QueueFamily::Default])
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_reclaim_resets_stale_locks_only() {
    let (db, _guard) = create_test_db().await;
    let repo = JobRepositoryImpl::new(db);
    let worker = Uuid::new_v4();
    let stale_time = Utc::now() - Duration::minutes(20);

    // 过期锁定，额度未耗尽：应回到待执行
    let mut stale = pending_job(QueueFamily::Default, JobType::FeedRefresh);
    stale.status = JobStatus::Locked;
    stale.locked_at = Some(stale_time.into());
    stale.locked_by = Some(worker);
    repo.create(&stale).await.unwrap();

    // 过期锁定，下一次执行即超额：应进入死信
    let mut exhausted = pending_job(QueueFamily::Default, JobType::FeedRefresh);
    exhausted.status = JobStatus::Locked;
    exhausted.locked_at = Some(stale_time.into());
    exhausted.locked_by = Some(worker);
    exhausted.attempt_count = 2;
    exhausted.max_attempts = 3;
    repo.create(&exhausted).await.unwrap();

    // 窗口内的锁定不能被动
    let mut fresh = pending_job(QueueFamily::Default, JobType::FeedRefresh);
    fresh.status = JobStatus::Locked;
    fresh.locked_at = Some(Utc::now().into());
    fresh.locked_by = Some(worker);
    repo.create(&fresh).await.unwrap();

    let reclaimed = repo
        .reclaim_stale_locks(Duration::minutes(10))
        .await
        .unwrap();
    assert_eq!(reclaimed, 2);

    let stale = repo.find_by_id(stale.id).await.unwrap().unwrap();
    assert_eq!(stale.status, JobStatus::Pending);
    assert_eq!(stale.attempt_count, 1);
    assert!(stale.locked_at.is_none());

    let exhausted = repo.find_by_id(exhausted.id).await.unwrap().unwrap();
    assert_eq!(exhausted.status, JobStatus::Dead);
    assert_eq!(exhausted.attempt_count, 3);

    let fresh = repo.find_by_id(fresh.id).await.unwrap().unwrap();
    assert_eq!(fresh.status, JobStatus::Locked);
    assert!(fresh.locked_at.is_some());

    // 回收后的作业立即可被重新认领
    let reclaimed_job = repo
        .claim_next(worker, &[QueueFamily::Default])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reclaimed_job.id, stale.id);
}

#[tokio::test]
async fn test_mark_failed_cancels_only_pending_rows() {
    let (db, _guard) = create_test_db().await;
    let repo = JobRepositoryImpl::new(db);
    let worker = Uuid::new_v4();

    let cancellable = pending_job(QueueFamily::Low, JobType::EmailRelay);
    repo.create(&cancellable).await.unwrap();

    let running = pending_job(QueueFamily::Default, JobType::FeedRefresh);
    repo.create(&running).await.unwrap();
    repo.claim_next(worker, &[QueueFamily::Default])
        .await
        .unwrap()
        .unwrap();

    repo.mark_failed(cancellable.id).await.unwrap();
    assert_eq!(
        repo.find_by_id(cancellable.id).await.unwrap().unwrap().status,
        JobStatus::Failed
    );

    // 已被认领的行不可取消
    assert!(repo.mark_failed(running.id).await.is_err());
}

#[tokio::test]
async fn test_pending_depth_and_dead_letters() {
    let (db, _guard) = create_test_db().await;
    let repo = JobRepositoryImpl::new(db);

    for _ in 0..3 {
        repo.create(&pending_job(QueueFamily::Bulk, JobType::EmailRelay))
            .await
            .unwrap();
    }
    let doomed = pending_job(QueueFamily::Bulk, JobType::EmailRelay);
    repo.create(&doomed).await.unwrap();
    repo.resolve_failure(doomed.id, "budget: monthly AI spend ceiling reached", false)
        .await
        .unwrap();

    assert_eq!(repo.pending_depth(QueueFamily::Bulk).await.unwrap(), 3);
    assert_eq!(repo.pending_depth(QueueFamily::High).await.unwrap(), 0);

    let dead = repo.dead_letters(10).await.unwrap();
    assert_eq!(dead.len(), 1);
    assert!(dead[0].last_error.as_deref().unwrap().starts_with("budget:"));
}

#[tokio::test]
async fn test_month_to_date_ignores_prior_months() {
    let (db, _guard) = create_test_db().await;
    let ledger = CostLedgerRepositoryImpl::new(db);

    let mut current = CostLedgerEntry::new(JobType::AiTag, "gpt-4o".to_string(), 900, 100, 40);
    current.created_at = Utc::now().into();
    ledger.append(&current).await.unwrap();

    let mut also_current = CostLedgerEntry::new(JobType::AiTag, "gpt-4o".to_string(), 90, 10, 5);
    also_current.created_at = Utc::now().into();
    ledger.append(&also_current).await.unwrap();

    let mut last_month = CostLedgerEntry::new(JobType::AiTag, "gpt-4o".to_string(), 900, 100, 999);
    last_month.created_at = (Utc::now() - Duration::days(45)).into();
    ledger.append(&last_month).await.unwrap();

    let spent = ledger.month_to_date(Utc::now()).await.unwrap();
    assert_eq!(spent, 45);
}

#[tokio::test]
async fn test_empty_ledger_sums_to_zero() {
    let (db, _guard) = create_test_db().await;
    let ledger = CostLedgerRepositoryImpl::new(db);

    assert_eq!(ledger.month_to_date(Utc::now()).await.unwrap(), 0);
}
