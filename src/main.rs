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

use portalq::config::settings::Settings;
use portalq::domain::repositories::storage_repository::StorageRepository;
use portalq::domain::services::llm_service::{LlmService, LlmServiceTrait};
use portalq::handlers::ai_tagger::{AiTagConfig, AiTagHandler};
use portalq::handlers::email_relay::EmailRelayHandler;
use portalq::handlers::feed_refresh::FeedRefreshHandler;
use portalq::handlers::screenshot::ScreenshotHandler;
use portalq::handlers::HandlerRegistry;
use portalq::infrastructure::database::connection;
use portalq::infrastructure::observability::metrics;
use portalq::infrastructure::repositories::cost_ledger_repo_impl::CostLedgerRepositoryImpl;
use portalq::infrastructure::repositories::job_repo_impl::JobRepositoryImpl;
use portalq::infrastructure::storage::LocalStorage;
use portalq::queue::permit_pool::PermitPools;
use portalq::utils::telemetry;
use portalq::workers::manager::WorkerManager;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use migration::{Migrator, MigratorTrait};

/// 主函数
///
/// 应用程序入口点，负责初始化所有组件并启动Worker进程
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize logging
    telemetry::init_telemetry();
    info!("Starting portalq...");

    // Initialize Prometheus Metrics
    metrics::init_metrics();

    // 2. Load configuration
    let settings = Arc::new(Settings::new()?);
    info!("Configuration loaded");

    // 3. Connect to database
    let db = connection::create_pool(&settings.database).await?;
    let db = Arc::new(db);
    info!("Database connection established");

    // Run database migrations
    info!("Running database migrations...");
    Migrator::up(db.as_ref(), None).await?;
    info!("Database migrations applied");

    // 4. Initialize job store and permit pools
    let job_repo = Arc::new(JobRepositoryImpl::new(db.clone()));
    let ledger_repo = Arc::new(CostLedgerRepositoryImpl::new(db.clone()));
    let permits = PermitPools::new(settings.screenshot.permits);

    // 5. Register handlers
    let storage: Arc<dyn StorageRepository> =
        Arc::new(LocalStorage::new(settings.screenshot.storage_path.clone()));
    let llm: Arc<dyn LlmServiceTrait> = Arc::new(LlmService::new());

    let mut handlers = HandlerRegistry::new();
    handlers.register(Arc::new(FeedRefreshHandler::new(Duration::from_secs(30))));
    handlers.register(Arc::new(AiTagHandler::new(
        llm,
        ledger_repo.clone(),
        AiTagConfig {
            model: settings.llm.model.clone(),
            reduced_model: settings.llm.reduced_model.clone(),
            cost_per_mtok_cents: settings.llm.cost_per_mtok_cents,
            reduced_cost_per_mtok_cents: settings.llm.reduced_cost_per_mtok_cents,
            full_batch: settings.llm.full_batch,
            reduced_batch: settings.llm.reduced_batch,
            monthly_ceiling_cents: settings.budget.monthly_ceiling_cents,
            defer_delay: Duration::from_secs(settings.budget.defer_delay_secs.max(0) as u64),
        },
    )));
    handlers.register(Arc::new(ScreenshotHandler::new(
        storage,
        Duration::from_secs(settings.screenshot.capture_timeout_secs),
    )));
    handlers.register(Arc::new(EmailRelayHandler::new(
        settings.relay.endpoint.clone(),
        settings.relay.secret.clone(),
    )));
    let handlers = Arc::new(handlers);
    info!("{} job handlers registered", handlers.len());

    // 6. Start gauge sampler
    metrics::spawn_gauge_sampler(
        job_repo.clone(),
        permits.clone(),
        ledger_repo.clone(),
        settings.budget.monthly_ceiling_cents,
    );

    // 7. Start Workers
    let mut worker_manager = WorkerManager::new(
        job_repo.clone(),
        handlers,
        permits,
        Duration::from_millis(settings.worker.poll_interval_ms),
        Duration::from_millis(settings.worker.error_backoff_ms),
    );
    worker_manager
        .start_workers(settings.worker.count)
        .await;
    worker_manager.start_reclaimer(
        Duration::from_secs(settings.worker.reclaim_interval_secs),
        chrono::Duration::seconds(settings.worker.lock_timeout_secs as i64),
    );
    info!("{} dispatch workers and reclaimer started", settings.worker.count);

    // 8. Run until shutdown
    worker_manager.wait_for_shutdown().await;

    Ok(())
}
