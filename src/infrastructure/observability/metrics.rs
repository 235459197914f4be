// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::{describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use std::time::Duration;
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};
use tracing::{error, warn};

use crate::domain::repositories::cost_ledger_repository::CostLedgerRepository;
use crate::domain::repositories::job_repository::JobRepository;
use crate::queue::permit_pool::PermitPools;
use crate::queue::registry::QueueRegistry;

/// 初始化指标系统
///
/// 配置并注册应用所需的各类监控指标
pub fn init_metrics() {
    let builder = PrometheusBuilder::new();
    builder
        .install()
        .expect("failed to install Prometheus recorder");

    // Register metrics
    describe_gauge!("system_cpu_usage_ratio", "Current CPU usage ratio (0.0 to 1.0)");
    describe_gauge!("system_memory_usage_ratio", "Current memory usage ratio (0.0 to 1.0)");
    describe_gauge!("job_queue_depth", "Pending jobs per queue family");
    describe_gauge!(
        "screenshot_permits_available",
        "Free permits in the screenshot capture pool"
    );
    describe_gauge!(
        "ai_spend_ratio",
        "Month-to-date AI spend as a fraction of the monthly ceiling"
    );
    describe_counter!("jobs_succeeded_total", "Jobs resolved as succeeded, per type");
    describe_counter!(
        "jobs_retried_total",
        "Failed job executions rescheduled for retry, per type"
    );
    describe_counter!("jobs_dead_total", "Jobs moved to the dead letter state, per type");
    describe_counter!(
        "jobs_reclaimed_total",
        "Stale locked jobs recovered by the reclaimer"
    );
    describe_counter!(
        "cost_ledger_append_failed_total",
        "Cost ledger writes that failed after a completed AI call"
    );
    describe_counter!("email_relay_delivered_total", "Emails accepted by the relay endpoint");
    describe_histogram!("job_duration_seconds", "Handler execution time per job type");
    describe_histogram!("feed_refresh_items", "Items extracted per feed refresh");
    describe_histogram!("screenshot_bytes", "Captured screenshot size in bytes");
}

/// 启动系统与队列指标采样任务
///
/// 周期性刷新系统CPU/内存占用，以及各队列深度、截图许可
/// 余量和当月AI支出比例。深度读取失败只告警不中断采样。
pub fn spawn_gauge_sampler(
    repository: Arc<dyn JobRepository>,
    pools: PermitPools,
    ledger: Arc<dyn CostLedgerRepository>,
    monthly_ceiling_cents: i64,
) -> tokio::task::JoinHandle<()> {
    let mut sys = System::new_with_specifics(
        RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::everything())
            .with_memory(MemoryRefreshKind::everything()),
    );

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        loop {
            interval.tick().await;

            update_system_metrics(&mut sys);

            for spec in QueueRegistry::in_priority_order() {
                match repository.pending_depth(spec.family).await {
                    Ok(depth) => {
                        gauge!("job_queue_depth", "queue" => spec.family.to_string())
                            .set(depth as f64);
                    }
                    Err(e) => warn!("Failed to read depth for queue {}: {}", spec.family, e),
                }

                if let Some(pool) = pools.pool(spec.family) {
                    gauge!("screenshot_permits_available").set(pool.available() as f64);
                }
            }

            match ledger.month_to_date(chrono::Utc::now()).await {
                Ok(spent) => {
                    if monthly_ceiling_cents > 0 {
                        gauge!("ai_spend_ratio")
                            .set(spent as f64 / monthly_ceiling_cents as f64);
                    }
                }
                Err(e) => warn!("Failed to read month-to-date spend: {}", e),
            }
        }
    })
}

fn update_system_metrics(sys: &mut System) {
    sys.refresh_cpu_all();
    sys.refresh_memory();

    let cpu_usage = sys.global_cpu_usage() / 100.0;
    gauge!("system_cpu_usage_ratio").set(cpu_usage as f64);

    // Alerting logic
    if cpu_usage > 0.9 {
        error!("CRITICAL: System CPU usage is extremely high: {:.2}%", cpu_usage * 100.0);
    } else if cpu_usage > 0.8 {
        warn!("ALARM: System CPU usage is high: {:.2}%", cpu_usage * 100.0);
    }

    let total_mem = sys.total_memory();
    if total_mem > 0 {
        let used_mem = sys.used_memory();
        let mem_usage = used_mem as f64 / total_mem as f64;
        gauge!("system_memory_usage_ratio").set(mem_usage);

        if mem_usage > 0.9 {
            error!("CRITICAL: System memory usage is extremely high: {:.2}%", mem_usage * 100.0);
        } else if mem_usage > 0.8 {
            warn!("ALARM: System memory usage is high: {:.2}%", mem_usage * 100.0);
        }
    }
}
