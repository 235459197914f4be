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

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// 应用程序配置设置
///
/// 包含数据库、Worker、截图、预算治理和外部服务等所有配置项
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// 数据库配置
    pub database: DatabaseSettings,
    /// Worker配置
    pub worker: WorkerSettings,
    /// 截图配置
    pub screenshot: ScreenshotSettings,
    /// 预算治理配置
    pub budget: BudgetSettings,
    /// LLM配置
    pub llm: LlmSettings,
    /// 邮件中转配置
    pub relay: RelaySettings,
}

/// 数据库配置设置
#[derive(Debug, Deserialize)]
pub struct DatabaseSettings {
    /// 数据库连接URL
    pub url: String,
    /// 最大连接数
    pub max_connections: Option<u32>,
    /// 最小连接数
    pub min_connections: Option<u32>,
    /// 连接超时时间（秒）
    pub connect_timeout: Option<u64>,
    /// 空闲连接超时时间（秒）
    pub idle_timeout: Option<u64>,
}

/// Worker配置设置
#[derive(Debug, Deserialize)]
pub struct WorkerSettings {
    /// 调度Worker数量
    pub count: usize,
    /// 空轮询休眠间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 存储故障后的退避时间（毫秒）
    pub error_backoff_ms: u64,
    /// 锁定超时（秒），超过后锁定被视为遗弃
    /// 取截图作业p99时延的约2倍
    pub lock_timeout_secs: u64,
    /// 锁回收器的运行间隔（秒）
    pub reclaim_interval_secs: u64,
}

/// 截图配置设置
#[derive(Debug, Deserialize)]
pub struct ScreenshotSettings {
    /// 截图队列的并发许可数
    pub permits: usize,
    /// 截图文件的本地存储路径
    pub storage_path: String,
    /// 单次捕获的超时时间（秒）
    pub capture_timeout_secs: u64,
}

/// 预算治理配置设置
#[derive(Debug, Deserialize)]
pub struct BudgetSettings {
    /// 月度AI支出上限（美分）
    pub monthly_ceiling_cents: i64,
    /// 治理排队状态下的延迟执行时间（秒）
    pub defer_delay_secs: i64,
}

/// LLM配置设置
#[derive(Debug, Deserialize)]
pub struct LlmSettings {
    /// 完整模型名称
    pub model: String,
    /// 降级模型名称，治理Reduce状态下使用
    pub reduced_model: String,
    /// 完整模型单价（美分/百万token）
    pub cost_per_mtok_cents: i64,
    /// 降级模型单价（美分/百万token）
    pub reduced_cost_per_mtok_cents: i64,
    /// 正常状态下的标签批量
    pub full_batch: usize,
    /// 降级状态下的标签批量
    pub reduced_batch: usize,
}

/// 邮件中转配置设置
#[derive(Debug, Deserialize)]
pub struct RelaySettings {
    /// 中转服务端点URL
    pub endpoint: String,
    /// 投递签名密钥
    pub secret: String,
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 从环境变量加载配置，支持默认值
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载的配置
    /// * `Err(ConfigError)` - 配置加载失败
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        let builder = Config::builder()
            // Default DB pool settings
            .set_default("database.max_connections", 50)?
            .set_default("database.min_connections", 5)?
            .set_default("database.connect_timeout", 10)?
            .set_default("database.idle_timeout", 300)?
            // Default Worker settings
            .set_default("worker.count", 4)?
            .set_default("worker.poll_interval_ms", 1000)?
            .set_default("worker.error_backoff_ms", 2000)?
            .set_default("worker.lock_timeout_secs", 600)?
            .set_default("worker.reclaim_interval_secs", 60)?
            // Default Screenshot settings
            .set_default("screenshot.permits", 3)?
            .set_default("screenshot.storage_path", "./storage/screenshots")?
            .set_default("screenshot.capture_timeout_secs", 30)?
            // Default Budget settings
            .set_default("budget.monthly_ceiling_cents", 50_000)?
            .set_default("budget.defer_delay_secs", 3600)?
            // Default LLM settings
            .set_default("llm.model", "gpt-4o")?
            .set_default("llm.reduced_model", "gpt-4o-mini")?
            .set_default("llm.cost_per_mtok_cents", 500)?
            .set_default("llm.reduced_cost_per_mtok_cents", 30)?
            .set_default("llm.full_batch", 10)?
            .set_default("llm.reduced_batch", 3)?
            // Default Relay settings
            .set_default("relay.endpoint", "http://localhost:8025/send")?
            .set_default("relay.secret", "your-secret-key")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("PORTALQ").separator("__"));

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
#[path = "settings_test.rs"]
mod tests;
