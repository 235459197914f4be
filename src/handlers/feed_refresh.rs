// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, instrument};
use url::Url;

use crate::domain::models::job::JobType;
use crate::handlers::traits::{HandlerError, JobHandler, JobOutcome};

/// 单次信息流抓取的条目数上限
const MAX_ITEMS: usize = 50;

/// 信息流刷新负载
#[derive(Debug, Deserialize)]
struct FeedRefreshPayload {
    /// 订阅源URL
    feed_url: String,
    /// 所属会员，用于日志关联
    member_id: Option<uuid::Uuid>,
}

/// 抓取到的信息流条目
#[derive(Debug)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
}

/// 信息流刷新处理器
///
/// 抓取会员首页订阅源并提取条目链接。条目的入库由
/// 门户的实体层负责，不属于调度核心。
pub struct FeedRefreshHandler {
    client: reqwest::Client,
    timeout: Duration,
}

impl FeedRefreshHandler {
    /// 创建新的信息流刷新处理器实例
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    /// 从HTML文档中提取条目链接
    ///
    /// # 参数
    ///
    /// * `html` - 订阅源页面内容
    ///
    /// # 返回值
    ///
    /// 返回提取到的条目列表，最多MAX_ITEMS条
    fn extract_items(html: &str) -> Vec<FeedItem> {
        let document = Html::parse_document(html);
        // 选择器在编译期是常量字符串，解析失败属于编程错误
        let selector = Selector::parse("a[href]").expect("static selector parses");

        document
            .select(&selector)
            .filter_map(|element| {
                let link = element.value().attr("href")?;
                let title = element.text().collect::<String>().trim().to_string();
                if title.is_empty() {
                    return None;
                }
                Some(FeedItem {
                    title,
                    link: link.to_string(),
                })
            })
            .take(MAX_ITEMS)
            .collect()
    }
}

#[async_trait]
impl JobHandler for FeedRefreshHandler {
    fn job_type(&self) -> JobType {
        JobType::FeedRefresh
    }

    #[instrument(skip(self, payload))]
    async fn execute(&self, payload: &serde_json::Value) -> Result<JobOutcome, HandlerError> {
        let payload: FeedRefreshPayload = serde_json::from_value(payload.clone())
            .map_err(|e| HandlerError::Permanent(format!("invalid feed payload: {}", e)))?;

        // 格式非法的URL重试也不会变好
        let url = Url::parse(&payload.feed_url)
            .map_err(|e| HandlerError::Permanent(format!("invalid feed url: {}", e)))?;

        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(HandlerError::from_http)?;

        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(HandlerError::Transient(format!(
                "feed source returned {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(HandlerError::Permanent(format!(
                "feed source returned {}",
                status
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| HandlerError::Transient(e.to_string()))?;

        let items = Self::extract_items(&body);
        metrics::histogram!("feed_refresh_items").record(items.len() as f64);
        info!(
            member_id = ?payload.member_id,
            items = items.len(),
            "Feed refreshed"
        );

        Ok(JobOutcome::Completed)
    }
}
