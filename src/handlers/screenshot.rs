// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{info, instrument};
use url::Url;
use uuid::Uuid;

use crate::domain::models::job::JobType;
use crate::domain::repositories::storage_repository::StorageRepository;
use crate::handlers::traits::{HandlerError, JobHandler, JobOutcome};

// Global browser instance to avoid re-launching Chrome on every capture.
// This significantly improves performance for screenshot jobs.
static BROWSER_INSTANCE: OnceCell<Browser> = OnceCell::const_new();

// Asynchronously gets or initializes the shared browser instance.
// This function ensures that the browser is launched only once.
pub async fn get_browser() -> Result<&'static Browser, HandlerError> {
    BROWSER_INSTANCE
        .get_or_try_init(|| async {
            let remote_debugging_url = std::env::var("CHROMIUM_REMOTE_DEBUGGING_URL").ok();

            let (browser, mut handler) = if let Some(ref url) = remote_debugging_url {
                tracing::info!("Connecting to remote Chrome instance at: {}", url);
                Browser::connect(url).await.map_err(|e| {
                    HandlerError::Transient(format!("Failed to connect to remote Chrome: {}", e))
                })?
            } else {
                let mut builder = BrowserConfig::builder()
                    .no_sandbox()
                    .request_timeout(Duration::from_secs(30));

                builder = builder.arg("--disable-gpu").arg("--disable-dev-shm-usage");

                Browser::launch(
                    builder
                        .build()
                        .map_err(|e| HandlerError::Transient(e.to_string()))?,
                )
                .await
                .map_err(|e| HandlerError::Transient(e.to_string()))?
            };

            // Spawn a handler to process browser events
            tokio::spawn(async move {
                while let Some(h) = handler.next().await {
                    if h.is_err() {
                        break;
                    }
                }
            });

            Ok(browser)
        })
        .await
}

/// 截图负载
#[derive(Debug, Deserialize)]
struct ScreenshotPayload {
    /// 目标页面URL
    url: String,
    /// 是否全页截图
    #[serde(default)]
    full_page: bool,
    /// 图片格式 (png, jpeg)
    format: Option<String>,
}

/// 截图处理器
///
/// 基于chromiumoxide的无头浏览器为收录链接生成页面截图。
/// 浏览器是昂贵的外部资源：并发由调度器持有的许可池限制，
/// 处理器本身只负责导航、捕获和落盘。
pub struct ScreenshotHandler {
    storage: Arc<dyn StorageRepository>,
    capture_timeout: Duration,
}

impl ScreenshotHandler {
    /// 创建新的截图处理器实例
    ///
    /// # 参数
    ///
    /// * `storage` - 截图文件的存储仓库
    /// * `capture_timeout` - 单次捕获的超时时间
    pub fn new(storage: Arc<dyn StorageRepository>, capture_timeout: Duration) -> Self {
        Self {
            storage,
            capture_timeout,
        }
    }
}

#[async_trait]
impl JobHandler for ScreenshotHandler {
    fn job_type(&self) -> JobType {
        JobType::ScreenshotCapture
    }

    #[instrument(skip(self, payload))]
    async fn execute(&self, payload: &serde_json::Value) -> Result<JobOutcome, HandlerError> {
        let payload: ScreenshotPayload = serde_json::from_value(payload.clone())
            .map_err(|e| HandlerError::Permanent(format!("invalid screenshot payload: {}", e)))?;

        Url::parse(&payload.url)
            .map_err(|e| HandlerError::Permanent(format!("invalid page url: {}", e)))?;

        let (format, extension) = match payload.format.as_deref() {
            Some("jpeg") => (CaptureScreenshotFormat::Jpeg, "jpg"),
            _ => (CaptureScreenshotFormat::Png, "png"),
        };

        // Wrap the navigate-and-capture sequence in a timeout; a hung page
        // must not hold the dispatcher's permit indefinitely.
        let bytes = tokio::time::timeout(self.capture_timeout, async {
            let browser = get_browser().await?;

            let page = browser
                .new_page("about:blank")
                .await
                .map_err(|e| HandlerError::Transient(e.to_string()))?;

            // goto waits for the load event by default
            page.goto(&payload.url)
                .await
                .map_err(|e| HandlerError::Transient(e.to_string()))?;

            let params = chromiumoxide::page::ScreenshotParams::builder()
                .format(format)
                .full_page(payload.full_page)
                .build();

            let bytes = page
                .screenshot(params)
                .await
                .map_err(|e| HandlerError::Transient(e.to_string()))?;

            let _ = page.close().await;

            Ok::<Vec<u8>, HandlerError>(bytes)
        })
        .await
        .map_err(|_| HandlerError::Transient("screenshot capture timed out".to_string()))??;

        let key = format!("screenshots/{}.{}", Uuid::new_v4(), extension);
        self.storage
            .save(&key, &bytes)
            .await
            .map_err(|e| HandlerError::Transient(e.to_string()))?;

        info!(url = %payload.url, key = %key, bytes = bytes.len(), "Screenshot captured");
        metrics::histogram!("screenshot_bytes").record(bytes.len() as f64);

        Ok(JobOutcome::Completed)
    }
}
