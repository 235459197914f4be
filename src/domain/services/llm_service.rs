// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::env;

use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[async_trait]
pub trait LlmServiceTrait: Send + Sync {
    async fn suggest_tags(
        &self,
        text: &str,
        model: &str,
        max_tags: usize,
    ) -> Result<(Vec<String>, TokenUsage)>;
}

/// LLM服务 - 处理与LLM提供商的交互
///
/// # 功能
///
/// 为分类信息条目生成标签建议，返回标签列表和令牌用量，
/// 用量由调用方折算成本并写入成本台账
///
/// # 配置
///
/// 通过环境变量进行配置：
/// - `LLM_API_KEY` - LLM API密钥
/// - `LLM_API_BASE_URL` - LLM API基础URL
pub struct LlmService {
    api_key: Option<String>,
    api_base_url: String,
    client: reqwest::Client,
}

#[async_trait]
impl LlmServiceTrait for LlmService {
    async fn suggest_tags(
        &self,
        text: &str,
        model: &str,
        max_tags: usize,
    ) -> Result<(Vec<String>, TokenUsage)> {
        LlmService::suggest_tags(self, text, model, max_tags).await
    }
}

impl Default for LlmService {
    fn default() -> Self {
        Self::new()
    }
}

impl LlmService {
    pub fn new() -> Self {
        Self {
            api_key: env::var("LLM_API_KEY").ok(),
            api_base_url: env::var("LLM_API_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            client: reqwest::Client::new(),
        }
    }

    pub fn new_with_config(api_key: String, api_base_url: String) -> Self {
        Self {
            api_key: Some(api_key),
            api_base_url,
            client: reqwest::Client::new(),
        }
    }

    /// 使用LLM为文本生成标签建议
    ///
    /// # 参数
    /// * `text` - 条目文本（标题加描述）
    /// * `model` - 模型名称，由治理状态决定使用完整模型还是低成本模型
    /// * `max_tags` - 最多返回的标签数量
    ///
    /// # 返回值
    /// * `Result<(Vec<String>, TokenUsage)>` - 标签列表和令牌使用情况
    ///
    /// # 错误
    /// * 当LLM API密钥未配置时返回错误
    /// * 当LLM服务调用失败时返回错误
    pub async fn suggest_tags(
        &self,
        text: &str,
        model: &str,
        max_tags: usize,
    ) -> Result<(Vec<String>, TokenUsage)> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("LLM API key not configured"))?;

        // Truncate text to avoid token limits (simplified)
        let truncated_text = if text.len() > 4000 { &text[..4000] } else { text };

        let prompt = format!(
            "Suggest at most {} short topical tags for the following classified listing. \
            Return ONLY a JSON array of lowercase strings, no markdown formatting. \
            Listing: {}",
            max_tags, truncated_text
        );

        let request_body = json!({
            "model": model,
            "messages": [
                {
                    "role": "system",
                    "content": "You are a tagging assistant for a classifieds marketplace. You output only valid JSON."
                },
                {
                    "role": "user",
                    "content": prompt
                }
            ],
            "temperature": 0.0
        });

        let url = format!("{}/chat/completions", self.api_base_url);
        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&request_body)
            .send()
            .await
            .context("Failed to send request to LLM API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "LLM API returned error: {} - {}",
                status,
                error_text
            ));
        }

        let body: Value = response
            .json()
            .await
            .context("Failed to parse LLM API response")?;

        let usage = if let Some(usage_val) = body.get("usage") {
            TokenUsage {
                prompt_tokens: usage_val["prompt_tokens"].as_u64().unwrap_or(0) as u32,
                completion_tokens: usage_val["completion_tokens"].as_u64().unwrap_or(0) as u32,
                total_tokens: usage_val["total_tokens"].as_u64().unwrap_or(0) as u32,
            }
        } else {
            TokenUsage::default()
        };

        if let Some(content) = body["choices"][0]["message"]["content"].as_str() {
            // Clean up potential markdown code blocks
            let clean_content = content
                .trim()
                .trim_start_matches("```json")
                .trim_start_matches("```")
                .trim_end_matches("```");

            let tags = serde_json::from_str::<Vec<String>>(clean_content)
                .context("Failed to parse suggested tags JSON")?;
            Ok((tags.into_iter().take(max_tags).collect(), usage))
        } else {
            Err(anyhow::anyhow!("Invalid response format from LLM API"))
        }
    }
}
