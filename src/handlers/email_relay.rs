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

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;
use tracing::{info, instrument};

use crate::domain::models::job::JobType;
use crate::handlers::traits::{HandlerError, JobHandler, JobOutcome};

/// 邮件消息负载
#[derive(Debug, Deserialize)]
struct EmailMessage {
    to: String,
    subject: String,
    body: String,
}

/// 邮件转发处理器
///
/// 将站内通知邮件投递给外部中转服务。投递带HMAC-SHA256
/// 签名头，中转服务据此校验来源。
pub struct EmailRelayHandler {
    client: reqwest::Client,
    endpoint: String,
    secret: String,
}

impl EmailRelayHandler {
    /// 创建新的邮件转发处理器实例
    ///
    /// # 参数
    ///
    /// * `endpoint` - 中转服务端点URL
    /// * `secret` - 投递签名密钥
    pub fn new(endpoint: String, secret: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            secret,
        }
    }

    /// 计算负载的十六进制HMAC-SHA256签名
    pub fn sign(secret: &str, payload: &str) -> String {
        type HmacSha256 = Hmac<Sha256>;
        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

#[async_trait]
impl JobHandler for EmailRelayHandler {
    fn job_type(&self) -> JobType {
        JobType::EmailRelay
    }

    #[instrument(skip(self, payload))]
    async fn execute(&self, payload: &serde_json::Value) -> Result<JobOutcome, HandlerError> {
        let message: EmailMessage = serde_json::from_value(payload.clone())
            .map_err(|e| HandlerError::Permanent(format!("invalid email payload: {}", e)))?;

        let body = payload.to_string();
        let signature = Self::sign(&self.secret, &body);

        let response = self
            .client
            .post(&self.endpoint)
            .header("X-Portalq-Signature", signature)
            .header("X-Portalq-Event", "email.relay")
            .json(payload)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(HandlerError::from_http)?;

        let status = response.status();
        if status.is_success() {
            info!(to = %message.to, subject = %message.subject, "Email relayed");
            metrics::counter!("email_relay_delivered_total").increment(1);
            return Ok(JobOutcome::Completed);
        }

        if status.as_u16() == 429 || status.is_server_error() {
            Err(HandlerError::Transient(format!(
                "relay endpoint returned {}",
                status
            )))
        } else {
            Err(HandlerError::Permanent(format!(
                "relay endpoint returned {}",
                status
            )))
        }
    }
}
