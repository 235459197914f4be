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
use std::time::Duration;
use thiserror::Error;

use crate::domain::models::job::JobType;

/// 处理器错误类型
///
/// 错误分类决定调度器的结算方式：瞬时错误按退避重试，
/// 永久错误直接进入死信，预算硬停带独立标记进入死信，
/// 便于运维在死信列表中区分治理拒绝和真实失败。
#[derive(Error, Debug)]
pub enum HandlerError {
    /// 瞬时失败（网络抖动、上游限流），可重试
    #[error("transient failure: {0}")]
    Transient(String),

    /// 永久失败（负载格式错误、资源不存在），不消耗剩余重试额度
    #[error("permanent failure: {0}")]
    Permanent(String),

    /// 预算硬停，策略结果而非缺陷；未发起任何AI调用
    #[error("budget: monthly AI spend ceiling reached")]
    BudgetExceeded,
}

impl HandlerError {
    /// 判断错误是否可重试
    ///
    /// # 返回值
    ///
    /// 仅瞬时失败返回true
    pub fn is_retryable(&self) -> bool {
        matches!(self, HandlerError::Transient(_))
    }

    /// 将reqwest错误按瞬时/永久归类
    pub fn from_http(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error()) {
            HandlerError::Transient(e.to_string())
        } else {
            HandlerError::Permanent(e.to_string())
        }
    }
}

/// 处理器执行结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// 执行完成，作业进入成功终态
    Completed,
    /// 延迟执行（治理排队），作业回到待执行且不消耗重试额度
    Deferred { delay: Duration },
}

/// 作业处理器特质
///
/// 每个处理器注册一种作业类型，是作业负载到执行结果的
/// 纯映射。准入控制和并发控制由调度器负责，处理器不感知
/// 队列和许可；回收重试意味着处理器必须幂等。
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// 处理器负责的作业类型
    fn job_type(&self) -> JobType;

    /// 执行作业
    async fn execute(&self, payload: &serde_json::Value) -> Result<JobOutcome, HandlerError>;
}
