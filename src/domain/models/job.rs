// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// 作业实体
///
/// 表示系统中一个延迟执行的工作单元，如信息流刷新、
/// AI打标、网页截图或邮件转发等。作业具有队列归属、
/// 状态、重试机制和行级锁定机制等属性。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// 作业唯一标识符
    pub id: Uuid,
    /// 所属队列族，决定调度优先级和并发上限
    pub queue: QueueFamily,
    /// 作业类型，决定由哪个处理器执行
    pub job_type: JobType,
    /// 作业状态，跟踪作业在其生命周期中的当前阶段
    pub status: JobStatus,
    /// 作业负载数据，仅由匹配的处理器消费
    pub payload: serde_json::Value,
    /// 已消耗的执行次数
    pub attempt_count: i32,
    /// 最大执行次数，超过后作业进入死信状态
    pub max_attempts: i32,
    /// 最早可调度时间，支持延迟执行和退避重试
    pub next_run_at: DateTime<FixedOffset>,
    /// 锁定时间，Worker认领作业时写入
    pub locked_at: Option<DateTime<FixedOffset>>,
    /// 锁定者，认领作业的Worker标识
    pub locked_by: Option<Uuid>,
    /// 最近一次失败原因，成功时清除
    pub last_error: Option<String>,
    /// 创建时间
    pub created_at: DateTime<FixedOffset>,
    /// 更新时间
    pub updated_at: DateTime<FixedOffset>,
}

/// 队列族枚举
///
/// 定义了系统中固定的调度队列，每个队列有静态优先级。
/// 队列集合和优先级在运行期只读，调整需要重新部署。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueueFamily {
    /// 高优先级队列，面向用户可感知的即时任务
    High,
    /// 默认队列
    #[default]
    Default,
    /// 低优先级队列
    Low,
    /// 批量队列，面向大批量后台任务
    Bulk,
    /// 截图队列，唯一带硬并发上限的队列
    Screenshot,
}

impl fmt::Display for QueueFamily {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            QueueFamily::High => write!(f, "high"),
            QueueFamily::Default => write!(f, "default"),
            QueueFamily::Low => write!(f, "low"),
            QueueFamily::Bulk => write!(f, "bulk"),
            QueueFamily::Screenshot => write!(f, "screenshot"),
        }
    }
}

impl FromStr for QueueFamily {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(QueueFamily::High),
            "default" => Ok(QueueFamily::Default),
            "low" => Ok(QueueFamily::Low),
            "bulk" => Ok(QueueFamily::Bulk),
            "screenshot" => Ok(QueueFamily::Screenshot),
            _ => Err(()),
        }
    }
}

/// 作业类型枚举
///
/// 定义了系统中支持的作业种类，每种类型对应一个注册的
/// 处理器实现。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// 信息流刷新作业，抓取会员首页的订阅源
    #[default]
    FeedRefresh,
    /// AI打标作业，为分类信息条目生成标签
    AiTag,
    /// 截图作业，为收录链接生成页面截图
    ScreenshotCapture,
    /// 邮件转发作业，向站内信中转服务投递邮件
    EmailRelay,
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            JobType::FeedRefresh => write!(f, "feed_refresh"),
            JobType::AiTag => write!(f, "ai_tag"),
            JobType::ScreenshotCapture => write!(f, "screenshot_capture"),
            JobType::EmailRelay => write!(f, "email_relay"),
        }
    }
}

impl FromStr for JobType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "feed_refresh" => Ok(JobType::FeedRefresh),
            "ai_tag" => Ok(JobType::AiTag),
            "screenshot_capture" => Ok(JobType::ScreenshotCapture),
            "email_relay" => Ok(JobType::EmailRelay),
            _ => Err(()),
        }
    }
}

/// 作业状态枚举
///
/// 表示作业在其生命周期中的不同状态。
/// 状态转换遵循以下流程：
/// Pending → Locked → Succeeded/Pending(重试)/Dead
/// Failed 仅由运维界面取消待执行作业时写入
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// 待执行，作业已入队且可被认领
    #[default]
    Pending,
    /// 已锁定，作业正在被某个Worker执行
    Locked,
    /// 已成功，终态
    Succeeded,
    /// 已失败，运维取消的作业
    Failed,
    /// 死信，重试耗尽或被策略拒绝，终态
    Dead,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Locked => write!(f, "locked"),
            JobStatus::Succeeded => write!(f, "succeeded"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Dead => write!(f, "dead"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "locked" => Ok(JobStatus::Locked),
            "succeeded" => Ok(JobStatus::Succeeded),
            "failed" => Ok(JobStatus::Failed),
            "dead" => Ok(JobStatus::Dead),
            _ => Err(()),
        }
    }
}

/// 领域错误类型
#[derive(Error, Debug)]
pub enum DomainError {
    /// 无效的状态转换，当作业状态转换不符合生命周期规则时发生
    #[error("Invalid state transition")]
    InvalidStateTransition,

    /// 验证错误，当输入数据不符合领域规则时发生
    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl Job {
    /// 创建一个新的作业
    ///
    /// # 参数
    ///
    /// * `queue` - 所属队列族
    /// * `job_type` - 作业类型
    /// * `payload` - 作业负载数据
    ///
    /// # 返回值
    ///
    /// 返回新创建的作业实例，状态为Pending，立即可调度
    pub fn new(queue: QueueFamily, job_type: JobType, payload: serde_json::Value) -> Self {
        let now: DateTime<FixedOffset> = Utc::now().into();
        Self {
            id: Uuid::new_v4(),
            queue,
            job_type,
            status: JobStatus::Pending,
            payload,
            attempt_count: 0,
            max_attempts: 3,
            next_run_at: now,
            locked_at: None,
            locked_by: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// 锁定作业
    ///
    /// 将作业状态从Pending变更为Locked，写入锁定字段
    ///
    /// # 参数
    ///
    /// * `worker_id` - 认领作业的Worker标识
    ///
    /// # 返回值
    ///
    /// * `Ok(Job)` - 锁定后的作业
    /// * `Err(DomainError)` - 状态转换失败
    pub fn lock(mut self, worker_id: Uuid) -> Result<Self, DomainError> {
        match self.status {
            JobStatus::Pending => {
                self.status = JobStatus::Locked;
                self.locked_at = Some(Utc::now().into());
                self.locked_by = Some(worker_id);
                self.updated_at = Utc::now().into();
                Ok(self)
            }
            _ => Err(DomainError::InvalidStateTransition),
        }
    }

    /// 完成作业
    ///
    /// 将作业状态从Locked变更为Succeeded，清除锁定字段和错误
    pub fn succeed(mut self) -> Result<Self, DomainError> {
        match self.status {
            JobStatus::Locked => {
                self.status = JobStatus::Succeeded;
                self.locked_at = None;
                self.locked_by = None;
                self.last_error = None;
                self.updated_at = Utc::now().into();
                Ok(self)
            }
            _ => Err(DomainError::InvalidStateTransition),
        }
    }

    /// 判断作业当前是否可被认领
    ///
    /// # 返回值
    ///
    /// 状态为Pending且已到最早可调度时间时返回true
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        let now: DateTime<FixedOffset> = now.into();
        self.status == JobStatus::Pending && self.next_run_at <= now
    }

    /// 判断作业是否还有剩余重试额度
    pub fn can_retry(&self) -> bool {
        self.attempt_count < self.max_attempts
    }

    /// 判断作业是否处于终态
    ///
    /// 终态作业（Succeeded/Dead）不再被调度器改写，
    /// 仅由外部保留策略回收
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, JobStatus::Succeeded | JobStatus::Dead)
    }
}
