// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::models::job::JobType;
use crate::handlers::traits::JobHandler;

/// 处理器注册表
///
/// 按作业类型索引已注册的处理器。生产者入队的类型必须
/// 在此注册，调度器认领到未注册类型时将作业按永久失败结算。
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<JobType, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    /// 创建空的处理器注册表
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// 注册一个处理器
    ///
    /// 同类型重复注册时后注册者生效
    pub fn register(&mut self, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(handler.job_type(), handler);
    }

    /// 查找作业类型对应的处理器
    pub fn get(&self, job_type: JobType) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(&job_type).cloned()
    }

    /// 已注册的处理器数量
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// 注册表是否为空
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
