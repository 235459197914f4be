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

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::domain::models::job::QueueFamily;
use crate::queue::registry::QueueRegistry;

/// 资源许可池
///
/// 以计数信号量实现的进程内并发上限，保护截图队列背后的
/// 无头浏览器资源。许可不持久化，进程启动时恢复到满容量；
/// 崩溃Worker持有的许可经由作业行的锁超时回收路径恢复，
/// 不做单独的许可簿记。
#[derive(Clone, Debug)]
pub struct PermitPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl PermitPool {
    /// 创建指定容量的许可池
    ///
    /// # 参数
    ///
    /// * `capacity` - 许可总数
    ///
    /// # 返回值
    ///
    /// 返回新的许可池实例
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// 非阻塞获取一个许可
    ///
    /// 无可用许可时立即返回None，调度器据此跳过该队列而不是
    /// 阻塞轮询线程。返回的许可是RAII守卫，离开作用域即归还，
    /// 处理器崩溃也不会泄漏许可。
    pub fn try_acquire(&self) -> Option<OwnedSemaphorePermit> {
        self.semaphore.clone().try_acquire_owned().ok()
    }

    /// 当前可用许可数，供观测指标读取
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// 许可总容量
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// 按队列族组织的许可池集合
///
/// 从队列注册表构建，只有携带并发上限的队列会得到一个池。
#[derive(Clone, Debug)]
pub struct PermitPools {
    pools: HashMap<QueueFamily, PermitPool>,
}

impl PermitPools {
    /// 按注册表构建许可池集合
    ///
    /// # 参数
    ///
    /// * `screenshot_ceiling` - 截图队列的许可数，来自配置
    pub fn new(screenshot_ceiling: usize) -> Self {
        let mut pools = HashMap::new();
        for spec in QueueRegistry::in_priority_order() {
            if spec.ceiling.is_some() {
                let capacity = match spec.family {
                    QueueFamily::Screenshot => screenshot_ceiling,
                    _ => spec.ceiling.unwrap_or(1),
                };
                pools.insert(spec.family, PermitPool::new(capacity));
            }
        }
        Self { pools }
    }

    /// 获取队列族对应的许可池
    pub fn pool(&self, family: QueueFamily) -> Option<&PermitPool> {
        self.pools.get(&family)
    }

    /// 非阻塞获取队列族的许可；无上限的队列返回None
    pub fn try_acquire(&self, family: QueueFamily) -> Option<OwnedSemaphorePermit> {
        self.pools.get(&family).and_then(|pool| pool.try_acquire())
    }
}
