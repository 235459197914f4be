// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::fmt;

use crate::domain::models::cost_ledger::SpendSnapshot;

/// 治理状态阈值：低于75%为正常
const REDUCE_THRESHOLD: f64 = 0.75;
/// 治理状态阈值：90%起进入排队
const QUEUE_THRESHOLD: f64 = 0.90;
/// 治理状态阈值：达到100%硬停
const HARD_STOP_THRESHOLD: f64 = 1.00;

/// 成本治理状态
///
/// AI类处理器在每次产生外部支出的调用前查询该状态，
/// 并按约定降级、排队或拒绝执行。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GovernanceState {
    /// 正常，按完整保真度执行
    Normal,
    /// 降级，改用低成本模型和更小批量
    Reduce,
    /// 排队，延迟执行以摊薄剩余预算
    Queue,
    /// 硬停，拒绝执行，不发起AI调用
    HardStop,
}

impl fmt::Display for GovernanceState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GovernanceState::Normal => write!(f, "normal"),
            GovernanceState::Reduce => write!(f, "reduce"),
            GovernanceState::Queue => write!(f, "queue"),
            GovernanceState::HardStop => write!(f, "hard_stop"),
        }
    }
}

/// 由支出快照计算治理状态
///
/// 纯函数，无副作用；每次调用前用最新台账快照重新计算，
/// 不做任何缓存。上限非正时视为硬停。
///
/// # 参数
///
/// * `snapshot` - 当月支出快照
///
/// # 返回值
///
/// 返回当前治理状态
pub fn evaluate(snapshot: &SpendSnapshot) -> GovernanceState {
    let ratio = snapshot.ratio();

    if ratio < REDUCE_THRESHOLD {
        GovernanceState::Normal
    } else if ratio < QUEUE_THRESHOLD {
        GovernanceState::Reduce
    } else if ratio < HARD_STOP_THRESHOLD {
        GovernanceState::Queue
    } else {
        GovernanceState::HardStop
    }
}
