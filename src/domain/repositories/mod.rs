// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 仓库接口模块
///
/// 该模块定义了领域层的仓库接口，遵循依赖倒置原则。
/// 仓库接口定义了数据持久化的抽象契约，具体实现由基础设施层提供。
///
/// 包含的仓库接口：
/// - 作业仓库（job_repository）：作业的入队、认领、结算和回收
/// - 成本台账仓库（cost_ledger_repository）：AI支出的追加和月度聚合
/// - 存储仓库（storage_repository）：截图文件的存储
///
/// 这些接口确保了领域层不依赖于具体的数据存储技术，
/// 提高了系统的可测试性和可维护性.
pub mod cost_ledger_repository;
pub mod job_repository;
pub mod storage_repository;
