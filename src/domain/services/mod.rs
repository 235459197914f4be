// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域服务模块
///
/// 包含跨实体的业务规则：
/// - 成本治理（cost_governor）：按月度支出比例输出治理状态
/// - LLM服务（llm_service）：AI打标所用的模型调用客户端
pub mod cost_governor;
pub mod llm_service;
