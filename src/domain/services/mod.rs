// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域服务模块
///
/// 包含的服务：
/// - 冲突矩阵（conflict_matrix）：纯函数，判定操作之间的冲突关系
/// - 协调器（coordinator）：判定、保留资源、提交任务并在结束时释放
/// - 周期计算（recurrence）：计算定时调用的首次和下一次运行时间
pub mod conflict_matrix;
pub mod coordinator;
pub mod recurrence;
