// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域模型模块
///
/// 该模块定义了系统的核心业务实体，包括：
/// - 资源（resource）：资源需求、资源占用记录和冲突判定结果
/// - 调用（call）：调用请求、调用行程和调用报告
/// - 定时调用（scheduled_call）：周期性调用及其选项
pub mod call;
pub mod resource;
pub mod scheduled_call;
