// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 配置模块
///
/// 处理应用程序的配置设置和环境变量
pub mod config;

/// 领域模块
///
/// 调用请求、资源占用、定时调用模型，仓库接口和协调服务
pub mod domain;

/// 基础设施模块
///
/// 数据库实体、仓库实现和指标
pub mod infrastructure;

/// 队列模块
///
/// 处理器注册、工作池和调度器
pub mod queue;

/// 工具模块
pub mod utils;

/// 工作器模块
///
/// 后台调度循环
pub mod workers;
