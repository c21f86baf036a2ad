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
/// - 资源占用仓库（task_resource_repository）：记录进行中任务持有的资源
/// - 调用报告仓库（call_report_repository）：记录每次提交的判定和执行状态
/// - 定时调用仓库（scheduled_call_repository）：管理周期性调用及其计数器
pub mod call_report_repository;
pub mod scheduled_call_repository;
pub mod task_resource_repository;

pub use task_resource_repository::RepositoryError;
