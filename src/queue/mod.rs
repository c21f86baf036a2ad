// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 队列模块
///
/// 处理器注册、工作池和定时调用调度
pub mod handler_registry;
pub mod scheduler;
pub mod task_queue;
