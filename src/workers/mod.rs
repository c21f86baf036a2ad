// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 工作器模块
///
/// 后台循环：定时调用的分发和调用报告的清理
pub mod dispatch_worker;
pub mod report_retention_worker;
pub mod worker;

pub use worker::Worker;
