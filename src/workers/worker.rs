// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::utils::errors::WorkerError;
use async_trait::async_trait;

/// 后台工作器
///
/// `run` 一直运行到工作器收到停止信号
#[async_trait]
pub trait Worker: Send + Sync {
    async fn run(&self) -> Result<(), WorkerError>;

    fn name(&self) -> &str;
}
