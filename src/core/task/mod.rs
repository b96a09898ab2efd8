//! Task: 单个种子的下载任务
//!
//! - `worker`: 任务主体，准备 → 告警循环 → 收尾
//! - `alerts`: 引擎告警到存储命令/实时状态的映射
//! - `source`: 链接到引擎输入（磁力链接或种子文件）的解析

mod alerts;
pub mod source;
pub mod worker;

use std::sync::Arc;

use actix::Addr;
use uuid::Uuid;

use crate::config::Config;
use crate::core::live::LiveStatusHub;
use crate::core::state::DownloadState;
use crate::engine::TorrentEngine;
use crate::store::StoreActor;

pub use worker::DownloadTask;

/// 任务运行所需的共享依赖
#[derive(Clone)]
pub struct TaskContext {
    pub config: Arc<Config>,
    pub store: Addr<StoreActor>,
    pub hub: LiveStatusHub,
    pub engine: Arc<dyn TorrentEngine>,
    pub notifier: Arc<dyn TaskNotifier>,
}

/// 一条进度通知
#[derive(Debug, Clone, PartialEq)]
pub struct TaskNotification {
    pub task_id: Uuid,
    pub title: String,
    /// 0 - 100
    pub percent: u32,
    /// 任务存活期间总是可以取消
    pub cancellable: bool,
}

/// 通知栏接口
pub trait TaskNotifier: Send + Sync {
    fn update(&self, notification: TaskNotification);

    /// 任务结束；`state` 为最终状态，失败时为 `None`
    fn finish(&self, task_id: Uuid, title: &str, state: Option<DownloadState>);
}

/// 不显示任何通知
pub struct SilentNotifier;

impl TaskNotifier for SilentNotifier {
    fn update(&self, _notification: TaskNotification) {}

    fn finish(&self, _task_id: Uuid, _title: &str, _state: Option<DownloadState>) {}
}
