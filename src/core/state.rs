//! 下载任务的生命周期状态

use serde::{Deserialize, Serialize};
use std::fmt;

/// 持久化在下载记录中的任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DownloadState {
    Init,
    Downloading,
    Paused,
    ErrorPaused,
    StorageMovedFailed,
    Seeding,
    SeedingPaused,
    Completed,
}

impl DownloadState {
    /// 暂停时应写入的状态，取决于暂停那一刻的状态
    ///
    /// 做种相关状态（以及无记录时按做种处理的情况）暂停为 `SeedingPaused`，其余为 `Paused`。
    pub fn paused_from(current: Option<DownloadState>) -> DownloadState {
        match current {
            Some(DownloadState::Seeding)
            | Some(DownloadState::Completed)
            | Some(DownloadState::SeedingPaused) => DownloadState::SeedingPaused,
            _ => DownloadState::Paused,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            DownloadState::Init => "等待中",
            DownloadState::Downloading => "下载中",
            DownloadState::Paused => "已暂停",
            DownloadState::ErrorPaused => "出错暂停",
            DownloadState::StorageMovedFailed => "迁移失败",
            DownloadState::Seeding => "做种中",
            DownloadState::SeedingPaused => "做种暂停",
            DownloadState::Completed => "已完成",
        }
    }
}

impl fmt::Display for DownloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// 任务启动时如何把种子交给引擎
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPlan {
    /// 重放恢复数据，目标 `Seeding`
    ReplayResume,
    /// 按链接重新添加，目标 `Downloading`
    FreshAdd,
}

impl StartPlan {
    pub fn for_state(state: Option<DownloadState>) -> StartPlan {
        match state {
            None
            | Some(DownloadState::Seeding)
            | Some(DownloadState::SeedingPaused)
            | Some(DownloadState::Completed) => StartPlan::ReplayResume,
            Some(_) => StartPlan::FreshAdd,
        }
    }

    pub fn target(&self) -> DownloadState {
        match self {
            StartPlan::ReplayResume => DownloadState::Seeding,
            StartPlan::FreshAdd => DownloadState::Downloading,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [DownloadState; 8] = [
        DownloadState::Init,
        DownloadState::Downloading,
        DownloadState::Paused,
        DownloadState::ErrorPaused,
        DownloadState::StorageMovedFailed,
        DownloadState::Seeding,
        DownloadState::SeedingPaused,
        DownloadState::Completed,
    ];

    #[test]
    fn test_paused_from() {
        for state in ALL {
            let expected = match state {
                DownloadState::Seeding | DownloadState::Completed | DownloadState::SeedingPaused => {
                    DownloadState::SeedingPaused
                }
                _ => DownloadState::Paused,
            };
            assert_eq!(DownloadState::paused_from(Some(state)), expected, "from {:?}", state);
        }
        assert_eq!(DownloadState::paused_from(None), DownloadState::Paused);
    }

    #[test]
    fn test_start_plan() {
        assert_eq!(StartPlan::for_state(None), StartPlan::ReplayResume);
        assert_eq!(StartPlan::for_state(Some(DownloadState::Completed)).target(), DownloadState::Seeding);
        assert_eq!(StartPlan::for_state(Some(DownloadState::SeedingPaused)).target(), DownloadState::Seeding);
        for state in [
            DownloadState::Init,
            DownloadState::Downloading,
            DownloadState::Paused,
            DownloadState::ErrorPaused,
            DownloadState::StorageMovedFailed,
        ] {
            assert_eq!(StartPlan::for_state(Some(state)), StartPlan::FreshAdd);
            assert_eq!(StartPlan::for_state(Some(state)).target(), DownloadState::Downloading);
        }
    }

    #[test]
    fn test_display_and_describe() {
        assert_eq!(DownloadState::StorageMovedFailed.describe(), "迁移失败");
        assert_eq!(DownloadState::Init.to_string(), "Init");
    }
}
