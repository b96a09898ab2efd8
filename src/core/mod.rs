//! Core: 任务编排、生命周期状态、实时状态与后台调度

pub mod error;
pub mod live;
pub mod manager;
pub mod scheduler;
pub mod state;
pub mod task;

// 只导出主流程和其它模块实际用到的类型
pub use error::{DownloadError, DownloadResult};
pub use live::LiveStatusHub;
pub use manager::DownloadManager;
pub use scheduler::{WorkScheduler, WorkState};
pub use state::DownloadState;
pub use task::{SilentNotifier, TaskNotification, TaskNotifier};
