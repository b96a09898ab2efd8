//! magnetdown: 磁力链接/种子下载编排
//!
//! 把链接变成可暂停、可恢复、可观察的下载任务；BitTorrent 协议本身由 `engine` 中的引擎实现。

pub mod cli;
pub mod config;
pub mod core;
pub mod engine;
pub mod store;
pub mod ui;
pub mod utils;

pub use crate::config::Config;
pub use crate::core::{DownloadError, DownloadManager, DownloadResult, DownloadState};
