//! Engine: 嵌入式 BitTorrent 引擎的协作接口
//!
//! 编排器不实现 BitTorrent 协议本身，只通过这里定义的 trait 驱动引擎：
//! - `TorrentEngine`: 创建会话（可用上次保存的会话状态热启动）
//! - `EngineSession`: 添加/暂停/移除种子、读写恢复数据、告警流
//! - `Alert`: 引擎异步发出的事件
//! - `params`: 添加参数与恢复数据编解码
//! - `proxy`: 代理配置到引擎设置的转换
//! - `loopback`: 进程内的确定性引擎，用于测试与演示

pub mod loopback;
pub mod params;
pub mod proxy;

use std::fmt;
use std::net::SocketAddr;
use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::Config;
use crate::core::error::DownloadResult;
pub use params::{AddTorrentParams, InfoHash};
pub use proxy::{ProxySettings, ProxyType};

/// 会话内的种子句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TorrentHandle(pub u64);

/// 引擎层面的种子状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineTorrentState {
    CheckingFiles,
    DownloadingMetadata,
    Downloading,
    Finished,
    Seeding,
    CheckingResumeData,
}

impl EngineTorrentState {
    /// 面向用户的状态描述
    pub fn describe(&self) -> &'static str {
        match self {
            EngineTorrentState::CheckingFiles => "正在校验文件",
            EngineTorrentState::DownloadingMetadata => "正在获取元数据",
            EngineTorrentState::Downloading => "正在下载",
            EngineTorrentState::Finished => "下载完成",
            EngineTorrentState::Seeding => "正在做种",
            EngineTorrentState::CheckingResumeData => "正在校验恢复数据",
        }
    }
}

impl fmt::Display for EngineTorrentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// 种子状态快照
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TorrentStatus {
    pub name: String,
    pub state: EngineTorrentState,
    /// 0.0 - 1.0
    pub progress: f32,
    pub total_done: u64,
    pub total_wanted: u64,
    pub total_uploaded: u64,
    pub download_rate: u64,
    pub upload_rate: u64,
    pub num_peers: u32,
    pub num_seeds: u32,
    pub save_path: String,
}

/// 对端信息快照
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeerInfo {
    pub address: SocketAddr,
    pub client: String,
    pub progress: f32,
    pub download_rate: u64,
    pub upload_rate: u64,
    pub seed: bool,
}

/// 种子内的单个文件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorrentFile {
    pub path: String,
    pub size: u64,
}

/// 引擎告警
#[derive(Debug, Clone)]
pub enum Alert {
    SaveResumeData { handle: TorrentHandle, params: AddTorrentParams },
    TorrentError { handle: TorrentHandle, message: String },
    FileError { handle: TorrentHandle, path: String, message: String },
    StorageMoved { handle: TorrentHandle, path: String },
    StorageMovedFailed { handle: TorrentHandle, path: String, message: String, operation: String },
    TorrentFinished { handle: TorrentHandle },
    TorrentChecked { handle: TorrentHandle, name: String, files: Vec<TorrentFile> },
    MetadataReceived { handle: TorrentHandle, name: String },
    StateChanged { handle: TorrentHandle, previous: EngineTorrentState, state: EngineTorrentState },
    PeerConnected { handle: TorrentHandle, address: SocketAddr },
    PeerDisconnected { handle: TorrentHandle, address: SocketAddr, reason: String },
    PeerInfo { handle: TorrentHandle },
    StatsUpdate { handle: TorrentHandle },
    /// 会话已停止，告警流到此结束
    SessionStopped,
}

impl Alert {
    pub fn handle(&self) -> Option<TorrentHandle> {
        match self {
            Alert::SaveResumeData { handle, .. }
            | Alert::TorrentError { handle, .. }
            | Alert::FileError { handle, .. }
            | Alert::StorageMoved { handle, .. }
            | Alert::StorageMovedFailed { handle, .. }
            | Alert::TorrentFinished { handle }
            | Alert::TorrentChecked { handle, .. }
            | Alert::MetadataReceived { handle, .. }
            | Alert::StateChanged { handle, .. }
            | Alert::PeerConnected { handle, .. }
            | Alert::PeerDisconnected { handle, .. }
            | Alert::PeerInfo { handle }
            | Alert::StatsUpdate { handle } => Some(*handle),
            Alert::SessionStopped => None,
        }
    }

    /// 用于日志的告警类型名
    pub fn kind(&self) -> &'static str {
        match self {
            Alert::SaveResumeData { .. } => "save_resume_data",
            Alert::TorrentError { .. } => "torrent_error",
            Alert::FileError { .. } => "file_error",
            Alert::StorageMoved { .. } => "storage_moved",
            Alert::StorageMovedFailed { .. } => "storage_moved_failed",
            Alert::TorrentFinished { .. } => "torrent_finished",
            Alert::TorrentChecked { .. } => "torrent_checked",
            Alert::MetadataReceived { .. } => "metadata_received",
            Alert::StateChanged { .. } => "state_changed",
            Alert::PeerConnected { .. } => "peer_connected",
            Alert::PeerDisconnected { .. } => "peer_disconnected",
            Alert::PeerInfo { .. } => "peer_info",
            Alert::StatsUpdate { .. } => "stats",
            Alert::SessionStopped => "session_stopped",
        }
    }
}

/// 会话启动设置
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    /// 稳定的客户端标识（user agent）
    pub client_id: String,
    pub peer_fingerprint: String,
    pub listen_port: u16,
    pub enable_dht: bool,
    pub enable_lsd: bool,
    pub proxy: ProxySettings,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            client_id: config.client_id.clone(),
            peer_fingerprint: config.peer_fingerprint.clone(),
            listen_port: config.listen_port,
            enable_dht: config.enable_dht,
            enable_lsd: config.enable_lsd,
            proxy: proxy::translate(&config.proxy),
        }
    }
}

#[async_trait]
pub trait TorrentEngine: Send + Sync {
    /// 创建会话，`warm_state` 为上次 `save_state` 的结果
    async fn open_session(
        &self,
        settings: SessionSettings,
        warm_state: Option<Bytes>,
    ) -> DownloadResult<Box<dyn EngineSession>>;
}

#[async_trait]
pub trait EngineSession: Send {
    /// 取走告警流，只能取一次
    fn take_alerts(&mut self) -> Option<mpsc::UnboundedReceiver<Alert>>;

    async fn add_magnet(
        &mut self,
        uri: &str,
        save_path: &Path,
        resume: Option<AddTorrentParams>,
    ) -> DownloadResult<TorrentHandle>;

    async fn add_torrent_file(
        &mut self,
        file: &Path,
        save_path: &Path,
        resume: Option<AddTorrentParams>,
    ) -> DownloadResult<TorrentHandle>;

    /// 直接用恢复数据重放种子
    async fn add_resume(&mut self, params: AddTorrentParams) -> DownloadResult<TorrentHandle>;

    fn pause(&mut self, handle: TorrentHandle) -> DownloadResult<()>;

    /// 异步请求恢复数据，结果以 `Alert::SaveResumeData` 送达
    fn request_resume_data(&mut self, handle: TorrentHandle) -> DownloadResult<()>;

    /// 当前恢复数据的同步快照
    fn resume_data(&self, handle: TorrentHandle) -> Option<AddTorrentParams>;

    fn move_storage(&mut self, handle: TorrentHandle, path: &Path) -> DownloadResult<()>;

    fn remove(&mut self, handle: TorrentHandle) -> DownloadResult<()>;

    fn status(&self, handle: TorrentHandle) -> Option<TorrentStatus>;

    fn peers(&self, handle: TorrentHandle) -> Vec<PeerInfo>;

    /// 序列化会话状态
    fn save_state(&self) -> Bytes;

    /// 停止会话及 DHT/LSD 等对端发现
    async fn stop(&mut self);
}
