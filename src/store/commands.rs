//! 发往 `StoreActor` 的命令与查询
//!
//! 任务对存储的所有修改都表达为 `StoreCommand`，由 `StoreActor` 逐条串行应用。

use actix::Message;
use bytes::Bytes;
use uuid::Uuid;

use crate::core::error::DownloadError;
use crate::core::state::DownloadState;
use crate::engine::{AddTorrentParams, TorrentFile};
use crate::store::files::TorrentFileEntry;
use crate::store::records::DownloadRecord;

#[derive(Debug, Clone)]
pub enum StoreCommand {
    SetDownloadState(DownloadState),
    /// 保存会话序列化结果并同时写入状态
    SetSessionState { blob: Bytes, state: DownloadState },
    SetDescription(String),
    SetTorrentFiles(Vec<TorrentFile>),
    SetName(String),
    SetProgress(f32),
    SetSize(u64),
    /// 把记录的所有权交给命令中的任务
    SetOwningTask,
    /// 已编码的恢复数据，按任务ID存放
    SetResumeData(Bytes),
    /// 按暂停那一刻的状态写入暂停态
    MarkPaused,
    /// 删除记录、文件索引与链接映射
    DeleteRecord,
    /// 删除会话状态与恢复数据
    DeleteSessionState,
    CreateIfAbsent(DownloadRecord),
}

impl StoreCommand {
    pub fn name(&self) -> &'static str {
        match self {
            StoreCommand::SetDownloadState(_) => "SetDownloadState",
            StoreCommand::SetSessionState { .. } => "SetSessionState",
            StoreCommand::SetDescription(_) => "SetDescription",
            StoreCommand::SetTorrentFiles(_) => "SetTorrentFiles",
            StoreCommand::SetName(_) => "SetName",
            StoreCommand::SetProgress(_) => "SetProgress",
            StoreCommand::SetSize(_) => "SetSize",
            StoreCommand::SetOwningTask => "SetOwningTask",
            StoreCommand::SetResumeData(_) => "SetResumeData",
            StoreCommand::MarkPaused => "MarkPaused",
            StoreCommand::DeleteRecord => "DeleteRecord",
            StoreCommand::DeleteSessionState => "DeleteSessionState",
            StoreCommand::CreateIfAbsent(_) => "CreateIfAbsent",
        }
    }

    /// 只有记录的当前所有者才能执行的命令
    pub fn requires_ownership(&self) -> bool {
        matches!(
            self,
            StoreCommand::SetDownloadState(_)
                | StoreCommand::SetSessionState { .. }
                | StoreCommand::SetDescription(_)
                | StoreCommand::SetTorrentFiles(_)
                | StoreCommand::SetName(_)
                | StoreCommand::SetProgress(_)
                | StoreCommand::SetSize(_)
        )
    }
}

/// 对某个链接应用一条命令
#[derive(Debug, Clone)]
pub struct Apply {
    pub link: String,
    pub task_id: Uuid,
    pub command: StoreCommand,
}
impl Message for Apply { type Result = Result<(), DownloadError>; }

impl Apply {
    pub fn new(link: impl Into<String>, task_id: Uuid, command: StoreCommand) -> Self {
        Self {
            link: link.into(),
            task_id,
            command,
        }
    }
}

/// 查询或分配链接对应的任务ID
pub struct ResolveTaskId { pub link: String }
impl Message for ResolveTaskId { type Result = Result<Uuid, DownloadError>; }

pub struct LookupLink { pub task_id: Uuid }
impl Message for LookupLink { type Result = Option<String>; }

pub struct LookupTaskId { pub link: String }
impl Message for LookupTaskId { type Result = Option<Uuid>; }

pub struct GetRecord { pub link: String }
impl Message for GetRecord { type Result = Option<DownloadRecord>; }

pub struct ListRecords;
impl Message for ListRecords { type Result = Vec<DownloadRecord>; }

pub struct GetSessionState { pub link: String }
impl Message for GetSessionState { type Result = Option<Bytes>; }

pub struct GetResumeData { pub task_id: Uuid }
impl Message for GetResumeData { type Result = Option<AddTorrentParams>; }

pub struct ListFiles { pub link: String }
impl Message for ListFiles { type Result = Vec<TorrentFileEntry>; }
