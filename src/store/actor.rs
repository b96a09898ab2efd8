use std::path::{Path, PathBuf};

use actix::prelude::*;
use log::{debug, error, info};
use tokio::sync::watch;

use crate::core::error::{DownloadError, DownloadResult};
use crate::core::state::DownloadState;
use crate::store::commands::*;
use crate::store::files::{TorrentFileEntry, TorrentFileIndexStore};
use crate::store::records::{DownloadRecord, DownloadRecordStore};
use crate::store::registry::LinkIdentityRegistry;
use crate::store::session::{ResumeDataStore, SessionStateStore};

/// 所有持久化存储的唯一写入者
///
/// 任务发来的命令在这里按到达顺序逐条执行；每次记录变化后把完整列表推送给观察者。
pub struct StoreActor {
    dir: PathBuf,
    records: DownloadRecordStore,
    registry: LinkIdentityRegistry,
    sessions: SessionStateStore,
    resume: ResumeDataStore,
    files: TorrentFileIndexStore,
    records_tx: watch::Sender<Vec<DownloadRecord>>,
}

impl StoreActor {
    pub fn open(dir: &Path, records_tx: watch::Sender<Vec<DownloadRecord>>) -> DownloadResult<Self> {
        std::fs::create_dir_all(dir).map_err(|source| DownloadError::Mkdir {
            path: dir.display().to_string(),
            source,
        })?;
        let store = Self {
            dir: dir.to_path_buf(),
            records: DownloadRecordStore::open(dir),
            registry: LinkIdentityRegistry::open(dir),
            sessions: SessionStateStore::open(dir),
            resume: ResumeDataStore::open(dir),
            files: TorrentFileIndexStore::open(dir),
            records_tx,
        };
        store.publish_records();
        Ok(store)
    }

    fn publish_records(&self) {
        self.records_tx.send_replace(self.records.list());
    }

    fn apply(&mut self, msg: Apply) -> DownloadResult<()> {
        let Apply { link, task_id, command } = msg;

        if command.requires_ownership() {
            match self.records.get(&link) {
                None => {
                    debug!("记录已不存在，忽略 {} [{}]", command.name(), link);
                    return Ok(());
                }
                Some(record) if record.task_id != task_id => {
                    debug!(
                        "过期任务 {} 的 {} 被忽略，当前所有者 {} [{}]",
                        task_id,
                        command.name(),
                        record.task_id,
                        link
                    );
                    return Ok(());
                }
                Some(_) => {}
            }
        }

        let name = command.name();
        let records_changed = match command {
            StoreCommand::SetDownloadState(state) => self.records.update(&link, |r| r.state = state)?,
            StoreCommand::SetSessionState { blob, state } => {
                self.sessions.put(&link, blob)?;
                self.records.update(&link, |r| r.state = state)?
            }
            StoreCommand::SetDescription(description) => {
                self.records.update(&link, |r| r.description = description)?
            }
            StoreCommand::SetTorrentFiles(files) => {
                let entries = files
                    .into_iter()
                    .map(|file| TorrentFileEntry {
                        link: link.clone(),
                        relative_path: file.path,
                        size: file.size,
                    })
                    .collect();
                self.files.replace(&link, entries)?;
                false
            }
            StoreCommand::SetName(display_name) => self.records.update(&link, |r| r.name = display_name)?,
            StoreCommand::SetProgress(progress) => {
                self.records.update(&link, |r| r.progress = progress.clamp(0.0, 1.0))?
            }
            StoreCommand::SetSize(size) => self.records.update(&link, |r| r.size = size)?,
            StoreCommand::SetOwningTask => self.records.update(&link, |r| r.task_id = task_id)?,
            StoreCommand::SetResumeData(data) => {
                // 链接已被删除的任务不再写恢复数据
                if self.registry.link_of(&task_id).is_none() {
                    debug!("任务 {} 已无映射，丢弃恢复数据", task_id);
                    return Ok(());
                }
                self.resume.write(&task_id, &data)?;
                false
            }
            StoreCommand::MarkPaused => {
                let current = self.records.get(&link).map(|r| r.state);
                let paused = DownloadState::paused_from(current);
                self.records.update(&link, |r| r.state = paused)?
            }
            StoreCommand::DeleteRecord => {
                let removed = self.records.remove(&link)?.is_some();
                self.files.remove(&link)?;
                self.registry.remove_link(&link)?;
                removed
            }
            StoreCommand::DeleteSessionState => {
                self.sessions.remove(&link)?;
                self.resume.remove(&task_id)?;
                false
            }
            StoreCommand::CreateIfAbsent(record) => self.records.create_if_absent(record)?,
        };

        if records_changed {
            debug!("{} 已应用 [{}]", name, link);
            self.publish_records();
        }
        Ok(())
    }
}

impl Actor for StoreActor {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        info!("存储已就绪: {}", self.dir.display());
    }
}

impl Handler<Apply> for StoreActor {
    type Result = MessageResult<Apply>;
    fn handle(&mut self, msg: Apply, _ctx: &mut Self::Context) -> Self::Result {
        let link = msg.link.clone();
        let name = msg.command.name();
        let result = self.apply(msg);
        if let Err(e) = &result {
            error!("存储命令 {} 失败 [{}]: {}", name, link, e);
        }
        MessageResult(result)
    }
}

impl Handler<ResolveTaskId> for StoreActor {
    type Result = MessageResult<ResolveTaskId>;
    fn handle(&mut self, msg: ResolveTaskId, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(self.registry.resolve_or_create(&msg.link).map_err(DownloadError::from))
    }
}

impl Handler<LookupLink> for StoreActor {
    type Result = MessageResult<LookupLink>;
    fn handle(&mut self, msg: LookupLink, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(self.registry.link_of(&msg.task_id).map(str::to_string))
    }
}

impl Handler<LookupTaskId> for StoreActor {
    type Result = MessageResult<LookupTaskId>;
    fn handle(&mut self, msg: LookupTaskId, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(self.registry.task_of(&msg.link))
    }
}

impl Handler<GetRecord> for StoreActor {
    type Result = MessageResult<GetRecord>;
    fn handle(&mut self, msg: GetRecord, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(self.records.get(&msg.link).cloned())
    }
}

impl Handler<ListRecords> for StoreActor {
    type Result = MessageResult<ListRecords>;
    fn handle(&mut self, _msg: ListRecords, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(self.records.list())
    }
}

impl Handler<GetSessionState> for StoreActor {
    type Result = MessageResult<GetSessionState>;
    fn handle(&mut self, msg: GetSessionState, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(self.sessions.get(&msg.link))
    }
}

impl Handler<GetResumeData> for StoreActor {
    type Result = MessageResult<GetResumeData>;
    fn handle(&mut self, msg: GetResumeData, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(self.resume.read(&msg.task_id))
    }
}

impl Handler<ListFiles> for StoreActor {
    type Result = MessageResult<ListFiles>;
    fn handle(&mut self, msg: ListFiles, _ctx: &mut Self::Context) -> Self::Result {
        let files = self.files.list(&msg.link);
        if files.is_empty() {
            debug!("尚无文件索引 [{}]", msg.link);
        }
        MessageResult(files)
    }
}
