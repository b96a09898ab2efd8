//! 引擎告警到存储命令与实时状态的映射

use bytes::Bytes;
use log::{debug, error, info, warn};

use crate::core::error::DownloadError;
use crate::core::state::DownloadState;
use crate::core::task::worker::{DownloadTask, Flow};
use crate::engine::params::write_resume_data;
use crate::engine::{Alert, EngineTorrentState, TorrentHandle};
use crate::store::StoreCommand;

impl DownloadTask {
    pub(super) fn on_alert(&mut self, alert: Alert) -> Flow {
        if let Some(handle) = alert.handle() {
            if self.handle != Some(handle) {
                debug!("忽略其它种子的告警 {} [{}]", alert.kind(), self.link);
                return Flow::Continue;
            }
        }

        match alert {
            Alert::SaveResumeData { handle, params } => {
                debug!("保存恢复数据 [{}] done={}", self.link, params.total_downloaded);
                self.writer
                    .send(StoreCommand::SetResumeData(Bytes::from(write_resume_data(&params))));
                self.refresh_progress(handle);
                Flow::Continue
            }
            Alert::TorrentError { message, .. } => {
                error!("种子错误 [{}] alert=torrent_error: {}", self.link, message);
                Flow::Fail(DownloadError::EngineFatal {
                    link: self.link.clone(),
                    message,
                })
            }
            Alert::FileError { path, message, .. } => {
                error!("文件错误 [{}] alert=file_error path={}: {}", self.link, path, message);
                Flow::Fail(DownloadError::EngineFatal {
                    link: self.link.clone(),
                    message: format!("{}: {}", path, message),
                })
            }
            Alert::StorageMoved { handle, path } => {
                info!("已迁移到 {} [{}]", path, self.link);
                self.request_resume_data(handle);
                self.persist_with_session(DownloadState::Seeding);
                self.refresh_progress(handle);
                if self.pause_after_move {
                    return Flow::Pause(None);
                }
                Flow::Continue
            }
            Alert::StorageMovedFailed { handle, path, message, operation } => {
                let failure = DownloadError::StorageMoveFailure { path, message };
                error!("迁移失败 [{}] operation={}: {}", self.link, operation, failure);
                self.request_resume_data(handle);
                self.persist(DownloadState::StorageMovedFailed);
                self.refresh_progress(handle);
                if self.pause_after_move {
                    return Flow::Pause(Some(DownloadState::StorageMovedFailed));
                }
                Flow::Continue
            }
            Alert::TorrentFinished { handle } => self.on_finished(handle),
            Alert::TorrentChecked { handle, name, files } => {
                info!("文件校验完成 [{}] name={} files={}", self.link, name, files.len());
                self.writer.send(StoreCommand::SetTorrentFiles(files));
                self.writer.send(StoreCommand::SetName(name.clone()));
                self.name = name;
                self.refresh_progress(handle);
                Flow::Continue
            }
            Alert::MetadataReceived { handle, name } => {
                debug!("收到元数据 [{}] name={}", self.link, name);
                self.refresh_progress(handle);
                Flow::Continue
            }
            Alert::StateChanged { handle, previous, state } => {
                debug!("引擎状态 [{}] {} -> {}", self.link, previous, state);
                if state == EngineTorrentState::Seeding && self.state != Some(DownloadState::Seeding) {
                    self.persist_with_session(DownloadState::Seeding);
                }
                self.writer.send(StoreCommand::SetDescription(state.describe().to_string()));
                self.refresh_progress(handle);
                Flow::Continue
            }
            Alert::PeerConnected { handle, .. }
            | Alert::PeerDisconnected { handle, .. }
            | Alert::PeerInfo { handle } => {
                if let Some(session) = self.session.as_ref() {
                    self.ctx.hub.publish_peers(self.task_id, session.peers(handle));
                }
                self.refresh_progress(handle);
                Flow::Continue
            }
            Alert::StatsUpdate { handle } => {
                self.refresh_progress(handle);
                Flow::Continue
            }
            Alert::SessionStopped => Flow::Continue,
        }
    }

    fn on_finished(&mut self, handle: TorrentHandle) -> Flow {
        info!("下载完成 [{}] task={}", self.link, self.task_id);
        self.progress = 1.0;
        self.writer.send(StoreCommand::SetProgress(1.0));
        self.notify();
        self.persist_with_session(DownloadState::Completed);
        self.refresh_progress(handle);

        let seed = self.ctx.config.seed_after_complete;
        let Some(media) = self.ctx.config.media_path() else {
            return if seed { Flow::Continue } else { Flow::Pause(None) };
        };

        if let Err(e) = std::fs::create_dir_all(&media) {
            error!("无法创建媒体目录 {} [{}]: {}", media.display(), self.link, e);
            self.persist(DownloadState::StorageMovedFailed);
            return if seed {
                Flow::Continue
            } else {
                Flow::Pause(Some(DownloadState::StorageMovedFailed))
            };
        }

        let moved = match self.session.as_mut() {
            Some(session) => session.move_storage(handle, &media),
            None => return Flow::Continue,
        };
        match moved {
            Ok(()) => {
                info!("迁移到媒体目录 {} [{}]", media.display(), self.link);
                self.pause_after_move = !seed;
                Flow::Continue
            }
            Err(e) => {
                error!("迁移请求失败 [{}]: {}", self.link, e);
                self.persist(DownloadState::StorageMovedFailed);
                if seed {
                    Flow::Continue
                } else {
                    Flow::Pause(Some(DownloadState::StorageMovedFailed))
                }
            }
        }
    }

    fn request_resume_data(&mut self, handle: TorrentHandle) {
        if let Some(session) = self.session.as_mut() {
            if let Err(e) = session.request_resume_data(handle) {
                warn!("请求恢复数据失败 [{}]: {}", self.link, e);
            }
        }
    }

    fn persist(&mut self, state: DownloadState) {
        self.state = Some(state);
        self.writer.send(StoreCommand::SetDownloadState(state));
    }

    /// 写入状态并同时保存会话
    fn persist_with_session(&mut self, state: DownloadState) {
        self.state = Some(state);
        match self.session.as_ref() {
            Some(session) => self.writer.send(StoreCommand::SetSessionState {
                blob: session.save_state(),
                state,
            }),
            None => self.writer.send(StoreCommand::SetDownloadState(state)),
        }
    }

    /// 发布状态快照；进度或大小变化时写入记录
    fn refresh_progress(&mut self, handle: TorrentHandle) {
        let Some(status) = self.session.as_ref().and_then(|s| s.status(handle)) else {
            return;
        };
        let (progress, size) = (status.progress, status.total_done);
        self.ctx.hub.publish_status(self.task_id, status);

        if progress != self.progress {
            self.progress = progress;
            self.writer.send(StoreCommand::SetProgress(progress));
            self.notify();
        }
        if size != self.size {
            self.size = size;
            self.writer.send(StoreCommand::SetSize(size));
        }
    }
}
