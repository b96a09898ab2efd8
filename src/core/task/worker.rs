use std::path::PathBuf;

use actix::Addr;
use bytes::Bytes;
use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::core::error::{DownloadError, DownloadResult};
use crate::core::scheduler::CancelSignal;
use crate::core::state::{DownloadState, StartPlan};
use crate::core::task::source::{resolve_source, TorrentSource};
use crate::core::task::{TaskContext, TaskNotification};
use crate::engine::params::write_resume_data;
use crate::engine::{Alert, EngineSession, SessionSettings, TorrentHandle};
use crate::store::commands::{GetRecord, GetResumeData, GetSessionState, LookupLink};
use crate::store::{Apply, DownloadRecord, StoreActor, StoreCommand};

/// 告警处理后的走向
pub(super) enum Flow {
    Continue,
    /// 主动暂停，可指定写入的状态，缺省按暂停规则推导
    Pause(Option<DownloadState>),
    Fail(DownloadError),
}

/// 告警循环的退出原因
enum Exit {
    Cancelled,
    /// 告警流结束或会话已停止
    Closed,
    Paused(Option<DownloadState>),
    Failed(DownloadError),
}

/// 以当前任务的身份向存储发送命令，不等待结果
pub(super) struct RecordWriter {
    store: Addr<StoreActor>,
    link: String,
    task_id: Uuid,
}

impl RecordWriter {
    pub(super) fn send(&self, command: StoreCommand) {
        self.store.do_send(Apply::new(self.link.clone(), self.task_id, command));
    }
}

/// 单个种子的下载任务
///
/// 一个实例对应一次运行：`run` 依次执行准备、告警循环和收尾，收尾步骤在任何退出路径上恰好执行一次。
pub struct DownloadTask {
    pub(super) task_id: Uuid,
    pub(super) link: String,
    pub(super) ctx: TaskContext,
    pub(super) writer: RecordWriter,
    pub(super) name: String,
    pub(super) progress: f32,
    pub(super) size: u64,
    /// 任务所知的持久化状态
    pub(super) state: Option<DownloadState>,
    pub(super) record_owner: Option<Uuid>,
    pub(super) save_dir: PathBuf,
    pub(super) session: Option<Box<dyn EngineSession>>,
    pub(super) handle: Option<TorrentHandle>,
    /// 暂停流程已开始
    pub(super) stopping: bool,
    pub(super) last_percent: Option<u32>,
    /// 迁移结束后暂停（完成后不做种时）
    pub(super) pause_after_move: bool,
}

impl DownloadTask {
    /// 运行任务直到完成、取消或失败，返回最终持久化的状态
    pub async fn run(task_id: Uuid, ctx: TaskContext, mut cancel: CancelSignal) -> DownloadResult<DownloadState> {
        let mut task = DownloadTask::prepare(task_id, ctx).await?;
        info!("任务启动 [{}] task={} state={:?}", task.link, task_id, task.state);
        let exit = task.drive(&mut cancel).await;
        task.finalize(exit).await
    }

    async fn prepare(task_id: Uuid, ctx: TaskContext) -> DownloadResult<Self> {
        let link = ctx
            .store
            .send(LookupLink { task_id })
            .await?
            .ok_or(DownloadError::UnknownTask(task_id))?;

        // 记录不存在时先创建；消息按顺序处理，随后的查询能读到它
        ctx.store.do_send(Apply::new(
            link.clone(),
            task_id,
            StoreCommand::CreateIfAbsent(DownloadRecord::new(&link, task_id)),
        ));
        let record = ctx.store.send(GetRecord { link: link.clone() }).await?;

        let save_dir = ctx.config.download_path();
        std::fs::create_dir_all(&save_dir).map_err(|source| DownloadError::Mkdir {
            path: save_dir.display().to_string(),
            source,
        })?;

        let writer = RecordWriter {
            store: ctx.store.clone(),
            link: link.clone(),
            task_id,
        };
        let name = record
            .as_ref()
            .map(|r| r.name.clone())
            .unwrap_or_else(|| crate::utils::validator::derive_name(&link));
        Ok(Self {
            task_id,
            link,
            writer,
            name,
            progress: record.as_ref().map_or(0.0, |r| r.progress),
            size: record.as_ref().map_or(0, |r| r.size),
            state: record.as_ref().map(|r| r.state),
            record_owner: record.as_ref().map(|r| r.task_id),
            save_dir,
            ctx,
            session: None,
            handle: None,
            stopping: false,
            last_percent: None,
            pause_after_move: false,
        })
    }

    async fn drive(&mut self, cancel: &mut CancelSignal) -> Exit {
        let mut alerts = match self.open().await {
            Ok(alerts) => alerts,
            Err(e) => return Exit::Failed(e),
        };
        self.notify();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("收到取消请求 [{}]", self.link);
                    return Exit::Cancelled;
                }
                alert = alerts.recv() => match alert {
                    None | Some(Alert::SessionStopped) => return Exit::Closed,
                    Some(alert) => match self.on_alert(alert) {
                        Flow::Continue => {}
                        Flow::Pause(target) => return Exit::Paused(target),
                        Flow::Fail(e) => return Exit::Failed(e),
                    },
                },
            }
        }
    }

    /// 建立会话并把种子交给引擎，返回告警流
    async fn open(&mut self) -> DownloadResult<mpsc::UnboundedReceiver<Alert>> {
        let warm_state = self
            .ctx
            .store
            .send(GetSessionState { link: self.link.clone() })
            .await?;
        let settings = SessionSettings::from_config(&self.ctx.config);
        debug!(
            "会话设置 [{}] client={} warm={} proxy={:?}",
            self.link,
            settings.client_id,
            warm_state.is_some(),
            settings
                .proxy
                .to_pairs()
                .into_iter()
                .filter(|(key, _)| *key != "proxy_password")
                .collect::<Vec<_>>()
        );

        let session = self.ctx.engine.open_session(settings, warm_state).await?;
        let session = self.session.insert(session);
        let alerts = session
            .take_alerts()
            .ok_or_else(|| DownloadError::Engine("告警流不可用".to_string()))?;

        if self.record_owner.map_or(false, |owner| owner != self.task_id) {
            info!("记录所有权转移到任务 {} [{}]", self.task_id, self.link);
            self.writer.send(StoreCommand::SetOwningTask);
            self.record_owner = Some(self.task_id);
        }

        let plan = StartPlan::for_state(self.state);
        let resume = self
            .ctx
            .store
            .send(GetResumeData { task_id: self.task_id })
            .await?;
        let handle = match (plan, resume) {
            (StartPlan::ReplayResume, Some(params)) => {
                debug!("重放恢复数据 [{}] hash={}", self.link, params.info_hash);
                session.add_resume(params).await?
            }
            (_, resume) => {
                match resolve_source(&self.link, self.task_id, &self.ctx.config).await? {
                    TorrentSource::Magnet(uri) => session.add_magnet(&uri, &self.save_dir, resume).await?,
                    TorrentSource::File(path) => {
                        session.add_torrent_file(&path, &self.save_dir, resume).await?
                    }
                }
            }
        };
        self.handle = Some(handle);

        let target = plan.target();
        self.state = Some(target);
        self.writer.send(StoreCommand::SetDownloadState(target));
        Ok(alerts)
    }

    async fn finalize(mut self, exit: Exit) -> DownloadResult<DownloadState> {
        let result = match exit {
            Exit::Cancelled | Exit::Closed => {
                let target = DownloadState::paused_from(self.state);
                self.pause(target).await;
                Ok(target)
            }
            Exit::Paused(target) => {
                let target = target.unwrap_or_else(|| DownloadState::paused_from(self.state));
                self.pause(target).await;
                Ok(target)
            }
            Exit::Failed(e) => {
                if e.is_fatal() {
                    error!("任务失败 [{}] task={}: {}", self.link, self.task_id, e);
                } else {
                    warn!("任务中断 [{}] task={}: {}", self.link, self.task_id, e);
                }
                self.pause(DownloadState::ErrorPaused).await;
                Err(e)
            }
        };

        self.ctx.hub.remove(&self.task_id);
        self.ctx
            .notifier
            .finish(self.task_id, &self.name, result.as_ref().ok().copied());
        info!("任务结束 [{}] task={} state={:?}", self.link, self.task_id, self.state);
        result
    }

    /// 暂停流程：保存恢复数据、移除种子、写入状态与会话、停止会话
    pub(super) async fn pause(&mut self, target: DownloadState) {
        if self.stopping {
            debug!("暂停已在进行 [{}]", self.link);
            return;
        }
        self.stopping = true;

        if let (Some(session), Some(handle)) = (self.session.as_mut(), self.handle.take()) {
            if let Err(e) = session.pause(handle) {
                warn!("引擎暂停失败 [{}]: {}", self.link, e);
            }
            match session.resume_data(handle) {
                Some(params) => {
                    let data = Bytes::from(write_resume_data(&params));
                    self.writer.send(StoreCommand::SetResumeData(data));
                }
                None => warn!("暂停时没有可保存的恢复数据 [{}]", self.link),
            }
            if let Err(e) = session.remove(handle) {
                warn!("移除种子失败 [{}]: {}", self.link, e);
            }
        }

        self.state = Some(target);
        self.writer.send(StoreCommand::SetDownloadState(target));

        if let Some(mut session) = self.session.take() {
            let blob = session.save_state();
            self.writer.send(StoreCommand::SetSessionState { blob, state: target });
            session.stop().await;
        }
        info!("任务已暂停 [{}] state={:?}", self.link, target);
    }

    /// 推送进度通知，只在整数百分比变化时发出
    pub(super) fn notify(&mut self) {
        let percent = (self.progress.clamp(0.0, 1.0) * 100.0).floor() as u32;
        if self.last_percent == Some(percent) {
            return;
        }
        self.last_percent = Some(percent);
        self.ctx.notifier.update(TaskNotification {
            task_id: self.task_id,
            title: self.name.clone(),
            percent,
            cancellable: true,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use std::path::Path;
    use tokio::sync::watch;

    use crate::config::Config;
    use crate::core::live::LiveStatusHub;
    use crate::core::scheduler::{WorkScheduler, WorkState};
    use crate::core::task::TaskNotifier;
    use crate::engine::loopback::{LoopbackEngine, LoopbackOptions};
    use crate::store::commands::{ListFiles, ResolveTaskId};

    const LINK: &str = "magnet:?xt=urn:btih:c12fe1c06bba254a9dc9f519b335aa7c1367a88a&dn=film";

    #[derive(Default)]
    struct RecordingNotifier {
        updates: Mutex<Vec<TaskNotification>>,
        finished: Mutex<Vec<Option<DownloadState>>>,
    }

    impl TaskNotifier for RecordingNotifier {
        fn update(&self, notification: TaskNotification) {
            self.updates.lock().unwrap().push(notification);
        }

        fn finish(&self, _task_id: Uuid, _title: &str, state: Option<DownloadState>) {
            self.finished.lock().unwrap().push(state);
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        ctx: TaskContext,
        engine: LoopbackEngine,
        notifier: Arc<RecordingNotifier>,
    }

    fn fixture(options: LoopbackOptions, tweak: impl FnOnce(&mut Config, &Path)) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config {
            download_dir: dir.path().join("downloads").display().to_string(),
            data_dir: dir.path().join("data").display().to_string(),
            ..Config::default()
        };
        tweak(&mut config, dir.path());
        let (tx, _rx) = watch::channel(Vec::new());
        let store = actix::Actor::start(StoreActor::open(&config.data_path(), tx).unwrap());
        let engine = LoopbackEngine::new(options);
        let notifier = Arc::new(RecordingNotifier::default());
        let ctx = TaskContext {
            config: Arc::new(config),
            store,
            hub: LiveStatusHub::new(),
            engine: Arc::new(engine.clone()),
            notifier: notifier.clone(),
        };
        Fixture { dir, ctx, engine, notifier }
    }

    fn fast() -> LoopbackOptions {
        LoopbackOptions {
            total_size: 8 * 1024,
            step: 1024,
            tick: Duration::from_millis(5),
            peers: 2,
            ..LoopbackOptions::default()
        }
    }

    async fn run_to_end(ctx: &TaskContext, task_id: Uuid) -> WorkState {
        let scheduler = WorkScheduler::new();
        let ctx = ctx.clone();
        scheduler.enqueue_unique(task_id, move |cancel| DownloadTask::run(task_id, ctx, cancel));
        tokio::time::timeout(Duration::from_secs(10), scheduler.wait(&task_id))
            .await
            .unwrap()
            .unwrap()
    }

    async fn record(ctx: &TaskContext) -> DownloadRecord {
        ctx.store.send(GetRecord { link: LINK.to_string() }).await.unwrap().unwrap()
    }

    #[actix_rt::test]
    async fn test_unknown_task_fails() {
        let fx = fixture(fast(), |_, _| {});
        let scheduler = WorkScheduler::new();
        let task_id = Uuid::new_v4();
        let ctx = fx.ctx.clone();
        scheduler.enqueue_unique(task_id, move |cancel| DownloadTask::run(task_id, ctx, cancel));
        let state = scheduler.wait(&task_id).await.unwrap();
        assert!(matches!(state, WorkState::Failed(message) if message.contains(&task_id.to_string())));
    }

    #[actix_rt::test]
    async fn test_no_seed_pauses_after_completion() {
        let fx = fixture(fast(), |config, _| config.seed_after_complete = false);
        let task_id = fx.ctx.store.send(ResolveTaskId { link: LINK.to_string() }).await.unwrap().unwrap();

        let outcome = run_to_end(&fx.ctx, task_id).await;
        assert_eq!(outcome, WorkState::Finished(DownloadState::SeedingPaused));

        let record = record(&fx.ctx).await;
        assert_eq!(record.state, DownloadState::SeedingPaused);
        assert_eq!(record.progress, 1.0);
        assert_eq!(record.name, "film");
        assert!(fx.ctx.hub.status_of(&task_id).is_none());

        let files = fx.ctx.store.send(ListFiles { link: LINK.to_string() }).await.unwrap();
        assert_eq!(files.len(), 1);

        let updates = fx.notifier.updates.lock().unwrap();
        assert_eq!(updates.last().map(|n| n.percent), Some(100));
        assert!(updates.iter().all(|n| n.cancellable));
        // 每个整数百分比最多通知一次
        let mut percents: Vec<u32> = updates.iter().map(|n| n.percent).collect();
        percents.dedup();
        assert_eq!(percents.len(), updates.len());
        assert_eq!(*fx.notifier.finished.lock().unwrap(), vec![Some(DownloadState::SeedingPaused)]);
        assert_eq!(fx.engine.journal().stops, 1);
    }

    #[actix_rt::test]
    async fn test_file_error_persists_error_paused() {
        let options = LoopbackOptions {
            fail_at: Some(0.5),
            ..fast()
        };
        let fx = fixture(options, |_, _| {});
        let task_id = fx.ctx.store.send(ResolveTaskId { link: LINK.to_string() }).await.unwrap().unwrap();

        let outcome = run_to_end(&fx.ctx, task_id).await;
        assert!(matches!(outcome, WorkState::Failed(message) if message.contains("磁盘空间不足")));
        assert_eq!(record(&fx.ctx).await.state, DownloadState::ErrorPaused);
        assert_eq!(*fx.notifier.finished.lock().unwrap(), vec![None]);
    }

    #[actix_rt::test]
    async fn test_failed_move_without_seeding_keeps_move_failure() {
        let options = LoopbackOptions {
            fail_storage_move: true,
            ..fast()
        };
        let fx = fixture(options, |config, root| {
            config.seed_after_complete = false;
            config.media_dir = root.join("media").display().to_string();
        });
        let task_id = fx.ctx.store.send(ResolveTaskId { link: LINK.to_string() }).await.unwrap().unwrap();

        let outcome = run_to_end(&fx.ctx, task_id).await;
        assert_eq!(outcome, WorkState::Finished(DownloadState::StorageMovedFailed));
        assert_eq!(record(&fx.ctx).await.state, DownloadState::StorageMovedFailed);
        assert_eq!(fx.engine.journal().moves, vec![fx.dir.path().join("media")]);
    }

    #[actix_rt::test]
    async fn test_successful_move_then_pause() {
        let fx = fixture(fast(), |config, root| {
            config.seed_after_complete = false;
            config.media_dir = root.join("media").display().to_string();
        });
        let task_id = fx.ctx.store.send(ResolveTaskId { link: LINK.to_string() }).await.unwrap().unwrap();

        let outcome = run_to_end(&fx.ctx, task_id).await;
        assert_eq!(outcome, WorkState::Finished(DownloadState::SeedingPaused));
        assert!(fx.dir.path().join("media").is_dir());
    }

    #[actix_rt::test]
    async fn test_mkdir_failure_aborts_start() {
        let blocker = tempfile::NamedTempFile::new().unwrap();
        let fx = fixture(fast(), |config, _| {
            config.download_dir = blocker.path().join("sub").display().to_string();
        });
        let task_id = fx.ctx.store.send(ResolveTaskId { link: LINK.to_string() }).await.unwrap().unwrap();
        match DownloadTask::prepare(task_id, fx.ctx.clone()).await {
            Err(DownloadError::Mkdir { .. }) => {}
            Err(other) => panic!("意外的错误: {}", other),
            Ok(_) => panic!("目录创建应当失败"),
        }
        assert!(fx.engine.journal().settings.is_empty());
    }

    #[actix_rt::test]
    async fn test_failed_move_while_seeding_keeps_running() {
        let options = LoopbackOptions {
            fail_storage_move: true,
            ..fast()
        };
        let fx = fixture(options, |config, root| {
            config.media_dir = root.join("media").display().to_string();
        });
        let task_id = fx.ctx.store.send(ResolveTaskId { link: LINK.to_string() }).await.unwrap().unwrap();

        let scheduler = WorkScheduler::new();
        let ctx = fx.ctx.clone();
        scheduler.enqueue_unique(task_id, move |cancel| DownloadTask::run(task_id, ctx, cancel));
        tokio::time::timeout(Duration::from_secs(10), async {
            while record(&fx.ctx).await.state != DownloadState::StorageMovedFailed {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        // 迁移失败后继续做种
        assert!(scheduler.is_live(&task_id));
        assert_eq!(scheduler.state(&task_id), Some(WorkState::Running));
        assert!(fx.notifier.finished.lock().unwrap().is_empty());

        assert!(scheduler.cancel(&task_id));
        let outcome = tokio::time::timeout(Duration::from_secs(10), scheduler.wait(&task_id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, WorkState::Finished(DownloadState::Paused));
        assert_eq!(record(&fx.ctx).await.state, DownloadState::Paused);
        assert_eq!(fx.engine.journal().moves, vec![fx.dir.path().join("media")]);
    }

    #[actix_rt::test]
    async fn test_torrent_alerts_publish_status() {
        let fx = fixture(fast(), |_, _| {});
        let task_id = fx.ctx.store.send(ResolveTaskId { link: LINK.to_string() }).await.unwrap().unwrap();
        let mut task = match DownloadTask::prepare(task_id, fx.ctx.clone()).await {
            Ok(task) => task,
            Err(e) => panic!("准备任务失败: {}", e),
        };
        let _alerts = task.open().await.unwrap();
        let handle = task.handle.unwrap();
        assert!(fx.ctx.hub.status_of(&task_id).is_none());

        let flow = task.on_alert(Alert::TorrentChecked {
            handle,
            name: "film".to_string(),
            files: Vec::new(),
        });
        assert!(matches!(flow, Flow::Continue));
        assert!(fx.ctx.hub.status_of(&task_id).is_some());

        fx.ctx.hub.remove(&task_id);
        let flow = task.on_alert(Alert::MetadataReceived { handle, name: "film".to_string() });
        assert!(matches!(flow, Flow::Continue));
        assert!(fx.ctx.hub.status_of(&task_id).is_some());

        let state = task.finalize(Exit::Cancelled).await.unwrap();
        assert_eq!(state, DownloadState::Paused);
        assert!(fx.ctx.hub.status_of(&task_id).is_none());
    }
}
