//! 下载编排器：任务生命周期的对外入口
//!
//! 持有存储、实时状态和调度器，所有操作都以链接或任务ID为参数，可以被任意次重复调用。

use std::sync::Arc;

use actix::{Actor, Addr};
use log::{debug, info, warn};
use tokio::sync::watch;
use uuid::Uuid;

use crate::config::Config;
use crate::core::error::{DownloadError, DownloadResult};
use crate::core::live::{LiveStatusHub, PeerMap, StatusMap};
use crate::core::scheduler::{WorkScheduler, WorkState};
use crate::core::state::DownloadState;
use crate::core::task::source::{fetched_torrent_path, LinkInspector};
use crate::core::task::{DownloadTask, TaskContext, TaskNotifier};
use crate::engine::TorrentEngine;
use crate::store::commands::{GetRecord, ListFiles, ListRecords, LookupLink, LookupTaskId, ResolveTaskId};
use crate::store::{Apply, DownloadRecord, StoreActor, StoreCommand, TorrentFileEntry};
use crate::utils::validator::{classify_link, is_http_url};

#[derive(Clone)]
pub struct DownloadManager {
    config: Arc<Config>,
    store: Addr<StoreActor>,
    hub: LiveStatusHub,
    scheduler: WorkScheduler,
    engine: Arc<dyn TorrentEngine>,
    notifier: Arc<dyn TaskNotifier>,
    inspector: Arc<dyn LinkInspector>,
    records_rx: watch::Receiver<Vec<DownloadRecord>>,
}

impl DownloadManager {
    /// 打开数据目录并启动存储 actor，需要在 actix 系统内调用
    pub fn open(
        config: Config,
        engine: Arc<dyn TorrentEngine>,
        notifier: Arc<dyn TaskNotifier>,
        inspector: Arc<dyn LinkInspector>,
    ) -> DownloadResult<Self> {
        let (records_tx, records_rx) = watch::channel(Vec::new());
        let store = StoreActor::open(&config.data_path(), records_tx)?.start();
        info!("下载管理器已启动，数据目录: {}", config.data_path().display());
        Ok(Self {
            config: Arc::new(config),
            store,
            hub: LiveStatusHub::new(),
            scheduler: WorkScheduler::new(),
            engine,
            notifier,
            inspector,
            records_rx,
        })
    }

    fn context(&self) -> TaskContext {
        TaskContext {
            config: self.config.clone(),
            store: self.store.clone(),
            hub: self.hub.clone(),
            engine: self.engine.clone(),
            notifier: self.notifier.clone(),
        }
    }

    fn enqueue(&self, task_id: Uuid) -> bool {
        let ctx = self.context();
        let spawned = self
            .scheduler
            .enqueue_unique(task_id, move |cancel| DownloadTask::run(task_id, ctx, cancel));
        if !spawned {
            debug!("任务 {} 已在运行", task_id);
        }
        spawned
    }

    /// 检查链接能否交给引擎：磁力链接、`.torrent` 地址（后缀或 MIME）或本地种子文件
    async fn check_link(&self, link: &str) -> DownloadResult<()> {
        if classify_link(link, None).is_some() {
            return Ok(());
        }
        if is_http_url(link) {
            match self.inspector.content_type(link).await {
                Ok(mime) => {
                    if classify_link(link, mime.as_deref()).is_some() {
                        return Ok(());
                    }
                    debug!("链接 MIME 类型不是种子: {} ({:?})", link, mime);
                }
                Err(e) => warn!("探测链接类型失败 {}: {}", link, e),
            }
        }
        Err(DownloadError::UnresolvableLink(link.to_string()))
    }

    /// 保存目录无法创建时直接报告给调用方
    fn ensure_save_dir(&self) -> DownloadResult<()> {
        let save_dir = self.config.download_path();
        std::fs::create_dir_all(&save_dir).map_err(|source| DownloadError::Mkdir {
            path: save_dir.display().to_string(),
            source,
        })
    }

    /// 开始下载；重复调用不会产生第二个任务
    pub async fn start(&self, link: &str) -> DownloadResult<Uuid> {
        let link = link.trim();
        self.check_link(link).await?;
        self.ensure_save_dir()?;
        let task_id = self.store.send(ResolveTaskId { link: link.to_string() }).await??;
        if self.enqueue(task_id) {
            info!("开始下载 [{}] task={}", link, task_id);
        }
        Ok(task_id)
    }

    /// 暂停：任务存活时请求取消（由任务自己写入暂停态），否则直接写入
    pub async fn pause(&self, task_id: Uuid, link: &str) -> DownloadResult<()> {
        if self.scheduler.cancel(&task_id) {
            info!("请求暂停 [{}] task={}", link, task_id);
            return Ok(());
        }
        self.store
            .send(Apply::new(link, task_id, StoreCommand::MarkPaused))
            .await??;
        info!("已标记暂停 [{}] task={}", link, task_id);
        Ok(())
    }

    /// 以原任务ID重新启动
    pub async fn resume(&self, task_id: Uuid, link: &str) -> DownloadResult<()> {
        match self.store.send(LookupLink { task_id }).await? {
            Some(known) if known == link.trim() => {}
            Some(known) => {
                warn!("任务 {} 对应的链接是 {}，而不是 {}", task_id, known, link);
                return Err(DownloadError::UnknownTask(task_id));
            }
            None => return Err(DownloadError::UnknownTask(task_id)),
        }
        if self.enqueue(task_id) {
            info!("恢复下载 [{}] task={}", link, task_id);
        }
        Ok(())
    }

    pub async fn retry(&self, task_id: Uuid, link: &str) -> DownloadResult<()> {
        self.resume(task_id, link).await
    }

    /// 删除任务及其全部持久化数据；重复删除视为成功
    pub async fn delete(&self, task_id: Uuid, link: &str) -> DownloadResult<()> {
        self.hub.remove(&task_id);
        if self.scheduler.is_live(&task_id) {
            debug!("等待任务 {} 停止后删除", task_id);
            self.scheduler.cancel(&task_id);
        }
        self.scheduler.wait(&task_id).await;
        self.scheduler.forget(&task_id);
        self.hub.remove(&task_id);

        self.store
            .send(Apply::new(link, task_id, StoreCommand::DeleteSessionState))
            .await??;
        self.store
            .send(Apply::new(link, task_id, StoreCommand::DeleteRecord))
            .await??;

        let fetched = fetched_torrent_path(&self.config.download_path(), &task_id);
        match tokio::fs::remove_file(&fetched).await {
            Ok(()) => debug!("已删除种子文件 {}", fetched.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("删除种子文件失败 {}: {}", fetched.display(), e),
        }
        info!("已删除 [{}] task={}", link, task_id);
        Ok(())
    }

    /// 重新启动进程退出时仍在下载或做种的任务
    pub async fn resume_interrupted(&self) -> DownloadResult<Vec<Uuid>> {
        let records = self.list_records().await?;
        let mut resumed = Vec::new();
        for record in records
            .into_iter()
            .filter(|r| matches!(r.state, DownloadState::Downloading | DownloadState::Seeding))
        {
            let task_id = self.store.send(ResolveTaskId { link: record.link.clone() }).await??;
            if self.enqueue(task_id) {
                info!("恢复中断的任务 [{}] state={}", record.link, record.state);
                resumed.push(task_id);
            }
        }
        Ok(resumed)
    }

    pub fn records(&self) -> watch::Receiver<Vec<DownloadRecord>> {
        self.records_rx.clone()
    }

    /// 当前记录列表的快照，按创建时间排序
    pub async fn list_records(&self) -> DownloadResult<Vec<DownloadRecord>> {
        Ok(self.store.send(ListRecords).await?)
    }

    /// 链接对应的任务ID，未分配过时为 `None`
    pub async fn task_id_of(&self, link: &str) -> DownloadResult<Option<Uuid>> {
        Ok(self.store.send(LookupTaskId { link: link.trim().to_string() }).await?)
    }

    pub async fn record(&self, link: &str) -> DownloadResult<Option<DownloadRecord>> {
        Ok(self.store.send(GetRecord { link: link.to_string() }).await?)
    }

    pub async fn files(&self, link: &str) -> DownloadResult<Vec<TorrentFileEntry>> {
        Ok(self.store.send(ListFiles { link: link.to_string() }).await?)
    }

    pub fn peers(&self) -> watch::Receiver<PeerMap> {
        self.hub.subscribe_peers()
    }

    pub fn statuses(&self) -> watch::Receiver<StatusMap> {
        self.hub.subscribe_statuses()
    }

    pub fn task_state(&self, task_id: &Uuid) -> Option<WorkState> {
        self.scheduler.state(task_id)
    }

    /// 等待任务结束；从未启动过的任务返回 `None`
    pub async fn wait(&self, task_id: &Uuid) -> Option<WorkState> {
        self.scheduler.wait(task_id).await
    }

    /// 暂停全部存活任务并等待它们结束
    pub async fn shutdown(&self) {
        let live = self.scheduler.live_keys();
        for task_id in &live {
            self.scheduler.cancel(task_id);
        }
        for task_id in &live {
            self.scheduler.wait(task_id).await;
        }
        if !live.is_empty() {
            info!("已暂停 {} 个任务", live.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio_test::{assert_err, assert_ok};

    use crate::core::task::SilentNotifier;
    use crate::engine::loopback::{LoopbackEngine, LoopbackOptions};
    use crate::store::commands::GetSessionState;

    const LINK: &str = "magnet:?xt=urn:btih:c12fe1c06bba254a9dc9f519b335aa7c1367a88a&dn=film";
    const WAIT: Duration = Duration::from_secs(10);

    struct FixedInspector(Option<&'static str>);

    #[async_trait(?Send)]
    impl LinkInspector for FixedInspector {
        async fn content_type(&self, _url: &str) -> DownloadResult<Option<String>> {
            Ok(self.0.map(str::to_string))
        }
    }

    fn slow() -> LoopbackOptions {
        LoopbackOptions {
            total_size: 1024 * 1024,
            step: 1024,
            tick: Duration::from_millis(10),
            peers: 3,
            ..LoopbackOptions::default()
        }
    }

    fn manager(dir: &tempfile::TempDir, engine: &LoopbackEngine, mime: Option<&'static str>) -> DownloadManager {
        let config = Config {
            download_dir: dir.path().join("downloads").display().to_string(),
            data_dir: dir.path().join("data").display().to_string(),
            ..Config::default()
        };
        DownloadManager::open(
            config,
            Arc::new(engine.clone()),
            Arc::new(SilentNotifier),
            Arc::new(FixedInspector(mime)),
        )
        .unwrap()
    }

    async fn wait_for_record(
        manager: &DownloadManager,
        check: impl Fn(&DownloadRecord) -> bool,
    ) -> DownloadRecord {
        let mut rx = manager.records();
        let found = tokio::time::timeout(WAIT, rx.wait_for(|list| list.iter().any(|r| r.link == LINK && check(r))))
            .await
            .unwrap()
            .unwrap()
            .iter()
            .find(|r| r.link == LINK)
            .cloned();
        found.unwrap()
    }

    #[actix_rt::test]
    async fn test_start_reaches_downloading_with_live_status() {
        let dir = tempfile::tempdir().unwrap();
        let engine = LoopbackEngine::new(slow());
        let manager = manager(&dir, &engine, None);

        let task_id = assert_ok!(manager.start(LINK).await);
        let record = wait_for_record(&manager, |r| r.state == DownloadState::Downloading && r.progress > 0.0).await;
        assert_eq!(record.task_id, task_id);
        assert_eq!(record.name, "film");
        assert_eq!(manager.task_id_of(&format!(" {} ", LINK)).await.unwrap(), Some(task_id));
        assert_eq!(manager.task_id_of("magnet:?xt=urn:btih:other").await.unwrap(), None);
        let listed = manager.list_records().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].link, LINK);

        let mut statuses = manager.statuses();
        let _ = tokio::time::timeout(WAIT, statuses.wait_for(|map| map.contains_key(&task_id)))
            .await
            .unwrap()
            .unwrap();
        let mut peers = manager.peers();
        let _ = tokio::time::timeout(WAIT, peers.wait_for(|map| map.get(&task_id).map_or(false, |p| !p.is_empty())))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(manager.task_state(&task_id), Some(WorkState::Running));

        manager.shutdown().await;
        assert!(manager.statuses().borrow().is_empty());
    }

    #[actix_rt::test]
    async fn test_concurrent_starts_share_one_task() {
        let dir = tempfile::tempdir().unwrap();
        let engine = LoopbackEngine::new(slow());
        let manager = manager(&dir, &engine, None);

        let (first, second) = tokio::join!(manager.start(LINK), manager.start(LINK));
        assert_eq!(first.unwrap(), second.unwrap());
        wait_for_record(&manager, |r| r.state == DownloadState::Downloading).await;

        let journal = engine.journal();
        assert_eq!(journal.settings.len(), 1);
        assert_eq!(journal.adds.len(), 1);
        manager.shutdown().await;
    }

    #[actix_rt::test]
    async fn test_pause_then_resume_continues_download() {
        let dir = tempfile::tempdir().unwrap();
        let engine = LoopbackEngine::new(slow());
        let manager = manager(&dir, &engine, None);

        let task_id = manager.start(LINK).await.unwrap();
        wait_for_record(&manager, |r| r.state == DownloadState::Downloading && r.progress > 0.0).await;

        assert_ok!(manager.pause(task_id, LINK).await);
        let outcome = tokio::time::timeout(WAIT, manager.wait(&task_id)).await.unwrap();
        assert_eq!(outcome, Some(WorkState::Finished(DownloadState::Paused)));
        let paused = manager.record(LINK).await.unwrap().unwrap();
        assert_eq!(paused.state, DownloadState::Paused);
        assert!(manager.statuses().borrow().get(&task_id).is_none());

        // 任务已结束，再次暂停直接写入
        assert_ok!(manager.pause(task_id, LINK).await);

        assert_ok!(manager.resume(task_id, LINK).await);
        let resumed = wait_for_record(&manager, |r| r.state == DownloadState::Downloading).await;
        assert_eq!(resumed.task_id, task_id);
        assert!(resumed.progress >= paused.progress);

        let journal = engine.journal();
        assert_eq!(journal.adds.len(), 2);
        assert!(!journal.adds[0].with_resume);
        assert!(journal.adds[1].with_resume);
        assert_eq!(journal.warm_starts, 1);
        manager.shutdown().await;
    }

    #[actix_rt::test]
    async fn test_pause_idle_seeding_record() {
        let dir = tempfile::tempdir().unwrap();
        let engine = LoopbackEngine::new(LoopbackOptions {
            total_size: 4 * 1024,
            step: 1024,
            tick: Duration::from_millis(5),
            ..slow()
        });
        let manager = manager(&dir, &engine, None);

        let task_id = manager.start(LINK).await.unwrap();
        wait_for_record(&manager, |r| r.state == DownloadState::Seeding).await;
        manager.shutdown().await;
        assert_eq!(
            manager.record(LINK).await.unwrap().map(|r| r.state),
            Some(DownloadState::SeedingPaused)
        );

        assert_ok!(manager.pause(task_id, LINK).await);
        assert_eq!(
            manager.record(LINK).await.unwrap().map(|r| r.state),
            Some(DownloadState::SeedingPaused)
        );

        // 做种暂停的任务重放恢复数据
        assert_ok!(manager.resume(task_id, LINK).await);
        wait_for_record(&manager, |r| r.state == DownloadState::Seeding).await;
        assert_eq!(engine.journal().adds.last().map(|a| a.kind), Some("resume"));
        manager.shutdown().await;
    }

    #[actix_rt::test]
    async fn test_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let engine = LoopbackEngine::new(slow());
        let manager = manager(&dir, &engine, None);

        let task_id = manager.start(LINK).await.unwrap();
        wait_for_record(&manager, |r| r.state == DownloadState::Downloading).await;

        assert_ok!(manager.delete(task_id, LINK).await);
        assert_ok!(manager.delete(task_id, LINK).await);

        assert!(manager.record(LINK).await.unwrap().is_none());
        assert!(manager.files(LINK).await.unwrap().is_empty());
        let blob = manager.store.send(GetSessionState { link: LINK.to_string() }).await.unwrap();
        assert!(blob.is_none());
        assert!(manager.statuses().borrow().get(&task_id).is_none());
        assert!(manager.records().borrow().is_empty());
        assert_eq!(manager.task_state(&task_id), None);
    }

    #[actix_rt::test]
    async fn test_unresolvable_links_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let engine = LoopbackEngine::new(slow());
        let manager = manager(&dir, &engine, Some("text/html"));

        let err = assert_err!(manager.start("ftp://example.com/a.iso").await);
        assert!(matches!(err, DownloadError::UnresolvableLink(_)));
        let err = assert_err!(manager.start("https://example.com/download?id=7").await);
        assert!(matches!(err, DownloadError::UnresolvableLink(_)));

        assert!(manager.records().borrow().is_empty());
        assert!(engine.journal().settings.is_empty());

        let err = assert_err!(manager.resume(Uuid::new_v4(), LINK).await);
        assert!(matches!(err, DownloadError::UnknownTask(_)));
    }

    #[actix_rt::test]
    async fn test_start_reports_mkdir_failure() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = tempfile::NamedTempFile::new().unwrap();
        let engine = LoopbackEngine::new(slow());
        let config = Config {
            download_dir: blocker.path().join("sub").display().to_string(),
            data_dir: dir.path().join("data").display().to_string(),
            ..Config::default()
        };
        let manager = DownloadManager::open(
            config,
            Arc::new(engine.clone()),
            Arc::new(SilentNotifier),
            Arc::new(FixedInspector(None)),
        )
        .unwrap();

        let err = assert_err!(manager.start(LINK).await);
        assert!(matches!(err, DownloadError::Mkdir { .. }));
        assert!(manager.list_records().await.unwrap().is_empty());
        assert_eq!(manager.task_id_of(LINK).await.unwrap(), None);
        assert!(engine.journal().settings.is_empty());
    }

    #[actix_rt::test]
    async fn test_resume_interrupted_restarts_live_records() {
        let dir = tempfile::tempdir().unwrap();
        let engine = LoopbackEngine::new(slow());
        let manager = manager(&dir, &engine, None);
        let task_id = manager.start(LINK).await.unwrap();
        wait_for_record(&manager, |r| r.state == DownloadState::Downloading).await;
        // 模拟进程退出：直接取消后把状态写回下载中
        manager.shutdown().await;
        manager
            .store
            .send(Apply::new(LINK, task_id, StoreCommand::SetDownloadState(DownloadState::Downloading)))
            .await
            .unwrap()
            .unwrap();

        let resumed = manager.resume_interrupted().await.unwrap();
        assert_eq!(resumed, vec![task_id]);
        assert!(manager.resume_interrupted().await.unwrap().is_empty());
        manager.shutdown().await;
    }
}
