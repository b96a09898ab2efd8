//! 回环引擎：不联网，按固定节拍模拟一个种子从获取元数据到做种的全过程
//!
//! 用于测试与 `--loopback` 演示模式。所有会话共享一份 `LoopbackJournal`，
//! 记录收到的设置与添加调用，便于断言。

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, info, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::core::error::{DownloadError, DownloadResult};
use crate::engine::params::{AddTorrentParams, InfoHash};
use crate::engine::{
    Alert, EngineSession, EngineTorrentState, PeerInfo, SessionSettings, TorrentEngine, TorrentFile,
    TorrentHandle, TorrentStatus,
};
use crate::utils::bencode::Value;
use crate::utils::validator::parse_magnet;

const PEER_CLIENTS: [&str; 5] = [
    "qBittorrent 4.6.2",
    "Transmission 4.0.5",
    "libtorrent 2.0.9",
    "Deluge 2.1.1",
    "μTorrent 3.6",
];

#[derive(Debug, Clone)]
pub struct LoopbackOptions {
    pub total_size: u64,
    /// 每个节拍下载的字节数
    pub step: u64,
    pub tick: Duration,
    pub peers: usize,
    /// 进度达到该值时注入一次文件错误
    pub fail_at: Option<f32>,
    /// `move_storage` 总是失败
    pub fail_storage_move: bool,
    /// 为空时按种子名生成单文件
    pub files: Vec<TorrentFile>,
}

impl Default for LoopbackOptions {
    fn default() -> Self {
        Self {
            total_size: 8 * 1024 * 1024,
            step: 512 * 1024,
            tick: Duration::from_millis(100),
            peers: 4,
            fail_at: None,
            fail_storage_move: false,
            files: Vec::new(),
        }
    }
}

/// 一次添加调用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddCall {
    /// "magnet" / "file" / "resume"
    pub kind: &'static str,
    pub source: String,
    pub with_resume: bool,
}

#[derive(Debug, Clone, Default)]
pub struct LoopbackJournal {
    pub settings: Vec<SessionSettings>,
    pub warm_starts: usize,
    pub adds: Vec<AddCall>,
    pub moves: Vec<PathBuf>,
    pub stops: usize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone)]
pub struct LoopbackEngine {
    options: LoopbackOptions,
    journal: Arc<Mutex<LoopbackJournal>>,
    next_handle: Arc<AtomicU64>,
}

impl LoopbackEngine {
    pub fn new(options: LoopbackOptions) -> Self {
        Self {
            options,
            journal: Arc::new(Mutex::new(LoopbackJournal::default())),
            next_handle: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn journal(&self) -> LoopbackJournal {
        lock(&self.journal).clone()
    }
}

#[async_trait]
impl TorrentEngine for LoopbackEngine {
    async fn open_session(
        &self,
        settings: SessionSettings,
        warm_state: Option<Bytes>,
    ) -> DownloadResult<Box<dyn EngineSession>> {
        {
            let mut journal = lock(&self.journal);
            if let Some(blob) = &warm_state {
                match Value::decode(blob) {
                    Ok(_) => journal.warm_starts += 1,
                    Err(e) => warn!("会话状态无法解析，冷启动: {}", e),
                }
            }
            journal.settings.push(settings.clone());
        }
        debug!(
            "回环会话启动 client={} port={} dht={} lsd={}",
            settings.client_id, settings.listen_port, settings.enable_dht, settings.enable_lsd
        );

        let (alerts_tx, alerts_rx) = mpsc::unbounded_channel();
        Ok(Box::new(LoopbackSession {
            options: self.options.clone(),
            settings,
            journal: self.journal.clone(),
            next_handle: self.next_handle.clone(),
            alerts_tx,
            alerts_rx: Some(alerts_rx),
            torrents: Arc::new(Mutex::new(HashMap::new())),
            producers: HashMap::new(),
        }))
    }
}

/// 模拟中的单个种子
struct SimTorrent {
    info_hash: InfoHash,
    name: String,
    save_path: PathBuf,
    source: String,
    trackers: Vec<String>,
    files: Vec<TorrentFile>,
    total: u64,
    done: u64,
    uploaded: u64,
    state: EngineTorrentState,
    peers: Vec<PeerInfo>,
    failed: bool,
    added_time: i64,
    completed_time: i64,
    ticks: u64,
}

impl SimTorrent {
    fn progress(&self) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        (self.done as f64 / self.total as f64) as f32
    }

    fn status(&self, options: &LoopbackOptions) -> TorrentStatus {
        let downloading = self.state == EngineTorrentState::Downloading;
        TorrentStatus {
            name: self.name.clone(),
            state: self.state,
            progress: self.progress(),
            total_done: self.done,
            total_wanted: self.total,
            total_uploaded: self.uploaded,
            download_rate: if downloading { rate_of(options) } else { 0 },
            upload_rate: if downloading { 0 } else { rate_of(options) / 4 },
            num_peers: self.peers.len() as u32,
            num_seeds: self.peers.iter().filter(|p| p.seed).count() as u32,
            save_path: self.save_path.display().to_string(),
        }
    }

    fn params(&self, options: &LoopbackOptions) -> AddTorrentParams {
        let piece_count = self.total.div_ceil(options.step.max(1)) as usize;
        let done_pieces = (self.done / options.step.max(1)) as usize;
        let mut pieces = vec![0u8; piece_count.div_ceil(8)];
        for index in 0..done_pieces.min(piece_count) {
            pieces[index / 8] |= 0x80 >> (index % 8);
        }
        AddTorrentParams {
            info_hash: self.info_hash,
            name: self.name.clone(),
            save_path: self.save_path.clone(),
            source: self.source.clone(),
            trackers: self.trackers.clone(),
            total_size: self.total,
            total_downloaded: self.done,
            total_uploaded: self.uploaded,
            pieces,
            seed_mode: self.done >= self.total,
            added_time: self.added_time,
            completed_time: self.completed_time,
        }
    }

    /// 推进一个节拍，返回要发出的告警；第二个值为 true 时停止推进
    fn advance(&mut self, handle: TorrentHandle, options: &LoopbackOptions) -> (Vec<Alert>, bool) {
        self.ticks += 1;
        let mut alerts = Vec::new();

        if self.ticks % 10 == 0 && !self.peers.is_empty() {
            let gone = self.peers.remove(0);
            alerts.push(Alert::PeerDisconnected {
                handle,
                address: gone.address,
                reason: "连接超时".to_string(),
            });
            let fresh = random_peer(self.progress());
            alerts.push(Alert::PeerConnected { handle, address: fresh.address });
            self.peers.push(fresh);
        }

        if self.state == EngineTorrentState::Seeding {
            self.uploaded += options.step / 4;
            alerts.push(Alert::StatsUpdate { handle });
            return (alerts, false);
        }

        self.done = (self.done + options.step).min(self.total);
        if let Some(limit) = options.fail_at {
            if !self.failed && self.progress() >= limit {
                self.failed = true;
                let path = self.files.first().map(|f| f.path.clone()).unwrap_or_default();
                alerts.push(Alert::FileError {
                    handle,
                    path,
                    message: "磁盘空间不足".to_string(),
                });
                return (alerts, true);
            }
        }
        alerts.push(Alert::StatsUpdate { handle });
        if self.ticks % 3 == 0 {
            refresh_peers(&mut self.peers);
            alerts.push(Alert::PeerInfo { handle });
        }

        if self.done >= self.total {
            self.completed_time = chrono::Utc::now().timestamp();
            alerts.push(Alert::StateChanged {
                handle,
                previous: EngineTorrentState::Downloading,
                state: EngineTorrentState::Finished,
            });
            alerts.push(Alert::TorrentFinished { handle });
            self.state = EngineTorrentState::Seeding;
            alerts.push(Alert::StateChanged {
                handle,
                previous: EngineTorrentState::Finished,
                state: EngineTorrentState::Seeding,
            });
        }
        (alerts, false)
    }
}

fn rate_of(options: &LoopbackOptions) -> u64 {
    let millis = options.tick.as_millis().max(1) as u64;
    options.step * 1000 / millis
}

fn random_peer(progress: f32) -> PeerInfo {
    let mut rng = rand::thread_rng();
    let seed = rng.gen_bool(0.3);
    PeerInfo {
        address: SocketAddr::from((
            [10, 0, rng.gen::<u8>(), rng.gen_range(1..255)],
            rng.gen_range(6881..6999),
        )),
        client: PEER_CLIENTS.choose(&mut rng).copied().unwrap_or("unknown").to_string(),
        progress: if seed { 1.0 } else { rng.gen_range(0.0..=1.0f32).max(progress) },
        download_rate: rng.gen_range(0..256 * 1024),
        upload_rate: rng.gen_range(0..128 * 1024),
        seed,
    }
}

fn refresh_peers(peers: &mut [PeerInfo]) {
    let mut rng = rand::thread_rng();
    for peer in peers.iter_mut().filter(|p| !p.seed) {
        peer.progress = (peer.progress + rng.gen_range(0.0..0.05f32)).min(1.0);
        peer.download_rate = rng.gen_range(0..256 * 1024);
    }
}

/// 从种子文件内容推导 info-hash 与名称
fn describe_torrent_file(data: &[u8], file: &Path) -> (InfoHash, Option<String>) {
    let mut hash = [0u8; 20];
    for (round, chunk) in hash.chunks_mut(8).enumerate() {
        let mut hasher = DefaultHasher::new();
        round.hash(&mut hasher);
        data.hash(&mut hasher);
        let digest = hasher.finish().to_be_bytes();
        chunk.copy_from_slice(&digest[..chunk.len()]);
    }
    let name = Value::decode(data)
        .ok()
        .and_then(|root| root.get("info")?.get("name")?.as_str().map(str::to_string))
        .or_else(|| file.file_stem().map(|s| s.to_string_lossy().into_owned()));
    (InfoHash(hash), name)
}

pub struct LoopbackSession {
    options: LoopbackOptions,
    settings: SessionSettings,
    journal: Arc<Mutex<LoopbackJournal>>,
    next_handle: Arc<AtomicU64>,
    alerts_tx: mpsc::UnboundedSender<Alert>,
    alerts_rx: Option<mpsc::UnboundedReceiver<Alert>>,
    torrents: Arc<Mutex<HashMap<TorrentHandle, SimTorrent>>>,
    producers: HashMap<TorrentHandle, JoinHandle<()>>,
}

impl LoopbackSession {
    fn record_add(&self, kind: &'static str, source: String, with_resume: bool) {
        lock(&self.journal).adds.push(AddCall { kind, source, with_resume });
    }

    fn insert(
        &mut self,
        info_hash: InfoHash,
        name: String,
        save_path: &Path,
        source: String,
        trackers: Vec<String>,
        resume: Option<AddTorrentParams>,
        fetch_metadata: bool,
    ) -> TorrentHandle {
        let handle = TorrentHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        let resume = resume.filter(|params| {
            let matches = params.info_hash == info_hash;
            if !matches {
                warn!("恢复数据的 info-hash 不匹配 ({} != {})，忽略", params.info_hash, info_hash);
            }
            matches
        });
        let total = resume
            .as_ref()
            .map(|p| p.total_size)
            .filter(|size| *size > 0)
            .unwrap_or(self.options.total_size);
        let files = if self.options.files.is_empty() {
            vec![TorrentFile {
                path: format!("{}/{}.bin", name, name),
                size: total,
            }]
        } else {
            self.options.files.clone()
        };
        let done = resume.as_ref().map_or(0, |p| p.total_downloaded.min(total));
        let torrent = SimTorrent {
            info_hash,
            name,
            save_path: save_path.to_path_buf(),
            source,
            trackers,
            files,
            total,
            done,
            uploaded: resume.as_ref().map_or(0, |p| p.total_uploaded),
            state: if done >= total {
                EngineTorrentState::Seeding
            } else {
                EngineTorrentState::Downloading
            },
            peers: (0..self.options.peers).map(|_| random_peer(0.0)).collect(),
            failed: false,
            added_time: resume
                .as_ref()
                .map_or_else(|| chrono::Utc::now().timestamp(), |p| p.added_time),
            completed_time: resume.as_ref().map_or(0, |p| p.completed_time),
            ticks: 0,
        };
        lock(&self.torrents).insert(handle, torrent);

        let producer = tokio::spawn(produce(
            handle,
            self.options.clone(),
            self.torrents.clone(),
            self.alerts_tx.clone(),
            fetch_metadata,
        ));
        self.producers.insert(handle, producer);
        handle
    }

    fn stop_producer(&mut self, handle: TorrentHandle) {
        if let Some(producer) = self.producers.remove(&handle) {
            producer.abort();
        }
    }

    fn with_torrent<R>(
        &self,
        handle: TorrentHandle,
        f: impl FnOnce(&mut SimTorrent) -> R,
    ) -> DownloadResult<R> {
        let mut torrents = lock(&self.torrents);
        let torrent = torrents
            .get_mut(&handle)
            .ok_or_else(|| DownloadError::Engine(format!("无效的种子句柄 {:?}", handle)))?;
        Ok(f(torrent))
    }
}

async fn produce(
    handle: TorrentHandle,
    options: LoopbackOptions,
    torrents: Arc<Mutex<HashMap<TorrentHandle, SimTorrent>>>,
    alerts: mpsc::UnboundedSender<Alert>,
    fetch_metadata: bool,
) {
    let opening = {
        let torrents = lock(&torrents);
        let Some(torrent) = torrents.get(&handle) else {
            return;
        };
        let mut opening = Vec::new();
        if fetch_metadata {
            opening.push(Alert::StateChanged {
                handle,
                previous: EngineTorrentState::DownloadingMetadata,
                state: EngineTorrentState::CheckingFiles,
            });
            opening.push(Alert::MetadataReceived {
                handle,
                name: torrent.name.clone(),
            });
        }
        opening.push(Alert::TorrentChecked {
            handle,
            name: torrent.name.clone(),
            files: torrent.files.clone(),
        });
        opening.push(Alert::StateChanged {
            handle,
            previous: if fetch_metadata {
                EngineTorrentState::CheckingFiles
            } else {
                EngineTorrentState::CheckingResumeData
            },
            state: torrent.state,
        });
        opening.extend(
            torrent
                .peers
                .iter()
                .map(|peer| Alert::PeerConnected { handle, address: peer.address }),
        );
        opening
    };
    for alert in opening {
        if alerts.send(alert).is_err() {
            return;
        }
    }

    let mut ticker = tokio::time::interval(options.tick);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let (batch, halt) = {
            let mut torrents = lock(&torrents);
            match torrents.get_mut(&handle) {
                Some(torrent) => torrent.advance(handle, &options),
                None => return,
            }
        };
        for alert in batch {
            if alerts.send(alert).is_err() {
                return;
            }
        }
        if halt {
            return;
        }
    }
}

#[async_trait]
impl EngineSession for LoopbackSession {
    fn take_alerts(&mut self) -> Option<mpsc::UnboundedReceiver<Alert>> {
        self.alerts_rx.take()
    }

    async fn add_magnet(
        &mut self,
        uri: &str,
        save_path: &Path,
        resume: Option<AddTorrentParams>,
    ) -> DownloadResult<TorrentHandle> {
        let magnet = parse_magnet(uri)
            .ok_or_else(|| DownloadError::Engine(format!("无法解析磁力链接: {}", uri)))?;
        self.record_add("magnet", uri.to_string(), resume.is_some());
        let name = magnet
            .display_name
            .unwrap_or_else(|| magnet.info_hash.to_hex());
        let fetch_metadata = resume.is_none();
        Ok(self.insert(
            magnet.info_hash,
            name,
            save_path,
            uri.to_string(),
            magnet.trackers,
            resume,
            fetch_metadata,
        ))
    }

    async fn add_torrent_file(
        &mut self,
        file: &Path,
        save_path: &Path,
        resume: Option<AddTorrentParams>,
    ) -> DownloadResult<TorrentHandle> {
        let data = tokio::fs::read(file).await?;
        let (info_hash, name) = describe_torrent_file(&data, file);
        let source = file.display().to_string();
        self.record_add("file", source.clone(), resume.is_some());
        let name = name.unwrap_or_else(|| info_hash.to_hex());
        Ok(self.insert(info_hash, name, save_path, source, Vec::new(), resume, false))
    }

    async fn add_resume(&mut self, params: AddTorrentParams) -> DownloadResult<TorrentHandle> {
        self.record_add("resume", params.info_hash.to_hex(), true);
        let save_path = params.save_path.clone();
        Ok(self.insert(
            params.info_hash,
            params.name.clone(),
            &save_path,
            params.source.clone(),
            params.trackers.clone(),
            Some(params),
            false,
        ))
    }

    fn pause(&mut self, handle: TorrentHandle) -> DownloadResult<()> {
        self.with_torrent(handle, |torrent| {
            for peer in &mut torrent.peers {
                peer.download_rate = 0;
                peer.upload_rate = 0;
            }
        })?;
        self.stop_producer(handle);
        Ok(())
    }

    fn request_resume_data(&mut self, handle: TorrentHandle) -> DownloadResult<()> {
        let options = self.options.clone();
        let params = self.with_torrent(handle, |torrent| torrent.params(&options))?;
        // 会话已停止时无人接收，忽略
        let _ = self.alerts_tx.send(Alert::SaveResumeData { handle, params });
        Ok(())
    }

    fn resume_data(&self, handle: TorrentHandle) -> Option<AddTorrentParams> {
        lock(&self.torrents)
            .get(&handle)
            .map(|torrent| torrent.params(&self.options))
    }

    fn move_storage(&mut self, handle: TorrentHandle, path: &Path) -> DownloadResult<()> {
        lock(&self.journal).moves.push(path.to_path_buf());
        let alert = if self.options.fail_storage_move {
            Alert::StorageMovedFailed {
                handle,
                path: path.display().to_string(),
                message: "跨设备移动失败".to_string(),
                operation: "rename".to_string(),
            }
        } else {
            self.with_torrent(handle, |torrent| torrent.save_path = path.to_path_buf())?;
            Alert::StorageMoved {
                handle,
                path: path.display().to_string(),
            }
        };
        let _ = self.alerts_tx.send(alert);
        Ok(())
    }

    fn remove(&mut self, handle: TorrentHandle) -> DownloadResult<()> {
        self.stop_producer(handle);
        lock(&self.torrents).remove(&handle);
        Ok(())
    }

    fn status(&self, handle: TorrentHandle) -> Option<TorrentStatus> {
        lock(&self.torrents)
            .get(&handle)
            .map(|torrent| torrent.status(&self.options))
    }

    fn peers(&self, handle: TorrentHandle) -> Vec<PeerInfo> {
        lock(&self.torrents)
            .get(&handle)
            .map(|torrent| torrent.peers.clone())
            .unwrap_or_default()
    }

    fn save_state(&self) -> Bytes {
        let settings = &self.settings;
        let state = Value::dict()
            .insert("client_id", Value::string(&settings.client_id))
            .insert("peer_fingerprint", Value::string(&settings.peer_fingerprint))
            .insert("listen_port", Value::integer(settings.listen_port as i64))
            .insert("enable_dht", Value::integer(settings.enable_dht as i64))
            .insert("enable_lsd", Value::integer(settings.enable_lsd as i64))
            .insert("torrents", Value::integer(lock(&self.torrents).len() as i64));
        Bytes::from(state.encode())
    }

    async fn stop(&mut self) {
        for (_, producer) in self.producers.drain() {
            producer.abort();
        }
        lock(&self.torrents).clear();
        lock(&self.journal).stops += 1;
        let _ = self.alerts_tx.send(Alert::SessionStopped);
        info!("回环会话已停止");
    }
}

impl Drop for LoopbackSession {
    fn drop(&mut self) {
        for (_, producer) in self.producers.drain() {
            producer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    const LINK: &str = "magnet:?xt=urn:btih:c12fe1c06bba254a9dc9f519b335aa7c1367a88a&dn=film";

    fn fast() -> LoopbackOptions {
        LoopbackOptions {
            total_size: 4 * 1024,
            step: 1024,
            tick: Duration::from_millis(5),
            peers: 2,
            ..LoopbackOptions::default()
        }
    }

    async fn open(engine: &LoopbackEngine) -> Box<dyn EngineSession> {
        let settings = SessionSettings::from_config(&Config::default());
        engine.open_session(settings, None).await.unwrap()
    }

    #[tokio::test]
    async fn test_magnet_runs_to_seeding() {
        let engine = LoopbackEngine::new(fast());
        let mut session = open(&engine).await;
        let mut alerts = session.take_alerts().unwrap();
        assert!(session.take_alerts().is_none());

        let handle = session.add_magnet(LINK, Path::new("/tmp/dl"), None).await.unwrap();
        let mut kinds = Vec::new();
        while let Some(alert) = alerts.recv().await {
            kinds.push(alert.kind());
            if matches!(alert, Alert::StateChanged { state: EngineTorrentState::Seeding, .. }) {
                break;
            }
        }
        assert_eq!(kinds[0], "state_changed");
        assert_eq!(kinds[1], "metadata_received");
        assert!(kinds.contains(&"torrent_checked"));
        assert!(kinds.contains(&"torrent_finished"));

        let status = session.status(handle).unwrap();
        assert_eq!(status.progress, 1.0);
        assert_eq!(status.name, "film");
        assert_eq!(session.peers(handle).len(), 2);
        assert!(session.resume_data(handle).unwrap().seed_mode);
    }

    #[tokio::test]
    async fn test_resume_continues_from_saved_progress() {
        let engine = LoopbackEngine::new(LoopbackOptions {
            tick: Duration::from_secs(60),
            ..fast()
        });
        let mut session = open(&engine).await;
        let hash = parse_magnet(LINK).unwrap().info_hash;
        let mut params = AddTorrentParams::new(hash, "film", "/tmp/dl");
        params.total_size = 4096;
        params.total_downloaded = 2048;

        let handle = session.add_magnet(LINK, Path::new("/tmp/dl"), Some(params)).await.unwrap();
        assert_eq!(session.status(handle).unwrap().progress, 0.5);
        assert_eq!(
            engine.journal().adds,
            vec![AddCall {
                kind: "magnet",
                source: LINK.to_string(),
                with_resume: true
            }]
        );
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let engine = LoopbackEngine::new(LoopbackOptions {
            fail_at: Some(0.5),
            fail_storage_move: true,
            ..fast()
        });
        let mut session = open(&engine).await;
        let mut alerts = session.take_alerts().unwrap();
        let handle = session.add_magnet(LINK, Path::new("/tmp/dl"), None).await.unwrap();

        loop {
            match alerts.recv().await.unwrap() {
                Alert::FileError { message, .. } => {
                    assert_eq!(message, "磁盘空间不足");
                    break;
                }
                Alert::TorrentFinished { .. } => panic!("注入的错误没有触发"),
                _ => {}
            }
        }

        session.move_storage(handle, Path::new("/media")).unwrap();
        loop {
            if let Alert::StorageMovedFailed { path, .. } = alerts.recv().await.unwrap() {
                assert_eq!(path, "/media");
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_stop_and_warm_start() {
        let engine = LoopbackEngine::new(fast());
        let mut session = open(&engine).await;
        let mut alerts = session.take_alerts().unwrap();
        session.add_magnet(LINK, Path::new("/tmp/dl"), None).await.unwrap();
        let state = session.save_state();
        session.stop().await;

        let mut stopped = false;
        while let Some(alert) = alerts.recv().await {
            if matches!(alert, Alert::SessionStopped) {
                stopped = true;
                break;
            }
        }
        assert!(stopped);

        let settings = SessionSettings::from_config(&Config::default());
        engine.open_session(settings, Some(state)).await.unwrap();
        let journal = engine.journal();
        assert_eq!(journal.stops, 1);
        assert_eq!(journal.warm_starts, 1);
        assert_eq!(journal.settings.len(), 2);
    }

    #[test]
    fn test_torrent_file_description() {
        let data = Value::dict()
            .insert("info", Value::dict().insert("name", Value::string("debian.iso")))
            .encode();
        let (hash, name) = describe_torrent_file(&data, Path::new("/tmp/x.torrent"));
        assert_eq!(name.as_deref(), Some("debian.iso"));
        assert_eq!(describe_torrent_file(&data, Path::new("/tmp/y.torrent")).0, hash);

        let (_, fallback) = describe_torrent_file(b"garbage", Path::new("/tmp/arch.torrent"));
        assert_eq!(fallback.as_deref(), Some("arch"));
    }
}
