//! 进程内的实时状态：按任务ID索引的对端列表与种子状态快照
//!
//! 不持久化。每次更新都整体替换对应任务的值，观察者拿到的永远是完整快照。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;
use uuid::Uuid;

use crate::engine::{PeerInfo, TorrentStatus};

pub type PeerMap = HashMap<Uuid, Arc<Vec<PeerInfo>>>;
pub type StatusMap = HashMap<Uuid, Arc<TorrentStatus>>;

#[derive(Clone)]
pub struct LiveStatusHub {
    peers: Arc<watch::Sender<PeerMap>>,
    statuses: Arc<watch::Sender<StatusMap>>,
}

impl Default for LiveStatusHub {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveStatusHub {
    pub fn new() -> Self {
        let (peers, _) = watch::channel(PeerMap::new());
        let (statuses, _) = watch::channel(StatusMap::new());
        Self {
            peers: Arc::new(peers),
            statuses: Arc::new(statuses),
        }
    }

    pub fn publish_peers(&self, task_id: Uuid, peers: Vec<PeerInfo>) {
        let peers = Arc::new(peers);
        self.peers.send_modify(|map| {
            map.insert(task_id, peers);
        });
    }

    pub fn publish_status(&self, task_id: Uuid, status: TorrentStatus) {
        let status = Arc::new(status);
        self.statuses.send_modify(|map| {
            map.insert(task_id, status);
        });
    }

    /// 任务结束时移除其全部条目
    pub fn remove(&self, task_id: &Uuid) {
        self.peers.send_if_modified(|map| map.remove(task_id).is_some());
        self.statuses.send_if_modified(|map| map.remove(task_id).is_some());
    }

    pub fn subscribe_peers(&self) -> watch::Receiver<PeerMap> {
        self.peers.subscribe()
    }

    pub fn subscribe_statuses(&self) -> watch::Receiver<StatusMap> {
        self.statuses.subscribe()
    }

    pub fn status_of(&self, task_id: &Uuid) -> Option<Arc<TorrentStatus>> {
        self.statuses.borrow().get(task_id).cloned()
    }
}
