//! 后台任务调度：同一个 key 同时最多只有一个存活任务
//!
//! `enqueue_unique` 采用“保留已有”策略：key 对应的任务仍在运行时，再次提交直接忽略。

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, warn};
use tokio::sync::watch;
use uuid::Uuid;

use crate::core::error::DownloadResult;
use crate::core::state::DownloadState;

/// 后台任务的运行状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkState {
    Running,
    /// 正常结束，携带最终持久化的状态
    Finished(DownloadState),
    Failed(String),
}

impl WorkState {
    pub fn is_running(&self) -> bool {
        matches!(self, WorkState::Running)
    }
}

/// 交给任务的协作式取消信号
#[derive(Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// 收到取消请求（或调度器丢弃了该任务）时返回
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

struct WorkEntry {
    cancel: watch::Sender<bool>,
    state: watch::Receiver<WorkState>,
}

#[derive(Clone, Default)]
pub struct WorkScheduler {
    entries: Arc<Mutex<HashMap<Uuid, WorkEntry>>>,
}

impl WorkScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, WorkEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 提交任务；同一 key 已有存活任务时返回 `false` 且不会调用 `work`
    ///
    /// 已结束的条目会一直保留，供 `state` 和 `wait` 读取结果，直到被重新提交的任务替换或被 `forget` 移除。
    pub fn enqueue_unique<F, Fut>(&self, key: Uuid, work: F) -> bool
    where
        F: FnOnce(CancelSignal) -> Fut,
        Fut: Future<Output = DownloadResult<DownloadState>> + 'static,
    {
        let mut entries = self.lock();
        if let Some(entry) = entries.get(&key) {
            if entry.state.borrow().is_running() {
                debug!("任务 {} 已在运行，保留现有任务", key);
                return false;
            }
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(WorkState::Running);
        entries.insert(
            key,
            WorkEntry {
                cancel: cancel_tx,
                state: state_rx,
            },
        );
        drop(entries);

        let future = work(CancelSignal { rx: cancel_rx });
        actix::spawn(async move {
            let outcome = match future.await {
                Ok(state) => WorkState::Finished(state),
                Err(e) => {
                    warn!("任务 {} 失败: {}", key, e);
                    WorkState::Failed(e.to_string())
                }
            };
            state_tx.send_replace(outcome);
        });
        true
    }

    /// 请求取消存活任务；没有存活任务时返回 `false`
    pub fn cancel(&self, key: &Uuid) -> bool {
        let entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.state.borrow().is_running() => {
                entry.cancel.send_replace(true);
                true
            }
            _ => false,
        }
    }

    pub fn state(&self, key: &Uuid) -> Option<WorkState> {
        self.lock().get(key).map(|entry| entry.state.borrow().clone())
    }

    pub fn is_live(&self, key: &Uuid) -> bool {
        self.state(key).map_or(false, |state| state.is_running())
    }

    /// 等待任务结束并返回最终状态；从未提交过的 key 返回 `None`
    pub async fn wait(&self, key: &Uuid) -> Option<WorkState> {
        let mut rx = self.lock().get(key)?.state.clone();
        loop {
            let state = rx.borrow_and_update().clone();
            if !state.is_running() {
                return Some(state);
            }
            if rx.changed().await.is_err() {
                // 任务在写入结果前被丢弃
                return Some(WorkState::Failed("任务异常退出".to_string()));
            }
        }
    }

    /// 丢弃已结束任务的记录
    pub fn forget(&self, key: &Uuid) {
        let mut entries = self.lock();
        if entries.get(key).map_or(false, |entry| !entry.state.borrow().is_running()) {
            entries.remove(key);
        }
    }

    pub fn live_keys(&self) -> Vec<Uuid> {
        self.lock()
            .iter()
            .filter(|(_, entry)| entry.state.borrow().is_running())
            .map(|(key, _)| *key)
            .collect()
    }
}
