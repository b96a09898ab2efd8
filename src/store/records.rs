//! 下载记录表：每个链接一条记录

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::state::DownloadState;
use crate::store::table::JsonFile;
use crate::utils::validator::derive_name;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub link: String,
    pub name: String,
    pub state: DownloadState,
    /// 0.0 - 1.0
    pub progress: f32,
    /// 累计已下载字节数
    pub size: u64,
    /// 引擎状态的文字描述
    pub description: String,
    /// 当前有权修改这条记录的任务
    pub task_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl DownloadRecord {
    /// 新建记录，名称从链接推导
    pub fn new(link: &str, task_id: Uuid) -> Self {
        Self {
            link: link.to_string(),
            name: derive_name(link),
            state: DownloadState::Init,
            progress: 0.0,
            size: 0,
            description: String::new(),
            task_id,
            created_at: Utc::now(),
        }
    }
}

pub struct DownloadRecordStore {
    file: JsonFile,
    records: BTreeMap<String, DownloadRecord>,
}

impl DownloadRecordStore {
    pub fn open(dir: &Path) -> Self {
        let file = JsonFile::new(dir.join("records.json"));
        let records = file.load();
        Self { file, records }
    }

    pub fn get(&self, link: &str) -> Option<&DownloadRecord> {
        self.records.get(link)
    }

    /// 按创建时间排序
    pub fn list(&self) -> Vec<DownloadRecord> {
        let mut records: Vec<_> = self.records.values().cloned().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.link.cmp(&b.link)));
        records
    }

    /// 不存在时插入，已存在则保持不变；返回是否插入
    pub fn create_if_absent(&mut self, record: DownloadRecord) -> io::Result<bool> {
        if self.records.contains_key(&record.link) {
            return Ok(false);
        }
        self.records.insert(record.link.clone(), record);
        self.flush()?;
        Ok(true)
    }

    /// 修改记录；记录不存在时返回 `Ok(false)`
    pub fn update<F>(&mut self, link: &str, mutate: F) -> io::Result<bool>
    where
        F: FnOnce(&mut DownloadRecord),
    {
        let Some(record) = self.records.get_mut(link) else {
            return Ok(false);
        };
        mutate(record);
        self.flush()?;
        Ok(true)
    }

    /// 删除记录；已不存在也视为成功
    pub fn remove(&mut self, link: &str) -> io::Result<Option<DownloadRecord>> {
        let removed = self.records.remove(link);
        if removed.is_some() {
            self.flush()?;
        }
        Ok(removed)
    }

    fn flush(&self) -> io::Result<()> {
        self.file.save(&self.records)
    }
}
