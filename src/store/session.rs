//! 会话状态（按链接）与恢复数据（按任务ID）

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use log::{debug, warn};
use uuid::Uuid;

use crate::core::error::DownloadError;
use crate::engine::params::{read_resume_data, AddTorrentParams};
use crate::store::table::JsonFile;

/// 引擎会话序列化结果，每个链接一份，仅用于热启动
pub struct SessionStateStore {
    file: JsonFile,
    blobs: BTreeMap<String, Bytes>,
}

impl SessionStateStore {
    pub fn open(dir: &Path) -> Self {
        let file = JsonFile::new(dir.join("sessions.json"));
        let blobs = file.load();
        Self { file, blobs }
    }

    pub fn get(&self, link: &str) -> Option<Bytes> {
        self.blobs.get(link).cloned()
    }

    /// 覆盖写入
    pub fn put(&mut self, link: &str, blob: Bytes) -> io::Result<()> {
        self.blobs.insert(link.to_string(), blob);
        self.file.save(&self.blobs)
    }

    pub fn remove(&mut self, link: &str) -> io::Result<bool> {
        if self.blobs.remove(link).is_none() {
            return Ok(false);
        }
        self.file.save(&self.blobs)?;
        Ok(true)
    }
}

/// 恢复数据，每个任务一个 bencode 文件
pub struct ResumeDataStore {
    dir: PathBuf,
}

impl ResumeDataStore {
    pub fn open(dir: &Path) -> Self {
        Self {
            dir: dir.join("resume"),
        }
    }

    pub fn path_of(&self, task_id: &Uuid) -> PathBuf {
        self.dir.join(format!("{}.resume", task_id))
    }

    pub fn write(&self, task_id: &Uuid, data: &[u8]) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_of(task_id);
        let tmp = path.with_extension("resume.tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &path)
    }

    /// 读取并解码；文件缺失或解码失败都按“没有恢复数据”处理
    pub fn read(&self, task_id: &Uuid) -> Option<AddTorrentParams> {
        let path = self.path_of(task_id);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("读取恢复数据失败 {}: {}", path.display(), e);
                return None;
            }
        };
        match read_resume_data(&data) {
            Ok(params) => {
                debug!("已读取恢复数据 task={} hash={}", task_id, params.info_hash);
                Some(params)
            }
            Err(e) => {
                let failure = DownloadError::ResumeDataDecode(format!("status={}: {}", e.code(), e));
                warn!("{} task={}，将重新添加", failure, task_id);
                None
            }
        }
    }

    /// 删除恢复数据；文件不存在视为成功
    pub fn remove(&self, task_id: &Uuid) -> io::Result<bool> {
        match fs::remove_file(self.path_of(task_id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}
