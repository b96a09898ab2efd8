//! 种子文件索引：元数据可用后写入一次

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::store::table::JsonFile;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorrentFileEntry {
    pub link: String,
    pub relative_path: String,
    pub size: u64,
}

pub struct TorrentFileIndexStore {
    file: JsonFile,
    entries: BTreeMap<String, Vec<TorrentFileEntry>>,
}

impl TorrentFileIndexStore {
    pub fn open(dir: &Path) -> Self {
        let file = JsonFile::new(dir.join("files.json"));
        let entries = file.load();
        Self { file, entries }
    }

    pub fn list(&self, link: &str) -> Vec<TorrentFileEntry> {
        self.entries.get(link).cloned().unwrap_or_default()
    }

    /// 整体替换某个链接的文件列表
    pub fn replace(&mut self, link: &str, entries: Vec<TorrentFileEntry>) -> io::Result<()> {
        self.entries.insert(link.to_string(), entries);
        self.file.save(&self.entries)
    }

    pub fn remove(&mut self, link: &str) -> io::Result<usize> {
        let removed = self.entries.remove(link).map_or(0, |entries| entries.len());
        if removed > 0 {
            self.file.save(&self.entries)?;
        }
        Ok(removed)
    }
}
