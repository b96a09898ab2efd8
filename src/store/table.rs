//! 以 JSON 文件持久化的表

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// 一个 JSON 文件对应一张表，整表读写
#[derive(Debug, Clone)]
pub struct JsonFile {
    path: PathBuf,
}

impl JsonFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 文件不存在时返回默认值；内容损坏时记录警告并返回默认值
    pub fn load<T>(&self) -> T
    where
        T: DeserializeOwned + Default,
    {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return T::default(),
            Err(e) => {
                warn!("读取 {} 失败: {}，使用空表", self.path.display(), e);
                return T::default();
            }
        };
        match serde_json::from_str(&content) {
            Ok(value) => value,
            Err(e) => {
                warn!("解析 {} 失败: {}，使用空表", self.path.display(), e);
                T::default()
            }
        }
    }

    /// 先写临时文件再改名，避免进程中断留下半个文件
    pub fn save<T: Serialize>(&self, value: &T) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_missing_and_corrupt_files_load_default() {
        let dir = tempfile::tempdir().unwrap();
        let table = JsonFile::new(dir.path().join("records.json"));
        let empty: HashMap<String, u32> = table.load();
        assert!(empty.is_empty());

        fs::write(table.path(), "{ not json").unwrap();
        let empty: HashMap<String, u32> = table.load();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let table = JsonFile::new(dir.path().join("nested").join("t.json"));
        let mut map = HashMap::new();
        map.insert("magnet:?xt=urn:btih:abc".to_string(), 3u32);
        table.save(&map).unwrap();

        let loaded: HashMap<String, u32> = table.load();
        assert_eq!(loaded, map);
        assert!(!table.path().with_extension("json.tmp").exists());
    }
}
