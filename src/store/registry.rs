//! 链接 ↔ 任务ID 的双向映射

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::Path;

use uuid::Uuid;

use crate::store::table::JsonFile;

pub struct LinkIdentityRegistry {
    file: JsonFile,
    by_link: BTreeMap<String, Uuid>,
    by_task: HashMap<Uuid, String>,
}

impl LinkIdentityRegistry {
    pub fn open(dir: &Path) -> Self {
        let file = JsonFile::new(dir.join("identities.json"));
        let by_link: BTreeMap<String, Uuid> = file.load();
        let by_task = by_link.iter().map(|(link, id)| (*id, link.clone())).collect();
        Self { file, by_link, by_task }
    }

    /// 已有映射直接返回，否则分配新的任务ID并持久化
    pub fn resolve_or_create(&mut self, link: &str) -> io::Result<Uuid> {
        if let Some(id) = self.by_link.get(link) {
            return Ok(*id);
        }
        let id = Uuid::new_v4();
        self.by_link.insert(link.to_string(), id);
        self.by_task.insert(id, link.to_string());
        self.file.save(&self.by_link)?;
        Ok(id)
    }

    pub fn link_of(&self, task_id: &Uuid) -> Option<&str> {
        self.by_task.get(task_id).map(String::as_str)
    }

    pub fn task_of(&self, link: &str) -> Option<Uuid> {
        self.by_link.get(link).copied()
    }

    /// 删除映射，下次 start 会分配新的任务ID
    pub fn remove_link(&mut self, link: &str) -> io::Result<Option<Uuid>> {
        let removed = self.by_link.remove(link);
        if let Some(id) = removed {
            self.by_task.remove(&id);
            self.file.save(&self.by_link)?;
        }
        Ok(removed)
    }
}
