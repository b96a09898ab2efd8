//! Store: 下载记录、链接映射、会话状态、恢复数据与文件索引的持久化
//!
//! 各表都是 `data_dir` 下的 JSON 文件（恢复数据为每任务一个 bencode 文件），
//! 统一由 `StoreActor` 串行写入。

pub mod actor;
pub mod commands;
pub mod files;
pub mod records;
pub mod registry;
pub mod session;
pub mod table;

pub use actor::StoreActor;
pub use commands::{Apply, StoreCommand};
pub use files::TorrentFileEntry;
pub use records::DownloadRecord;
