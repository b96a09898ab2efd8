mod progress;

use std::fmt;

use crate::core::live::StatusMap;
use crate::store::{DownloadRecord, TorrentFileEntry};

pub use progress::ProgressNotifier;

pub fn print_success(message: &str) {
    println!("✓ {}", message);
}

pub fn print_error(message: &str) {
    println!("✗ {}", message);
}

/// `list` 命令的输出
pub struct RecordTable<'a> {
    pub records: &'a [DownloadRecord],
    pub statuses: &'a StatusMap,
}

impl fmt::Display for RecordTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.records.is_empty() {
            return writeln!(f, "没有下载记录");
        }
        writeln!(f, "\n下载记录 ({}):", self.records.len())?;
        for record in self.records {
            write!(
                f,
                "  {:<10} {:>6.1}% {:>10}  {}",
                record.state.describe(),
                record.progress * 100.0,
                format_size(record.size),
                record.name
            )?;
            if let Some(status) = self.statuses.get(&record.task_id) {
                write!(
                    f,
                    "  ↓{} ↑{} 对端:{}",
                    format_rate(status.download_rate),
                    format_rate(status.upload_rate),
                    status.num_peers
                )?;
            }
            writeln!(f)?;
            if !record.description.is_empty() {
                writeln!(f, "             {}", record.description)?;
            }
            writeln!(f, "             {}", record.link)?;
        }
        Ok(())
    }
}

/// `files` 命令的输出
pub struct FileTable<'a>(pub &'a [TorrentFileEntry]);

impl fmt::Display for FileTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return writeln!(f, "尚未获取文件列表");
        }
        let total: u64 = self.0.iter().map(|e| e.size).sum();
        for entry in self.0 {
            writeln!(f, "  {:>10}  {}", format_size(entry.size), entry.relative_path)?;
        }
        writeln!(f, "共 {} 个文件, {}", self.0.len(), format_size(total))
    }
}

pub fn format_size(size: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = size as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

pub fn format_rate(bytes_per_second: u64) -> String {
    format!("{}/s", format_size(bytes_per_second))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0.00 B");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(5 * 1024 * 1024 * 1024), "5.00 GB");
        assert_eq!(format_rate(2048), "2.00 KB/s");
    }

    #[test]
    fn test_tables() {
        let record = DownloadRecord::new("magnet:?xt=urn:btih:c12fe1c06bba254a9dc9f519b335aa7c1367a88a&dn=film", Uuid::new_v4());
        let statuses = StatusMap::new();
        let records = [record];
        let text = RecordTable { records: &records, statuses: &statuses }.to_string();
        assert!(text.contains("film"));
        assert!(text.contains("等待中"));

        let files = [TorrentFileEntry {
            link: "l".to_string(),
            relative_path: "film/film.mkv".to_string(),
            size: 1024,
        }];
        let text = FileTable(&files).to_string();
        assert!(text.contains("film/film.mkv"));
        assert!(text.contains("共 1 个文件"));
    }
}
