//! 种子添加参数及其 bencode 恢复数据格式
//!
//! 恢复数据与 libtorrent 的 fastresume 文件保持相同的键名，
//! 以便引擎在重启后跳过完整校验直接续传。

use std::fmt;
use std::path::PathBuf;
use serde::{Deserialize, Serialize};

use crate::utils::bencode::{BencodeError, Value};

const RESUME_FILE_FORMAT: &str = "libtorrent resume file";
const RESUME_FILE_VERSION: i64 = 1;

/// 20 字节的 v1 info-hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InfoHash(pub [u8; 20]);

impl InfoHash {
    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != 40 {
            return None;
        }
        let mut bytes = [0u8; 20];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(hex.get(i * 2..i * 2 + 2)?, 16).ok()?;
        }
        Some(Self(bytes))
    }

    /// 磁力链接中常见的 32 位 base32 形式
    pub fn from_base32(text: &str) -> Option<Self> {
        if text.len() != 32 {
            return None;
        }
        let mut bytes = [0u8; 20];
        let mut buffer: u64 = 0;
        let mut bits = 0;
        let mut index = 0;
        for c in text.chars() {
            let value = match c.to_ascii_uppercase() {
                'A'..='Z' => c.to_ascii_uppercase() as u64 - 'A' as u64,
                '2'..='7' => c as u64 - '2' as u64 + 26,
                _ => return None,
            };
            buffer = (buffer << 5) | value;
            bits += 5;
            if bits >= 8 {
                bits -= 8;
                bytes[index] = (buffer >> bits) as u8;
                index += 1;
            }
        }
        Some(Self(bytes))
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let array: [u8; 20] = bytes.try_into().ok()?;
        Some(Self(array))
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// 向引擎添加种子时使用的参数，同时也是恢复数据的内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddTorrentParams {
    pub info_hash: InfoHash,
    pub name: String,
    pub save_path: PathBuf,
    /// 原始来源：磁力链接或种子文件路径
    pub source: String,
    pub trackers: Vec<String>,
    pub total_size: u64,
    pub total_downloaded: u64,
    pub total_uploaded: u64,
    /// 已校验分片的位图
    pub pieces: Vec<u8>,
    pub seed_mode: bool,
    pub added_time: i64,
    pub completed_time: i64,
}

impl AddTorrentParams {
    pub fn new(info_hash: InfoHash, name: impl Into<String>, save_path: impl Into<PathBuf>) -> Self {
        Self {
            info_hash,
            name: name.into(),
            save_path: save_path.into(),
            source: String::new(),
            trackers: Vec::new(),
            total_size: 0,
            total_downloaded: 0,
            total_uploaded: 0,
            pieces: Vec::new(),
            seed_mode: false,
            added_time: chrono::Utc::now().timestamp(),
            completed_time: 0,
        }
    }
}

/// 将添加参数编码为恢复数据
pub fn write_resume_data(params: &AddTorrentParams) -> Vec<u8> {
    let trackers = params.trackers.iter().fold(Value::list(), |list, tracker| {
        // libtorrent 的 trackers 是分层列表，这里每个 tracker 独占一层
        list.push(Value::list().push(Value::string(tracker)))
    });
    Value::dict()
        .insert("file-format", Value::string(RESUME_FILE_FORMAT))
        .insert("file-version", Value::integer(RESUME_FILE_VERSION))
        .insert("info-hash", Value::Bytes(params.info_hash.0.to_vec()))
        .insert("name", Value::string(&params.name))
        .insert("save_path", Value::string(&params.save_path.to_string_lossy()))
        .insert("source", Value::string(&params.source))
        .insert("trackers", trackers)
        .insert("total_size", Value::integer(params.total_size as i64))
        .insert("total_downloaded", Value::integer(params.total_downloaded as i64))
        .insert("total_uploaded", Value::integer(params.total_uploaded as i64))
        .insert("pieces", Value::Bytes(params.pieces.clone()))
        .insert("seed_mode", Value::integer(params.seed_mode as i64))
        .insert("added_time", Value::integer(params.added_time))
        .insert("completed_time", Value::integer(params.completed_time))
        .encode()
}

/// 从恢复数据解码添加参数；缺少关键字段时返回 `UnexpectedEnd` 状态
pub fn read_resume_data(data: &[u8]) -> Result<AddTorrentParams, BencodeError> {
    let root = Value::decode(data)?;
    let missing = || BencodeError::UnexpectedEnd(data.len());

    if root.get("file-format").and_then(Value::as_str) != Some(RESUME_FILE_FORMAT) {
        return Err(BencodeError::InvalidLength(0));
    }
    let info_hash = root
        .get("info-hash")
        .and_then(Value::as_bytes)
        .and_then(InfoHash::from_slice)
        .ok_or_else(missing)?;
    let text = |key: &str| root.get(key).and_then(Value::as_str).unwrap_or_default().to_string();
    let number = |key: &str| root.get(key).and_then(Value::as_integer).unwrap_or(0);

    let save_path = root.get("save_path").and_then(Value::as_str).ok_or_else(missing)?;
    let trackers = root
        .get("trackers")
        .and_then(Value::as_list)
        .unwrap_or_default()
        .iter()
        .filter_map(Value::as_list)
        .flat_map(|tier| tier.iter().filter_map(Value::as_str).map(str::to_string))
        .collect();

    Ok(AddTorrentParams {
        info_hash,
        name: text("name"),
        save_path: PathBuf::from(save_path),
        source: text("source"),
        trackers,
        total_size: number("total_size").max(0) as u64,
        total_downloaded: number("total_downloaded").max(0) as u64,
        total_uploaded: number("total_uploaded").max(0) as u64,
        pieces: root
            .get("pieces")
            .and_then(Value::as_bytes)
            .map(<[u8]>::to_vec)
            .unwrap_or_default(),
        seed_mode: number("seed_mode") != 0,
        added_time: number("added_time"),
        completed_time: number("completed_time"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_hash() -> InfoHash {
        InfoHash::from_hex("c12fe1c06bba254a9dc9f519b335aa7c1367a88a").unwrap()
    }

    #[test]
    fn test_info_hash_hex() {
        let hash = sample_hash();
        assert_eq!(hash.to_hex(), "c12fe1c06bba254a9dc9f519b335aa7c1367a88a");
        assert!(InfoHash::from_hex("zz").is_none());
        assert!(InfoHash::from_hex(&"g".repeat(40)).is_none());
    }

    #[test]
    fn test_info_hash_base32_matches_hex() {
        // 同一个 info-hash 的 base32 与 hex 两种写法
        let base32 = InfoHash::from_base32("YEX6DQDLXISUVHOJ6UM3GNNKPQJWPKEK").unwrap();
        assert_eq!(base32, sample_hash());
        assert!(InfoHash::from_base32("1111111111111111111111111111111A").is_none());
    }

    #[test]
    fn test_resume_data_reproduces_hash_and_save_path() {
        let mut params = AddTorrentParams::new(sample_hash(), "ubuntu.iso", "/data/downloads");
        params.source = "magnet:?xt=urn:btih:c12fe1c06bba254a9dc9f519b335aa7c1367a88a".to_string();
        params.trackers = vec!["udp://tracker.example:1337/announce".to_string()];
        params.total_size = 4096;
        params.total_downloaded = 1024;
        params.pieces = vec![0b1000_0000];

        let decoded = read_resume_data(&write_resume_data(&params)).unwrap();
        assert_eq!(decoded.info_hash, params.info_hash);
        assert_eq!(decoded.save_path, params.save_path);
        assert_eq!(decoded.trackers, params.trackers);
        assert_eq!(decoded.total_downloaded, 1024);
    }

    #[test]
    fn test_resume_data_rejects_foreign_payload() {
        let foreign = Value::dict().insert("name", Value::string("x")).encode();
        let err = read_resume_data(&foreign).unwrap_err();
        assert_ne!(err.code(), 0);

        let truncated = &write_resume_data(&AddTorrentParams::new(sample_hash(), "a", "/tmp"))[..10];
        assert!(read_resume_data(truncated).is_err());
    }
}
