use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use url::Url;

use crate::engine::InfoHash;

/// 可被引擎接受的链接类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkKind {
    Magnet,
    /// 需要先下载的 `.torrent` 地址
    TorrentUrl,
    /// 本地 `.torrent` 文件
    TorrentFile(PathBuf),
}

fn torrent_mime_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^applications?/x-bittorrent$").unwrap_or_else(|e| panic!("种子 MIME 正则无效: {}", e))
    })
}

/// 是否为种子 MIME 类型，只接受 `application(s)/x-bittorrent`
pub fn is_torrent_mime(mime: &str) -> bool {
    torrent_mime_regex().is_match(mime.trim())
}

pub fn is_magnet(link: &str) -> bool {
    link.get(..8).map_or(false, |prefix| prefix.eq_ignore_ascii_case("magnet:?"))
}

pub fn is_http_url(link: &str) -> bool {
    Url::parse(link)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}

fn has_torrent_suffix(path: &str) -> bool {
    path.to_ascii_lowercase().ends_with(".torrent")
}

/// 对链接分类，`mime` 为探测到的 Content-Type（可选）
///
/// 无法识别时返回 `None`，调用方据此报告 `UnresolvableLink`。
pub fn classify_link(link: &str, mime: Option<&str>) -> Option<LinkKind> {
    let link = link.trim();
    if is_magnet(link) {
        return Some(LinkKind::Magnet);
    }
    if is_http_url(link) {
        let by_suffix = Url::parse(link)
            .map(|url| has_torrent_suffix(url.path()))
            .unwrap_or(false);
        if by_suffix || mime.map_or(false, is_torrent_mime) {
            return Some(LinkKind::TorrentUrl);
        }
        return None;
    }

    // file:// 或本地路径
    let path = match Url::parse(link) {
        Ok(url) if url.scheme() == "file" => url.to_file_path().ok()?,
        Ok(_) => return None,
        Err(_) => PathBuf::from(link),
    };
    if has_torrent_suffix(&path.to_string_lossy()) && path.is_file() {
        Some(LinkKind::TorrentFile(path))
    } else {
        None
    }
}

/// 磁力链接解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagnetLink {
    pub info_hash: InfoHash,
    pub display_name: Option<String>,
    pub trackers: Vec<String>,
}

/// 解析 `xt=urn:btih:`（40 位 hex 或 32 位 base32）、`dn` 与 `tr`
pub fn parse_magnet(link: &str) -> Option<MagnetLink> {
    let url = Url::parse(link.trim()).ok()?;
    if url.scheme() != "magnet" {
        return None;
    }
    let mut info_hash = None;
    let mut display_name = None;
    let mut trackers = Vec::new();
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "xt" => {
                if let Some(hash) = value.strip_prefix("urn:btih:") {
                    info_hash = match hash.len() {
                        40 => InfoHash::from_hex(hash),
                        32 => InfoHash::from_base32(hash),
                        _ => None,
                    };
                }
            }
            "dn" if !value.trim().is_empty() => display_name = Some(value.trim().to_string()),
            "tr" => trackers.push(value.into_owned()),
            _ => {}
        }
    }
    Some(MagnetLink {
        info_hash: info_hash?,
        display_name,
        trackers,
    })
}

/// 名称未知时从链接推导展示名
pub fn derive_name(link: &str) -> String {
    if let Some(magnet) = parse_magnet(link) {
        return magnet
            .display_name
            .unwrap_or_else(|| magnet.info_hash.to_hex());
    }
    let from_path = |path: &str| {
        Path::new(path)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .filter(|stem| !stem.is_empty())
    };
    match Url::parse(link) {
        Ok(url) if url.scheme() != "magnet" => url
            .path_segments()
            .and_then(|mut segments| segments.next_back().and_then(from_path))
            .unwrap_or_else(|| link.to_string()),
        Ok(_) => link.to_string(),
        Err(_) => from_path(link).unwrap_or_else(|| link.to_string()),
    }
}
