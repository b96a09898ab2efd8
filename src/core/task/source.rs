use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use uuid::Uuid;

use crate::config::Config;
use crate::core::error::{DownloadError, DownloadResult};
use crate::utils::validator::{classify_link, is_http_url, is_magnet, LinkKind};

/// 种子文件的大小上限
const MAX_TORRENT_SIZE: usize = 10 * 1024 * 1024;
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// 交给引擎的输入
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TorrentSource {
    Magnet(String),
    File(PathBuf),
}

/// 已下载的种子文件存放位置：`<download_dir>/.torrents/<taskId>.torrent`
pub fn fetched_torrent_path(download_dir: &Path, task_id: &Uuid) -> PathBuf {
    download_dir.join(".torrents").join(format!("{}.torrent", task_id))
}

/// 把链接解析为引擎输入；http(s) 地址会先下载种子文件（已下载过则复用）
pub async fn resolve_source(link: &str, task_id: Uuid, config: &Config) -> DownloadResult<TorrentSource> {
    let link = link.trim();
    if is_magnet(link) {
        return Ok(TorrentSource::Magnet(link.to_string()));
    }
    if is_http_url(link) {
        let target = fetched_torrent_path(&config.download_path(), &task_id);
        if target.is_file() {
            debug!("复用已下载的种子文件 {}", target.display());
        } else {
            fetch_torrent(link, &target, &config.client_id).await?;
        }
        return Ok(TorrentSource::File(target));
    }
    match classify_link(link, None) {
        Some(LinkKind::TorrentFile(path)) => Ok(TorrentSource::File(path)),
        _ => Err(DownloadError::UnresolvableLink(link.to_string())),
    }
}

/// 下载种子文件到 `target`
pub async fn fetch_torrent(url: &str, target: &Path, user_agent: &str) -> DownloadResult<()> {
    let client = awc::Client::builder().timeout(FETCH_TIMEOUT).finish();
    let mut response = client
        .get(url)
        .insert_header(("User-Agent", user_agent))
        .send()
        .await
        .map_err(|e| DownloadError::Network(format!("{} 请求失败: {:?}", url, e)))?;

    if !response.status().is_success() {
        return Err(DownloadError::Network(format!("{} 服务器错误: {}", url, response.status())));
    }

    let body = response
        .body()
        .limit(MAX_TORRENT_SIZE)
        .await
        .map_err(|e| DownloadError::Network(format!("{} 读取失败: {:?}", url, e)))?;

    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(target, &body).await?;
    info!("种子文件已下载: {} -> {} ({} 字节)", url, target.display(), body.len());
    Ok(())
}

/// 探测链接的 Content-Type
#[async_trait(?Send)]
pub trait LinkInspector: Send + Sync {
    async fn content_type(&self, url: &str) -> DownloadResult<Option<String>>;
}

/// 用 HEAD 请求探测
pub struct HttpInspector {
    pub user_agent: String,
}

#[async_trait(?Send)]
impl LinkInspector for HttpInspector {
    async fn content_type(&self, url: &str) -> DownloadResult<Option<String>> {
        let client = awc::Client::builder().timeout(FETCH_TIMEOUT).finish();
        let response = client
            .head(url)
            .insert_header(("User-Agent", self.user_agent.as_str()))
            .send()
            .await
            .map_err(|e| DownloadError::Network(format!("{:?}", e)))?;

        if !response.status().is_success() {
            return Err(DownloadError::Network(format!("服务器错误: {}", response.status())));
        }

        Ok(response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.split(';').next().unwrap_or(s).trim().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_rt::test]
    async fn test_resolve_magnet_and_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            download_dir: dir.path().display().to_string(),
            ..Config::default()
        };
        let task_id = Uuid::new_v4();

        let magnet = "magnet:?xt=urn:btih:c12fe1c06bba254a9dc9f519b335aa7c1367a88a";
        assert_eq!(
            resolve_source(magnet, task_id, &config).await.unwrap(),
            TorrentSource::Magnet(magnet.to_string())
        );

        let local = dir.path().join("debian.torrent");
        std::fs::write(&local, b"d4:infod4:name6:debianee").unwrap();
        assert_eq!(
            resolve_source(local.to_str().unwrap(), task_id, &config).await.unwrap(),
            TorrentSource::File(local.clone())
        );

        let err = resolve_source("gopher://example.com/x", task_id, &config).await.unwrap_err();
        assert!(matches!(err, DownloadError::UnresolvableLink(_)));
    }

    #[actix_rt::test]
    async fn test_previously_fetched_torrent_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            download_dir: dir.path().display().to_string(),
            ..Config::default()
        };
        let task_id = Uuid::new_v4();
        let cached = fetched_torrent_path(dir.path(), &task_id);
        std::fs::create_dir_all(cached.parent().unwrap()).unwrap();
        std::fs::write(&cached, b"de").unwrap();

        // 地址不可达也不会发起请求
        let source = resolve_source("http://127.0.0.1:9/a.torrent", task_id, &config).await.unwrap();
        assert_eq!(source, TorrentSource::File(cached));
    }
}
