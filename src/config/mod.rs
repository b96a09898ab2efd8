use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use crate::core::error::DownloadError;

/// 代理模式
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProxyMode {
    /// 复用系统默认代理
    Auto,
    /// 使用下面手动填写的地址
    Manual,
}

/// 代理协议
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProxyKind {
    Http,
    Socks4,
    Socks5,
}

/// 代理配置
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ProxyConfig {
    pub enabled: bool,
    pub mode: ProxyMode,
    pub kind: ProxyKind,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: ProxyMode::Auto,
            kind: ProxyKind::Http,
            host: String::new(),
            port: 0,
            username: String::new(),
            password: String::new(),
        }
    }
}

/// 配置结构体
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// 种子内容保存目录
    pub download_dir: String,
    /// 下载记录、会话状态、恢复数据的存放目录
    pub data_dir: String,
    /// 下载完成后迁移到的媒体库目录，空字符串表示不迁移
    pub media_dir: String,
    /// 下载完成后是否继续做种
    pub seed_after_complete: bool,
    /// 客户端标识（User-Agent）
    pub client_id: String,
    /// peer id 前缀
    pub peer_fingerprint: String,
    /// 监听端口
    pub listen_port: u16,
    pub enable_dht: bool,
    pub enable_lsd: bool,
    /// 日志级别: error/warn/info/debug/trace
    pub log_level: String,
    /// 日志文件，空字符串表示输出到 stderr
    pub log_file: String,
    /// 日志文件最大字节数，超出后在启动时轮转
    pub log_max_size: u64,
    /// 代理设置放在最后，toml 要求表格位于普通键之后
    pub proxy: ProxyConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            download_dir: "./downloads".to_string(),
            data_dir: "./.magnetdown".to_string(),
            media_dir: String::new(),
            seed_after_complete: true,
            client_id: format!("MagnetDown/{}", env!("CARGO_PKG_VERSION")),
            peer_fingerprint: "-MD0100-".to_string(),
            listen_port: 6881,
            enable_dht: true,
            enable_lsd: true,
            log_level: "info".to_string(),
            log_file: String::new(),
            log_max_size: 10 * 1024 * 1024,
            proxy: ProxyConfig::default(),
        }
    }
}

impl Config {
    /// 加载配置文件，文件不存在或格式错误时写入默认配置
    pub fn load(path: &str) -> Result<Self, DownloadError> {
        if Path::new(path).exists() {
            let content = fs::read_to_string(path)?;
            match toml::from_str(&content) {
                Ok(config) => Ok(config),
                Err(e) => {
                    eprintln!("配置文件格式错误: {}，将使用默认配置", e);
                    let config = Config::default();
                    config.save_with_tutorial(path)?;
                    Ok(config)
                }
            }
        } else {
            let config = Config::default();
            config.save_with_tutorial(path)?;
            Ok(config)
        }
    }

    /// 保存带教程的配置文件（唯一写入方法）
    pub fn save_with_tutorial(&self, path: &str) -> Result<(), DownloadError> {
        if let Some(parent) = Path::new(path).parent() {
            fs::create_dir_all(parent)?;
        }
        let config_content = toml::to_string_pretty(self)
            .map_err(|e| DownloadError::Config(format!("无法序列化配置: {}", e)))?;
        let full_content = format!("{}\n\n{}", Config::generate_tutorial_content(), config_content);
        fs::write(path, full_content)?;
        Ok(())
    }

    /// 生成配置文件教程内容
    fn generate_tutorial_content() -> String {
        r#"# MagnetDown 配置文件
# ====================
#
# TOML 格式。修改后保存即可，下次启动生效。
#
# 配置文件位置：
# - Windows: %APPDATA%/magnetdown/magnetdown.conf
# - macOS: ~/Library/Application Support/magnetdown/magnetdown.conf
# - Linux: ~/.config/magnetdown/magnetdown.conf
#
# 命令行参数会覆盖配置文件中的设置，优先级：命令行 > 配置文件 > 默认值
#
# 使用示例：
#   magnetdown add "magnet:?xt=urn:btih:..."          # 添加磁力链接
#   magnetdown add https://example.com/a.torrent      # 添加种子地址
#   magnetdown list                                   # 查看所有任务
#   magnetdown pause "magnet:?xt=urn:btih:..."        # 暂停
#   magnetdown delete "magnet:?xt=urn:btih:..."       # 删除任务及其记录

# ==================== 目录 ====================
#
# download_dir: 种子内容的保存目录
# data_dir:     下载记录、会话状态与恢复数据（删除后所有任务从头开始）
# media_dir:    下载完成后把内容迁移到这里，留空表示不迁移

# ==================== 做种 ====================
#
# seed_after_complete = false 时，下载完成后立即暂停（状态变为 SeedingPaused）

# ==================== 网络 ====================
#
# client_id:        对 tracker 与 peer 展示的客户端标识
# peer_fingerprint: peer id 前缀
# listen_port:      监听端口
# enable_dht / enable_lsd: 是否启用 DHT 与本地发现

# ==================== 代理 ====================
#
# [proxy]
# enabled = true
# mode = "auto"      # auto: 读取 ALL_PROXY / HTTPS_PROXY / HTTP_PROXY
#                    # manual: 使用下面的地址
# kind = "socks5"    # http / socks4 / socks5
# host = "127.0.0.1"
# port = 1080
# username = ""      # 用户名或密码任一为空时，两者都不会下发
# password = ""

# ==================== 故障排除 ====================
#
# 问题：任务一直停在“正在获取元数据”
# 解决：确认 enable_dht = true，或检查代理设置
#
# 问题：完成后状态为 StorageMovedFailed
# 解决：检查 media_dir 是否存在且可写，然后执行 resume

# ==================== 配置项说明 ===================="#
            .to_string()
    }

    /// 校验配置合法性
    pub fn validate(&self) -> Result<(), DownloadError> {
        if self.download_dir.trim().is_empty() {
            return Err(DownloadError::Config("下载目录不能为空".to_string()));
        }

        if self.data_dir.trim().is_empty() {
            return Err(DownloadError::Config("数据目录不能为空".to_string()));
        }

        if self.client_id.trim().is_empty() {
            return Err(DownloadError::Config("客户端标识不能为空".to_string()));
        }

        if self.listen_port == 0 {
            return Err(DownloadError::Config("监听端口必须大于0".to_string()));
        }

        // 手动代理必须给出完整地址
        if self.proxy.enabled && self.proxy.mode == ProxyMode::Manual {
            if self.proxy.host.trim().is_empty() {
                return Err(DownloadError::Config("代理地址不能为空".to_string()));
            }
            if self.proxy.port == 0 {
                return Err(DownloadError::Config("代理端口必须大于0".to_string()));
            }
        }

        Ok(())
    }

    /// 合并命令行参数到配置
    pub fn merge_from_args(&mut self, args: &crate::cli::Args) {
        if let Some(download_dir) = &args.download_dir {
            self.download_dir = download_dir.clone();
        }

        if let Some(data_dir) = &args.data_dir {
            self.data_dir = data_dir.clone();
        }

        if args.no_seed {
            self.seed_after_complete = false;
        }

        if args.verbose {
            self.log_level = "debug".to_string();
        }
    }

    pub fn download_path(&self) -> PathBuf {
        PathBuf::from(&self.download_dir)
    }

    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }

    pub fn media_path(&self) -> Option<PathBuf> {
        let dir = self.media_dir.trim();
        (!dir.is_empty()).then(|| PathBuf::from(dir))
    }

    /// 获取配置摘要信息
    pub fn get_summary(&self) -> String {
        format!(
            "配置摘要:\n\
            - 下载目录: {}\n\
            - 数据目录: {}\n\
            - 媒体库目录: {}\n\
            - 完成后做种: {}\n\
            - 客户端标识: {}\n\
            - 监听端口: {}\n\
            - DHT/LSD: {}/{}\n\
            - 代理: {}",
            self.download_dir,
            self.data_dir,
            if self.media_dir.is_empty() { "不迁移" } else { self.media_dir.as_str() },
            if self.seed_after_complete { "启用" } else { "禁用" },
            self.client_id,
            self.listen_port,
            if self.enable_dht { "启用" } else { "禁用" },
            if self.enable_lsd { "启用" } else { "禁用" },
            match (self.proxy.enabled, self.proxy.mode) {
                (false, _) => "未启用".to_string(),
                (true, ProxyMode::Auto) => "系统代理".to_string(),
                (true, ProxyMode::Manual) => format!("{}:{}", self.proxy.host, self.proxy.port),
            }
        )
    }
}
