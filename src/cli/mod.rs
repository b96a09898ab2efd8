//! CLI: 命令行接口和参数解析模块
//!
//! ## 支持的命令
//!
//! - 添加任务：`magnetdown add <link>...` / `magnetdown add -f links.txt`
//! - 列出任务：`magnetdown list`
//! - 暂停/继续/删除：`magnetdown pause|resume|delete <link>`
//! - 查看文件：`magnetdown files <link>`
//! - 编辑配置：`magnetdown -e`
//!
//! ## 平台支持
//!
//! - Windows: `%APPDATA%/magnetdown/magnetdown.conf`
//! - macOS: `~/Library/Application Support/magnetdown/magnetdown.conf`
//! - Linux: `~/.config/magnetdown/magnetdown.conf`

use clap::{Parser, Subcommand};
use std::env;
use std::fs;
use std::path::Path;
use crate::config::Config;
use crate::core::error::DownloadError;

/// 获取平台默认配置文件路径
pub fn default_config_path() -> String {
    #[cfg(target_os = "windows")]
    {
        let appdata = env::var("APPDATA").unwrap_or_else(|_| ".".to_string());
        format!("{}/magnetdown/magnetdown.conf", appdata)
    }
    #[cfg(target_os = "macos")]
    {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{}/Library/Application Support/magnetdown/magnetdown.conf", home)
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{}/.config/magnetdown/magnetdown.conf", home)
    }
}

/// 打开配置文件编辑器
pub fn open_config_in_editor(config_path: &str) {
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("notepad").arg(config_path).status().ok();
    }
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg("-e").arg(config_path).status().ok();
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        // 优先 xdg-open，否则 nano
        if std::process::Command::new("xdg-open").arg(config_path).status().is_err() {
            let _ = std::process::Command::new("nano").arg(config_path).status();
        }
    }
}

/// MagnetDown 命令行参数
///
/// 示例用法：
///   magnetdown add "magnet:?xt=urn:btih:..."
///   magnetdown -e  # 编辑配置文件
///   magnetdown --loopback add "magnet:?xt=urn:btih:..."
#[derive(Parser, Debug, Clone)]
#[command(
    name = "magnetdown",
    author = "panzhifu",
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("VERGEN_GIT_SHA"), ", ", env!("VERGEN_BUILD_TIMESTAMP"), ")"),
    about = "一个用 Rust 编写的 BitTorrent 下载任务编排器",
    long_about = "把磁力链接或种子地址变成可暂停、可恢复、可观察的下载任务。\n\n示例：\n  magnetdown add \"magnet:?xt=urn:btih:...\"\n  magnetdown list\n  magnetdown pause \"magnet:?xt=urn:btih:...\"\n  magnetdown -e\n"
)]
pub struct Args {
    /// 配置文件路径，默认为平台推荐路径
    #[arg(short = 'c', long, global = true, default_value_t = default_config_path(), help = "配置文件路径，默认为平台推荐路径。")]
    pub config: String,

    /// 编辑配置文件（-e 或 --edit）
    #[arg(short = 'e', long = "edit", help = "用系统默认编辑器打开配置文件并退出。")]
    pub edit_config: bool,

    /// 指定下载目录
    #[arg(long, short = 'd', global = true, help = "指定下载目录，覆盖配置文件中的设置。")]
    pub download_dir: Option<String>,

    /// 指定数据目录
    #[arg(long, global = true, help = "指定记录与恢复数据的存放目录。")]
    pub data_dir: Option<String>,

    /// 下载完成后不做种
    #[arg(long, global = true, help = "下载完成后立即暂停，不做种。")]
    pub no_seed: bool,

    /// 使用内置的回环引擎
    #[arg(long, global = true, help = "使用内置的回环引擎（演示与测试用，不联网）。")]
    pub loopback: bool,

    /// 输出调试日志
    #[arg(long, short = 'v', global = true, help = "输出调试日志。")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// 添加并开始下载
    Add {
        /// 磁力链接、种子地址或本地种子文件
        links: Vec<String>,
        /// 包含链接列表的文件路径，每行一个
        #[arg(short, long)]
        file: Option<String>,
    },
    /// 列出所有任务
    List,
    /// 暂停任务
    Pause { link: String },
    /// 继续任务
    Resume { link: String },
    /// 删除任务及其记录
    Delete { link: String },
    /// 查看种子内的文件
    Files { link: String },
}

impl Args {
    pub fn parse_args() -> Result<(Self, Config), DownloadError> {
        let args = Args::parse();

        if args.edit_config {
            // 文件不存在时先生成带教程的默认配置
            Config::load(&args.config)?;
            open_config_in_editor(&args.config);
            std::process::exit(0);
        }

        let mut config = Config::load(&args.config)
            .map_err(|e| DownloadError::Config(format!("无法读取配置文件 {}: {}", args.config, e)))?;

        // 合并命令行参数到配置
        config.merge_from_args(&args);

        config
            .validate()
            .map_err(|e| DownloadError::Config(format!("配置无效: {}", e)))?;

        Ok((args, config))
    }

    /// 汇总 `add` 命令行与链接文件中的链接
    pub fn get_links(&self) -> Result<Vec<String>, DownloadError> {
        let Some(Command::Add { links: inline, file }) = &self.command else {
            return Ok(Vec::new());
        };
        let mut links = inline.clone();

        if let Some(file_path) = file {
            if !Path::new(file_path).exists() {
                return Err(DownloadError::Config(format!("链接文件不存在: {}", file_path)));
            }
            let content = fs::read_to_string(file_path)?;

            // 按行读取，忽略空行和注释
            for line in content.lines() {
                let line = line.trim();
                if !line.is_empty() && !line.starts_with('#') {
                    links.push(line.to_string());
                }
            }
        }

        if links.is_empty() {
            return Err(DownloadError::Config(
                "未提供任何链接。请通过命令行参数或文件提供至少一个磁力链接或种子地址。".to_string(),
            ));
        }

        Ok(links)
    }
}
