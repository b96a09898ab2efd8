//! 代理配置 → 引擎代理设置
//!
//! 引擎侧的键名与 libtorrent 的 settings_pack 一致：
//! `proxy_type`、`proxy_hostname`、`proxy_port`、`proxy_username`、`proxy_password`、
//! `proxy_peer_connections`、`proxy_tracker_connections`。

use std::env;

use log::{debug, warn};
use url::Url;

use crate::config::{ProxyConfig, ProxyKind, ProxyMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyType {
    None,
    Socks4,
    Socks5,
    Socks5Pw,
    Http,
    HttpPw,
}

impl ProxyType {
    fn for_kind(kind: ProxyKind, with_credentials: bool) -> Self {
        match (kind, with_credentials) {
            (ProxyKind::Http, false) => ProxyType::Http,
            (ProxyKind::Http, true) => ProxyType::HttpPw,
            // socks4 不支持认证
            (ProxyKind::Socks4, _) => ProxyType::Socks4,
            (ProxyKind::Socks5, false) => ProxyType::Socks5,
            (ProxyKind::Socks5, true) => ProxyType::Socks5Pw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySettings {
    pub proxy_type: ProxyType,
    pub proxy_hostname: String,
    pub proxy_port: u16,
    pub proxy_username: String,
    pub proxy_password: String,
    pub proxy_peer_connections: bool,
    pub proxy_tracker_connections: bool,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            proxy_type: ProxyType::None,
            proxy_hostname: String::new(),
            proxy_port: 0,
            proxy_username: String::new(),
            proxy_password: String::new(),
            proxy_peer_connections: false,
            proxy_tracker_connections: false,
        }
    }
}

impl ProxySettings {
    /// 以 `(键, 值)` 形式列出，便于日志与引擎注入
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let proxy_type = match self.proxy_type {
            ProxyType::None => 0,
            ProxyType::Socks4 => 1,
            ProxyType::Socks5 => 2,
            ProxyType::Socks5Pw => 3,
            ProxyType::Http => 4,
            ProxyType::HttpPw => 5,
        };
        vec![
            ("proxy_type", proxy_type.to_string()),
            ("proxy_hostname", self.proxy_hostname.clone()),
            ("proxy_port", self.proxy_port.to_string()),
            ("proxy_username", self.proxy_username.clone()),
            ("proxy_password", self.proxy_password.clone()),
            ("proxy_peer_connections", self.proxy_peer_connections.to_string()),
            ("proxy_tracker_connections", self.proxy_tracker_connections.to_string()),
        ]
    }
}

/// 读取系统默认代理（环境变量）
pub fn translate(config: &ProxyConfig) -> ProxySettings {
    translate_with_env(config, |key| env::var(key).ok())
}

/// 与 `translate` 相同，环境变量由调用方提供
pub fn translate_with_env<F>(config: &ProxyConfig, lookup: F) -> ProxySettings
where
    F: Fn(&str) -> Option<String>,
{
    if !config.enabled {
        return ProxySettings::default();
    }
    let (kind, host, port, username, password) = match config.mode {
        ProxyMode::Manual => (
            config.kind,
            config.host.clone(),
            config.port,
            config.username.clone(),
            config.password.clone(),
        ),
        ProxyMode::Auto => match system_proxy(&lookup) {
            Some(found) => found,
            None => {
                debug!("未检测到系统代理，直连");
                return ProxySettings::default();
            }
        },
    };
    if host.trim().is_empty() || port == 0 {
        warn!("代理地址不完整 ({}:{})，已忽略代理设置", host, port);
        return ProxySettings::default();
    }

    // 用户名或密码任一为空时两者都清空，不下发半套凭据
    let (username, password) = if username.trim().is_empty() || password.trim().is_empty() {
        (String::new(), String::new())
    } else {
        (username, password)
    };
    let with_credentials = !username.is_empty();

    ProxySettings {
        proxy_type: ProxyType::for_kind(kind, with_credentials),
        proxy_hostname: host,
        proxy_port: port,
        proxy_username: username,
        proxy_password: password,
        proxy_peer_connections: true,
        proxy_tracker_connections: true,
    }
}

fn system_proxy<F>(lookup: &F) -> Option<(ProxyKind, String, u16, String, String)>
where
    F: Fn(&str) -> Option<String>,
{
    const KEYS: [&str; 6] = [
        "ALL_PROXY",
        "all_proxy",
        "HTTPS_PROXY",
        "https_proxy",
        "HTTP_PROXY",
        "http_proxy",
    ];
    let raw = KEYS
        .iter()
        .filter_map(|key| lookup(key))
        .find(|value| !value.trim().is_empty())?;
    let url = match Url::parse(raw.trim()) {
        Ok(url) => url,
        Err(e) => {
            warn!("系统代理地址无法解析 {}: {}", raw, e);
            return None;
        }
    };
    let kind = match url.scheme() {
        "socks4" | "socks4a" => ProxyKind::Socks4,
        "socks5" | "socks5h" => ProxyKind::Socks5,
        _ => ProxyKind::Http,
    };
    let host = url.host_str()?.to_string();
    let port = url.port_or_known_default().unwrap_or(match kind {
        ProxyKind::Http => 8080,
        _ => 1080,
    });
    let password = url.password().unwrap_or_default().to_string();
    Some((kind, host, port, url.username().to_string(), password))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn manual(kind: ProxyKind, username: &str, password: &str) -> ProxyConfig {
        ProxyConfig {
            enabled: true,
            mode: ProxyMode::Manual,
            kind,
            host: "127.0.0.1".to_string(),
            port: 1080,
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    #[test]
    fn test_disabled_proxy() {
        let config = ProxyConfig::default();
        assert_eq!(translate_with_env(&config, |_| None), ProxySettings::default());
    }

    #[test]
    fn test_blank_username_clears_both_credentials() {
        let settings = translate_with_env(&manual(ProxyKind::Socks5, "", "secret"), |_| None);
        assert_eq!(settings.proxy_username, "");
        assert_eq!(settings.proxy_password, "");
        assert_eq!(settings.proxy_type, ProxyType::Socks5);

        let settings = translate_with_env(&manual(ProxyKind::Http, "alice", "  "), |_| None);
        assert_eq!(settings.proxy_username, "");
        assert_eq!(settings.proxy_password, "");
        assert_eq!(settings.proxy_type, ProxyType::Http);
    }

    #[test]
    fn test_manual_with_credentials() {
        let settings = translate_with_env(&manual(ProxyKind::Socks5, "alice", "secret"), |_| None);
        assert_eq!(settings.proxy_type, ProxyType::Socks5Pw);
        assert_eq!(settings.proxy_hostname, "127.0.0.1");
        assert_eq!(settings.proxy_port, 1080);
        assert!(settings.proxy_peer_connections);
        assert!(settings.to_pairs().contains(&("proxy_type", "3".to_string())));
    }

    #[test]
    fn test_auto_reads_environment() {
        let env: HashMap<&str, &str> = [("https_proxy", "http://bob:pw@proxy.lan:3128")].into();
        let config = ProxyConfig {
            enabled: true,
            mode: ProxyMode::Auto,
            ..ProxyConfig::default()
        };
        let settings = translate_with_env(&config, |key| env.get(key).map(|v| v.to_string()));
        assert_eq!(settings.proxy_type, ProxyType::HttpPw);
        assert_eq!(settings.proxy_hostname, "proxy.lan");
        assert_eq!(settings.proxy_port, 3128);
        assert_eq!(settings.proxy_username, "bob");

        let direct = translate_with_env(&config, |_| None);
        assert_eq!(direct.proxy_type, ProxyType::None);
    }
}
