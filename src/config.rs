//! 客户端配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `WEBCHAT__*` 覆盖（双下划线表示嵌套，如 `WEBCHAT__SESSION__MINUTES_UNTIL_INACTIVE=30`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// 配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub transport: TransportSection,
    #[serde(default)]
    pub api: ApiSection,
}

/// [app] 段：演示客户端连接的后端与 contact point
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub host: Option<String>,
    pub contact_point: Option<String>,
}

/// [session] 段：客户端不活跃超时
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSection {
    #[serde(default = "default_minutes_until_inactive")]
    pub minutes_until_inactive: u64,
    /// 超时窗口之外的固定宽限
    #[serde(default = "default_inactivity_grace_ms")]
    pub inactivity_grace_ms: u64,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            minutes_until_inactive: default_minutes_until_inactive(),
            inactivity_grace_ms: default_inactivity_grace_ms(),
        }
    }
}

impl SessionSection {
    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.minutes_until_inactive * 60)
            + Duration::from_millis(self.inactivity_grace_ms)
    }
}

fn default_minutes_until_inactive() -> u64 {
    60
}

fn default_inactivity_grace_ms() -> u64 {
    1000
}

/// [retry] 段：覆盖默认的状态码分类
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RetrySection {
    #[serde(default)]
    pub retryable_statuses: Vec<u16>,
    #[serde(default)]
    pub fatal_statuses: Vec<u16>,
}

/// [transport] 段：socket 连接次数上限与重连间隔
#[derive(Debug, Clone, Deserialize)]
pub struct TransportSection {
    #[serde(default = "default_max_connection_attempts")]
    pub max_connection_attempts: u32,
    /// 连接关闭后的重连间隔；过短会在网关断开时打爆后端
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            max_connection_attempts: default_max_connection_attempts(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
        }
    }
}

fn default_max_connection_attempts() -> u32 {
    100
}

fn default_reconnect_interval_ms() -> u64 {
    10_000
}

/// [api] 段：REST 请求超时与客户端标识
#[derive(Debug, Clone, Deserialize)]
pub struct ApiSection {
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_client_id")]
    pub client_id: String,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            client_id: default_client_id(),
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_client_id() -> String {
    "webchat-session".to_string()
}

/// 从 config 目录加载配置，环境变量 WEBCHAT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 WEBCHAT__*
pub fn load_config(config_path: Option<PathBuf>) -> Result<ClientConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default"] {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("WEBCHAT")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.session.minutes_until_inactive, 60);
        assert_eq!(
            cfg.session.inactivity_timeout(),
            Duration::from_millis(60 * 60 * 1000 + 1000)
        );
        assert_eq!(cfg.transport.reconnect_interval_ms, 10_000);
        assert!(cfg.retry.retryable_statuses.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[session]
minutes_until_inactive = 5

[retry]
fatal_statuses = [500]

[app]
host = "https://tenant.example.com"
contact_point = "default"
"#
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.session.minutes_until_inactive, 5);
        assert_eq!(cfg.session.inactivity_grace_ms, 1000);
        assert_eq!(cfg.retry.fatal_statuses, vec![500]);
        assert_eq!(cfg.app.contact_point.as_deref(), Some("default"));
        assert_eq!(cfg.api.client_id, "webchat-session");
    }
}
