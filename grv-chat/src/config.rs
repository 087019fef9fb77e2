use anyhow::{anyhow, Result};
use grv::{ConfigError, ConfigManager};
use std::time::Duration;

use crate::registry::DEFAULT_OUTBOUND_CAPACITY;
use crate::storage::postgres::build_postgres_url;
use crate::storage::{DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT};

/// 监听配置 / Listener configuration
#[derive(Clone, Debug, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub ws_port: u16,
    pub http_port: u16,
    pub ws_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            ws_port: 5200,
            http_port: 8080,
            ws_path: "/ws/chat".to_string(),
        }
    }
}

/// 消息管道参数 / Messaging pipeline tunables
#[derive(Clone, Debug, PartialEq)]
pub struct ChatConfig {
    pub outbound_capacity: usize,
    pub max_content_chars: usize,
    pub store_timeout: Duration,
    pub read_timeout: Duration,
    pub ping_interval: Duration,
    pub write_timeout: Duration,
    pub max_inflight_events: usize,
    pub history_default_limit: usize,
    pub history_max_limit: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            max_content_chars: 10_000,
            store_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(60),
            ping_interval: Duration::from_secs(30),
            write_timeout: Duration::from_secs(10),
            max_inflight_events: 64,
            history_default_limit: DEFAULT_HISTORY_LIMIT,
            history_max_limit: MAX_HISTORY_LIMIT,
        }
    }
}

/// 存储后端 / Storage backend selection
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Postgres,
    /// 不持久化：只投递，历史与已读不可用 / Deliver only; history and receipts unavailable
    Disabled,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            url: None,
            max_connections: 10,
        }
    }
}

fn millis(cm: &ConfigManager, key: &str, default: Duration) -> Duration {
    let ms: i64 = cm.get_or(key, default.as_millis() as i64);
    if ms > 0 {
        Duration::from_millis(ms as u64)
    } else {
        default
    }
}

fn positive(cm: &ConfigManager, key: &str, default: usize) -> usize {
    let v: i64 = cm.get_or(key, default as i64);
    if v > 0 {
        v as usize
    } else {
        default
    }
}

/// 读取整数并检查目标类型的取值范围；缺省时用默认值，越界或类型错误直接报错
/// Read an integer that must fit the target type; absent keys take the default,
/// out-of-range or mistyped values are rejected
fn ranged<T>(cm: &ConfigManager, key: &str, default: T) -> Result<T>
where
    T: TryFrom<i64>,
{
    let raw: i64 = match cm.get_safe(key) {
        Ok(v) => v,
        Err(ConfigError::KeyNotFound { .. }) => return Ok(default),
        Err(e) => return Err(e.into()),
    };
    T::try_from(raw).map_err(|_| anyhow!("{} = {} is out of range", key, raw))
}

impl ServerConfig {
    pub fn from_manager(cm: &ConfigManager) -> Result<Self> {
        let d = Self::default();
        let mut ws_path: String = cm.get_or("server.ws_path", d.ws_path.clone());
        if !ws_path.starts_with('/') {
            ws_path.insert(0, '/');
        }
        Ok(Self {
            host: cm.get_or("server.host", d.host),
            ws_port: ranged(cm, "server.ws_port", d.ws_port)?,
            http_port: ranged(cm, "server.http_port", d.http_port)?,
            ws_path,
        })
    }
}

impl ChatConfig {
    pub fn from_manager(cm: &ConfigManager) -> Self {
        let d = Self::default();
        let history_max_limit = positive(cm, "chat.history_max_limit", d.history_max_limit);
        Self {
            outbound_capacity: positive(cm, "chat.outbound_capacity", d.outbound_capacity),
            max_content_chars: positive(cm, "chat.max_content_chars", d.max_content_chars),
            store_timeout: millis(cm, "chat.store_timeout_ms", d.store_timeout),
            read_timeout: millis(cm, "chat.read_timeout_ms", d.read_timeout),
            ping_interval: millis(cm, "chat.ping_interval_ms", d.ping_interval),
            write_timeout: millis(cm, "chat.write_timeout_ms", d.write_timeout),
            max_inflight_events: positive(cm, "chat.max_inflight_events", d.max_inflight_events),
            history_default_limit: positive(cm, "chat.history_default_limit", d.history_default_limit)
                .min(history_max_limit),
            history_max_limit,
        }
    }
}

impl StorageConfig {
    pub fn from_manager(cm: &ConfigManager) -> Result<Self> {
        let d = Self::default();
        let backend: String = cm.get_or("storage.backend", "memory".to_string());
        let backend = match backend.to_lowercase().as_str() {
            "memory" => StorageBackend::Memory,
            "postgres" | "postgresql" => StorageBackend::Postgres,
            "none" | "disabled" => StorageBackend::Disabled,
            other => return Err(anyhow!("unsupported storage.backend: {}", other)),
        };

        // 未给出 url 时按分项拼接 / compose from parts when no url is given
        let port: u16 = ranged(cm, "storage.port", 5432)?;
        let url = cm.get::<String>("storage.url").ok().or_else(|| {
            cm.exists("storage.host").then(|| {
                build_postgres_url(
                    &cm.get_or("storage.host", "127.0.0.1".to_string()),
                    port,
                    &cm.get_or("storage.user", "postgres".to_string()),
                    &cm.get_or("storage.pass", String::new()),
                    &cm.get_or("storage.name", "postgres".to_string()),
                )
            })
        });
        if backend == StorageBackend::Postgres && url.is_none() {
            return Err(anyhow!("storage.backend = postgres requires storage.url or storage.host"));
        }

        Ok(Self {
            backend,
            url,
            max_connections: ranged(cm, "storage.max_connections", d.max_connections)?,
        })
    }
}

/// 全部运行配置 / Complete runtime configuration
#[derive(Clone, Debug, Default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub chat: ChatConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    pub fn from_manager(cm: &ConfigManager) -> Result<Self> {
        Ok(Self {
            server: ServerConfig::from_manager(cm)?,
            chat: ChatConfig::from_manager(cm),
            storage: StorageConfig::from_manager(cm)?,
        })
    }
}

/// 从全局配置管理器加载 / Load from the global config manager
pub fn load() -> Result<AppConfig> {
    let cm = grv::get_global_config_manager()?;
    AppConfig::from_manager(&cm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use grv::{ConfigSource, FileFormat};

    fn manager(toml: &str) -> ConfigManager {
        ConfigManager::with_sources(vec![ConfigSource::String {
            content: toml.to_string(),
            format: FileFormat::Toml,
        }])
        .unwrap()
    }

    #[test]
    fn test_overrides_and_clamping() {
        let cm = manager(
            r#"
            [server]
            ws_path = "chat"
            ws_port = 6000
            [chat]
            outbound_capacity = 0
            store_timeout_ms = 1500
            history_default_limit = 500
            history_max_limit = 80
            "#,
        );
        let server = ServerConfig::from_manager(&cm).unwrap();
        assert_eq!(server.ws_path, "/chat");
        assert_eq!(server.ws_port, 6000);

        let chat = ChatConfig::from_manager(&cm);
        assert_eq!(chat.outbound_capacity, DEFAULT_OUTBOUND_CAPACITY);
        assert_eq!(chat.store_timeout, Duration::from_millis(1500));
        assert_eq!(chat.history_max_limit, 80);
        assert_eq!(chat.history_default_limit, 80);
    }

    #[test]
    fn test_storage_backends() {
        let cm = manager("[storage]\nbackend = \"none\"");
        assert_eq!(
            StorageConfig::from_manager(&cm).unwrap().backend,
            StorageBackend::Disabled
        );

        let cm = manager("[storage]\nbackend = \"postgres\"\nhost = \"db\"\nuser = \"u\"\nname = \"m\"");
        let storage = StorageConfig::from_manager(&cm).unwrap();
        assert_eq!(storage.url.as_deref(), Some("postgres://u:@db:5432/m"));

        let cm = manager("[storage]\nbackend = \"sqlite\"");
        assert!(StorageConfig::from_manager(&cm).is_err());
    }

    #[test]
    fn test_out_of_range_numbers_are_rejected() {
        let cm = manager("[server]\nws_port = 70000");
        let err = ServerConfig::from_manager(&cm).unwrap_err();
        assert!(err.to_string().contains("server.ws_port"));

        let cm = manager("[server]\nhttp_port = -1");
        assert!(ServerConfig::from_manager(&cm).is_err());

        let cm = manager("[server]\nws_port = \"high\"");
        assert!(ServerConfig::from_manager(&cm).is_err());

        let cm = manager("[storage]\nmax_connections = 5000000000");
        assert!(StorageConfig::from_manager(&cm).is_err());

        let cm = manager("[storage]\nbackend = \"postgres\"\nhost = \"db\"\nport = 99999");
        assert!(StorageConfig::from_manager(&cm).is_err());

        let cm = manager("[server]\nhost = \"0.0.0.0\"");
        assert_eq!(ServerConfig::from_manager(&cm).unwrap().ws_port, 5200);
    }
}
