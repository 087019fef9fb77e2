use anyhow::{anyhow, Result};
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use lazy_static::lazy_static;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

lazy_static! {
    static ref GLOBAL_CONFIG_MANAGER: RwLock<Option<Arc<ConfigManager>>> = RwLock::new(None);
}

/// 环境变量前缀 / Environment variable prefix (`GRV_SERVER__WS_PORT` style keys)
pub const ENV_PREFIX: &str = "GRV";

/// 配置错误类型 / Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("配置项 '{key}' 不存在 / key '{key}' not found")]
    KeyNotFound { key: String },
    #[error("配置项 '{key}' 类型转换失败 / key '{key}' has wrong type: {message}")]
    TypeConversionError { key: String, message: String },
}

/// 配置数据源信息 / Loaded source description
#[derive(Debug, Clone)]
pub struct ConfigSourceInfo {
    pub source_type: String,
    pub description: String,
    pub priority: u8,
    pub loaded: bool,
}

/// 配置管理器 / Layered configuration manager
pub struct ConfigManager {
    config: Config,
    sources_info: Vec<ConfigSourceInfo>,
}

impl ConfigManager {
    /// 仅使用默认配置源创建 / Build from default sources only
    pub fn new() -> Result<Self> {
        Self::with_sources(vec![])
    }

    /// 在默认配置源之上叠加额外配置源 / Build with extra sources layered on top of defaults
    ///
    /// 优先级（后者覆盖前者）/ Priority (later wins):
    /// development.toml -> default.toml -> production.toml -> 环境变量 / env -> extra sources
    pub fn with_sources(sources: Vec<ConfigSource>) -> Result<Self> {
        let mut builder = Config::builder();
        let mut sources_info = Vec::new();

        let default_sources = vec![
            ConfigSource::File {
                path: "config/development.toml".to_string(),
                format: Some(FileFormat::Toml),
                required: false,
            },
            ConfigSource::File {
                path: "config/default.toml".to_string(),
                format: Some(FileFormat::Toml),
                required: false,
            },
            ConfigSource::File {
                path: "config/production.toml".to_string(),
                format: Some(FileFormat::Toml),
                required: false,
            },
            ConfigSource::Env {
                prefix: ENV_PREFIX.to_string(),
                separator: "__",
            },
        ];

        for (index, source) in default_sources.into_iter().chain(sources).enumerate() {
            let info = source.get_source_info(index as u8 + 1);

            // 可选文件不存在时跳过，必需文件不存在时报错
            // Skip missing optional files, fail on missing required ones
            if let ConfigSource::File { path, required, .. } = &source {
                if !std::path::Path::new(path).exists() {
                    if *required {
                        return Err(anyhow!("required config file not found: {}", path));
                    }
                    sources_info.push(info);
                    continue;
                }
            }

            builder = source.add_to_builder(builder)?;
            sources_info.push(ConfigSourceInfo {
                loaded: true,
                ..info
            });
        }

        let config = builder
            .build()
            .map_err(|e| anyhow!("构建配置失败 / failed to build config: {}", e))?;
        Ok(Self {
            config,
            sources_info,
        })
    }

    /// 在默认源之上加载指定文件 / Defaults plus one required file
    pub fn with_file(path: &str) -> Result<Self> {
        Self::with_sources(vec![ConfigSource::File {
            path: path.to_string(),
            format: None,
            required: true,
        }])
    }

    /// 获取指定 key 的配置值 / Read a typed value
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.config
            .get(key)
            .map_err(|e| anyhow!("获取配置 '{}' 失败 / failed to read '{}': {}", key, key, e))
    }

    /// 获取配置值，不存在时返回默认值 / Read a typed value or fall back to default
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    /// 安全获取配置值，返回详细错误 / Read with a structured error
    pub fn get_safe<T: DeserializeOwned>(&self, key: &str) -> std::result::Result<T, ConfigError> {
        self.config.get(key).map_err(|e| match e {
            config::ConfigError::NotFound(_) => ConfigError::KeyNotFound {
                key: key.to_string(),
            },
            other => ConfigError::TypeConversionError {
                key: key.to_string(),
                message: other.to_string(),
            },
        })
    }

    /// 检查配置项是否存在 / Whether a key is present
    pub fn exists(&self, key: &str) -> bool {
        self.config.get::<serde_json::Value>(key).is_ok()
    }

    /// 以日志形式输出配置源 / Log which sources were loaded
    pub fn log_sources_info(&self) {
        for info in &self.sources_info {
            if info.loaded {
                tracing::info!("🔧 config source loaded: {}", info.description);
            } else {
                tracing::debug!("config source skipped: {}", info.description);
            }
        }
    }
}

/// 配置源类型 / Configuration source kinds
pub enum ConfigSource {
    /// 文件配置源 / File source
    File {
        path: String,
        format: Option<FileFormat>,
        required: bool,
    },
    /// 环境变量配置源 / Environment source
    Env {
        prefix: String,
        separator: &'static str,
    },
    /// 内存配置源 / In-memory map
    Memory(HashMap<String, serde_json::Value>),
    /// 字符串配置源 / Inline string
    String { content: String, format: FileFormat },
}

impl ConfigSource {
    pub fn get_source_info(&self, priority: u8) -> ConfigSourceInfo {
        let (source_type, description) = match self {
            ConfigSource::File { path, required, .. } => (
                "File",
                format!("file {} (required: {})", path, required),
            ),
            ConfigSource::Env { prefix, separator } => (
                "Environment",
                format!("env prefix={} separator={}", prefix, separator),
            ),
            ConfigSource::Memory(map) => ("Memory", format!("memory, {} keys", map.len())),
            ConfigSource::String { .. } => ("String", "inline string".to_string()),
        };
        ConfigSourceInfo {
            source_type: source_type.to_string(),
            description,
            priority,
            loaded: false,
        }
    }

    pub fn add_to_builder(
        self,
        builder: ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<ConfigBuilder<config::builder::DefaultState>> {
        match self {
            ConfigSource::File {
                path,
                format,
                required,
            } => {
                let file_source = match format {
                    Some(format) => File::with_name(&path).format(format),
                    None => File::with_name(&path),
                };
                Ok(builder.add_source(file_source.required(required)))
            }
            ConfigSource::Env { prefix, separator } => Ok(builder.add_source(
                Environment::with_prefix(&prefix)
                    .separator(separator)
                    .prefix_separator("_")
                    .try_parsing(true)
                    .ignore_empty(true),
            )),
            ConfigSource::Memory(map) => {
                let json_content = serde_json::to_string(&map)
                    .map_err(|e| anyhow!("序列化内存配置失败 / memory source: {}", e))?;
                Ok(builder.add_source(File::from_str(&json_content, FileFormat::Json)))
            }
            ConfigSource::String { content, format } => {
                Ok(builder.add_source(File::from_str(&content, format)))
            }
        }
    }
}

/// 获取全局配置管理器（单例，首次访问时懒加载默认源）
/// Global config manager (singleton, lazily built from default sources)
pub fn get_global_config_manager() -> Result<Arc<ConfigManager>> {
    {
        let manager = GLOBAL_CONFIG_MANAGER
            .read()
            .map_err(|e| anyhow!("读取全局配置管理器锁失败 / config lock poisoned: {}", e))?;
        if let Some(ref config_manager) = *manager {
            return Ok(Arc::clone(config_manager));
        }
    }
    let mut manager = GLOBAL_CONFIG_MANAGER
        .write()
        .map_err(|e| anyhow!("获取全局配置管理器写锁失败 / config lock poisoned: {}", e))?;
    match manager.as_ref() {
        Some(existing) => Ok(Arc::clone(existing)),
        None => {
            let config_manager = Arc::new(ConfigManager::new()?);
            *manager = Some(Arc::clone(&config_manager));
            Ok(config_manager)
        }
    }
}

/// 使用指定文件初始化全局配置 / Initialise the global manager from a file
pub fn init_global_config_with_file(path: &str) -> Result<Arc<ConfigManager>> {
    let config_manager = Arc::new(ConfigManager::with_file(path)?);
    let mut manager = GLOBAL_CONFIG_MANAGER
        .write()
        .map_err(|e| anyhow!("获取全局配置管理器写锁失败 / config lock poisoned: {}", e))?;
    *manager = Some(Arc::clone(&config_manager));
    Ok(config_manager)
}
