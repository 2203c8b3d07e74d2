//! 管理层配置
//!
//! 定义日志、通知通道与目录查询的配置结构和加载逻辑。
//! 配置文件按扩展名选择格式：`.json` 为 JSON，其余按 YAML 解析。

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::utils::logger::RotationStrategy;
use crate::utils::{ManagementError, Result};

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否输出到文件
    #[serde(default)]
    pub file_output: bool,

    /// 日志文件目录
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// 是否输出 JSON 格式
    #[serde(default)]
    pub json_format: bool,

    /// 日志轮转策略（never / hourly / daily）
    #[serde(default = "default_rotation")]
    pub rotation: String,

    /// 保留日志文件数
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

fn default_max_files() -> usize {
    7
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_output: false,
            log_dir: None,
            json_format: false,
            rotation: default_rotation(),
            max_files: default_max_files(),
        }
    }
}

/// 通知配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// 广播通道容量，慢速接收者超出后丢弃最旧的通知
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// 是否转发模块事件
    #[serde(default = "default_true")]
    pub monitor_modules: bool,

    /// 是否转发服务事件
    #[serde(default = "default_true")]
    pub monitor_services: bool,
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_true() -> bool {
    true
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            monitor_modules: true,
            monitor_services: true,
        }
    }
}

/// 目录查询配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// 读取清单头时未指定语言环境所使用的默认值
    #[serde(default)]
    pub default_locale: Option<String>,
}

/// 管理层配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManagementConfig {
    /// 配置文件路径
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    /// 日志配置
    #[serde(default)]
    pub logging: LogConfig,

    /// 通知配置
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// 目录查询配置
    #[serde(default)]
    pub directory: DirectoryConfig,
}

impl ManagementConfig {
    /// 创建配置构建器
    pub fn builder() -> ManagementConfigBuilder {
        ManagementConfigBuilder::new()
    }

    /// 从文件加载配置
    ///
    /// # Errors
    ///
    /// - 文件读取失败
    /// - 内容无法解析
    /// - 校验不通过
    pub async fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            ManagementError::ConfigLoadFailed(format!("{}: {}", path.display(), e))
        })?;

        let mut config: ManagementConfig =
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                serde_json::from_str(&content)?
            } else {
                serde_yaml::from_str(&content)?
            };

        config.validate()?;
        tracing::debug!(path = %path.display(), "已加载配置文件");
        config.config_path = Some(path);
        Ok(config)
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.notifications.channel_capacity == 0 {
            return Err(ManagementError::InvalidConfigValue {
                key: "notifications.channel_capacity".to_string(),
                reason: "通道容量必须大于 0".to_string(),
            });
        }
        if !self.notifications.monitor_modules && !self.notifications.monitor_services {
            return Err(ManagementError::InvalidConfigValue {
                key: "notifications".to_string(),
                reason: "至少需要监控模块事件或服务事件之一".to_string(),
            });
        }
        RotationStrategy::from_str(&self.logging.rotation)?;
        if self.logging.file_output && self.logging.log_dir.is_none() {
            return Err(ManagementError::InvalidConfigValue {
                key: "logging.log_dir".to_string(),
                reason: "启用文件日志时必须指定目录".to_string(),
            });
        }
        Ok(())
    }

    /// 合并另一个配置（用于覆盖）
    ///
    /// 只覆盖对方与默认值不同的项。
    pub fn merge(&mut self, other: ManagementConfig) {
        if other.logging.level != default_log_level() {
            self.logging.level = other.logging.level;
        }
        if other.logging.file_output {
            self.logging.file_output = true;
            self.logging.log_dir = other.logging.log_dir;
        }
        if other.logging.json_format {
            self.logging.json_format = true;
        }
        if other.logging.rotation != default_rotation() {
            self.logging.rotation = other.logging.rotation;
        }
        if other.notifications.channel_capacity != default_channel_capacity() {
            self.notifications.channel_capacity = other.notifications.channel_capacity;
        }
        if !other.notifications.monitor_modules {
            self.notifications.monitor_modules = false;
        }
        if !other.notifications.monitor_services {
            self.notifications.monitor_services = false;
        }
        if other.directory.default_locale.is_some() {
            self.directory.default_locale = other.directory.default_locale;
        }
    }
}

/// 配置构建器
#[derive(Debug, Default)]
pub struct ManagementConfigBuilder {
    config: ManagementConfig,
}

impl ManagementConfigBuilder {
    /// 创建新的构建器
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置日志级别
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// 启用文件日志
    pub fn file_logging(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.config.logging.file_output = true;
        self.config.logging.log_dir = Some(log_dir.into());
        self
    }

    /// 启用 JSON 格式日志
    pub fn json_logging(mut self) -> Self {
        self.config.logging.json_format = true;
        self
    }

    /// 设置通知通道容量
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.notifications.channel_capacity = capacity;
        self
    }

    /// 设置是否转发模块事件
    pub fn monitor_modules(mut self, enabled: bool) -> Self {
        self.config.notifications.monitor_modules = enabled;
        self
    }

    /// 设置是否转发服务事件
    pub fn monitor_services(mut self, enabled: bool) -> Self {
        self.config.notifications.monitor_services = enabled;
        self
    }

    /// 设置默认语言环境
    pub fn default_locale(mut self, locale: impl Into<String>) -> Self {
        self.config.directory.default_locale = Some(locale.into());
        self
    }

    /// 构建配置
    pub fn build(self) -> ManagementConfig {
        self.config
    }
}
