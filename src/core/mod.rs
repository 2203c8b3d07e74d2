//! 核心模块
//!
//! 包含管理层配置。

pub mod config;

pub use config::{
    DirectoryConfig, LogConfig, ManagementConfig, ManagementConfigBuilder, NotificationConfig,
};
