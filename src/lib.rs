//! # Chips Management - 薯片模块管理层
//!
//! 在模块/服务框架之上提供只读的管理视图：
//!
//! - **模块目录**: 每个已安装模块的结构化快照，支持按字段掩码或字段名裁剪
//! - **服务目录**: 服务快照、属性编码与 LDAP 风格过滤
//! - **连线图**: 按命名空间查看能力、需求与连线
//! - **事件转发**: 模块与服务事件转换为带序号的通知流
//! - **权限边界**: 按安装位置保存编码权限
//!
//! ## 快速开始
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chips_management::{ManagementAgent, ManagementConfig, ModuleRegistry};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = ModuleRegistry::new();
//! let agent = ManagementAgent::new(ManagementConfig::default(), Arc::new(registry))?;
//!
//! agent.start()?;
//! for module in agent.modules().list()? {
//!     println!("{} {} {:?}", module.symbolic_name, module.version, module.state);
//! }
//! agent.stop()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## 模块结构
//!
//! - `module` - 框架模型：模块、修订版本、服务、事件、过滤表达式与内存注册表
//! - `management` - 目录查询、连线图、事件转发与权限边界
//! - `utils` - 错误类型与日志系统
//! - `core` - 管理层配置
//! - `api` - 管理代理入口

#![warn(rustdoc::missing_crate_level_docs)]

pub mod api;
pub mod core;
pub mod management;
pub mod module;
pub mod utils;

// 重导出常用类型，方便使用
pub use module::{
    Capability, Filter, Framework, Module, ModuleDescriptor, ModuleEvent, ModuleEventKind,
    ModuleId, ModuleRegistry, ModuleState, PropertyValue, Requirement, Revision, ServiceEvent,
    ServiceEventKind, ServiceId, ServiceReference,
};

pub use management::{
    EventForwarder, EventKind, FieldSet, ModuleDirectory, ModuleField, ModuleSnapshot,
    Notification, NotificationPayload, PermissionManager, Record, ServiceDirectory, ServiceField,
    ServiceSnapshot, StructuredValue, WiringSnapshot,
};

pub use utils::{error_code, status_code, ErrorKind, ManagementError, Result};
pub use utils::logger::{fields, LogGuard, Logger, LoggerConfig, LoggerConfigBuilder, RotationStrategy};

pub use crate::core::config::{
    DirectoryConfig, LogConfig, ManagementConfig, ManagementConfigBuilder, NotificationConfig,
};
pub use api::sdk::ManagementAgent;

/// 库版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
