//! ManagementAgent SDK
//!
//! 管理层的统一入口。把模块目录、服务目录、事件转发器与权限边界组装在同一个框架之上：
//!
//! - 内省：模块与服务的结构化快照
//! - 通知：框架事件转发为带序号的通知流
//! - 权限：按位置保存编码权限
//!
//! # 示例
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chips_management::{ManagementAgent, ManagementConfig, ModuleDescriptor, ModuleRegistry};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = ModuleRegistry::new();
//! let config = ManagementConfig::builder().channel_capacity(256).build();
//! let agent = ManagementAgent::new(config, Arc::new(registry.clone()))?;
//!
//! let mut notifications = agent.subscribe();
//! agent.start()?;
//!
//! let id = registry.install(ModuleDescriptor::new("demo", "1.0.0", "file:demo.jar"))?;
//! let snapshot = agent.modules().get(id)?;
//! assert_eq!(snapshot.symbolic_name, "demo");
//! assert!(notifications.try_recv().is_ok());
//!
//! agent.stop()?;
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::core::config::ManagementConfig;
use crate::management::{
    EventForwarder, ModuleDirectory, Notification, PermissionManager, ServiceDirectory,
};
use crate::module::Framework;
use crate::utils::Result;

// ============================================================================
// ManagementAgent 主结构体
// ============================================================================

/// 管理代理
///
/// 只读地观察一个框架。目录查询随时可用，事件转发需要显式 `start()`。
///
/// # 组件
///
/// - `modules`: 模块目录
/// - `services`: 服务目录
/// - `forwarder`: 事件转发器
/// - `permissions`: 权限管理器（可选）
///
/// # 生命周期
///
/// 1. `new()` - 校验配置并组装组件
/// 2. `start()` - 开始转发事件
/// 3. `stop()` - 停止转发；丢弃代理时自动停止
pub struct ManagementAgent {
    /// 管理配置
    config: ManagementConfig,

    /// 被观察的框架
    framework: Arc<dyn Framework>,

    /// 模块目录
    modules: ModuleDirectory,

    /// 服务目录
    services: ServiceDirectory,

    /// 事件转发器
    forwarder: EventForwarder,

    /// 权限管理器
    permissions: Option<PermissionManager>,
}

impl std::fmt::Debug for ManagementAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagementAgent")
            .field("config", &self.config)
            .field("forwarder", &self.forwarder)
            .field("permissions", &self.permissions.is_some())
            .finish()
    }
}

impl ManagementAgent {
    // ========================================================================
    // 初始化和生命周期
    // ========================================================================

    /// 创建管理代理
    ///
    /// # Arguments
    ///
    /// * `config` - 管理配置
    /// * `framework` - 被观察的框架
    ///
    /// # Errors
    ///
    /// 配置校验失败时返回 `InvalidConfigValue`
    pub fn new(config: ManagementConfig, framework: Arc<dyn Framework>) -> Result<Self> {
        config.validate()?;
        info!("初始化管理代理 v{}", crate::VERSION);

        let modules = ModuleDirectory::new(framework.clone())
            .with_default_locale(config.directory.default_locale.clone());
        let services = ServiceDirectory::new(framework.clone());
        let forwarder = EventForwarder::with_config(framework.clone(), &config.notifications);
        debug!(
            channel_capacity = config.notifications.channel_capacity,
            default_locale = ?config.directory.default_locale,
            "管理组件初始化完成"
        );

        Ok(Self {
            config,
            framework,
            modules,
            services,
            forwarder,
            permissions: None,
        })
    }

    /// 从配置文件创建管理代理
    ///
    /// # Errors
    ///
    /// 配置文件读取、解析或校验失败
    pub async fn from_config_file(
        path: impl Into<PathBuf>,
        framework: Arc<dyn Framework>,
    ) -> Result<Self> {
        let config = ManagementConfig::from_file(path).await?;
        Self::new(config, framework)
    }

    /// 挂载权限管理器
    pub fn with_permissions(mut self, permissions: PermissionManager) -> Self {
        self.permissions = Some(permissions);
        self
    }

    /// 开始转发事件
    ///
    /// 已在转发中时不做任何操作。
    pub fn start(&self) -> Result<()> {
        self.forwarder.start()
    }

    /// 停止转发事件
    ///
    /// 幂等。返回后不会再发出通知。
    pub fn stop(&self) -> Result<()> {
        self.forwarder.stop()
    }

    /// 是否在转发中
    pub fn is_active(&self) -> bool {
        self.forwarder.is_active()
    }

    /// 新的通知接收端
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.forwarder.subscribe()
    }

    // ========================================================================
    // 组件访问
    // ========================================================================

    /// 模块目录
    pub fn modules(&self) -> &ModuleDirectory {
        &self.modules
    }

    /// 服务目录
    pub fn services(&self) -> &ServiceDirectory {
        &self.services
    }

    /// 事件转发器
    pub fn forwarder(&self) -> &EventForwarder {
        &self.forwarder
    }

    /// 权限管理器，未挂载时为 `None`
    pub fn permissions(&self) -> Option<&PermissionManager> {
        self.permissions.as_ref()
    }

    /// 被观察的框架
    pub fn framework(&self) -> &Arc<dyn Framework> {
        &self.framework
    }

    /// 管理配置
    pub fn config(&self) -> &ManagementConfig {
        &self.config
    }
}
