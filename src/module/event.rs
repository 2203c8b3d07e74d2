//! 框架变更事件
//!
//! 框架在模块生命周期与服务注册表发生变化时，在执行变更的线程上同步投递这些事件。

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::metadata::Module;
use super::service::ServiceReference;

/// 模块事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ModuleEventKind {
    Installed,
    Resolved,
    Started,
    Stopping,
    Stopped,
    Updated,
    Unresolved,
    Uninstalled,
}

impl ModuleEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleEventKind::Installed => "INSTALLED",
            ModuleEventKind::Resolved => "RESOLVED",
            ModuleEventKind::Started => "STARTED",
            ModuleEventKind::Stopping => "STOPPING",
            ModuleEventKind::Stopped => "STOPPED",
            ModuleEventKind::Updated => "UPDATED",
            ModuleEventKind::Unresolved => "UNRESOLVED",
            ModuleEventKind::Uninstalled => "UNINSTALLED",
        }
    }
}

impl fmt::Display for ModuleEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 服务事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceEventKind {
    Registered,
    Modified,
    /// 属性修改后不再匹配监听器的过滤条件
    ModifiedEndmatch,
    Unregistering,
}

impl ServiceEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceEventKind::Registered => "REGISTERED",
            ServiceEventKind::Modified => "MODIFIED",
            ServiceEventKind::ModifiedEndmatch => "MODIFIED_ENDMATCH",
            ServiceEventKind::Unregistering => "UNREGISTERING",
        }
    }
}

impl fmt::Display for ServiceEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 模块事件
#[derive(Debug, Clone)]
pub struct ModuleEvent {
    pub kind: ModuleEventKind,
    /// 事件发生时受影响模块的观察值
    pub module: Module,
}

/// 服务事件
#[derive(Debug, Clone)]
pub struct ServiceEvent {
    pub kind: ServiceEventKind,
    /// 事件发生时服务引用的观察值
    pub service: ServiceReference,
    /// 发布模块的符号名与位置（服务注销后无法再反查）
    pub module_symbolic_name: String,
    pub module_location: String,
}

/// 监听器标识
pub type ListenerId = u64;

/// 模块事件回调
///
/// 回调在投递线程上同步执行，必须线程安全且不能阻塞。
pub type ModuleListener = Arc<dyn Fn(&ModuleEvent) + Send + Sync>;

/// 服务事件回调
pub type ServiceListener = Arc<dyn Fn(&ServiceEvent) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_names() {
        assert_eq!(ModuleEventKind::Uninstalled.to_string(), "UNINSTALLED");
        assert_eq!(ServiceEventKind::ModifiedEndmatch.to_string(), "MODIFIED_ENDMATCH");
    }

    #[test]
    fn test_event_kind_serialization() {
        let json = serde_json::to_string(&ServiceEventKind::ModifiedEndmatch).unwrap();
        assert_eq!(json, "\"MODIFIED_ENDMATCH\"");
        let kind: ModuleEventKind = serde_json::from_str("\"STARTED\"").unwrap();
        assert_eq!(kind, ModuleEventKind::Started);
    }
}
