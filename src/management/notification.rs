//! 通知记录
//!
//! 事件转发器把每个框架事件转换为一条带序号的通知。

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::module::{
    ModuleEvent, ModuleEventKind, ModuleId, ModuleState, ServiceEvent, ServiceEventKind, ServiceId,
};

/// 通知对应的事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "entity", content = "kind", rename_all = "lowercase")]
pub enum EventKind {
    Module(ModuleEventKind),
    Service(ServiceEventKind),
}

impl EventKind {
    pub fn is_module(&self) -> bool {
        matches!(self, EventKind::Module(_))
    }

    pub fn is_service(&self) -> bool {
        matches!(self, EventKind::Service(_))
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Module(kind) => write!(f, "module.{}", kind),
            EventKind::Service(kind) => write!(f, "service.{}", kind),
        }
    }
}

/// 模块事件载荷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleNotice {
    pub module_id: ModuleId,
    pub symbolic_name: String,
    pub version: String,
    pub location: String,
    pub state: ModuleState,
}

impl From<&ModuleEvent> for ModuleNotice {
    fn from(event: &ModuleEvent) -> Self {
        Self {
            module_id: event.module.id,
            symbolic_name: event.module.symbolic_name.clone(),
            version: event.module.version.to_string(),
            location: event.module.location.clone(),
            state: event.module.state,
        }
    }
}

/// 服务事件载荷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceNotice {
    pub service_id: ServiceId,
    pub interface_names: Vec<String>,
    pub module_id: ModuleId,
    pub module_symbolic_name: String,
    pub module_location: String,
}

impl From<&ServiceEvent> for ServiceNotice {
    fn from(event: &ServiceEvent) -> Self {
        Self {
            service_id: event.service.id,
            interface_names: event.service.interfaces.clone(),
            module_id: event.service.module_id,
            module_symbolic_name: event.module_symbolic_name.clone(),
            module_location: event.module_location.clone(),
        }
    }
}

/// 通知载荷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NotificationPayload {
    Module(ModuleNotice),
    Service(ServiceNotice),
}

/// 通知
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// 本次监控期间的序号，从 0 开始
    pub sequence: u64,
    pub event_kind: EventKind,
    pub payload: NotificationPayload,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    /// 受影响的模块（服务通知为注册服务的模块）
    pub fn module_id(&self) -> ModuleId {
        match &self.payload {
            NotificationPayload::Module(m) => m.module_id,
            NotificationPayload::Service(s) => s.module_id,
        }
    }

    pub fn service_id(&self) -> Option<ServiceId> {
        match &self.payload {
            NotificationPayload::Module(_) => None,
            NotificationPayload::Service(s) => Some(s.service_id),
        }
    }
}
