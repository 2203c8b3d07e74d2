//! 管理层
//!
//! 把活动的模块/服务图转换为可查询的结构化快照，并把变更事件转发为带序号的通知。
//!
//! # 组件
//!
//! - [`property`] - 属性编码器
//! - [`revision`] - 修订版本身份跟踪器
//! - [`wiring`] - 连线图构建器
//! - [`fields`] - 字段掩码与字段名选择
//! - [`module_state`] - 模块目录
//! - [`service_state`] - 服务目录
//! - [`forwarder`] - 事件转发器
//! - [`permission`] - 权限存储边界

pub mod fields;
pub mod forwarder;
pub mod module_state;
pub mod notification;
pub mod permission;
pub mod property;
pub mod revision;
pub mod service_state;
pub mod wiring;

pub use fields::{Field, FieldSet, ModuleField, Record, ServiceField};
pub use forwarder::{EventForwarder, Subscribable};
pub use module_state::{HeaderEntry, ModuleDirectory, ModuleSnapshot};
pub use notification::{EventKind, ModuleNotice, Notification, NotificationPayload, ServiceNotice};
pub use permission::{MemoryPermissionStore, PermissionInfo, PermissionManager, PermissionStore};
pub use property::{PropertyEntry, Scalar, ScalarType, StructuredValue};
pub use revision::{RevisionId, RevisionTracker};
pub use service_state::{ServiceDirectory, ServiceSnapshot};
pub use wiring::{
    CapabilityRecord, Direction, RequirementRecord, WireRecord, WiringGraph, WiringSnapshot,
};

use crate::utils::{ErrorKind, ManagementError};

/// 记录请求失败并原样返回错误
///
/// 编码失败属于意外错误，按 error 级别记录；其余按 debug 记录。
pub(crate) fn report(operation: &str, error: ManagementError) -> ManagementError {
    match error.kind() {
        ErrorKind::Encoding | ErrorKind::Internal => tracing::error!(
            operation = %operation,
            error_code = error.error_code(),
            error = %error,
            "管理请求失败"
        ),
        _ => tracing::debug!(
            operation = %operation,
            error_code = error.error_code(),
            error = %error,
            "管理请求失败"
        ),
    }
    error
}
