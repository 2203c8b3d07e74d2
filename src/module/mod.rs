//! 模块框架模型
//!
//! 包含被观察的活动模块/服务图：
//! - 模块、修订版本、能力与需求
//! - 服务引用与动态属性值
//! - 生命周期事件与监听器
//! - LDAP 风格过滤表达式
//! - 框架边界 trait 及其内存实现

pub mod event;
pub mod filter;
pub mod framework;
pub mod metadata;
pub mod registry;
pub mod service;
pub mod value;

// 重导出常用类型
pub use event::{
    ListenerId, ModuleEvent, ModuleEventKind, ModuleListener, ServiceEvent, ServiceEventKind,
    ServiceListener,
};
pub use filter::Filter;
pub use framework::{Framework, ModuleWiring, Wire, WiringRef};
pub use metadata::{
    header, namespace, Capability, Module, ModuleDescriptor, ModuleId, ModuleState, Requirement,
    Revision,
};
pub use registry::ModuleRegistry;
pub use service::{ServiceId, ServiceReference, OBJECT_CLASS, SERVICE_ID, SERVICE_RANKING};
pub use value::PropertyValue;
