//! 服务引用
//!
//! 服务是某个模块以一个或多个接口名发布的对象。管理层只观察服务引用，
//! 不接触服务对象本身。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::metadata::ModuleId;
use super::value::PropertyValue;

/// 服务标识，由框架单调分配，不会复用
pub type ServiceId = u64;

/// 服务 ID 属性名
pub const SERVICE_ID: &str = "service.id";

/// 接口名属性名
pub const OBJECT_CLASS: &str = "objectClass";

/// 服务排序属性名
pub const SERVICE_RANKING: &str = "service.ranking";

/// 服务引用
///
/// 服务在某一时刻的观察值。`properties` 中总是包含 `service.id` 与 `objectClass`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceReference {
    /// 服务标识
    pub id: ServiceId,

    /// 发布服务的模块
    pub module_id: ModuleId,

    /// 发布的接口名
    pub interfaces: Vec<String>,

    /// 服务属性
    pub properties: BTreeMap<String, PropertyValue>,

    /// 正在使用该服务的模块
    pub using_modules: Vec<ModuleId>,
}

impl ServiceReference {
    /// 读取属性（属性名大小写不敏感）
    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key).or_else(|| {
            self.properties
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v)
        })
    }

    /// 是否以指定接口名发布
    pub fn provides(&self, interface: &str) -> bool {
        self.interfaces.iter().any(|i| i == interface)
    }
}
