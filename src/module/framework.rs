//! 框架边界
//!
//! 管理层观察的是一个由外部调度器并发修改的模块/服务图。
//! [`Framework`] 抽象了这张活图的只读视图与事件订阅，目录与事件转发器
//! 都只通过 `Arc<dyn Framework>` 访问它。
//!
//! 单个实体的读取（`module`、`wiring`、`registered_services` 等）在一次加锁内
//! 组装出完整的值；列表读取只保证反映调用时刻的某个有效状态。

use std::collections::BTreeMap;
use std::sync::Arc;

use super::event::{ListenerId, ModuleListener, ServiceListener};
use super::filter::Filter;
use super::metadata::{Capability, Module, ModuleId, Requirement, Revision};
use super::service::ServiceReference;

/// 连线端点：某个仍持有连线视图的修订版本
#[derive(Debug, Clone)]
pub struct WiringRef {
    /// 修订版本所属模块
    pub module_id: ModuleId,

    /// 修订版本本身（身份即对象）
    pub revision: Arc<Revision>,
}

/// 一条已解析的连线
///
/// 端点的连线视图可能已经消失（例如模块在查询过程中被卸载），
/// 此时对应端点为 `None`。
#[derive(Debug, Clone)]
pub struct Wire {
    /// 被满足的需求
    pub requirement: Requirement,

    /// 满足需求的能力
    pub capability: Capability,

    /// 提供方
    pub provider: Option<WiringRef>,

    /// 需求方
    pub requirer: Option<WiringRef>,
}

impl Wire {
    /// 连线所在命名空间
    pub fn namespace(&self) -> &str {
        &self.capability.namespace
    }

    /// 两端连线视图是否都存在
    pub fn is_complete(&self) -> bool {
        self.provider.is_some() && self.requirer.is_some()
    }
}

/// 模块当前修订版本的连线视图
#[derive(Debug, Clone)]
pub struct ModuleWiring {
    /// 模块标识
    pub module_id: ModuleId,

    /// 当前修订版本
    pub revision: Arc<Revision>,

    /// 本修订版本作为提供方的连线
    pub provided: Vec<Wire>,

    /// 本修订版本作为需求方的连线
    pub required: Vec<Wire>,
}

impl ModuleWiring {
    /// 指定命名空间下提供出去的连线
    pub fn provided_in<'a>(&'a self, ns: &'a str) -> impl Iterator<Item = &'a Wire> + 'a {
        self.provided.iter().filter(move |w| w.namespace() == ns)
    }

    /// 指定命名空间下依赖的连线
    pub fn required_in<'a>(&'a self, ns: &'a str) -> impl Iterator<Item = &'a Wire> + 'a {
        self.required.iter().filter(move |w| w.namespace() == ns)
    }
}

/// 活动模块/服务图的只读视图
pub trait Framework: Send + Sync {
    /// 当前已安装的所有模块，按 ID 升序
    fn modules(&self) -> Vec<Module>;

    /// 单个模块的观察值
    fn module(&self, id: ModuleId) -> Option<Module>;

    /// 模块当前修订版本
    fn revision(&self, id: ModuleId) -> Option<Arc<Revision>>;

    /// 模块清单头
    ///
    /// `locale` 为 `None` 时返回原始清单头；否则以该语言环境的翻译覆盖，
    /// 找不到精确匹配时回退到语言部分（`en_US` → `en`）。
    fn headers(&self, id: ModuleId, locale: Option<&str>) -> Option<BTreeMap<String, String>>;

    /// 模块当前修订版本的连线视图，未解析或模块不存在时为 `None`
    fn wiring(&self, id: ModuleId) -> Option<ModuleWiring>;

    /// 模块注册的服务，模块不存在时为 `None`
    fn registered_services(&self, id: ModuleId) -> Option<Vec<ServiceReference>>;

    /// 模块正在使用的服务，模块不存在时为 `None`
    fn services_in_use(&self, id: ModuleId) -> Option<Vec<ServiceReference>>;

    /// 按接口名与过滤条件查询服务引用，按服务 ID 升序
    fn service_references(
        &self,
        interface: Option<&str>,
        filter: Option<&Filter>,
    ) -> Vec<ServiceReference>;

    /// 注册模块事件监听器
    fn add_module_listener(&self, listener: ModuleListener) -> ListenerId;

    /// 移除模块事件监听器，返回是否确有移除
    fn remove_module_listener(&self, id: ListenerId) -> bool;

    /// 注册服务事件监听器，可附带过滤条件
    fn add_service_listener(&self, listener: ServiceListener, filter: Option<Filter>)
        -> ListenerId;

    /// 移除服务事件监听器，返回是否确有移除
    fn remove_service_listener(&self, id: ListenerId) -> bool;
}


/// 测试用框架替身：`modules()` 仍列出被隐藏的模块，但针对它的单体读取
/// 都返回 `None`，等价于模块在列表读取之后被卸载
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::module::registry::ModuleRegistry;

    pub(crate) struct VanishingFramework {
        pub inner: ModuleRegistry,
        pub hidden: ModuleId,
    }

    impl VanishingFramework {
        fn visible(&self, id: ModuleId) -> bool {
            id != self.hidden
        }
    }

    impl Framework for VanishingFramework {
        fn modules(&self) -> Vec<Module> {
            Framework::modules(&self.inner)
        }

        fn module(&self, id: ModuleId) -> Option<Module> {
            self.visible(id).then(|| Framework::module(&self.inner, id)).flatten()
        }

        fn revision(&self, id: ModuleId) -> Option<Arc<Revision>> {
            self.visible(id).then(|| Framework::revision(&self.inner, id)).flatten()
        }

        fn headers(&self, id: ModuleId, locale: Option<&str>) -> Option<BTreeMap<String, String>> {
            self.visible(id)
                .then(|| Framework::headers(&self.inner, id, locale))
                .flatten()
        }

        fn wiring(&self, id: ModuleId) -> Option<ModuleWiring> {
            self.visible(id).then(|| Framework::wiring(&self.inner, id)).flatten()
        }

        fn registered_services(&self, id: ModuleId) -> Option<Vec<ServiceReference>> {
            self.visible(id)
                .then(|| Framework::registered_services(&self.inner, id))
                .flatten()
        }

        fn services_in_use(&self, id: ModuleId) -> Option<Vec<ServiceReference>> {
            self.visible(id)
                .then(|| Framework::services_in_use(&self.inner, id))
                .flatten()
        }

        fn service_references(
            &self,
            interface: Option<&str>,
            filter: Option<&Filter>,
        ) -> Vec<ServiceReference> {
            Framework::service_references(&self.inner, interface, filter)
                .into_iter()
                .filter(|r| self.visible(r.module_id))
                .collect()
        }

        fn add_module_listener(&self, listener: ModuleListener) -> ListenerId {
            Framework::add_module_listener(&self.inner, listener)
        }

        fn remove_module_listener(&self, id: ListenerId) -> bool {
            Framework::remove_module_listener(&self.inner, id)
        }

        fn add_service_listener(
            &self,
            listener: ServiceListener,
            filter: Option<Filter>,
        ) -> ListenerId {
            Framework::add_service_listener(&self.inner, listener, filter)
        }

        fn remove_service_listener(&self, id: ListenerId) -> bool {
            Framework::remove_service_listener(&self.inner, id)
        }
    }
}
