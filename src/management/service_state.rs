//! 服务目录
//!
//! 按需为服务构建快照。框架不提供按服务 ID 的直接查找，
//! 单个服务通过线性扫描各模块注册的服务定位，首个匹配者胜出。

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::fields::{FieldSet, Record, ServiceField};
use super::property::{encode, encode_entries, encode_map, PropertyEntry, StructuredValue};
use super::report;
use crate::module::{Filter, Framework, ModuleId, ServiceId, ServiceReference};
use crate::utils::{ManagementError, Result};

/// 服务快照
///
/// 序列化后的字段名即 [`ServiceField`] 的字段名。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSnapshot {
    pub id: ServiceId,
    pub module_id: ModuleId,
    pub interface_names: Vec<String>,
    pub properties: BTreeMap<String, StructuredValue>,
    pub using_module_ids: Vec<ModuleId>,
}

impl ServiceSnapshot {
    fn from_reference(reference: &ServiceReference) -> Result<Self> {
        Ok(Self {
            id: reference.id,
            module_id: reference.module_id,
            interface_names: reference.interfaces.clone(),
            properties: encode_map(&reference.properties)?,
            using_module_ids: reference.using_modules.clone(),
        })
    }
}

/// 服务目录
#[derive(Clone)]
pub struct ServiceDirectory {
    framework: Arc<dyn Framework>,
}

impl std::fmt::Debug for ServiceDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceDirectory").finish_non_exhaustive()
    }
}

impl ServiceDirectory {
    pub fn new(framework: Arc<dyn Framework>) -> Self {
        Self { framework }
    }

    /// 线性扫描各模块注册的服务
    fn find(&self, id: ServiceId) -> Result<ServiceReference> {
        self.framework
            .modules()
            .into_iter()
            .filter_map(|m| self.framework.registered_services(m.id))
            .flatten()
            .find(|r| r.id == id)
            .ok_or(ManagementError::ServiceNotFound(id))
    }

    fn snapshots(&self, operation: &str, refs: &[ServiceReference]) -> Result<Vec<ServiceSnapshot>> {
        refs.iter()
            .map(ServiceSnapshot::from_reference)
            .collect::<Result<Vec<_>>>()
            .map_err(|e| report(operation, e))
    }

    // ========================================================================
    // 快照
    // ========================================================================

    /// 获取单个服务快照
    ///
    /// # Errors
    ///
    /// - 服务不存在时返回 `ServiceNotFound`
    /// - 属性无法编码时返回 `Encoding`
    pub fn get(&self, id: ServiceId) -> Result<ServiceSnapshot> {
        let _span = crate::query_span!("service.get").entered();
        let reference = self.find(id)?;
        ServiceSnapshot::from_reference(&reference).map_err(|e| report("service.get", e))
    }

    /// 全部服务快照，按服务 ID 升序
    pub fn list(&self) -> Result<Vec<ServiceSnapshot>> {
        let _span = crate::query_span!("service.list").entered();
        let mut refs: Vec<ServiceReference> = self
            .framework
            .modules()
            .into_iter()
            .filter_map(|m| self.framework.registered_services(m.id))
            .flatten()
            .collect();
        refs.sort_by_key(|r| r.id);
        self.snapshots("service.list", &refs)
    }

    /// 按接口名与过滤表达式查询服务
    ///
    /// 两个条件都可省略。
    ///
    /// # Errors
    ///
    /// 过滤表达式语法错误时返回 `InvalidFilter`
    pub fn list_filtered(
        &self,
        interface: Option<&str>,
        filter: Option<&str>,
    ) -> Result<Vec<ServiceSnapshot>> {
        let refs = self.references(interface, filter)?;
        self.snapshots("service.list_filtered", &refs)
    }

    /// 按接口名与过滤表达式查询，并只保留指定字段
    pub fn list_filtered_fields<I, S>(
        &self,
        interface: Option<&str>,
        filter: Option<&str>,
        names: I,
    ) -> Result<Vec<Record<ServiceField>>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let selection = FieldSet::from_names(names)?;
        self.list_filtered(interface, filter)?
            .iter()
            .map(|snapshot| Record::project(snapshot, &selection))
            .collect()
    }

    fn references(
        &self,
        interface: Option<&str>,
        filter: Option<&str>,
    ) -> Result<Vec<ServiceReference>> {
        let filter = filter
            .filter(|f| !f.trim().is_empty())
            .map(Filter::parse)
            .transpose()?;
        tracing::debug!(
            interface = interface.unwrap_or("*"),
            filter = %filter.as_ref().map(|f| f.to_string()).unwrap_or_default(),
            "查询服务"
        );
        Ok(self.framework.service_references(interface, filter.as_ref()))
    }

    // ========================================================================
    // 单字段访问
    // ========================================================================

    /// 按键排序的服务属性
    pub fn properties(&self, id: ServiceId) -> Result<Vec<PropertyEntry>> {
        let reference = self.find(id)?;
        encode_entries(&reference.properties).map_err(|e| report("service.properties", e))
    }

    /// 读取单个属性（键大小写不敏感），不存在时为 `None`
    pub fn property(&self, id: ServiceId, key: &str) -> Result<Option<StructuredValue>> {
        let reference = self.find(id)?;
        reference
            .property(key)
            .map(|value| encode(key, value))
            .transpose()
            .map_err(|e| report("service.property", e))
    }

    pub fn using_module_ids(&self, id: ServiceId) -> Result<Vec<ModuleId>> {
        Ok(self.find(id)?.using_modules)
    }

    /// 注册服务的模块
    pub fn module_of(&self, id: ServiceId) -> Result<ModuleId> {
        Ok(self.find(id)?.module_id)
    }

    /// 服务发布的接口名
    pub fn interfaces_of(&self, id: ServiceId) -> Result<Vec<String>> {
        Ok(self.find(id)?.interfaces)
    }

    /// 全部服务 ID，升序
    pub fn all_service_ids(&self) -> Vec<ServiceId> {
        self.framework
            .service_references(None, None)
            .iter()
            .map(|r| r.id)
            .collect()
    }

    // ========================================================================
    // 模块关系
    // ========================================================================

    /// 模块注册的服务
    ///
    /// # Errors
    ///
    /// 模块不存在时返回 `ModuleNotFound`
    pub fn registered_services_of(&self, module_id: ModuleId) -> Result<Vec<ServiceSnapshot>> {
        let refs = self
            .framework
            .registered_services(module_id)
            .ok_or(ManagementError::ModuleNotFound(module_id))?;
        self.snapshots("service.registered_services_of", &refs)
    }

    /// 模块正在使用的服务
    ///
    /// # Errors
    ///
    /// 模块不存在时返回 `ModuleNotFound`
    pub fn services_in_use_of(&self, module_id: ModuleId) -> Result<Vec<ServiceSnapshot>> {
        let refs = self
            .framework
            .services_in_use(module_id)
            .ok_or(ManagementError::ModuleNotFound(module_id))?;
        self.snapshots("service.services_in_use_of", &refs)
    }
}
