//! 模块目录
//!
//! 按需为单个模块或全部模块构建快照。每次查询都直接读取活动框架，不跨调用缓存。
//!
//! 列表查询只遍历一次模块列表，不做事务隔离：遍历期间被卸载的模块会被跳过，
//! 结果反映某个有效时刻的状态，但不保证是单一原子快照。

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::fields::{FieldSet, ModuleField, Record};
use super::report;
use super::wiring::{Direction, WiringGraph, WiringSnapshot};
use crate::module::{namespace, Framework, Module, ModuleId, ModuleState, ServiceId};
use crate::utils::{ManagementError, Result};

/// 模块快照
///
/// 序列化后的字段名即 [`ModuleField`] 的字段名。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSnapshot {
    pub id: ModuleId,
    pub symbolic_name: String,
    pub version: String,
    pub location: String,
    pub state: ModuleState,
    pub start_level: i32,
    pub persistently_started: bool,
    pub activation_policy_used: bool,
    pub fragment: bool,
    pub removal_pending: bool,
    /// 是否有其他模块通过模块或包命名空间依赖本模块
    pub required: bool,
    pub headers: BTreeMap<String, String>,
    /// `包名;版本`
    pub exported_packages: Vec<String>,
    /// `包名;版本`
    pub imported_packages: Vec<String>,
    pub fragment_ids: Vec<ModuleId>,
    pub host_ids: Vec<ModuleId>,
    pub required_module_ids: Vec<ModuleId>,
    pub requiring_module_ids: Vec<ModuleId>,
    pub registered_service_ids: Vec<ServiceId>,
    pub services_in_use_ids: Vec<ServiceId>,
    pub last_modified: DateTime<Utc>,
}

/// 清单头条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderEntry {
    pub key: String,
    pub value: String,
}

/// 模块目录
#[derive(Clone)]
pub struct ModuleDirectory {
    framework: Arc<dyn Framework>,
    wiring: WiringGraph,
    default_locale: Option<String>,
}

impl std::fmt::Debug for ModuleDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleDirectory")
            .field("default_locale", &self.default_locale)
            .finish_non_exhaustive()
    }
}

impl ModuleDirectory {
    /// 创建模块目录
    pub fn new(framework: Arc<dyn Framework>) -> Self {
        Self {
            wiring: WiringGraph::new(framework.clone()),
            framework,
            default_locale: None,
        }
    }

    /// 设置未指定语言环境时使用的默认值
    pub fn with_default_locale(mut self, locale: Option<String>) -> Self {
        self.default_locale = locale;
        self
    }

    /// 连线图构建器
    pub fn wiring_graph(&self) -> &WiringGraph {
        &self.wiring
    }

    fn module(&self, id: ModuleId) -> Result<Module> {
        self.framework
            .module(id)
            .ok_or(ManagementError::ModuleNotFound(id))
    }

    // ========================================================================
    // 快照
    // ========================================================================

    /// 获取单个模块的完整快照
    ///
    /// # Errors
    ///
    /// 模块不存在时返回 `ModuleNotFound`
    pub fn get(&self, id: ModuleId) -> Result<ModuleSnapshot> {
        let _span = crate::query_span!("module.get").entered();
        let module = self.module(id)?;
        self.build(module, &FieldSet::all())
    }

    /// 获取单个模块的投影记录
    pub fn get_fields(&self, id: ModuleId, selection: &FieldSet<ModuleField>) -> Result<Record<ModuleField>> {
        let module = self.module(id)?;
        let snapshot = self.build(module, selection)?;
        Record::project(&snapshot, selection)
    }

    /// 全部模块的完整快照，按 ID 升序
    pub fn list(&self) -> Result<Vec<ModuleSnapshot>> {
        let _span = crate::query_span!("module.list").entered();
        let selection = FieldSet::all();
        self.collect(|module| self.build(module, &selection))
    }

    /// 按位掩码选择字段列出全部模块
    ///
    /// # Errors
    ///
    /// 掩码不在 `1..=2097151` 内时返回 `InvalidMask`
    pub fn list_with_mask(&self, mask: u32) -> Result<Vec<Record<ModuleField>>> {
        let selection = FieldSet::from_mask(mask)?;
        tracing::debug!(mask = mask, fields = selection.len(), "按掩码列出模块");
        self.list_selected(&selection)
    }

    /// 按字段名选择字段列出全部模块
    ///
    /// # Errors
    ///
    /// 出现未知字段名时返回 `UnknownField`
    pub fn list_with_fields<I, S>(&self, names: I) -> Result<Vec<Record<ModuleField>>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let selection = FieldSet::from_names(names)?;
        self.list_selected(&selection)
    }

    /// 按字段集合列出全部模块
    pub fn list_selected(&self, selection: &FieldSet<ModuleField>) -> Result<Vec<Record<ModuleField>>> {
        self.collect(|module| {
            let snapshot = self.build(module, selection)?;
            Record::project(&snapshot, selection)
        })
    }

    /// 遍历一次模块列表，跳过遍历期间消失的模块
    fn collect<T>(&self, mut f: impl FnMut(Module) -> Result<T>) -> Result<Vec<T>> {
        let modules = self.framework.modules();
        let mut out = Vec::with_capacity(modules.len());
        for module in modules {
            let id = module.id;
            match f(module) {
                Ok(item) => out.push(item),
                Err(ManagementError::ModuleNotFound(gone)) if gone == id => {
                    tracing::debug!(module_id = id, "模块在遍历过程中被移除，已跳过");
                }
                Err(e) => return Err(report("module.list", e)),
            }
        }
        Ok(out)
    }

    /// 构建快照；未选中的关系字段保持为空，不做计算
    fn build(&self, module: Module, selection: &FieldSet<ModuleField>) -> Result<ModuleSnapshot> {
        let id = module.id;
        let want = |f: ModuleField| selection.contains(f);

        let headers = if want(ModuleField::Headers) {
            self.headers_map(id, None)?
        } else {
            BTreeMap::new()
        };

        Ok(ModuleSnapshot {
            id,
            version: module.version.to_string(),
            state: module.state,
            start_level: module.start_level,
            persistently_started: module.persistently_started,
            activation_policy_used: module.activation_policy_used,
            fragment: module.fragment,
            removal_pending: module.removal_pending,
            required: want(ModuleField::Required) && self.is_required(id)?,
            headers,
            exported_packages: when(want(ModuleField::ExportedPackages), || {
                self.exported_packages(id)
            })?,
            imported_packages: when(want(ModuleField::ImportedPackages), || {
                self.imported_packages(id)
            })?,
            fragment_ids: when(want(ModuleField::FragmentIds), || self.fragment_ids(id))?,
            host_ids: when(want(ModuleField::HostIds), || self.host_ids(id))?,
            required_module_ids: when(want(ModuleField::RequiredModuleIds), || {
                self.required_module_ids(id)
            })?,
            requiring_module_ids: when(want(ModuleField::RequiringModuleIds), || {
                self.requiring_module_ids(id)
            })?,
            registered_service_ids: when(want(ModuleField::RegisteredServiceIds), || {
                self.registered_service_ids(id)
            })?,
            services_in_use_ids: when(want(ModuleField::ServicesInUseIds), || {
                self.services_in_use_ids(id)
            })?,
            last_modified: module.last_modified,
            symbolic_name: module.symbolic_name,
            location: module.location,
        })
    }

    // ========================================================================
    // 清单头
    // ========================================================================

    fn headers_map(&self, id: ModuleId, locale: Option<&str>) -> Result<BTreeMap<String, String>> {
        let locale = locale.or(self.default_locale.as_deref());
        self.framework
            .headers(id, locale)
            .ok_or(ManagementError::ModuleNotFound(id))
    }

    /// 按键排序的清单头
    ///
    /// `locale` 为 `None` 时使用配置的默认语言环境，仍为空则返回原始清单头。
    pub fn headers(&self, id: ModuleId, locale: Option<&str>) -> Result<Vec<HeaderEntry>> {
        Ok(self
            .headers_map(id, locale)?
            .into_iter()
            .map(|(key, value)| HeaderEntry { key, value })
            .collect())
    }

    /// 读取单个清单头，键不存在时为 `None`
    ///
    /// 键匹配不区分大小写。
    pub fn header(&self, id: ModuleId, key: &str) -> Result<Option<String>> {
        Ok(take_header(self.headers_map(id, None)?, key).map(|(_, value)| value))
    }

    /// 以指定语言环境读取单个清单头
    pub fn header_localized(
        &self,
        id: ModuleId,
        key: &str,
        locale: &str,
    ) -> Result<Option<HeaderEntry>> {
        Ok(take_header(self.headers_map(id, Some(locale))?, key)
            .map(|(key, value)| HeaderEntry { key, value }))
    }

    // ========================================================================
    // 单字段访问
    // ========================================================================

    pub fn symbolic_name(&self, id: ModuleId) -> Result<String> {
        Ok(self.module(id)?.symbolic_name)
    }

    pub fn version(&self, id: ModuleId) -> Result<String> {
        Ok(self.module(id)?.version.to_string())
    }

    pub fn location(&self, id: ModuleId) -> Result<String> {
        Ok(self.module(id)?.location)
    }

    pub fn last_modified(&self, id: ModuleId) -> Result<DateTime<Utc>> {
        Ok(self.module(id)?.last_modified)
    }

    pub fn state(&self, id: ModuleId) -> Result<ModuleState> {
        Ok(self.module(id)?.state)
    }

    pub fn start_level(&self, id: ModuleId) -> Result<i32> {
        Ok(self.module(id)?.start_level)
    }

    pub fn is_fragment(&self, id: ModuleId) -> Result<bool> {
        Ok(self.module(id)?.fragment)
    }

    pub fn is_persistently_started(&self, id: ModuleId) -> Result<bool> {
        Ok(self.module(id)?.persistently_started)
    }

    pub fn is_removal_pending(&self, id: ModuleId) -> Result<bool> {
        Ok(self.module(id)?.removal_pending)
    }

    pub fn is_activation_policy_used(&self, id: ModuleId) -> Result<bool> {
        Ok(self.module(id)?.activation_policy_used)
    }

    /// 是否有其他模块通过模块或包命名空间依赖本模块
    pub fn is_required(&self, id: ModuleId) -> Result<bool> {
        for ns in [namespace::MODULE, namespace::PACKAGE] {
            if !self.wiring.wires_for(id, ns, Direction::Provided)?.is_empty() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    // ========================================================================
    // 关系访问
    // ========================================================================

    /// 当前修订版本导出的包
    pub fn exported_packages(&self, id: ModuleId) -> Result<Vec<String>> {
        let revision = self
            .framework
            .revision(id)
            .ok_or(ManagementError::ModuleNotFound(id))?;
        Ok(revision
            .capabilities_in(namespace::PACKAGE)
            .filter_map(|cap| cap.name().map(|name| format!("{};{}", name, cap.version_text())))
            .collect())
    }

    /// 通过包连线导入的包
    pub fn imported_packages(&self, id: ModuleId) -> Result<Vec<String>> {
        Ok(self
            .wiring
            .wires_for(id, namespace::PACKAGE, Direction::Required)?
            .iter()
            .filter_map(|w| {
                w.capability
                    .name()
                    .map(|name| format!("{};{}", name, w.capability.version_text()))
            })
            .collect())
    }

    pub fn fragment_ids(&self, id: ModuleId) -> Result<Vec<ModuleId>> {
        self.wiring.fragments_of(id)
    }

    pub fn host_ids(&self, id: ModuleId) -> Result<Vec<ModuleId>> {
        self.wiring.hosts_of(id)
    }

    pub fn required_module_ids(&self, id: ModuleId) -> Result<Vec<ModuleId>> {
        self.wiring.required_modules(id)
    }

    pub fn requiring_module_ids(&self, id: ModuleId) -> Result<Vec<ModuleId>> {
        self.wiring.requiring_modules(id)
    }

    pub fn registered_service_ids(&self, id: ModuleId) -> Result<Vec<ServiceId>> {
        self.framework
            .registered_services(id)
            .map(|refs| refs.iter().map(|r| r.id).collect())
            .ok_or(ManagementError::ModuleNotFound(id))
    }

    pub fn services_in_use_ids(&self, id: ModuleId) -> Result<Vec<ServiceId>> {
        self.framework
            .services_in_use(id)
            .map(|refs| refs.iter().map(|r| r.id).collect())
            .ok_or(ManagementError::ModuleNotFound(id))
    }

    // ========================================================================
    // 连线
    // ========================================================================

    /// 模块在指定命名空间下的连线快照，未解析的模块为 `None`
    pub fn wiring(&self, id: ModuleId, ns: &str) -> Result<Option<WiringSnapshot>> {
        self.wiring
            .snapshot(id, ns)
            .map_err(|e| report("module.wiring", e))
    }

    /// 所有已解析模块在指定命名空间下的连线快照
    pub fn wirings(&self, ns: &str) -> Result<Vec<WiringSnapshot>> {
        self.wiring
            .snapshots(ns)
            .map_err(|e| report("module.wirings", e))
    }
}

/// 先精确匹配，再忽略大小写匹配
fn take_header(mut headers: BTreeMap<String, String>, key: &str) -> Option<(String, String)> {
    headers.remove_entry(key).or_else(|| {
        headers
            .into_iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
    })
}

fn when<T: Default>(selected: bool, f: impl FnOnce() -> Result<T>) -> Result<T> {
    if selected {
        f()
    } else {
        Ok(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::management::fields::Field;
    use crate::module::framework::testing::VanishingFramework;
    use crate::module::{header, Capability, ModuleDescriptor, ModuleRegistry};

    fn directory() -> (ModuleRegistry, ModuleDirectory) {
        let registry = ModuleRegistry::new();
        let directory = ModuleDirectory::new(Arc::new(registry.clone()));
        (registry, directory)
    }

    #[test]
    fn test_empty_graph() {
        let (_registry, directory) = directory();
        assert!(directory.list().unwrap().is_empty());
        assert!(directory.list_with_mask(1).unwrap().is_empty());
    }

    #[test]
    fn test_get_unknown_module() {
        let (_registry, directory) = directory();
        let err = directory.get(7).unwrap_err();
        assert!(matches!(err, ManagementError::ModuleNotFound(7)));
        assert!(directory.state(7).unwrap_err().is_not_found());
        assert!(directory.registered_service_ids(7).unwrap_err().is_not_found());
    }

    #[test]
    fn test_snapshot_fields() {
        let (registry, directory) = directory();
        let lib = registry
            .install(
                ModuleDescriptor::new("lib", "1.2.3", "file:lib.jar")
                    .export_package("org.demo.api", "1.0.0")
                    .capability(Capability::named(namespace::PACKAGE, "org.demo.spi")),
            )
            .unwrap();
        let app = registry
            .install(ModuleDescriptor::new("app", "1.0.0", "file:app.jar").import_package("org.demo.api"))
            .unwrap();
        registry.wire(app, lib, namespace::PACKAGE).unwrap();

        let snapshot = directory.get(lib).unwrap();
        assert_eq!(snapshot.id, lib);
        assert_eq!(snapshot.version, "1.2.3");
        assert_eq!(snapshot.state, ModuleState::Resolved);
        assert!(snapshot.required);
        assert_eq!(
            snapshot.exported_packages,
            vec!["org.demo.api;1.0.0".to_string(), "org.demo.spi;0.0.0".to_string()]
        );

        let app_snapshot = directory.get(app).unwrap();
        assert!(!app_snapshot.required);
        assert_eq!(app_snapshot.imported_packages, vec!["org.demo.api;1.0.0".to_string()]);
    }

    #[test]
    fn test_mask_projection() {
        let (registry, directory) = directory();
        registry
            .install(ModuleDescriptor::new("demo", "1.0.0", "file:demo.jar"))
            .unwrap();

        let records = directory.list_with_mask(1).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].fields(), vec![ModuleField::Id]);

        let records = directory.list_with_fields(["symbolicName", "state"]).unwrap();
        assert_eq!(records[0].get_by_name("symbolicName"), Some(&serde_json::json!("demo")));
        assert_eq!(records[0].get_by_name("state"), Some(&serde_json::json!("INSTALLED")));
        assert!(records[0].get_by_name("id").is_none());

        assert!(directory.list_with_mask(0).unwrap_err().is_invalid_argument());
        assert!(directory.list_with_fields(["nope"]).unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_full_mask_matches_full_snapshot() {
        let (registry, directory) = directory();
        let id = registry
            .install(ModuleDescriptor::new("demo", "1.0.0", "file:demo.jar"))
            .unwrap();
        let record = directory
            .get_fields(id, &FieldSet::from_mask(FieldSet::<ModuleField>::max_mask()).unwrap())
            .unwrap();
        let full = serde_json::to_value(directory.get(id).unwrap()).unwrap();
        assert_eq!(serde_json::to_value(&record).unwrap(), full);
    }

    #[test]
    fn test_headers_and_locale() {
        let registry = ModuleRegistry::new();
        let id = registry
            .install(
                ModuleDescriptor::new("demo", "1.0.0", "file:demo.jar")
                    .header(header::NAME, "Demo")
                    .localized_header("zh", header::NAME, "演示"),
            )
            .unwrap();
        let directory = ModuleDirectory::new(Arc::new(registry.clone()))
            .with_default_locale(Some("zh_CN".to_string()));

        let headers = directory.headers(id, None).unwrap();
        let keys: Vec<&str> = headers.iter().map(|h| h.key.as_str()).collect();
        assert_eq!(keys, vec![header::NAME, header::SYMBOLIC_NAME, header::VERSION]);
        assert_eq!(headers[0].value, "演示");

        assert_eq!(directory.header(id, header::NAME).unwrap().as_deref(), Some("演示"));
        assert_eq!(directory.header(id, "Missing").unwrap(), None);

        let entry = directory.header_localized(id, header::NAME, "en").unwrap().unwrap();
        assert_eq!(entry.value, "Demo");
    }

    #[test]
    fn test_header_lookup_ignores_case() {
        let (registry, directory) = directory();
        let id = registry
            .install(ModuleDescriptor::new("demo", "1.0.0", "file:demo.jar").header(header::NAME, "Demo"))
            .unwrap();

        assert_eq!(directory.header(id, "bundle-name").unwrap().as_deref(), Some("Demo"));
        assert_eq!(directory.header(id, "BUNDLE-NAME").unwrap().as_deref(), Some("Demo"));

        // 返回的条目保留清单中的原始键
        let entry = directory.header_localized(id, "bundle-name", "en").unwrap().unwrap();
        assert_eq!(entry.key, header::NAME);
        assert_eq!(entry.value, "Demo");
    }

    #[test]
    fn test_module_vanishing_during_list_is_skipped() {
        let registry = ModuleRegistry::new();
        let ids: Vec<ModuleId> = ["a", "b", "c"]
            .iter()
            .map(|name| {
                registry
                    .install(ModuleDescriptor::new(*name, "1.0.0", format!("file:{}.jar", name)))
                    .unwrap()
            })
            .collect();
        let gone = ids[1];
        let directory = ModuleDirectory::new(Arc::new(VanishingFramework {
            inner: registry,
            hidden: gone,
        }));

        let listed: Vec<ModuleId> = directory.list().unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(listed, vec![ids[0], ids[2]]);

        let records = directory.list_with_mask(ModuleField::Headers.bit()).unwrap();
        assert_eq!(records.len(), 2);

        let with_ids = directory.list_with_fields(["id", "headers"]).unwrap();
        let listed: Vec<_> = with_ids
            .iter()
            .map(|r| r.get(ModuleField::Id).cloned().unwrap())
            .collect();
        assert_eq!(listed, vec![serde_json::json!(ids[0]), serde_json::json!(ids[2])]);

        // 只选列表读取自带的字段时，不再回读框架，取列表时刻的观察值
        assert_eq!(directory.list_with_mask(1).unwrap().len(), 3);

        assert!(directory.get(gone).unwrap_err().is_not_found());
    }

    #[test]
    fn test_relation_accessors() {
        let (registry, directory) = directory();
        let host = registry
            .install(
                ModuleDescriptor::new("host", "1.0.0", "file:host.jar")
                    .capability(Capability::named(namespace::HOST, "host")),
            )
            .unwrap();
        let frag = registry
            .install(ModuleDescriptor::new("frag", "1.0.0", "file:frag.jar").fragment_of("host"))
            .unwrap();
        registry.wire(frag, host, namespace::HOST).unwrap();

        assert_eq!(directory.fragment_ids(host).unwrap(), vec![frag]);
        assert_eq!(directory.host_ids(frag).unwrap(), vec![host]);
        assert!(directory.is_fragment(frag).unwrap());
        assert!(!directory.is_required(host).unwrap());

        let snapshot = directory.wiring(host, namespace::HOST).unwrap().unwrap();
        assert_eq!(snapshot.provided_wires.len(), 1);
        assert_eq!(directory.wirings(namespace::HOST).unwrap().len(), 2);
    }
}
