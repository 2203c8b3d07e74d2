//! 模块注册表
//!
//! [`Framework`] 的内存实现。管理已安装模块、修订版本之间的连线以及服务注册表，
//! 所有变更操作在调用线程上同步投递事件（在锁外投递）。
//!
//! 连线视图的生命周期：
//! - 修订版本解析后获得连线视图；
//! - 模块更新或卸载时，若旧修订版本仍被其他模块依赖，其连线视图保留（等待移除），
//!   直到 [`ModuleRegistry::refresh`]；否则立即消失，但指向它的连线条目会留到 `refresh`，
//!   这些条目的对应端点在读取时为 `None`。

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use semver::Version;

use super::event::{
    ListenerId, ModuleEvent, ModuleEventKind, ModuleListener, ServiceEvent, ServiceEventKind,
    ServiceListener,
};
use super::filter::Filter;
use super::framework::{Framework, ModuleWiring, Wire, WiringRef};
use super::metadata::{
    header, Capability, Module, ModuleDescriptor, ModuleId, ModuleState, Requirement, Revision,
};
use super::service::{ServiceId, ServiceReference, OBJECT_CLASS, SERVICE_ID};
use super::value::PropertyValue;
use crate::utils::{ManagementError, Result};

/// 修订版本身份键（对象地址）
///
/// 只对仍被注册表持有的 `Arc` 使用，因此地址不会被复用。
fn revision_key(revision: &Arc<Revision>) -> usize {
    Arc::as_ptr(revision) as usize
}

#[derive(Debug)]
struct ModuleEntry {
    module: Module,
    headers: BTreeMap<String, String>,
    localized_headers: BTreeMap<String, BTreeMap<String, String>>,
    revision: Arc<Revision>,
}

#[derive(Debug)]
struct WireEntry {
    requirement: Requirement,
    capability: Capability,
    provider: Arc<Revision>,
    requirer: Arc<Revision>,
}

#[derive(Debug)]
struct ServiceEntry {
    module_id: ModuleId,
    interfaces: Vec<String>,
    properties: BTreeMap<String, PropertyValue>,
    /// 使用者 -> 引用计数
    usage: BTreeMap<ModuleId, u32>,
}

#[derive(Debug, Default)]
struct RegistryState {
    modules: BTreeMap<ModuleId, ModuleEntry>,
    /// 持有连线视图的修订版本
    live: HashMap<usize, Arc<Revision>>,
    wires: Vec<WireEntry>,
    services: BTreeMap<ServiceId, ServiceEntry>,
    next_module_id: ModuleId,
    next_service_id: ServiceId,
}

impl RegistryState {
    fn entry(&self, id: ModuleId) -> Result<&ModuleEntry> {
        self.modules.get(&id).ok_or(ManagementError::ModuleNotFound(id))
    }

    fn entry_mut(&mut self, id: ModuleId) -> Result<&mut ModuleEntry> {
        self.modules
            .get_mut(&id)
            .ok_or(ManagementError::ModuleNotFound(id))
    }

    fn is_live(&self, revision: &Arc<Revision>) -> bool {
        self.live.contains_key(&revision_key(revision))
    }

    fn wiring_ref(&self, revision: &Arc<Revision>) -> Option<WiringRef> {
        self.is_live(revision).then(|| WiringRef {
            module_id: revision.module_id,
            revision: revision.clone(),
        })
    }

    fn to_wire(&self, entry: &WireEntry) -> Wire {
        Wire {
            requirement: entry.requirement.clone(),
            capability: entry.capability.clone(),
            provider: self.wiring_ref(&entry.provider),
            requirer: self.wiring_ref(&entry.requirer),
        }
    }

    /// 是否有其他模块的活动修订版本依赖该修订版本
    fn has_live_dependents(&self, revision: &Arc<Revision>) -> bool {
        let key = revision_key(revision);
        self.wires.iter().any(|w| {
            revision_key(&w.provider) == key
                && w.requirer.module_id != revision.module_id
                && self.is_live(&w.requirer)
        })
    }

    /// 旧修订版本退役：仍被依赖则保留连线视图并返回 true
    fn retire(&mut self, revision: &Arc<Revision>) -> bool {
        if self.is_live(revision) && self.has_live_dependents(revision) {
            true
        } else {
            self.live.remove(&revision_key(revision));
            false
        }
    }

    fn reference(&self, id: ServiceId, entry: &ServiceEntry) -> ServiceReference {
        ServiceReference {
            id,
            module_id: entry.module_id,
            interfaces: entry.interfaces.clone(),
            properties: entry.properties.clone(),
            using_modules: entry.usage.keys().copied().collect(),
        }
    }

    fn service_event(
        &self,
        kind: ServiceEventKind,
        id: ServiceId,
        entry: &ServiceEntry,
    ) -> ServiceEvent {
        let (name, location) = self
            .modules
            .get(&entry.module_id)
            .map(|m| (m.module.symbolic_name.clone(), m.module.location.clone()))
            .unwrap_or_default();
        ServiceEvent {
            kind,
            service: self.reference(id, entry),
            module_symbolic_name: name,
            module_location: location,
        }
    }

    /// 移除某模块注册的全部服务，返回注销事件
    fn drop_services_of(&mut self, module_id: ModuleId) -> Vec<ServiceEvent> {
        let ids: Vec<ServiceId> = self
            .services
            .iter()
            .filter(|(_, s)| s.module_id == module_id)
            .map(|(id, _)| *id)
            .collect();

        let mut events = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entry) = self.services.get(&id) {
                events.push(self.service_event(ServiceEventKind::Unregistering, id, entry));
            }
            self.services.remove(&id);
        }
        events
    }

    fn release_usage_of(&mut self, module_id: ModuleId) {
        for service in self.services.values_mut() {
            service.usage.remove(&module_id);
        }
    }
}

/// 待投递事件
enum Pending {
    Module(ModuleEvent),
    Service(ServiceEvent),
    /// 属性修改：旧属性用于计算 MODIFIED_ENDMATCH
    Modified {
        event: ServiceEvent,
        previous: BTreeMap<String, PropertyValue>,
    },
}

#[derive(Default)]
struct Listeners {
    next_id: ListenerId,
    module: Vec<(ListenerId, ModuleListener)>,
    service: Vec<(ListenerId, ServiceListener, Option<Filter>)>,
}

/// 模块注册表
///
/// 线程安全，克隆后共享同一份状态。
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    state: Arc<RwLock<RegistryState>>,
    listeners: Arc<RwLock<Listeners>>,
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("ModuleRegistry")
            .field("modules", &state.modules.len())
            .field("services", &state.services.len())
            .field("wires", &state.wires.len())
            .finish()
    }
}

impl ModuleRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // 模块生命周期
    // ========================================================================

    /// 安装模块
    ///
    /// # Arguments
    ///
    /// * `descriptor` - 模块安装描述
    ///
    /// # Returns
    ///
    /// 新分配的模块 ID（从 1 开始）
    ///
    /// # Errors
    ///
    /// 版本号不是合法的 semver 时返回 `VersionParse`
    pub fn install(&self, descriptor: ModuleDescriptor) -> Result<ModuleId> {
        let version = Version::parse(&descriptor.version)?;

        let event = {
            let mut state = self.state.write();
            state.next_module_id += 1;
            let id = state.next_module_id;

            let revision = Arc::new(Revision {
                module_id: id,
                symbolic_name: descriptor.symbolic_name.clone(),
                version: version.clone(),
                capabilities: descriptor.capabilities,
                requirements: descriptor.requirements,
            });

            let mut headers = descriptor.headers;
            headers
                .entry(header::SYMBOLIC_NAME.to_string())
                .or_insert_with(|| descriptor.symbolic_name.clone());
            headers
                .entry(header::VERSION.to_string())
                .or_insert_with(|| descriptor.version.clone());

            let module = Module {
                id,
                symbolic_name: descriptor.symbolic_name,
                version,
                location: descriptor.location,
                state: ModuleState::Installed,
                start_level: 1,
                persistently_started: false,
                fragment: revision.is_fragment(),
                activation_policy_used: descriptor.activation_policy_used,
                removal_pending: false,
                last_modified: Utc::now(),
            };

            state.modules.insert(
                id,
                ModuleEntry {
                    module: module.clone(),
                    headers,
                    localized_headers: descriptor.localized_headers,
                    revision,
                },
            );

            ModuleEvent {
                kind: ModuleEventKind::Installed,
                module,
            }
        };

        let id = event.module.id;
        tracing::info!(
            module_id = id,
            symbolic_name = %event.module.symbolic_name,
            "模块已安装"
        );
        self.dispatch(vec![Pending::Module(event)]);
        Ok(id)
    }

    /// 解析模块，使其当前修订版本获得连线视图
    ///
    /// 已解析的模块不做任何操作。
    pub fn resolve(&self, id: ModuleId) -> Result<()> {
        let events = {
            let mut state = self.state.write();
            Self::resolve_locked(&mut state, id)?
        };
        self.dispatch(events);
        Ok(())
    }

    fn resolve_locked(state: &mut RegistryState, id: ModuleId) -> Result<Vec<Pending>> {
        let entry = state.entry_mut(id)?;
        if entry.module.state != ModuleState::Installed {
            return Ok(vec![]);
        }
        entry.module.state = ModuleState::Resolved;
        let revision = entry.revision.clone();
        let module = entry.module.clone();
        state.live.insert(revision_key(&revision), revision);

        Ok(vec![Pending::Module(ModuleEvent {
            kind: ModuleEventKind::Resolved,
            module,
        })])
    }

    /// 在两个模块的当前修订版本之间建立连线
    ///
    /// 需求方在该命名空间下选取第一条过滤条件与提供方能力匹配的需求，
    /// 提供方选取该命名空间下第一个满足它的能力。两个模块都会被解析。
    ///
    /// # Errors
    ///
    /// - 任一模块不存在
    /// - 找不到可以匹配的需求或能力
    pub fn wire(&self, requirer: ModuleId, provider: ModuleId, namespace: &str) -> Result<()> {
        let events = {
            let mut state = self.state.write();
            let requirer_rev = state.entry(requirer)?.revision.clone();
            let provider_rev = state.entry(provider)?.revision.clone();

            let (requirement, capability) = provider_rev
                .capabilities_in(namespace)
                .find_map(|cap| {
                    requirer_rev
                        .requirements_in(namespace)
                        .find(|req| requirement_accepts(req, cap))
                        .map(|req| (req.clone(), cap.clone()))
                })
                .ok_or_else(|| {
                    ManagementError::InvalidArgument(format!(
                        "模块 {} 在命名空间 {} 中没有可由模块 {} 满足的需求",
                        requirer, namespace, provider
                    ))
                })?;

            let mut events = Self::resolve_locked(&mut state, provider)?;
            events.extend(Self::resolve_locked(&mut state, requirer)?);
            state.wires.push(WireEntry {
                requirement,
                capability,
                provider: provider_rev,
                requirer: requirer_rev,
            });
            events
        };

        tracing::debug!(
            requirer = requirer,
            provider = provider,
            namespace = %namespace,
            "已建立连线"
        );
        self.dispatch(events);
        Ok(())
    }

    /// 启动模块（必要时先解析）
    pub fn start(&self, id: ModuleId) -> Result<()> {
        let events = {
            let mut state = self.state.write();
            let mut events = Self::resolve_locked(&mut state, id)?;
            let entry = state.entry_mut(id)?;
            if entry.module.state.can_start() {
                entry.module.state = ModuleState::Active;
                entry.module.persistently_started = true;
                events.push(Pending::Module(ModuleEvent {
                    kind: ModuleEventKind::Started,
                    module: entry.module.clone(),
                }));
            }
            events
        };
        tracing::info!(module_id = id, "模块已启动");
        self.dispatch(events);
        Ok(())
    }

    /// 停止模块
    ///
    /// 模块注册的服务随之注销，对其他服务的使用随之释放。未运行的模块不做任何操作。
    pub fn stop(&self, id: ModuleId) -> Result<()> {
        let events = {
            let mut state = self.state.write();
            state.entry(id)?;
            Self::stop_locked(&mut state, id, true)?
        };
        self.dispatch(events);
        Ok(())
    }

    fn stop_locked(
        state: &mut RegistryState,
        id: ModuleId,
        transient_clear: bool,
    ) -> Result<Vec<Pending>> {
        let entry = state.entry_mut(id)?;
        if !entry.module.state.can_stop() {
            return Ok(vec![]);
        }

        let mut events = Vec::new();
        entry.module.state = ModuleState::Stopping;
        events.push(Pending::Module(ModuleEvent {
            kind: ModuleEventKind::Stopping,
            module: entry.module.clone(),
        }));

        events.extend(state.drop_services_of(id).into_iter().map(Pending::Service));
        state.release_usage_of(id);

        let entry = state.entry_mut(id)?;
        entry.module.state = ModuleState::Resolved;
        if transient_clear {
            entry.module.persistently_started = false;
        }
        events.push(Pending::Module(ModuleEvent {
            kind: ModuleEventKind::Stopped,
            module: entry.module.clone(),
        }));
        Ok(events)
    }

    /// 更新模块内容
    ///
    /// 新修订版本取代当前修订版本，模块回到已安装状态；原先运行中的模块会被重新启动。
    ///
    /// # Errors
    ///
    /// - 模块不存在
    /// - 新版本号不合法
    pub fn update(&self, id: ModuleId, descriptor: ModuleDescriptor) -> Result<()> {
        let version = Version::parse(&descriptor.version)?;

        let events = {
            let mut state = self.state.write();
            let was_active = state.entry(id)?.module.state.can_stop();
            let mut events = Self::stop_locked(&mut state, id, false)?;

            let old = state.entry(id)?.revision.clone();
            let was_resolved = state.entry(id)?.module.state.is_resolved();
            let pending = state.retire(&old);

            let revision = Arc::new(Revision {
                module_id: id,
                symbolic_name: descriptor.symbolic_name.clone(),
                version: version.clone(),
                capabilities: descriptor.capabilities,
                requirements: descriptor.requirements,
            });

            let entry = state.entry_mut(id)?;
            let mut headers = descriptor.headers;
            headers
                .entry(header::SYMBOLIC_NAME.to_string())
                .or_insert_with(|| descriptor.symbolic_name.clone());
            headers
                .entry(header::VERSION.to_string())
                .or_insert_with(|| descriptor.version.clone());
            entry.headers = headers;
            entry.localized_headers = descriptor.localized_headers;
            entry.module.symbolic_name = descriptor.symbolic_name;
            entry.module.version = version;
            entry.module.fragment = revision.is_fragment();
            entry.module.activation_policy_used = descriptor.activation_policy_used;
            entry.module.removal_pending = pending;
            entry.module.state = ModuleState::Installed;
            entry.module.last_modified = Utc::now();
            entry.revision = revision;

            if was_resolved {
                events.push(Pending::Module(ModuleEvent {
                    kind: ModuleEventKind::Unresolved,
                    module: entry.module.clone(),
                }));
            }
            events.push(Pending::Module(ModuleEvent {
                kind: ModuleEventKind::Updated,
                module: entry.module.clone(),
            }));

            if was_active {
                events.extend(Self::resolve_locked(&mut state, id)?);
                let entry = state.entry_mut(id)?;
                entry.module.state = ModuleState::Active;
                events.push(Pending::Module(ModuleEvent {
                    kind: ModuleEventKind::Started,
                    module: entry.module.clone(),
                }));
            }
            events
        };

        tracing::info!(module_id = id, "模块已更新");
        self.dispatch(events);
        Ok(())
    }

    /// 卸载模块
    ///
    /// 运行中的模块先被停止。仍被依赖的修订版本保留连线视图直到 `refresh`。
    pub fn uninstall(&self, id: ModuleId) -> Result<()> {
        let events = {
            let mut state = self.state.write();
            state.entry(id)?;
            let mut events = Self::stop_locked(&mut state, id, false)?;

            let revision = state.entry(id)?.revision.clone();
            let was_resolved = state.entry(id)?.module.state.is_resolved();
            let pending = state.retire(&revision);

            events.extend(state.drop_services_of(id).into_iter().map(Pending::Service));
            state.release_usage_of(id);
            let mut entry = state
                .modules
                .remove(&id)
                .ok_or(ManagementError::ModuleNotFound(id))?;

            entry.module.removal_pending = pending;
            if was_resolved {
                entry.module.state = ModuleState::Installed;
                events.push(Pending::Module(ModuleEvent {
                    kind: ModuleEventKind::Unresolved,
                    module: entry.module.clone(),
                }));
            }
            entry.module.state = ModuleState::Uninstalled;
            entry.module.last_modified = Utc::now();
            events.push(Pending::Module(ModuleEvent {
                kind: ModuleEventKind::Uninstalled,
                module: entry.module,
            }));
            events
        };

        tracing::info!(module_id = id, "模块已卸载");
        self.dispatch(events);
        Ok(())
    }

    /// 清理等待移除的修订版本与失效连线
    ///
    /// # Returns
    ///
    /// 被丢弃的连线条数
    pub fn refresh(&self) -> usize {
        let mut guard = self.state.write();
        let state = &mut *guard;

        let current: HashMap<usize, ModuleId> = state
            .modules
            .values()
            .map(|m| (revision_key(&m.revision), m.module.id))
            .collect();
        state.live.retain(|key, _| current.contains_key(key));

        let before = state.wires.len();
        let live = &state.live;
        let retained: Vec<WireEntry> = std::mem::take(&mut state.wires)
            .into_iter()
            .filter(|w| {
                live.contains_key(&revision_key(&w.provider))
                    && live.contains_key(&revision_key(&w.requirer))
            })
            .collect();
        state.wires = retained;

        for entry in state.modules.values_mut() {
            entry.module.removal_pending = false;
        }

        let dropped = before - state.wires.len();
        tracing::debug!(count = dropped, "已刷新连线");
        dropped
    }

    /// 设置启动级别
    pub fn set_start_level(&self, id: ModuleId, level: i32) -> Result<()> {
        if level < 1 {
            return Err(ManagementError::InvalidArgument(format!(
                "启动级别必须大于 0: {}",
                level
            )));
        }
        let mut state = self.state.write();
        state.entry_mut(id)?.module.start_level = level;
        Ok(())
    }

    // ========================================================================
    // 服务注册表
    // ========================================================================

    /// 注册服务
    ///
    /// `service.id` 与 `objectClass` 由注册表写入，调用方提供的同名属性会被覆盖。
    ///
    /// # Errors
    ///
    /// - 模块不存在
    /// - 接口名列表为空
    pub fn register_service(
        &self,
        module_id: ModuleId,
        interfaces: &[&str],
        properties: BTreeMap<String, PropertyValue>,
    ) -> Result<ServiceId> {
        if interfaces.is_empty() {
            return Err(ManagementError::InvalidArgument(
                "服务至少需要一个接口名".to_string(),
            ));
        }

        let event = {
            let mut state = self.state.write();
            state.entry(module_id)?;
            state.next_service_id += 1;
            let id = state.next_service_id;

            let interfaces: Vec<String> = interfaces.iter().map(|s| s.to_string()).collect();
            let properties = with_standard_properties(properties, id, &interfaces);
            let entry = ServiceEntry {
                module_id,
                interfaces,
                properties,
                usage: BTreeMap::new(),
            };
            let event = state.service_event(ServiceEventKind::Registered, id, &entry);
            state.services.insert(id, entry);
            event
        };

        let id = event.service.id;
        tracing::info!(
            service_id = id,
            module_id = module_id,
            "服务已注册"
        );
        self.dispatch(vec![Pending::Service(event)]);
        Ok(id)
    }

    /// 替换服务属性
    pub fn set_service_properties(
        &self,
        id: ServiceId,
        properties: BTreeMap<String, PropertyValue>,
    ) -> Result<()> {
        let pending = {
            let mut state = self.state.write();
            let entry = state
                .services
                .get_mut(&id)
                .ok_or(ManagementError::ServiceNotFound(id))?;
            let updated = with_standard_properties(properties, id, &entry.interfaces);
            let previous = std::mem::replace(&mut entry.properties, updated);

            let entry = state
                .services
                .get(&id)
                .ok_or(ManagementError::ServiceNotFound(id))?;
            Pending::Modified {
                event: state.service_event(ServiceEventKind::Modified, id, entry),
                previous,
            }
        };
        self.dispatch(vec![pending]);
        Ok(())
    }

    /// 注销服务
    pub fn unregister_service(&self, id: ServiceId) -> Result<()> {
        let event = {
            let mut state = self.state.write();
            let entry = state
                .services
                .remove(&id)
                .ok_or(ManagementError::ServiceNotFound(id))?;
            state.service_event(ServiceEventKind::Unregistering, id, &entry)
        };
        tracing::info!(service_id = id, "服务已注销");
        self.dispatch(vec![Pending::Service(event)]);
        Ok(())
    }

    /// 模块获取服务，使用计数加一
    pub fn get_service(&self, user: ModuleId, id: ServiceId) -> Result<()> {
        let mut state = self.state.write();
        state.entry(user)?;
        let entry = state
            .services
            .get_mut(&id)
            .ok_or(ManagementError::ServiceNotFound(id))?;
        *entry.usage.entry(user).or_insert(0) += 1;
        Ok(())
    }

    /// 模块释放服务，返回释放前是否确有使用
    pub fn unget_service(&self, user: ModuleId, id: ServiceId) -> Result<bool> {
        let mut state = self.state.write();
        let entry = state
            .services
            .get_mut(&id)
            .ok_or(ManagementError::ServiceNotFound(id))?;
        match entry.usage.get_mut(&user) {
            Some(count) if *count > 1 => {
                *count -= 1;
                Ok(true)
            }
            Some(_) => {
                entry.usage.remove(&user);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ========================================================================
    // 统计
    // ========================================================================

    /// 已安装模块数量
    pub fn module_count(&self) -> usize {
        self.state.read().modules.len()
    }

    /// 已注册服务数量
    pub fn service_count(&self) -> usize {
        self.state.read().services.len()
    }

    // ========================================================================
    // 事件投递
    // ========================================================================

    fn dispatch(&self, events: Vec<Pending>) {
        if events.is_empty() {
            return;
        }

        let (module_listeners, service_listeners) = {
            let listeners = self.listeners.read();
            (
                listeners
                    .module
                    .iter()
                    .map(|(_, l)| l.clone())
                    .collect::<Vec<_>>(),
                listeners
                    .service
                    .iter()
                    .map(|(_, l, f)| (l.clone(), f.clone()))
                    .collect::<Vec<_>>(),
            )
        };

        for pending in events {
            match pending {
                Pending::Module(event) => {
                    for listener in &module_listeners {
                        listener(&event);
                    }
                }
                Pending::Service(event) => {
                    for (listener, filter) in &service_listeners {
                        let accepted = filter
                            .as_ref()
                            .map_or(true, |f| f.matches(&event.service.properties));
                        if accepted {
                            listener(&event);
                        }
                    }
                }
                Pending::Modified { event, previous } => {
                    for (listener, filter) in &service_listeners {
                        match filter {
                            None => listener(&event),
                            Some(f) if f.matches(&event.service.properties) => listener(&event),
                            Some(f) if f.matches(&previous) => {
                                let endmatch = ServiceEvent {
                                    kind: ServiceEventKind::ModifiedEndmatch,
                                    ..event.clone()
                                };
                                listener(&endmatch);
                            }
                            Some(_) => {}
                        }
                    }
                }
            }
        }
    }
}

/// 需求的 filter 指令是否接受该能力（没有 filter 指令即接受）
fn requirement_accepts(requirement: &Requirement, capability: &Capability) -> bool {
    match requirement.directives.get("filter") {
        Some(expression) => Filter::parse(expression)
            .map(|f| f.matches(&capability.attributes))
            .unwrap_or(false),
        None => true,
    }
}

fn with_standard_properties(
    mut properties: BTreeMap<String, PropertyValue>,
    id: ServiceId,
    interfaces: &[String],
) -> BTreeMap<String, PropertyValue> {
    properties.retain(|k, _| {
        !k.eq_ignore_ascii_case(SERVICE_ID) && !k.eq_ignore_ascii_case(OBJECT_CLASS)
    });
    properties.insert(SERVICE_ID.to_string(), PropertyValue::Long(id as i64));
    properties.insert(
        OBJECT_CLASS.to_string(),
        PropertyValue::string_list(interfaces),
    );
    properties
}

fn localized_overlay(
    base: &BTreeMap<String, String>,
    translations: &BTreeMap<String, BTreeMap<String, String>>,
    locale: &str,
) -> BTreeMap<String, String> {
    let mut headers = base.clone();
    let language = locale.split(['_', '-']).next().unwrap_or(locale);
    if language != locale {
        if let Some(t) = translations.get(language) {
            headers.extend(t.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
    }
    if let Some(t) = translations.get(locale) {
        headers.extend(t.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    headers
}

impl Framework for ModuleRegistry {
    fn modules(&self) -> Vec<Module> {
        let state = self.state.read();
        state.modules.values().map(|e| e.module.clone()).collect()
    }

    fn module(&self, id: ModuleId) -> Option<Module> {
        let state = self.state.read();
        state.modules.get(&id).map(|e| e.module.clone())
    }

    fn revision(&self, id: ModuleId) -> Option<Arc<Revision>> {
        let state = self.state.read();
        state.modules.get(&id).map(|e| e.revision.clone())
    }

    fn headers(&self, id: ModuleId, locale: Option<&str>) -> Option<BTreeMap<String, String>> {
        let state = self.state.read();
        let entry = state.modules.get(&id)?;
        Some(match locale {
            Some(locale) => localized_overlay(&entry.headers, &entry.localized_headers, locale),
            None => entry.headers.clone(),
        })
    }

    fn wiring(&self, id: ModuleId) -> Option<ModuleWiring> {
        let state = self.state.read();
        let entry = state.modules.get(&id)?;
        let revision = entry.revision.clone();
        if !state.is_live(&revision) {
            return None;
        }

        let key = revision_key(&revision);
        let provided = state
            .wires
            .iter()
            .filter(|w| revision_key(&w.provider) == key)
            .map(|w| state.to_wire(w))
            .collect();
        let required = state
            .wires
            .iter()
            .filter(|w| revision_key(&w.requirer) == key)
            .map(|w| state.to_wire(w))
            .collect();

        Some(ModuleWiring {
            module_id: id,
            revision,
            provided,
            required,
        })
    }

    fn registered_services(&self, id: ModuleId) -> Option<Vec<ServiceReference>> {
        let state = self.state.read();
        state.modules.get(&id)?;
        Some(
            state
                .services
                .iter()
                .filter(|(_, s)| s.module_id == id)
                .map(|(sid, s)| state.reference(*sid, s))
                .collect(),
        )
    }

    fn services_in_use(&self, id: ModuleId) -> Option<Vec<ServiceReference>> {
        let state = self.state.read();
        state.modules.get(&id)?;
        Some(
            state
                .services
                .iter()
                .filter(|(_, s)| s.usage.contains_key(&id))
                .map(|(sid, s)| state.reference(*sid, s))
                .collect(),
        )
    }

    fn service_references(
        &self,
        interface: Option<&str>,
        filter: Option<&Filter>,
    ) -> Vec<ServiceReference> {
        let state = self.state.read();
        state
            .services
            .iter()
            .filter(|(_, s)| interface.map_or(true, |i| s.interfaces.iter().any(|x| x == i)))
            .filter(|(_, s)| filter.map_or(true, |f| f.matches(&s.properties)))
            .map(|(sid, s)| state.reference(*sid, s))
            .collect()
    }

    fn add_module_listener(&self, listener: ModuleListener) -> ListenerId {
        let mut listeners = self.listeners.write();
        listeners.next_id += 1;
        let id = listeners.next_id;
        listeners.module.push((id, listener));
        id
    }

    fn remove_module_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.module.len();
        listeners.module.retain(|(lid, _)| *lid != id);
        listeners.module.len() != before
    }

    fn add_service_listener(
        &self,
        listener: ServiceListener,
        filter: Option<Filter>,
    ) -> ListenerId {
        let mut listeners = self.listeners.write();
        listeners.next_id += 1;
        let id = listeners.next_id;
        listeners.service.push((id, listener, filter));
        id
    }

    fn remove_service_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.service.len();
        listeners.service.retain(|(lid, _, _)| *lid != id);
        listeners.service.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::metadata::namespace;
    use parking_lot::Mutex;

    fn descriptor(name: &str) -> ModuleDescriptor {
        ModuleDescriptor::new(name, "1.0.0", format!("file:{}.jar", name))
    }

    fn recorder(registry: &ModuleRegistry) -> Arc<Mutex<Vec<ModuleEventKind>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        registry.add_module_listener(Arc::new(move |e: &ModuleEvent| sink.lock().push(e.kind)));
        seen
    }

    #[test]
    fn test_install_assigns_ids_and_headers() {
        let registry = ModuleRegistry::new();
        let a = registry.install(descriptor("a")).unwrap();
        let b = registry.install(descriptor("b")).unwrap();
        assert_eq!((a, b), (1, 2));

        let module = registry.module(a).unwrap();
        assert_eq!(module.state, ModuleState::Installed);
        assert_eq!(module.version, Version::new(1, 0, 0));

        let headers = registry.headers(a, None).unwrap();
        assert_eq!(headers.get(header::SYMBOLIC_NAME).map(String::as_str), Some("a"));
        assert_eq!(headers.get(header::VERSION).map(String::as_str), Some("1.0.0"));
    }

    #[test]
    fn test_install_rejects_bad_version() {
        let registry = ModuleRegistry::new();
        let err = registry
            .install(ModuleDescriptor::new("a", "not-a-version", "file:a"))
            .unwrap_err();
        assert!(matches!(err, ManagementError::VersionParse(_)));
        assert_eq!(registry.module_count(), 0);
    }

    #[test]
    fn test_lifecycle_events() {
        let registry = ModuleRegistry::new();
        let seen = recorder(&registry);
        let id = registry.install(descriptor("a")).unwrap();
        registry.start(id).unwrap();
        registry.stop(id).unwrap();
        registry.uninstall(id).unwrap();

        assert_eq!(
            *seen.lock(),
            vec![
                ModuleEventKind::Installed,
                ModuleEventKind::Resolved,
                ModuleEventKind::Started,
                ModuleEventKind::Stopping,
                ModuleEventKind::Stopped,
                ModuleEventKind::Unresolved,
                ModuleEventKind::Uninstalled,
            ]
        );
        assert!(registry.module(id).is_none());
    }

    #[test]
    fn test_wiring_requires_matching_capability() {
        let registry = ModuleRegistry::new();
        let host = registry.install(descriptor("host")).unwrap();
        let frag = registry
            .install(descriptor("frag").fragment_of("other.host"))
            .unwrap();

        // 宿主没有声明 host 能力
        assert!(registry.wire(frag, host, namespace::HOST).is_err());

        let host2 = registry
            .install(descriptor("other.host").capability(Capability::named(namespace::HOST, "other.host")))
            .unwrap();
        registry.wire(frag, host2, namespace::HOST).unwrap();

        let wiring = registry.wiring(host2).unwrap();
        assert_eq!(wiring.provided_in(namespace::HOST).count(), 1);
        let fw = registry.wiring(frag).unwrap();
        let wire = fw.required_in(namespace::HOST).next().unwrap();
        assert_eq!(wire.provider.as_ref().map(|p| p.module_id), Some(host2));
        assert!(registry.module(frag).unwrap().fragment);
    }

    #[test]
    fn test_uninstall_leaves_stale_wire_until_refresh() {
        let registry = ModuleRegistry::new();
        let lib = registry
            .install(descriptor("lib").capability(Capability::named(namespace::MODULE, "lib")))
            .unwrap();
        let app = registry.install(descriptor("app").require_module("lib")).unwrap();
        registry.wire(app, lib, namespace::MODULE).unwrap();

        // app 没有依赖者，卸载后连线视图立即消失
        registry.uninstall(app).unwrap();
        let wiring = registry.wiring(lib).unwrap();
        let wire = wiring.provided_in(namespace::MODULE).next().unwrap();
        assert!(wire.requirer.is_none());

        assert_eq!(registry.refresh(), 1);
        assert_eq!(registry.wiring(lib).unwrap().provided.len(), 0);
    }

    #[test]
    fn test_update_with_dependents_is_removal_pending() {
        let registry = ModuleRegistry::new();
        let lib = registry
            .install(descriptor("lib").capability(Capability::named(namespace::MODULE, "lib")))
            .unwrap();
        let app = registry.install(descriptor("app").require_module("lib")).unwrap();
        registry.wire(app, lib, namespace::MODULE).unwrap();

        registry
            .update(lib, ModuleDescriptor::new("lib", "2.0.0", "file:lib.jar"))
            .unwrap();
        let module = registry.module(lib).unwrap();
        assert!(module.removal_pending);
        assert_eq!(module.state, ModuleState::Installed);

        // app 仍连接在旧修订版本上，旧修订版本的连线视图保留
        let wiring = registry.wiring(app).unwrap();
        let wire = wiring.required_in(namespace::MODULE).next().unwrap();
        let provider = wire.provider.as_ref().unwrap();
        assert_eq!(provider.revision.version, Version::new(1, 0, 0));

        registry.refresh();
        assert!(!registry.module(lib).unwrap().removal_pending);
        assert!(registry.wiring(app).unwrap().required.is_empty());
    }

    #[test]
    fn test_services_and_usage() {
        let registry = ModuleRegistry::new();
        let owner = registry.install(descriptor("owner")).unwrap();
        let user = registry.install(descriptor("user")).unwrap();

        let mut props = BTreeMap::new();
        props.insert("service.id".to_string(), PropertyValue::Long(999));
        props.insert("lang".to_string(), PropertyValue::from("zh"));
        let sid = registry
            .register_service(owner, &["org.demo.Greeter"], props)
            .unwrap();

        let refs = registry.registered_services(owner).unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].property(SERVICE_ID), Some(&PropertyValue::Long(sid as i64)));
        assert_eq!(
            refs[0].property(OBJECT_CLASS).and_then(|v| v.as_string_list()),
            Some(vec!["org.demo.Greeter".to_string()])
        );

        registry.get_service(user, sid).unwrap();
        registry.get_service(user, sid).unwrap();
        assert_eq!(registry.services_in_use(user).unwrap().len(), 1);
        assert!(registry.unget_service(user, sid).unwrap());
        assert!(registry.unget_service(user, sid).unwrap());
        assert!(!registry.unget_service(user, sid).unwrap());
        assert!(registry.services_in_use(user).unwrap().is_empty());
        assert!(registry.services_in_use(999).is_none());
    }

    #[test]
    fn test_stop_unregisters_services() {
        let registry = ModuleRegistry::new();
        let owner = registry.install(descriptor("owner")).unwrap();
        registry.start(owner).unwrap();
        registry
            .register_service(owner, &["org.demo.A"], BTreeMap::new())
            .unwrap();
        assert_eq!(registry.service_count(), 1);
        registry.stop(owner).unwrap();
        assert_eq!(registry.service_count(), 0);
    }

    #[test]
    fn test_modified_endmatch() {
        let registry = ModuleRegistry::new();
        let owner = registry.install(descriptor("owner")).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        registry.add_service_listener(
            Arc::new(move |e: &ServiceEvent| sink.lock().push(e.kind)),
            Some(Filter::parse("(lang=zh)").unwrap()),
        );

        let mut props = BTreeMap::new();
        props.insert("lang".to_string(), PropertyValue::from("zh"));
        let sid = registry
            .register_service(owner, &["org.demo.Greeter"], props.clone())
            .unwrap();
        registry.set_service_properties(sid, props).unwrap();

        let mut en = BTreeMap::new();
        en.insert("lang".to_string(), PropertyValue::from("en"));
        registry.set_service_properties(sid, en.clone()).unwrap();
        // 两次都不匹配：不投递
        registry.set_service_properties(sid, en).unwrap();
        registry.unregister_service(sid).unwrap();

        assert_eq!(
            *seen.lock(),
            vec![
                ServiceEventKind::Registered,
                ServiceEventKind::Modified,
                ServiceEventKind::ModifiedEndmatch,
            ]
        );
    }

    #[test]
    fn test_localized_headers() {
        let registry = ModuleRegistry::new();
        let id = registry
            .install(
                descriptor("a")
                    .header(header::NAME, "Demo")
                    .localized_header("zh", header::NAME, "演示")
                    .localized_header("zh_TW", header::NAME, "演示（繁）"),
            )
            .unwrap();

        let zh_cn = registry.headers(id, Some("zh_CN")).unwrap();
        assert_eq!(zh_cn.get(header::NAME).map(String::as_str), Some("演示"));
        let zh_tw = registry.headers(id, Some("zh_TW")).unwrap();
        assert_eq!(zh_tw.get(header::NAME).map(String::as_str), Some("演示（繁）"));
        let fr = registry.headers(id, Some("fr")).unwrap();
        assert_eq!(fr.get(header::NAME).map(String::as_str), Some("Demo"));
    }

    #[test]
    fn test_listener_removal() {
        let registry = ModuleRegistry::new();
        let id = registry.add_module_listener(Arc::new(|_: &ModuleEvent| {}));
        assert!(registry.remove_module_listener(id));
        assert!(!registry.remove_module_listener(id));
    }
}
