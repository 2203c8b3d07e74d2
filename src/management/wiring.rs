//! 连线图构建
//!
//! 沿活动连线关系，为模块在某个命名空间、某个方向上收集连线，并派生出
//! 片段/宿主、依赖/被依赖这几组对称关系。
//!
//! 连线的任一端点没有连线视图（例如在查询过程中被卸载）时，该连线被静默丢弃。
//!
//! # 对称性
//!
//! - B ∈ `hosts_of(A)` 当且仅当 A ∈ `fragments_of(B)`
//! - B ∈ `required_modules(A)` 当且仅当 A ∈ `requiring_modules(B)`

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::property::{encode_map, StructuredValue};
use super::revision::{RevisionId, RevisionTracker};
use crate::module::{namespace, Capability, Framework, ModuleId, ModuleWiring, Requirement, Wire};
use crate::utils::{ManagementError, Result};

/// 连线方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// 本模块作为提供方
    Provided,
    /// 本模块作为需求方
    Required,
}

/// 能力记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityRecord {
    pub namespace: String,
    pub attributes: BTreeMap<String, StructuredValue>,
    pub directives: BTreeMap<String, String>,
}

impl CapabilityRecord {
    pub fn from_capability(capability: &Capability) -> Result<Self> {
        Ok(Self {
            namespace: capability.namespace.clone(),
            attributes: encode_map(&capability.attributes)?,
            directives: capability.directives.clone(),
        })
    }
}

/// 需求记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementRecord {
    pub namespace: String,
    pub attributes: BTreeMap<String, StructuredValue>,
    pub directives: BTreeMap<String, String>,
}

impl RequirementRecord {
    pub fn from_requirement(requirement: &Requirement) -> Result<Self> {
        Ok(Self {
            namespace: requirement.namespace.clone(),
            attributes: encode_map(&requirement.attributes)?,
            directives: requirement.directives.clone(),
        })
    }
}

/// 连线记录
///
/// 只为两端连线视图都存在的连线生成。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRecord {
    pub requirement: RequirementRecord,
    pub capability: CapabilityRecord,
    pub provider_module_id: ModuleId,
    pub provider_revision_id: RevisionId,
    pub requirer_module_id: ModuleId,
    pub requirer_revision_id: RevisionId,
}

/// 模块在某个命名空间下的连线快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WiringSnapshot {
    pub module_id: ModuleId,
    pub revision_id: RevisionId,
    pub namespace: String,
    pub capabilities: Vec<CapabilityRecord>,
    pub requirements: Vec<RequirementRecord>,
    pub provided_wires: Vec<WireRecord>,
    pub required_wires: Vec<WireRecord>,
}

/// 连线图构建器
#[derive(Clone)]
pub struct WiringGraph {
    framework: Arc<dyn Framework>,
}

impl WiringGraph {
    pub fn new(framework: Arc<dyn Framework>) -> Self {
        Self { framework }
    }

    /// 当前连线视图；模块不存在时报错，未解析时为 `None`
    fn current_wiring(&self, module_id: ModuleId) -> Result<Option<ModuleWiring>> {
        match self.framework.wiring(module_id) {
            Some(wiring) => Ok(Some(wiring)),
            None if self.framework.module(module_id).is_some() => Ok(None),
            None => Err(ManagementError::ModuleNotFound(module_id)),
        }
    }

    /// 收集模块在指定命名空间、指定方向上的完整连线
    ///
    /// # Errors
    ///
    /// 模块不存在时返回 `ModuleNotFound`；未解析的模块返回空列表
    pub fn wires_for(
        &self,
        module_id: ModuleId,
        ns: &str,
        direction: Direction,
    ) -> Result<Vec<Wire>> {
        Ok(match self.current_wiring(module_id)? {
            Some(wiring) => select(&wiring, ns, direction),
            None => Vec::new(),
        })
    }

    /// 依附到该宿主的片段
    pub fn fragments_of(&self, module_id: ModuleId) -> Result<Vec<ModuleId>> {
        self.related(module_id, namespace::HOST, Direction::Provided)
    }

    /// 片段所依附的宿主
    pub fn hosts_of(&self, module_id: ModuleId) -> Result<Vec<ModuleId>> {
        self.related(module_id, namespace::HOST, Direction::Required)
    }

    /// 整体依赖该模块的模块
    pub fn requiring_modules(&self, module_id: ModuleId) -> Result<Vec<ModuleId>> {
        self.related(module_id, namespace::MODULE, Direction::Provided)
    }

    /// 该模块整体依赖的模块
    pub fn required_modules(&self, module_id: ModuleId) -> Result<Vec<ModuleId>> {
        self.related(module_id, namespace::MODULE, Direction::Required)
    }

    fn related(&self, module_id: ModuleId, ns: &str, direction: Direction) -> Result<Vec<ModuleId>> {
        let wires = self.wires_for(module_id, ns, direction)?;
        Ok(peer_ids(&wires, direction))
    }

    /// 单个模块的连线快照，使用独立的身份跟踪器
    pub fn snapshot(&self, module_id: ModuleId, ns: &str) -> Result<Option<WiringSnapshot>> {
        let mut tracker = RevisionTracker::new();
        match self.current_wiring(module_id)? {
            Some(wiring) => Ok(Some(build_snapshot(&wiring, ns, &mut tracker)?)),
            None => Ok(None),
        }
    }

    /// 所有已解析模块的连线快照，整个响应共用一个身份跟踪器
    ///
    /// 遍历过程中消失或尚未解析的模块被跳过。
    pub fn snapshots(&self, ns: &str) -> Result<Vec<WiringSnapshot>> {
        let mut tracker = RevisionTracker::new();
        let mut snapshots = Vec::new();
        for module in self.framework.modules() {
            if let Some(wiring) = self.framework.wiring(module.id) {
                snapshots.push(build_snapshot(&wiring, ns, &mut tracker)?);
            }
        }
        tracing::debug!(namespace = %ns, count = snapshots.len(), "已构建连线快照");
        Ok(snapshots)
    }
}

impl std::fmt::Debug for WiringGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WiringGraph").finish_non_exhaustive()
    }
}

/// 按命名空间和方向筛选，丢弃端点缺失的连线
fn select(wiring: &ModuleWiring, ns: &str, direction: Direction) -> Vec<Wire> {
    let candidates: Vec<&Wire> = match direction {
        Direction::Provided => wiring.provided_in(ns).collect(),
        Direction::Required => wiring.required_in(ns).collect(),
    };

    let total = candidates.len();
    let wires: Vec<Wire> = candidates
        .into_iter()
        .filter(|w| w.is_complete())
        .cloned()
        .collect();

    if wires.len() != total {
        tracing::debug!(
            module_id = wiring.module_id,
            namespace = %ns,
            dropped = total - wires.len(),
            "跳过端点已失效的连线"
        );
    }
    wires
}

/// 对端模块 ID，保持首次出现顺序并去重
fn peer_ids(wires: &[Wire], direction: Direction) -> Vec<ModuleId> {
    let mut ids: Vec<ModuleId> = Vec::with_capacity(wires.len());
    for wire in wires {
        let peer = match direction {
            Direction::Provided => wire.requirer.as_ref(),
            Direction::Required => wire.provider.as_ref(),
        };
        if let Some(peer) = peer {
            if !ids.contains(&peer.module_id) {
                ids.push(peer.module_id);
            }
        }
    }
    ids
}

fn wire_record(wire: &Wire, tracker: &mut RevisionTracker) -> Result<Option<WireRecord>> {
    let (provider, requirer) = match (&wire.provider, &wire.requirer) {
        (Some(p), Some(r)) => (p, r),
        _ => return Ok(None),
    };
    Ok(Some(WireRecord {
        requirement: RequirementRecord::from_requirement(&wire.requirement)?,
        capability: CapabilityRecord::from_capability(&wire.capability)?,
        provider_module_id: provider.module_id,
        provider_revision_id: tracker.id_for(&provider.revision),
        requirer_module_id: requirer.module_id,
        requirer_revision_id: tracker.id_for(&requirer.revision),
    }))
}

fn build_snapshot(
    wiring: &ModuleWiring,
    ns: &str,
    tracker: &mut RevisionTracker,
) -> Result<WiringSnapshot> {
    let revision_id = tracker.id_for(&wiring.revision);

    let capabilities = wiring
        .revision
        .capabilities_in(ns)
        .map(CapabilityRecord::from_capability)
        .collect::<Result<Vec<_>>>()?;
    let requirements = wiring
        .revision
        .requirements_in(ns)
        .map(RequirementRecord::from_requirement)
        .collect::<Result<Vec<_>>>()?;

    let mut provided_wires = Vec::new();
    for wire in wiring.provided_in(ns) {
        if let Some(record) = wire_record(wire, tracker)? {
            provided_wires.push(record);
        }
    }
    let mut required_wires = Vec::new();
    for wire in wiring.required_in(ns) {
        if let Some(record) = wire_record(wire, tracker)? {
            required_wires.push(record);
        }
    }

    Ok(WiringSnapshot {
        module_id: wiring.module_id,
        revision_id,
        namespace: ns.to_string(),
        capabilities,
        requirements,
        provided_wires,
        required_wires,
    })
}
