//! 模块元数据定义
//!
//! 定义框架中模块、修订版本、能力与需求的数据结构。

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};

use super::value::PropertyValue;
use crate::utils::ManagementError;

/// 模块标识，由框架分配，在模块安装期间保持不变
pub type ModuleId = u64;

/// 能力命名空间常量
pub mod namespace {
    /// 模块对模块的整体依赖
    pub const MODULE: &str = "osgi.wiring.bundle";
    /// 片段对宿主的依附
    pub const HOST: &str = "osgi.wiring.host";
    /// 包导入导出
    pub const PACKAGE: &str = "osgi.wiring.package";
}

/// 标准清单头
pub mod header {
    pub const SYMBOLIC_NAME: &str = "Bundle-SymbolicName";
    pub const VERSION: &str = "Bundle-Version";
    pub const NAME: &str = "Bundle-Name";
    pub const FRAGMENT_HOST: &str = "Fragment-Host";
    pub const ACTIVATION_POLICY: &str = "Bundle-ActivationPolicy";
}

/// 包版本属性名
pub const VERSION_ATTRIBUTE: &str = "version";

/// 模块生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ModuleState {
    /// 已安装
    Installed,
    /// 已解析
    Resolved,
    /// 正在启动
    Starting,
    /// 运行中
    Active,
    /// 正在停止
    Stopping,
    /// 已卸载
    Uninstalled,
}

impl Default for ModuleState {
    fn default() -> Self {
        ModuleState::Installed
    }
}

impl ModuleState {
    /// 状态名称（对外输出用）
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleState::Installed => "INSTALLED",
            ModuleState::Resolved => "RESOLVED",
            ModuleState::Starting => "STARTING",
            ModuleState::Active => "ACTIVE",
            ModuleState::Stopping => "STOPPING",
            ModuleState::Uninstalled => "UNINSTALLED",
        }
    }

    /// 是否可以启动
    pub fn can_start(&self) -> bool {
        matches!(self, ModuleState::Installed | ModuleState::Resolved)
    }

    /// 是否可以停止
    pub fn can_stop(&self) -> bool {
        matches!(self, ModuleState::Active | ModuleState::Starting)
    }

    /// 是否已解析（已有连线视图）
    pub fn is_resolved(&self) -> bool {
        matches!(
            self,
            ModuleState::Resolved | ModuleState::Starting | ModuleState::Active | ModuleState::Stopping
        )
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleState {
    type Err = ManagementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "INSTALLED" => Ok(ModuleState::Installed),
            "RESOLVED" => Ok(ModuleState::Resolved),
            "STARTING" => Ok(ModuleState::Starting),
            "ACTIVE" => Ok(ModuleState::Active),
            "STOPPING" => Ok(ModuleState::Stopping),
            "UNINSTALLED" => Ok(ModuleState::Uninstalled),
            other => Err(ManagementError::InvalidArgument(format!(
                "未知的模块状态: {}",
                other
            ))),
        }
    }
}

/// 修订版本提供的能力
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    /// 命名空间
    pub namespace: String,

    /// 带类型的属性
    #[serde(default)]
    pub attributes: BTreeMap<String, PropertyValue>,

    /// 指令
    #[serde(default)]
    pub directives: BTreeMap<String, String>,
}

impl Capability {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            attributes: BTreeMap::new(),
            directives: BTreeMap::new(),
        }
    }

    /// 以命名空间同名属性作为能力名的便捷构造，如包名、模块名
    pub fn named(namespace: &str, name: impl Into<String>) -> Self {
        Self::new(namespace).with_attribute(namespace, PropertyValue::String(name.into()))
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: PropertyValue) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn with_directive(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.directives.insert(key.into(), value.into());
        self
    }

    /// 能力名：命名空间同名属性的字符串值
    pub fn name(&self) -> Option<&str> {
        self.attributes.get(&self.namespace).and_then(PropertyValue::as_str)
    }

    /// `version` 属性的文本形式，缺省为 0.0.0
    pub fn version_text(&self) -> String {
        self.attributes
            .get(VERSION_ATTRIBUTE)
            .map(|v| v.to_string())
            .unwrap_or_else(|| "0.0.0".to_string())
    }
}

/// 修订版本声明的需求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    /// 命名空间
    pub namespace: String,

    /// 带类型的属性
    #[serde(default)]
    pub attributes: BTreeMap<String, PropertyValue>,

    /// 指令（如 filter、resolution）
    #[serde(default)]
    pub directives: BTreeMap<String, String>,
}

impl Requirement {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            attributes: BTreeMap::new(),
            directives: BTreeMap::new(),
        }
    }

    /// 以 filter 指令指向某个同名能力的便捷构造
    pub fn on(namespace: &str, name: &str) -> Self {
        Self::new(namespace).with_directive("filter", format!("({}={})", namespace, name))
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: PropertyValue) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn with_directive(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.directives.insert(key.into(), value.into());
        self
    }
}

/// 修订版本
///
/// 模块内容在某一时刻的不可变化身。修订版本没有稳定的外部标识，
/// 框架内以 `Arc<Revision>` 共享，身份即对象本身。
#[derive(Debug)]
pub struct Revision {
    /// 所属模块
    pub module_id: ModuleId,

    /// 符号名
    pub symbolic_name: String,

    /// 版本
    pub version: Version,

    /// 提供的能力
    pub capabilities: Vec<Capability>,

    /// 声明的需求
    pub requirements: Vec<Requirement>,
}

impl Revision {
    /// 指定命名空间下的能力
    pub fn capabilities_in<'a>(&'a self, ns: &'a str) -> impl Iterator<Item = &'a Capability> + 'a {
        self.capabilities.iter().filter(move |c| c.namespace == ns)
    }

    /// 指定命名空间下的需求
    pub fn requirements_in<'a>(
        &'a self,
        ns: &'a str,
    ) -> impl Iterator<Item = &'a Requirement> + 'a {
        self.requirements.iter().filter(move |r| r.namespace == ns)
    }

    /// 是否为片段（声明了宿主需求）
    pub fn is_fragment(&self) -> bool {
        self.requirements_in(namespace::HOST).next().is_some()
    }
}

/// 模块安装描述
///
/// 对应一次安装或更新所携带的内容
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    /// 符号名
    pub symbolic_name: String,

    /// 版本（semver 格式）
    pub version: String,

    /// 安装位置
    pub location: String,

    /// 清单头
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// 本地化清单头：locale -> (key -> value)
    #[serde(default)]
    pub localized_headers: BTreeMap<String, BTreeMap<String, String>>,

    /// 提供的能力
    #[serde(default)]
    pub capabilities: Vec<Capability>,

    /// 声明的需求
    #[serde(default)]
    pub requirements: Vec<Requirement>,

    /// 是否使用了延迟激活策略
    #[serde(default)]
    pub activation_policy_used: bool,
}

impl ModuleDescriptor {
    /// 创建新的安装描述
    pub fn new(
        symbolic_name: impl Into<String>,
        version: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            symbolic_name: symbolic_name.into(),
            version: version.into(),
            location: location.into(),
            headers: BTreeMap::new(),
            localized_headers: BTreeMap::new(),
            capabilities: vec![],
            requirements: vec![],
            activation_policy_used: false,
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn localized_header(
        mut self,
        locale: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.localized_headers
            .entry(locale.into())
            .or_default()
            .insert(key.into(), value.into());
        self
    }

    pub fn capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    pub fn requirement(mut self, requirement: Requirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    /// 导出一个包
    pub fn export_package(self, name: &str, version: &str) -> Self {
        self.capability(
            Capability::named(namespace::PACKAGE, name)
                .with_attribute(VERSION_ATTRIBUTE, PropertyValue::String(version.to_string())),
        )
    }

    /// 导入一个包
    pub fn import_package(self, name: &str) -> Self {
        self.requirement(Requirement::on(namespace::PACKAGE, name))
    }

    /// 作为片段依附到宿主
    pub fn fragment_of(self, host_symbolic_name: &str) -> Self {
        self.header(header::FRAGMENT_HOST, host_symbolic_name)
            .requirement(Requirement::on(namespace::HOST, host_symbolic_name))
    }

    /// 整体依赖另一个模块
    pub fn require_module(self, symbolic_name: &str) -> Self {
        self.requirement(Requirement::on(namespace::MODULE, symbolic_name))
    }

    pub fn lazy_activation(mut self) -> Self {
        self.activation_policy_used = true;
        self
    }
}

/// 模块信息
///
/// 框架在某一时刻对一个已安装模块的完整观察值
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    /// 模块标识
    pub id: ModuleId,

    /// 符号名
    pub symbolic_name: String,

    /// 版本
    pub version: Version,

    /// 安装位置
    pub location: String,

    /// 生命周期状态
    pub state: ModuleState,

    /// 启动级别
    pub start_level: i32,

    /// 是否持久化启动
    pub persistently_started: bool,

    /// 是否为片段
    pub fragment: bool,

    /// 是否使用了激活策略
    pub activation_policy_used: bool,

    /// 是否存在等待移除的旧修订版本
    pub removal_pending: bool,

    /// 最后修改时间
    pub last_modified: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_state_roundtrip_names() {
        for state in [
            ModuleState::Installed,
            ModuleState::Resolved,
            ModuleState::Starting,
            ModuleState::Active,
            ModuleState::Stopping,
            ModuleState::Uninstalled,
        ] {
            assert_eq!(state.as_str().parse::<ModuleState>().unwrap(), state);
        }
        assert!("LOADED".parse::<ModuleState>().is_err());
    }

    #[test]
    fn test_module_state_transitions() {
        assert!(ModuleState::Installed.can_start());
        assert!(ModuleState::Resolved.can_start());
        assert!(!ModuleState::Active.can_start());
        assert!(ModuleState::Active.can_stop());
        assert!(!ModuleState::Resolved.can_stop());
        assert!(ModuleState::Active.is_resolved());
        assert!(!ModuleState::Installed.is_resolved());
    }

    #[test]
    fn test_capability_name_and_version() {
        let cap = Capability::named(namespace::PACKAGE, "org.demo.api")
            .with_attribute(VERSION_ATTRIBUTE, PropertyValue::String("1.2.0".into()));
        assert_eq!(cap.name(), Some("org.demo.api"));
        assert_eq!(cap.version_text(), "1.2.0");

        let bare = Capability::new(namespace::PACKAGE);
        assert_eq!(bare.name(), None);
        assert_eq!(bare.version_text(), "0.0.0");
    }

    #[test]
    fn test_descriptor_builders() {
        let descriptor = ModuleDescriptor::new("demo.fragment", "1.0.0", "file:demo.jar")
            .fragment_of("demo.host")
            .import_package("org.demo.api")
            .lazy_activation();

        assert_eq!(
            descriptor.headers.get(header::FRAGMENT_HOST).map(String::as_str),
            Some("demo.host")
        );
        assert_eq!(descriptor.requirements.len(), 2);
        assert_eq!(
            descriptor.requirements[0].directives.get("filter").map(String::as_str),
            Some("(osgi.wiring.host=demo.host)")
        );
        assert!(descriptor.activation_policy_used);
    }

    #[test]
    fn test_revision_is_fragment() {
        let revision = Revision {
            module_id: 1,
            symbolic_name: "f".into(),
            version: Version::new(1, 0, 0),
            capabilities: vec![],
            requirements: vec![Requirement::on(namespace::HOST, "h")],
        };
        assert!(revision.is_fragment());
        assert_eq!(revision.requirements_in(namespace::PACKAGE).count(), 0);
    }

    #[test]
    fn test_descriptor_yaml() {
        let yaml = r#"
symbolic_name: demo
version: 1.0.0
location: file:demo.jar
headers:
  Bundle-Name: Demo
"#;
        let descriptor: ModuleDescriptor = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(descriptor.symbolic_name, "demo");
        assert_eq!(descriptor.headers.get("Bundle-Name").map(String::as_str), Some("Demo"));
        assert!(descriptor.capabilities.is_empty());
    }
}
