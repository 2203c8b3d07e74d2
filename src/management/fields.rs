//! 字段选择
//!
//! 快照的字段可以按位掩码或字段名集合选择。位 i（从 0 开始）对应字段枚举中
//! 第 i 个字段，未选中的字段从结果记录中完全省略，而不是填 null。

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::utils::{ManagementError, Result};

/// 可选择的字段
pub trait Field: Copy + Ord + fmt::Debug + 'static {
    /// 按位序排列的全部字段
    const ALL: &'static [Self];

    /// 对外字段名
    fn name(&self) -> &'static str;

    /// 按名称查找
    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.name() == name)
    }

    /// 对应的位
    fn bit(&self) -> u32 {
        let index = Self::ALL.iter().position(|f| f == self).unwrap_or(0);
        1 << index
    }
}

/// 模块快照字段，声明顺序即位序
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModuleField {
    Id,
    SymbolicName,
    Version,
    Location,
    State,
    StartLevel,
    PersistentlyStarted,
    ActivationPolicyUsed,
    Fragment,
    RemovalPending,
    Required,
    Headers,
    ExportedPackages,
    ImportedPackages,
    FragmentIds,
    HostIds,
    RequiredModuleIds,
    RequiringModuleIds,
    RegisteredServiceIds,
    ServicesInUseIds,
    LastModified,
}

impl Field for ModuleField {
    const ALL: &'static [Self] = &[
        ModuleField::Id,
        ModuleField::SymbolicName,
        ModuleField::Version,
        ModuleField::Location,
        ModuleField::State,
        ModuleField::StartLevel,
        ModuleField::PersistentlyStarted,
        ModuleField::ActivationPolicyUsed,
        ModuleField::Fragment,
        ModuleField::RemovalPending,
        ModuleField::Required,
        ModuleField::Headers,
        ModuleField::ExportedPackages,
        ModuleField::ImportedPackages,
        ModuleField::FragmentIds,
        ModuleField::HostIds,
        ModuleField::RequiredModuleIds,
        ModuleField::RequiringModuleIds,
        ModuleField::RegisteredServiceIds,
        ModuleField::ServicesInUseIds,
        ModuleField::LastModified,
    ];

    fn name(&self) -> &'static str {
        match self {
            ModuleField::Id => "id",
            ModuleField::SymbolicName => "symbolicName",
            ModuleField::Version => "version",
            ModuleField::Location => "location",
            ModuleField::State => "state",
            ModuleField::StartLevel => "startLevel",
            ModuleField::PersistentlyStarted => "persistentlyStarted",
            ModuleField::ActivationPolicyUsed => "activationPolicyUsed",
            ModuleField::Fragment => "fragment",
            ModuleField::RemovalPending => "removalPending",
            ModuleField::Required => "required",
            ModuleField::Headers => "headers",
            ModuleField::ExportedPackages => "exportedPackages",
            ModuleField::ImportedPackages => "importedPackages",
            ModuleField::FragmentIds => "fragmentIds",
            ModuleField::HostIds => "hostIds",
            ModuleField::RequiredModuleIds => "requiredModuleIds",
            ModuleField::RequiringModuleIds => "requiringModuleIds",
            ModuleField::RegisteredServiceIds => "registeredServiceIds",
            ModuleField::ServicesInUseIds => "servicesInUseIds",
            ModuleField::LastModified => "lastModified",
        }
    }
}

/// 服务快照字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ServiceField {
    Id,
    ModuleId,
    InterfaceNames,
    Properties,
    UsingModuleIds,
}

impl Field for ServiceField {
    const ALL: &'static [Self] = &[
        ServiceField::Id,
        ServiceField::ModuleId,
        ServiceField::InterfaceNames,
        ServiceField::Properties,
        ServiceField::UsingModuleIds,
    ];

    fn name(&self) -> &'static str {
        match self {
            ServiceField::Id => "id",
            ServiceField::ModuleId => "moduleId",
            ServiceField::InterfaceNames => "interfaceNames",
            ServiceField::Properties => "properties",
            ServiceField::UsingModuleIds => "usingModuleIds",
        }
    }
}

/// 选中的字段集合
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSet<F: Field> {
    fields: BTreeSet<F>,
}

impl<F: Field> FieldSet<F> {
    /// 全部字段
    pub fn all() -> Self {
        Self {
            fields: F::ALL.iter().copied().collect(),
        }
    }

    /// 合法掩码的上界
    pub fn max_mask() -> u32 {
        (1u32 << F::ALL.len()) - 1
    }

    /// 由位掩码选择
    ///
    /// # Errors
    ///
    /// 掩码为 0 或超出字段数量时返回 `InvalidMask`
    pub fn from_mask(mask: u32) -> Result<Self> {
        if mask == 0 || mask > Self::max_mask() {
            return Err(ManagementError::InvalidMask(mask));
        }
        Ok(Self {
            fields: F::ALL
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, f)| *f)
                .collect(),
        })
    }

    /// 由字段名选择
    ///
    /// # Errors
    ///
    /// 出现未知字段名时返回 `UnknownField`
    pub fn from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut fields = BTreeSet::new();
        for name in names {
            let name = name.as_ref();
            let field =
                F::from_name(name).ok_or_else(|| ManagementError::UnknownField(name.to_string()))?;
            fields.insert(field);
        }
        Ok(Self { fields })
    }

    pub fn contains(&self, field: F) -> bool {
        self.fields.contains(&field)
    }

    /// 任一字段被选中
    pub fn contains_any(&self, fields: &[F]) -> bool {
        fields.iter().any(|f| self.fields.contains(f))
    }

    pub fn iter(&self) -> impl Iterator<Item = F> + '_ {
        self.fields.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// 等价的位掩码
    pub fn mask(&self) -> u32 {
        self.fields.iter().fold(0, |acc, f| acc | f.bit())
    }
}

/// 按字段投影后的记录
///
/// 只包含选中的字段，按字段位序排列，序列化为以字段名为键的表。
#[derive(Debug, Clone, PartialEq)]
pub struct Record<F: Field> {
    values: BTreeMap<F, serde_json::Value>,
}

impl<F: Field> Record<F> {
    /// 从完整快照中投影出选中的字段
    ///
    /// 快照序列化后的键名必须与字段名一致。
    pub fn project<T: Serialize>(snapshot: &T, selection: &FieldSet<F>) -> Result<Self> {
        let mut object = match serde_json::to_value(snapshot)? {
            serde_json::Value::Object(object) => object,
            other => {
                return Err(ManagementError::Internal(format!(
                    "快照不是对象: {}",
                    other
                )))
            }
        };

        let mut values = BTreeMap::new();
        for field in selection.iter() {
            let value = object.remove(field.name()).ok_or_else(|| {
                ManagementError::Internal(format!("快照缺少字段 {}", field.name()))
            })?;
            values.insert(field, value);
        }
        Ok(Self { values })
    }

    pub fn get(&self, field: F) -> Option<&serde_json::Value> {
        self.values.get(&field)
    }

    /// 按字段名读取
    pub fn get_by_name(&self, name: &str) -> Option<&serde_json::Value> {
        F::from_name(name).and_then(|f| self.values.get(&f))
    }

    pub fn contains(&self, field: F) -> bool {
        self.values.contains_key(&field)
    }

    /// 记录中的字段，按位序
    pub fn fields(&self) -> Vec<F> {
        self.values.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<F: Field> Serialize for Record<F> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (field, value) in &self.values {
            map.serialize_entry(field.name(), value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_field_bits() {
        assert_eq!(ModuleField::ALL.len(), 21);
        assert_eq!(FieldSet::<ModuleField>::max_mask(), 2_097_151);
        assert_eq!(ModuleField::Id.bit(), 1);
        assert_eq!(ModuleField::LastModified.bit(), 1 << 20);
    }

    #[test]
    fn test_mask_selection() {
        let set = FieldSet::<ModuleField>::from_mask(1).unwrap();
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![ModuleField::Id]);

        let set = FieldSet::<ModuleField>::from_mask(0b10010).unwrap();
        assert_eq!(
            set.iter().collect::<Vec<_>>(),
            vec![ModuleField::SymbolicName, ModuleField::State]
        );
        assert_eq!(set.mask(), 0b10010);

        assert_eq!(FieldSet::<ModuleField>::from_mask(2_097_151).unwrap().len(), 21);
    }

    #[test]
    fn test_mask_out_of_range() {
        for mask in [0, 2_097_152, u32::MAX] {
            let err = FieldSet::<ModuleField>::from_mask(mask).unwrap_err();
            assert!(matches!(err, ManagementError::InvalidMask(m) if m == mask));
            assert!(err.is_invalid_argument());
        }
        assert!(FieldSet::<ServiceField>::from_mask(32).is_err());
    }

    #[test]
    fn test_name_selection() {
        let set = FieldSet::<ModuleField>::from_names(["state", "id"]).unwrap();
        assert_eq!(
            set.iter().collect::<Vec<_>>(),
            vec![ModuleField::Id, ModuleField::State]
        );

        let err = FieldSet::<ServiceField>::from_names(["id", "bogus"]).unwrap_err();
        assert!(matches!(err, ManagementError::UnknownField(ref n) if n == "bogus"));
    }

    #[test]
    fn test_record_projection() {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Snapshot {
            id: u64,
            module_id: u64,
            interface_names: Vec<String>,
            properties: BTreeMap<String, String>,
            using_module_ids: Vec<u64>,
        }

        let snapshot = Snapshot {
            id: 3,
            module_id: 1,
            interface_names: vec!["a".into()],
            properties: BTreeMap::new(),
            using_module_ids: vec![],
        };
        let selection = FieldSet::<ServiceField>::from_names(["moduleId", "id"]).unwrap();
        let record = Record::project(&snapshot, &selection).unwrap();

        assert_eq!(record.fields(), vec![ServiceField::Id, ServiceField::ModuleId]);
        assert_eq!(record.get(ServiceField::Id), Some(&serde_json::json!(3)));
        assert!(!record.contains(ServiceField::Properties));
        assert_eq!(
            serde_json::to_string(&record).unwrap(),
            r#"{"id":3,"moduleId":1}"#
        );
    }
}
