//! 属性编码器
//!
//! 把框架中动态类型的属性值转换为自描述的结构化值。
//! 支持标量、同类型标量数组，以及一层由标量/数组组成的键值表；
//! 其他形状一律拒绝，不做字符串化兜底。数值类型原样保留，不做放宽或收窄。

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::module::PropertyValue;
use crate::utils::{ManagementError, Result};

/// 标量类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarType {
    String,
    Boolean,
    Character,
    Byte,
    Short,
    Integer,
    Long,
    Float,
    Double,
}

impl ScalarType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarType::String => "String",
            ScalarType::Boolean => "Boolean",
            ScalarType::Character => "Character",
            ScalarType::Byte => "Byte",
            ScalarType::Short => "Short",
            ScalarType::Integer => "Integer",
            ScalarType::Long => "Long",
            ScalarType::Float => "Float",
            ScalarType::Double => "Double",
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 带类型的标量
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Scalar {
    String(String),
    Boolean(bool),
    Character(char),
    Byte(i8),
    Short(i16),
    Integer(i32),
    Long(i64),
    Float(f32),
    Double(f64),
}

impl Scalar {
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            Scalar::String(_) => ScalarType::String,
            Scalar::Boolean(_) => ScalarType::Boolean,
            Scalar::Character(_) => ScalarType::Character,
            Scalar::Byte(_) => ScalarType::Byte,
            Scalar::Short(_) => ScalarType::Short,
            Scalar::Integer(_) => ScalarType::Integer,
            Scalar::Long(_) => ScalarType::Long,
            Scalar::Float(_) => ScalarType::Float,
            Scalar::Double(_) => ScalarType::Double,
        }
    }

    fn from_property(value: &PropertyValue) -> Option<Self> {
        Some(match value {
            PropertyValue::String(v) => Scalar::String(v.clone()),
            PropertyValue::Bool(v) => Scalar::Boolean(*v),
            PropertyValue::Char(v) => Scalar::Character(*v),
            PropertyValue::Byte(v) => Scalar::Byte(*v),
            PropertyValue::Short(v) => Scalar::Short(*v),
            PropertyValue::Int(v) => Scalar::Integer(*v),
            PropertyValue::Long(v) => Scalar::Long(*v),
            PropertyValue::Float(v) => Scalar::Float(*v),
            PropertyValue::Double(v) => Scalar::Double(*v),
            PropertyValue::List(_) | PropertyValue::Map(_) | PropertyValue::Opaque(_) => {
                return None
            }
        })
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::String(v) => write!(f, "{}", v),
            Scalar::Boolean(v) => write!(f, "{}", v),
            Scalar::Character(v) => write!(f, "{}", v),
            Scalar::Byte(v) => write!(f, "{}", v),
            Scalar::Short(v) => write!(f, "{}", v),
            Scalar::Integer(v) => write!(f, "{}", v),
            Scalar::Long(v) => write!(f, "{}", v),
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::Double(v) => write!(f, "{}", v),
        }
    }
}

/// 结构化值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StructuredValue {
    Scalar(Scalar),
    /// 同类型标量数组，保持原有顺序
    Array {
        element_type: ScalarType,
        items: Vec<Scalar>,
    },
    /// 一层键值表，值只能是标量或数组
    Map(BTreeMap<String, StructuredValue>),
}

impl StructuredValue {
    /// 类型描述，如 `Long`、`Array of Integer`、`Map`
    pub fn type_name(&self) -> String {
        match self {
            StructuredValue::Scalar(s) => s.scalar_type().to_string(),
            StructuredValue::Array { element_type, .. } => format!("Array of {}", element_type),
            StructuredValue::Map(_) => "Map".to_string(),
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            StructuredValue::Scalar(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for StructuredValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructuredValue::Scalar(s) => write!(f, "{}", s),
            StructuredValue::Array { items, .. } => {
                let parts: Vec<String> = items.iter().map(|i| i.to_string()).collect();
                write!(f, "[{}]", parts.join(","))
            }
            StructuredValue::Map(entries) => {
                let parts: Vec<String> =
                    entries.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                write!(f, "{{{}}}", parts.join(","))
            }
        }
    }
}

/// 有序的属性条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyEntry {
    pub key: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub value: StructuredValue,
}

/// 编码单个属性
///
/// # Errors
///
/// 值的形状无法表示时返回 `ManagementError::Encoding`：
/// 异构数组、数组中嵌套数组或表、表中嵌套表、不透明对象。
pub fn encode(key: &str, value: &PropertyValue) -> Result<StructuredValue> {
    match value {
        PropertyValue::List(items) => encode_array(key, items),
        PropertyValue::Map(entries) => {
            let mut encoded = BTreeMap::new();
            for (k, v) in entries {
                let nested = match v {
                    PropertyValue::Map(_) => {
                        return Err(encoding_error(key, format!("键 {} 的值是嵌套的表", k)))
                    }
                    PropertyValue::List(items) => encode_array(key, items)?,
                    other => StructuredValue::Scalar(scalar(key, other)?),
                };
                encoded.insert(k.clone(), nested);
            }
            Ok(StructuredValue::Map(encoded))
        }
        other => Ok(StructuredValue::Scalar(scalar(key, other)?)),
    }
}

/// 编码整张属性表
pub fn encode_map(
    properties: &BTreeMap<String, PropertyValue>,
) -> Result<BTreeMap<String, StructuredValue>> {
    properties
        .iter()
        .map(|(k, v)| encode(k, v).map(|encoded| (k.clone(), encoded)))
        .collect()
}

/// 编码为有序条目序列
pub fn encode_entries(properties: &BTreeMap<String, PropertyValue>) -> Result<Vec<PropertyEntry>> {
    properties
        .iter()
        .map(|(k, v)| {
            let value = encode(k, v)?;
            Ok(PropertyEntry {
                key: k.clone(),
                type_name: value.type_name(),
                value,
            })
        })
        .collect()
}

fn scalar(key: &str, value: &PropertyValue) -> Result<Scalar> {
    Scalar::from_property(value)
        .ok_or_else(|| encoding_error(key, format!("不支持的值类型 {}", value.type_name())))
}

fn encode_array(key: &str, items: &[PropertyValue]) -> Result<StructuredValue> {
    let scalars = items
        .iter()
        .map(|item| {
            Scalar::from_property(item).ok_or_else(|| {
                encoding_error(key, format!("数组元素不能是 {}", item.type_name()))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let element_type = match scalars.first() {
        Some(first) => first.scalar_type(),
        None => ScalarType::String,
    };
    if let Some(odd) = scalars.iter().find(|s| s.scalar_type() != element_type) {
        return Err(encoding_error(
            key,
            format!("数组元素类型不一致: {} 与 {}", element_type, odd.scalar_type()),
        ));
    }

    Ok(StructuredValue::Array {
        element_type,
        items: scalars,
    })
}

fn encoding_error(key: &str, reason: String) -> ManagementError {
    ManagementError::Encoding {
        key: key.to_string(),
        reason,
    }
}
