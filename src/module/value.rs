//! 动态属性值
//!
//! 框架中服务属性、能力/需求属性都以运行时类型不定的值保存。
//! 管理层在对外输出前由属性编码器统一转换为结构化值。

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// 框架中保存的动态类型属性值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    String(String),
    Bool(bool),
    Char(char),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    /// 有序列表，元素类型在编码时校验
    List(Vec<PropertyValue>),
    /// 键值表
    Map(BTreeMap<String, PropertyValue>),
    /// 无法表示的运行时对象，仅保留类型名
    Opaque(String),
}

impl PropertyValue {
    /// 值的运行时类型名
    pub fn type_name(&self) -> &str {
        match self {
            PropertyValue::String(_) => "String",
            PropertyValue::Bool(_) => "Boolean",
            PropertyValue::Char(_) => "Character",
            PropertyValue::Byte(_) => "Byte",
            PropertyValue::Short(_) => "Short",
            PropertyValue::Int(_) => "Integer",
            PropertyValue::Long(_) => "Long",
            PropertyValue::Float(_) => "Float",
            PropertyValue::Double(_) => "Double",
            PropertyValue::List(_) => "List",
            PropertyValue::Map(_) => "Map",
            PropertyValue::Opaque(name) => name,
        }
    }

    /// 字符串视图
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// 整数视图（所有整数类型都放宽到 i64）
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            PropertyValue::Byte(v) => Some(v as i64),
            PropertyValue::Short(v) => Some(v as i64),
            PropertyValue::Int(v) => Some(v as i64),
            PropertyValue::Long(v) => Some(v),
            _ => None,
        }
    }

    /// 字符串列表视图，任一元素不是字符串时返回 None
    pub fn as_string_list(&self) -> Option<Vec<String>> {
        match self {
            PropertyValue::List(items) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect(),
            _ => None,
        }
    }

    /// 由字符串切片构造字符串列表
    pub fn string_list<S: AsRef<str>>(items: &[S]) -> Self {
        PropertyValue::List(
            items
                .iter()
                .map(|s| PropertyValue::String(s.as_ref().to_string()))
                .collect(),
        )
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::String(v) => write!(f, "{}", v),
            PropertyValue::Bool(v) => write!(f, "{}", v),
            PropertyValue::Char(v) => write!(f, "{}", v),
            PropertyValue::Byte(v) => write!(f, "{}", v),
            PropertyValue::Short(v) => write!(f, "{}", v),
            PropertyValue::Int(v) => write!(f, "{}", v),
            PropertyValue::Long(v) => write!(f, "{}", v),
            PropertyValue::Float(v) => write!(f, "{}", v),
            PropertyValue::Double(v) => write!(f, "{}", v),
            PropertyValue::List(items) => {
                let parts: Vec<String> = items.iter().map(|i| i.to_string()).collect();
                write!(f, "[{}]", parts.join(","))
            }
            PropertyValue::Map(entries) => {
                let parts: Vec<String> =
                    entries.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                write!(f, "{{{}}}", parts.join(","))
            }
            PropertyValue::Opaque(name) => write!(f, "<{}>", name),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::String(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::String(v)
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl From<i32> for PropertyValue {
    fn from(v: i32) -> Self {
        PropertyValue::Int(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Long(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Double(v)
    }
}
