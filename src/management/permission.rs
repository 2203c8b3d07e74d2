//! 权限存储边界
//!
//! 按安装位置保存编码后的权限字符串，以及未单独配置位置时使用的默认权限。
//! 编码格式为 `(type)`、`(type "name")` 或 `(type "name" "actions")`。
//! 写入前整批校验，任一条格式错误则整批拒绝、不写入任何内容。

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;
use regex::Regex;

use crate::utils::{ManagementError, Result};

static ENCODED_PERMISSION: LazyLock<std::result::Result<Regex, regex::Error>> =
    LazyLock::new(|| {
        Regex::new(
            r#"^\(\s*([^\s"()]+)(?:\s+"((?:[^"\\]|\\.)*)"(?:\s+"((?:[^"\\]|\\.)*)")?)?\s*\)$"#,
        )
    });

/// 一条解析后的权限
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PermissionInfo {
    pub kind: String,
    pub name: Option<String>,
    pub actions: Option<String>,
}

impl PermissionInfo {
    /// 规范化的编码形式
    pub fn encoded(&self) -> String {
        match (&self.name, &self.actions) {
            (Some(name), Some(actions)) => format!("({} \"{}\" \"{}\")", self.kind, name, actions),
            (Some(name), None) => format!("({} \"{}\")", self.kind, name),
            _ => format!("({})", self.kind),
        }
    }
}

impl FromStr for PermissionInfo {
    type Err = ManagementError;

    fn from_str(s: &str) -> Result<Self> {
        let pattern = ENCODED_PERMISSION
            .as_ref()
            .map_err(|e| ManagementError::Internal(format!("权限格式正则无效: {}", e)))?;
        let captures = pattern
            .captures(s.trim())
            .ok_or_else(|| ManagementError::InvalidPermission(s.to_string()))?;
        Ok(Self {
            kind: captures[1].to_string(),
            name: captures.get(2).map(|m| m.as_str().to_string()),
            actions: captures.get(3).map(|m| m.as_str().to_string()),
        })
    }
}

impl fmt::Display for PermissionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded())
    }
}

/// 权限存储
pub trait PermissionStore: Send + Sync {
    /// 已单独配置权限的位置
    fn locations(&self) -> Vec<String>;

    /// 位置的权限，未配置时为 `None`
    fn permissions(&self, location: &str) -> Option<Vec<PermissionInfo>>;

    /// 设置位置的权限，`None` 表示清除
    fn set_permissions(&self, location: &str, permissions: Option<Vec<PermissionInfo>>);

    /// 默认权限，未配置时为 `None`
    fn default_permissions(&self) -> Option<Vec<PermissionInfo>>;

    /// 设置默认权限，`None` 表示清除
    fn set_default_permissions(&self, permissions: Option<Vec<PermissionInfo>>);
}

/// 内存中的权限存储
#[derive(Debug, Default)]
pub struct MemoryPermissionStore {
    by_location: RwLock<BTreeMap<String, Vec<PermissionInfo>>>,
    defaults: RwLock<Option<Vec<PermissionInfo>>>,
}

impl MemoryPermissionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PermissionStore for MemoryPermissionStore {
    fn locations(&self) -> Vec<String> {
        self.by_location.read().keys().cloned().collect()
    }

    fn permissions(&self, location: &str) -> Option<Vec<PermissionInfo>> {
        self.by_location.read().get(location).cloned()
    }

    fn set_permissions(&self, location: &str, permissions: Option<Vec<PermissionInfo>>) {
        let mut map = self.by_location.write();
        match permissions {
            Some(p) => {
                map.insert(location.to_string(), p);
            }
            None => {
                map.remove(location);
            }
        }
    }

    fn default_permissions(&self) -> Option<Vec<PermissionInfo>> {
        self.defaults.read().clone()
    }

    fn set_default_permissions(&self, permissions: Option<Vec<PermissionInfo>>) {
        *self.defaults.write() = permissions;
    }
}

/// 权限管理器
///
/// 在编码字符串与权限存储之间转换。
#[derive(Clone)]
pub struct PermissionManager {
    store: Arc<dyn PermissionStore>,
}

impl fmt::Debug for PermissionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionManager").finish_non_exhaustive()
    }
}

impl PermissionManager {
    pub fn new(store: Arc<dyn PermissionStore>) -> Self {
        Self { store }
    }

    /// 使用内存存储
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryPermissionStore::new()))
    }

    pub fn list_locations(&self) -> Vec<String> {
        self.store.locations()
    }

    /// 位置的编码权限，未配置时为 `None`
    ///
    /// # Errors
    ///
    /// 位置为空字符串时返回 `InvalidArgument`
    pub fn permissions(&self, location: &str) -> Result<Option<Vec<String>>> {
        check_location(location)?;
        Ok(self.store.permissions(location).map(encode_all))
    }

    /// 替换位置的权限
    ///
    /// # Errors
    ///
    /// - 位置为空字符串
    /// - 任一编码权限格式错误（此时不写入任何内容）
    pub fn set_permissions<S: AsRef<str>>(&self, location: &str, encoded: &[S]) -> Result<()> {
        check_location(location)?;
        let parsed = decode_all(encoded)?;
        tracing::info!(location = %location, count = parsed.len(), "已设置权限");
        self.store.set_permissions(location, Some(parsed));
        Ok(())
    }

    /// 清除位置的权限
    pub fn clear_permissions(&self, location: &str) -> Result<()> {
        check_location(location)?;
        self.store.set_permissions(location, None);
        Ok(())
    }

    pub fn list_default_permissions(&self) -> Option<Vec<String>> {
        self.store.default_permissions().map(encode_all)
    }

    /// 替换默认权限
    ///
    /// # Errors
    ///
    /// 任一编码权限格式错误时返回 `InvalidPermission`，不写入任何内容
    pub fn set_default_permissions<S: AsRef<str>>(&self, encoded: &[S]) -> Result<()> {
        let parsed = decode_all(encoded)?;
        tracing::info!(count = parsed.len(), "已设置默认权限");
        self.store.set_default_permissions(Some(parsed));
        Ok(())
    }
}

fn check_location(location: &str) -> Result<()> {
    if location.trim().is_empty() {
        return Err(ManagementError::InvalidArgument(
            "位置不能为空".to_string(),
        ));
    }
    Ok(())
}

fn decode_all<S: AsRef<str>>(encoded: &[S]) -> Result<Vec<PermissionInfo>> {
    encoded.iter().map(|e| e.as_ref().parse()).collect()
}

fn encode_all(permissions: Vec<PermissionInfo>) -> Vec<String> {
    permissions.iter().map(PermissionInfo::encoded).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_encoded_permissions() {
        let p: PermissionInfo = r#"(java.io.FilePermission "/tmp/-" "read,write")"#.parse().unwrap();
        assert_eq!(p.kind, "java.io.FilePermission");
        assert_eq!(p.name.as_deref(), Some("/tmp/-"));
        assert_eq!(p.actions.as_deref(), Some("read,write"));

        let p: PermissionInfo = "( java.security.AllPermission )".parse().unwrap();
        assert_eq!(p.encoded(), "(java.security.AllPermission)");

        let p: PermissionInfo = r#"(org.demo.Perm   "name")"#.parse().unwrap();
        assert_eq!(p.encoded(), r#"(org.demo.Perm "name")"#);
    }

    #[test]
    fn test_malformed_permissions() {
        for bad in ["", "()", "java.io.FilePermission", r#"(a "unterminated)"#, r#"(a b)"#] {
            let err = bad.parse::<PermissionInfo>().unwrap_err();
            assert!(matches!(err, ManagementError::InvalidPermission(_)), "{:?}", bad);
            assert!(err.is_invalid_argument());
        }
    }

    #[test]
    fn test_manager_roundtrip() {
        let manager = PermissionManager::in_memory();
        assert!(manager.list_locations().is_empty());
        assert_eq!(manager.permissions("file:a.jar").unwrap(), None);

        manager
            .set_permissions("file:a.jar", &[r#"(org.demo.P "x" "get")"#])
            .unwrap();
        assert_eq!(manager.list_locations(), vec!["file:a.jar".to_string()]);
        assert_eq!(
            manager.permissions("file:a.jar").unwrap(),
            Some(vec![r#"(org.demo.P "x" "get")"#.to_string()])
        );

        manager.clear_permissions("file:a.jar").unwrap();
        assert!(manager.list_locations().is_empty());
    }

    #[test]
    fn test_invalid_batch_writes_nothing() {
        let manager = PermissionManager::in_memory();
        manager.set_default_permissions(&["(org.demo.A)"]).unwrap();

        let err = manager
            .set_default_permissions(&["(org.demo.B)", "not-a-permission"])
            .unwrap_err();
        assert!(matches!(err, ManagementError::InvalidPermission(ref p) if p == "not-a-permission"));
        assert_eq!(
            manager.list_default_permissions(),
            Some(vec!["(org.demo.A)".to_string()])
        );
    }

    #[test]
    fn test_empty_location_rejected() {
        let manager = PermissionManager::in_memory();
        assert!(manager.permissions(" ").unwrap_err().is_invalid_argument());
        assert!(manager
            .set_permissions::<&str>("", &[])
            .unwrap_err()
            .is_invalid_argument());
    }
}
