//! 管理子系统错误类型定义
//!
//! 本模块定义了内省与事件转发子系统中使用的所有错误类型。

use thiserror::Error;

use crate::module::{ModuleId, ServiceId};

/// 管理子系统错误类型
#[derive(Error, Debug)]
pub enum ManagementError {
    // ==================== 实体不存在 ====================

    /// 模块不存在
    #[error("模块不存在: id {0}")]
    ModuleNotFound(ModuleId),

    /// 服务不存在
    #[error("服务不存在: id {0}")]
    ServiceNotFound(ServiceId),

    // ==================== 参数错误 ====================

    /// 字段掩码超出范围
    #[error("字段掩码超出范围: {0}（有效范围 1..=2097151）")]
    InvalidMask(u32),

    /// 未知字段名
    #[error("未知字段名: '{0}'")]
    UnknownField(String),

    /// 过滤表达式语法错误
    #[error("过滤表达式无效: '{expression}' - {reason}")]
    InvalidFilter {
        expression: String,
        reason: String,
    },

    /// 编码权限字符串格式错误
    #[error("编码权限格式无效: '{0}'")]
    InvalidPermission(String),

    /// 其他参数错误
    #[error("参数无效: {0}")]
    InvalidArgument(String),

    // ==================== 编码错误 ====================

    /// 属性值无法编码为结构化值
    #[error("属性编码失败: '{key}' - {reason}")]
    Encoding {
        key: String,
        reason: String,
    },

    // ==================== 配置错误 ====================

    /// 配置加载失败
    #[error("配置加载失败: {0}")]
    ConfigLoadFailed(String),

    /// 配置值无效
    #[error("配置值无效: '{key}' - {reason}")]
    InvalidConfigValue {
        key: String,
        reason: String,
    },

    // ==================== IO 和序列化错误 ====================

    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 序列化/反序列化错误
    #[error("JSON 错误: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML 序列化/反序列化错误
    #[error("YAML 错误: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// 版本解析错误
    #[error("版本解析错误: {0}")]
    VersionParse(#[from] semver::Error),

    // ==================== 通用错误 ====================

    /// 内部错误
    #[error("内部错误: {0}")]
    Internal(String),

    /// 初始化失败
    #[error("初始化失败: {0}")]
    InitFailed(String),
}

/// 管理操作结果类型别名
pub type Result<T> = std::result::Result<T, ManagementError>;

/// 错误分类
///
/// 对外只暴露这四类，调用方据此决定如何呈现失败。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 请求的实体当前不存在
    NotFound,
    /// 调用参数不合法
    InvalidArgument,
    /// 属性值形态无法表示
    Encoding,
    /// 其他内部失败
    Internal,
}

/// 状态码常量
pub mod status_code {
    /// 成功
    pub const OK: u16 = 200;

    /// 请求格式错误
    pub const BAD_REQUEST: u16 = 400;

    /// 未找到
    pub const NOT_FOUND: u16 = 404;

    /// 内部错误
    pub const INTERNAL_ERROR: u16 = 500;
}

/// 错误码常量
pub mod error_code {
    // 模块错误 (MODULE-xxx)
    pub const MODULE_NOT_FOUND: &str = "MODULE-001";

    // 服务错误 (SERVICE-xxx)
    pub const SERVICE_NOT_FOUND: &str = "SERVICE-001";

    // 参数错误 (ARG-xxx)
    pub const ARG_INVALID_MASK: &str = "ARG-001";
    pub const ARG_UNKNOWN_FIELD: &str = "ARG-002";
    pub const ARG_INVALID_FILTER: &str = "ARG-003";
    pub const ARG_INVALID_PERMISSION: &str = "ARG-004";
    pub const ARG_INVALID: &str = "ARG-005";

    // 编码错误 (ENCODING-xxx)
    pub const ENCODING_FAILED: &str = "ENCODING-001";

    // 配置错误 (CONFIG-xxx)
    pub const CONFIG_LOAD_FAILED: &str = "CONFIG-001";
    pub const CONFIG_INVALID_VALUE: &str = "CONFIG-002";
}

impl ManagementError {
    /// 获取错误分类
    pub fn kind(&self) -> ErrorKind {
        match self {
            ManagementError::ModuleNotFound(_) | ManagementError::ServiceNotFound(_) => {
                ErrorKind::NotFound
            }
            ManagementError::InvalidMask(_)
            | ManagementError::UnknownField(_)
            | ManagementError::InvalidFilter { .. }
            | ManagementError::InvalidPermission(_)
            | ManagementError::InvalidArgument(_)
            | ManagementError::InvalidConfigValue { .. } => ErrorKind::InvalidArgument,
            ManagementError::Encoding { .. } => ErrorKind::Encoding,
            _ => ErrorKind::Internal,
        }
    }

    /// 是否为“实体不存在”错误
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// 是否为参数错误
    pub fn is_invalid_argument(&self) -> bool {
        self.kind() == ErrorKind::InvalidArgument
    }

    /// 获取错误码
    pub fn error_code(&self) -> &'static str {
        match self {
            ManagementError::ModuleNotFound(_) => error_code::MODULE_NOT_FOUND,
            ManagementError::ServiceNotFound(_) => error_code::SERVICE_NOT_FOUND,
            ManagementError::InvalidMask(_) => error_code::ARG_INVALID_MASK,
            ManagementError::UnknownField(_) => error_code::ARG_UNKNOWN_FIELD,
            ManagementError::InvalidFilter { .. } => error_code::ARG_INVALID_FILTER,
            ManagementError::InvalidPermission(_) => error_code::ARG_INVALID_PERMISSION,
            ManagementError::InvalidArgument(_) => error_code::ARG_INVALID,
            ManagementError::Encoding { .. } => error_code::ENCODING_FAILED,
            ManagementError::ConfigLoadFailed(_) => error_code::CONFIG_LOAD_FAILED,
            ManagementError::InvalidConfigValue { .. } => error_code::CONFIG_INVALID_VALUE,
            _ => "UNKNOWN",
        }
    }

    /// 获取 HTTP 状态码
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::NotFound => status_code::NOT_FOUND,
            ErrorKind::InvalidArgument => status_code::BAD_REQUEST,
            ErrorKind::Encoding | ErrorKind::Internal => status_code::INTERNAL_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ManagementError::ModuleNotFound(42);
        assert!(err.to_string().contains("42"));

        let err = ManagementError::InvalidFilter {
            expression: "(a=".to_string(),
            reason: "缺少右括号".to_string(),
        };
        assert!(err.to_string().contains("(a="));
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(ManagementError::ModuleNotFound(1).kind(), ErrorKind::NotFound);
        assert_eq!(ManagementError::ServiceNotFound(1).kind(), ErrorKind::NotFound);
        assert_eq!(ManagementError::InvalidMask(0).kind(), ErrorKind::InvalidArgument);
        assert_eq!(
            ManagementError::UnknownField("x".into()).kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            ManagementError::Encoding {
                key: "k".into(),
                reason: "r".into()
            }
            .kind(),
            ErrorKind::Encoding
        );
        assert_eq!(ManagementError::Internal("x".into()).kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_error_code() {
        let err = ManagementError::ModuleNotFound(7);
        assert_eq!(err.error_code(), error_code::MODULE_NOT_FOUND);
        assert!(err.is_not_found());

        let err = ManagementError::InvalidPermission("bad".into());
        assert_eq!(err.error_code(), error_code::ARG_INVALID_PERMISSION);
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_status_code() {
        assert_eq!(
            ManagementError::ServiceNotFound(3).status_code(),
            status_code::NOT_FOUND
        );
        assert_eq!(
            ManagementError::InvalidMask(0).status_code(),
            status_code::BAD_REQUEST
        );
        assert_eq!(
            ManagementError::Internal("boom".into()).status_code(),
            status_code::INTERNAL_ERROR
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ManagementError = io_err.into();
        assert!(matches!(err, ManagementError::Io(_)));
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
