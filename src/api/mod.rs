//! API 模块
//!
//! 对外提供的管理代理入口。
//!
//! # 模块概览
//!
//! - `sdk`: ManagementAgent，组装目录查询、事件转发与权限边界

pub mod sdk;

pub use sdk::ManagementAgent;
