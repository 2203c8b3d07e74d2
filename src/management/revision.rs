//! 修订版本身份分配
//!
//! 修订版本在框架中没有稳定标识。跟踪器为一次请求内遇到的每个修订版本对象
//! 分配从 0 开始的小整数，同一对象重复查询返回同一个值。跟踪器随请求创建、随请求丢弃，
//! 分配出的标识只在同一个响应内可比较。

use std::collections::HashMap;
use std::sync::Arc;

use crate::module::Revision;

/// 修订版本标识
pub type RevisionId = u32;

/// 修订版本身份跟踪器
///
/// 内部以对象地址为键，同时持有 `Arc` 保证跟踪器存活期间地址不会被复用。
#[derive(Debug, Default)]
pub struct RevisionTracker {
    arena: Vec<Arc<Revision>>,
    index: HashMap<usize, RevisionId>,
}

impl RevisionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取修订版本的标识，首次出现时分配下一个未用的整数
    pub fn id_for(&mut self, revision: &Arc<Revision>) -> RevisionId {
        let key = Arc::as_ptr(revision) as usize;
        if let Some(id) = self.index.get(&key) {
            return *id;
        }
        let id = self.arena.len() as RevisionId;
        self.arena.push(revision.clone());
        self.index.insert(key, id);
        id
    }

    /// 按标识取回修订版本
    pub fn revision(&self, id: RevisionId) -> Option<&Arc<Revision>> {
        self.arena.get(id as usize)
    }

    /// 已分配的标识数量
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semver::Version;

    fn revision(name: &str) -> Arc<Revision> {
        Arc::new(Revision {
            module_id: 1,
            symbolic_name: name.to_string(),
            version: Version::new(1, 0, 0),
            capabilities: vec![],
            requirements: vec![],
        })
    }

    #[test]
    fn test_same_object_same_id() {
        let mut tracker = RevisionTracker::new();
        let r = revision("a");
        assert_eq!(tracker.id_for(&r), 0);
        assert_eq!(tracker.id_for(&r.clone()), 0);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_structurally_equal_revisions_are_distinct() {
        let mut tracker = RevisionTracker::new();
        let a = revision("same");
        let b = revision("same");
        let ida = tracker.id_for(&a);
        let idb = tracker.id_for(&b);
        assert_ne!(ida, idb);
        assert_eq!((ida, idb), (0, 1));
        assert!(Arc::ptr_eq(tracker.revision(idb).unwrap(), &b));
    }

    #[test]
    fn test_fresh_tracker_restarts_at_zero() {
        let r = revision("a");
        let other = revision("b");
        let mut first = RevisionTracker::new();
        first.id_for(&other);
        assert_eq!(first.id_for(&r), 1);

        let mut second = RevisionTracker::new();
        assert!(second.is_empty());
        assert_eq!(second.id_for(&r), 0);
    }
}
