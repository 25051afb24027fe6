//! 候选模块集合
//!
//! 发现顺序的有序工作集，只会缩小。核心锚定模块永远不会被移除。

use indexmap::IndexSet;

use super::metadata::ModuleId;
use crate::utils::{CoreError, Result};

/// 候选模块集合
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateSet {
    anchor: ModuleId,
    members: IndexSet<ModuleId>,
}

impl CandidateSet {
    /// 创建候选集合，锚定模块缺失时补到最前面
    pub fn new(anchor: ModuleId, ids: impl IntoIterator<Item = ModuleId>) -> Self {
        let mut members = IndexSet::new();
        members.insert(anchor.clone());
        members.extend(ids);
        Self { anchor, members }
    }

    pub fn anchor(&self) -> &ModuleId {
        &self.anchor
    }

    pub fn contains(&self, id: &ModuleId) -> bool {
        self.members.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModuleId> {
        self.members.iter()
    }

    /// 成员快照
    pub fn ids(&self) -> Vec<ModuleId> {
        self.members.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// 在发现顺序中的位置
    pub fn position(&self, id: &ModuleId) -> Option<usize> {
        self.members.get_index_of(id)
    }

    /// 只保留满足条件的成员，返回被移除的 ID
    ///
    /// 锚定模块不受条件影响。
    pub fn retain<F>(&mut self, mut keep: F) -> Vec<ModuleId>
    where
        F: FnMut(&ModuleId) -> bool,
    {
        let mut removed = Vec::new();
        let anchor = &self.anchor;
        self.members.retain(|id| {
            if id == anchor || keep(id) {
                true
            } else {
                removed.push(id.clone());
                false
            }
        });
        removed
    }

    /// 移除成员，返回是否确实移除
    ///
    /// # Errors
    ///
    /// 移除锚定模块时返回 `CoreError::AnchorDisabled`。
    pub fn remove(&mut self, id: &ModuleId) -> Result<bool> {
        if id == &self.anchor {
            return Err(CoreError::AnchorDisabled(id.to_string()));
        }
        Ok(self.members.shift_remove(id))
    }
}
