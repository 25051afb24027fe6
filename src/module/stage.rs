//! 启动阶段过滤

use indexmap::IndexMap;

use super::candidates::CandidateSet;
use super::metadata::{ModuleId, ModuleMetadata, Stage};

/// 阶段过滤器
pub struct StageFilter;

impl StageFilter {
    /// 移除阶段窗口不包含 `stage` 的候选，返回被移除的 ID
    pub fn apply(
        set: &mut CandidateSet,
        metadata: &IndexMap<ModuleId, ModuleMetadata>,
        stage: Stage,
    ) -> Vec<ModuleId> {
        let removed = set.retain(|id| {
            metadata
                .get(id)
                .map_or(true, |meta| meta.is_eligible(stage))
        });

        for id in &removed {
            if let Some(meta) = metadata.get(id) {
                tracing::debug!(
                    module_id = %id,
                    %stage,
                    min = %meta.stage.effective_min(meta.origin),
                    max = %meta.stage.effective_max(),
                    "模块不适用于当前启动阶段，已移除"
                );
            }
        }

        removed
    }
}
