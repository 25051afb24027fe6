//! 启用/禁用解析
//!
//! 每条声明带有权重：模块作用于自身为本地（1），作用于其他模块为远程（2），
//! 引擎全局覆盖为全局（3）。同一目标取权重最高的声明；
//! 权重相同时后处理的声明生效，但处理顺序不作保证。

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::candidates::CandidateSet;
use super::metadata::{ModuleId, ModuleMetadata};
use crate::utils::{CoreError, Result};

/// 声明权重
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToggleWeight {
    Local = 1,
    Remote = 2,
    Global = 3,
}

/// 引擎全局覆盖（按给定顺序处理）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalOverrides {
    entries: Vec<(ModuleId, bool)>,
}

impl GlobalOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable(mut self, id: impl Into<ModuleId>) -> Self {
        self.entries.push((id.into(), true));
        self
    }

    pub fn disable(mut self, id: impl Into<ModuleId>) -> Self {
        self.entries.push((id.into(), false));
        self
    }

    pub fn push(&mut self, id: ModuleId, enabled: bool) {
        self.entries.push((id, enabled));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ModuleId, bool)> {
        self.entries.iter().map(|(id, enabled)| (id, *enabled))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(ModuleId, bool)> for GlobalOverrides {
    fn from_iter<I: IntoIterator<Item = (ModuleId, bool)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// 声明方
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Declarer {
    Module(ModuleId),
    Global,
}

/// 某个目标的最终启用状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToggleState {
    pub enabled: bool,
    pub weight: ToggleWeight,
    pub declared_by: Declarer,
}

/// 解析结果
#[derive(Debug, Clone, Default, Serialize)]
pub struct EnablementOutcome {
    /// 每个被声明过的目标的最终状态（首次声明顺序）
    pub states: IndexMap<ModuleId, ToggleState>,
    /// 从候选集合中移除的模块
    pub disabled: Vec<ModuleId>,
}

impl EnablementOutcome {
    pub fn state_of(&self, id: &ModuleId) -> Option<&ToggleState> {
        self.states.get(id)
    }
}

/// 启用/禁用解析器
pub struct EnablementResolver;

impl EnablementResolver {
    /// 解析全部声明，并从候选集合中移除最终为禁用的模块
    ///
    /// # Errors
    ///
    /// 任何指向锚定模块的禁用声明都返回 `CoreError::AnchorDisabled`。
    pub fn resolve(
        set: &mut CandidateSet,
        metadata: &IndexMap<ModuleId, ModuleMetadata>,
        overrides: &GlobalOverrides,
    ) -> Result<EnablementOutcome> {
        let mut outcome = EnablementOutcome::default();

        for id in set.ids() {
            let Some(meta) = metadata.get(&id) else {
                continue;
            };

            for toggle in &meta.enables {
                let target = toggle.resolve(&id);
                let weight = Self::module_weight(&id, target);
                Self::apply(&mut outcome, target, true, weight, Declarer::Module(id.clone()));
            }

            for toggle in &meta.disables {
                let target = toggle.resolve(&id);
                if target == set.anchor() {
                    return Err(CoreError::AnchorDisabled(target.to_string()));
                }
                let weight = Self::module_weight(&id, target);
                Self::apply(&mut outcome, target, false, weight, Declarer::Module(id.clone()));
            }
        }

        for (target, enabled) in overrides.iter() {
            if !enabled && target == set.anchor() {
                return Err(CoreError::AnchorDisabled(target.to_string()));
            }
            Self::apply(&mut outcome, target, enabled, ToggleWeight::Global, Declarer::Global);
        }

        for (target, state) in &outcome.states {
            if state.enabled || !set.contains(target) {
                continue;
            }
            set.remove(target)?;
            tracing::debug!(
                module_id = %target,
                weight = ?state.weight,
                declared_by = ?state.declared_by,
                "模块已禁用"
            );
            outcome.disabled.push(target.clone());
        }

        Ok(outcome)
    }

    fn module_weight(declaring: &ModuleId, target: &ModuleId) -> ToggleWeight {
        if declaring == target {
            ToggleWeight::Local
        } else {
            ToggleWeight::Remote
        }
    }

    fn apply(
        outcome: &mut EnablementOutcome,
        target: &ModuleId,
        enabled: bool,
        weight: ToggleWeight,
        declared_by: Declarer,
    ) {
        if let Some(existing) = outcome.states.get(target) {
            if existing.weight > weight {
                return;
            }
        }

        outcome.states.insert(
            target.clone(),
            ToggleState {
                enabled,
                weight,
                declared_by,
            },
        );
    }
}
