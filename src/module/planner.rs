//! 启动计划
//!
//! 串联 注册表 → 阶段过滤 → 启用/禁用解析 → 依赖图构建 → 拓扑排序，
//! 得到本次启动的模块顺序。整个过程不执行任何模块代码。

use serde::Serialize;

use super::dependency::{DependencyGraph, GraphBuilder};
use super::enablement::{EnablementResolver, GlobalOverrides};
use super::metadata::{ModuleId, Stage};
use super::registry::ModuleRegistry;
use super::report::DependencyReport;
use super::stage::StageFilter;
use crate::utils::{CoreError, Result};

/// 启动计划
#[derive(Debug, Clone, Serialize)]
pub struct BootPlan {
    pub stage: Stage,
    /// 启动顺序
    pub sequence: Vec<ModuleId>,
    #[serde(skip)]
    pub graph: DependencyGraph,
    /// 被阶段过滤移除的模块
    pub filtered_out: Vec<ModuleId>,
    /// 被禁用的模块
    pub disabled: Vec<ModuleId>,
}

impl BootPlan {
    /// 终止顺序（启动顺序的反序）
    pub fn unload_order(&self) -> Vec<ModuleId> {
        self.sequence.iter().rev().cloned().collect()
    }

    pub fn position(&self, id: &ModuleId) -> Option<usize> {
        self.sequence.iter().position(|m| m == id)
    }
}

/// 启动规划器
pub struct BootPlanner;

impl BootPlanner {
    /// 计算启动计划
    ///
    /// # Errors
    ///
    /// 组合配置错误（锚定模块被禁用、依赖断裂、循环依赖）在任何模块执行前返回。
    /// 循环依赖时会先在 info 级别输出依赖诊断报告。
    pub fn plan(
        registry: &ModuleRegistry,
        stage: Stage,
        overrides: &GlobalOverrides,
    ) -> Result<BootPlan> {
        let metadata = registry.metadata();
        let mut set = registry.candidates();

        let filtered_out = StageFilter::apply(&mut set, &metadata, stage);
        let enablement = EnablementResolver::resolve(&mut set, &metadata, overrides)?;
        let graph = GraphBuilder::build(&set, &metadata, registry)?;

        let sequence = match graph.topological_sort() {
            Ok(sequence) => sequence,
            Err(CoreError::CircularDependency { cycle, .. }) => {
                let report = DependencyReport::build(&set, &metadata, registry, Some(&graph));
                tracing::info!("依赖诊断报告:\n{}", report);
                tracing::error!(cycle = %cycle.join(" -> "), "模块依赖存在循环，无法排序");
                return Err(CoreError::CircularDependency {
                    cycle,
                    report: report.to_string(),
                });
            }
            Err(e) => return Err(e),
        };

        tracing::debug!(
            %stage,
            modules = sequence.len(),
            filtered = filtered_out.len(),
            disabled = enablement.disabled.len(),
            "启动计划已生成"
        );

        Ok(BootPlan {
            stage,
            sequence,
            graph,
            filtered_out,
            disabled: enablement.disabled,
        })
    }

    /// 生成依赖诊断报告
    ///
    /// 依赖图能构建时包含解析得到的边，否则只列出声明。
    pub fn report(
        registry: &ModuleRegistry,
        stage: Stage,
        overrides: &GlobalOverrides,
    ) -> Result<DependencyReport> {
        let metadata = registry.metadata();
        let mut set = registry.candidates();

        StageFilter::apply(&mut set, &metadata, stage);
        EnablementResolver::resolve(&mut set, &metadata, overrides)?;
        let graph = GraphBuilder::build(&set, &metadata, registry).ok();

        Ok(DependencyReport::build(&set, &metadata, registry, graph.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::metadata::{ModuleDescriptor, Requirement};

    fn registry() -> ModuleRegistry {
        let mut registry = ModuleRegistry::new(ModuleDescriptor::declared("anchor"));
        registry
            .register(ModuleDescriptor::declared("web").require(Requirement::module("db")))
            .unwrap()
            .register(ModuleDescriptor::declared("db").core())
            .unwrap()
            .register(ModuleDescriptor::declared("wizard").user().max_stage(Stage::Install).min_stage(Stage::Install))
            .unwrap()
            .register(ModuleDescriptor::declared("legacy").disable_self())
            .unwrap();
        registry
    }

    #[test]
    fn test_plan_pipeline() {
        let plan = BootPlanner::plan(&registry(), Stage::Run, &GlobalOverrides::new()).unwrap();

        let ids: Vec<_> = plan.sequence.iter().map(|m| m.as_str()).collect();
        assert_eq!(ids, vec!["anchor", "db", "web"]);
        assert_eq!(plan.filtered_out, vec![ModuleId::from("wizard")]);
        assert_eq!(plan.disabled, vec![ModuleId::from("legacy")]);
        assert_eq!(plan.unload_order().first().map(|m| m.as_str()), Some("web"));
    }

    #[test]
    fn test_plan_is_deterministic() {
        let registry = registry();
        let first = BootPlanner::plan(&registry, Stage::Run, &GlobalOverrides::new()).unwrap();
        let second = BootPlanner::plan(&registry, Stage::Run, &GlobalOverrides::new()).unwrap();
        assert_eq!(first.sequence, second.sequence);
    }

    #[test]
    fn test_plan_cycle_carries_report() {
        let mut registry = ModuleRegistry::new(ModuleDescriptor::declared("anchor"));
        registry
            .register(ModuleDescriptor::declared("a").require(Requirement::module("b")))
            .unwrap()
            .register(ModuleDescriptor::declared("b").require(Requirement::module("a")))
            .unwrap();

        let err = BootPlanner::plan(&registry, Stage::Run, &GlobalOverrides::new()).unwrap_err();
        match &err {
            CoreError::CircularDependency { cycle, report } => {
                assert_eq!(cycle, &vec!["a".to_string(), "b".to_string(), "a".to_string()]);
                assert!(report.contains("a\n  -> b (strong)\n  = b\n/"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.report().is_some());
    }

    #[test]
    fn test_report_on_broken_graph() {
        let mut registry = ModuleRegistry::new(ModuleDescriptor::declared("anchor"));
        registry
            .register(ModuleDescriptor::declared("a").require(Requirement::module("ghost")))
            .unwrap();

        assert!(BootPlanner::plan(&registry, Stage::Run, &GlobalOverrides::new()).is_err());

        let report = BootPlanner::report(&registry, Stage::Run, &GlobalOverrides::new()).unwrap();
        let a = report.entry(&ModuleId::from("a")).unwrap();
        assert!(a.requires[0].missing);
        assert!(a.resolved.is_empty());
    }
}
