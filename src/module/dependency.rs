//! 模块依赖管理
//!
//! 本模块提供模块依赖关系的图结构、图构建器和拓扑排序。
//!
//! # 主要组件
//!
//! - [`DependencyGraph`] - 依赖关系图，边从依赖方指向被依赖方
//! - [`GraphBuilder`] - 根据折叠后的模块元数据构建依赖图
//!
//! # 示例
//!
//! ```rust
//! use chips_boot::module::dependency::DependencyGraph;
//! use chips_boot::module::metadata::ModuleId;
//!
//! let (a, b) = (ModuleId::from("module_a"), ModuleId::from("module_b"));
//! let mut graph = DependencyGraph::new();
//! graph.add_module(&a);
//! graph.add_module(&b);
//! graph.add_dependency(&a, &b);
//!
//! assert_eq!(graph.get_dependencies(&a), &[b.clone()]);
//! assert_eq!(graph.topological_sort().unwrap(), vec![b, a]);
//! ```

use std::collections::HashSet;

use indexmap::IndexMap;

use super::candidates::CandidateSet;
use super::metadata::{CapabilityId, ModuleId, ModuleMetadata, Target};
use super::registry::ModuleRegistry;
use crate::utils::{CoreError, Result};

/// 模块依赖关系图
///
/// 节点保持候选集合的发现顺序，边保持插入顺序并去重。
/// 所有边的两端都是图中的节点，能力接口不会成为节点。
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// 正向边：模块 ID -> 该模块依赖的模块列表
    edges: IndexMap<ModuleId, Vec<ModuleId>>,
    /// 反向边：模块 ID -> 依赖该模块的模块列表
    reverse_edges: IndexMap<ModuleId, Vec<ModuleId>>,
}

impl DependencyGraph {
    /// 创建一个空的依赖图
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加模块节点
    ///
    /// 如果模块已存在，则不会重复添加。
    pub fn add_module(&mut self, module_id: &ModuleId) {
        self.edges.entry(module_id.clone()).or_default();
        self.reverse_edges.entry(module_id.clone()).or_default();
    }

    /// 添加依赖关系
    ///
    /// 表示 `module_id` 必须在 `dependency_id` 之后运行。
    /// 自依赖会被忽略；不存在的节点会自动添加。
    pub fn add_dependency(&mut self, module_id: &ModuleId, dependency_id: &ModuleId) {
        if module_id == dependency_id {
            return;
        }

        self.add_module(module_id);
        self.add_module(dependency_id);

        // 添加正向边（避免重复）
        if let Some(deps) = self.edges.get_mut(module_id) {
            if !deps.contains(dependency_id) {
                deps.push(dependency_id.clone());
            }
        }

        // 添加反向边（避免重复）
        if let Some(rev_deps) = self.reverse_edges.get_mut(dependency_id) {
            if !rev_deps.contains(module_id) {
                rev_deps.push(module_id.clone());
            }
        }
    }

    /// 获取模块的直接依赖
    pub fn get_dependencies(&self, module_id: &ModuleId) -> &[ModuleId] {
        self.edges.get(module_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 获取直接依赖该模块的模块
    pub fn get_dependents(&self, module_id: &ModuleId) -> &[ModuleId] {
        self.reverse_edges
            .get(module_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn contains_module(&self, module_id: &ModuleId) -> bool {
        self.edges.contains_key(module_id)
    }

    /// 所有模块（节点顺序）
    pub fn modules(&self) -> impl Iterator<Item = &ModuleId> {
        self.edges.keys()
    }

    pub fn module_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// 检测是否存在循环依赖
    pub fn has_cycle(&self) -> bool {
        self.find_cycle().is_some()
    }

    /// 查找循环依赖路径
    ///
    /// 如果存在循环，返回闭合的循环路径（首尾相同）；否则返回 `None`。
    pub fn find_cycle(&self) -> Option<Vec<ModuleId>> {
        self.visit_all().err()
    }

    /// 拓扑排序（深度优先）
    ///
    /// 按节点顺序依次访问，每个节点的依赖按边的顺序访问，
    /// 节点在其全部依赖之后输出。相同输入总是得到相同输出。
    ///
    /// # 错误
    ///
    /// 如果存在循环依赖，返回 `CoreError::CircularDependency`（报告为空，由调用方补充）。
    pub fn topological_sort(&self) -> Result<Vec<ModuleId>> {
        self.visit_all().map_err(|cycle| CoreError::CircularDependency {
            cycle: cycle.iter().map(ToString::to_string).collect(),
            report: String::new(),
        })
    }

    /// 获取卸载顺序（启动顺序的反序）
    pub fn get_unload_order(&self) -> Result<Vec<ModuleId>> {
        let mut order = self.topological_sort()?;
        order.reverse();
        Ok(order)
    }

    fn visit_all(&self) -> std::result::Result<Vec<ModuleId>, Vec<ModuleId>> {
        let mut visited = HashSet::new();
        let mut path = Vec::new();
        let mut sorted = Vec::with_capacity(self.edges.len());

        for node in self.edges.keys() {
            self.visit(node, &mut visited, &mut path, &mut sorted)?;
        }

        Ok(sorted)
    }

    fn visit<'a>(
        &'a self,
        node: &'a ModuleId,
        visited: &mut HashSet<&'a ModuleId>,
        path: &mut Vec<&'a ModuleId>,
        sorted: &mut Vec<ModuleId>,
    ) -> std::result::Result<(), Vec<ModuleId>> {
        if let Some(start) = path.iter().position(|n| *n == node) {
            // 找到循环，提取循环路径并闭合
            let mut cycle: Vec<ModuleId> = path[start..].iter().map(|n| (*n).clone()).collect();
            cycle.push(node.clone());
            return Err(cycle);
        }

        if visited.contains(node) {
            return Ok(());
        }

        path.push(node);
        for dependency in self.get_dependencies(node) {
            self.visit(dependency, visited, path, sorted)?;
        }
        path.pop();

        visited.insert(node);
        sorted.push(node.clone());
        Ok(())
    }
}

/// 依赖图构建器
pub struct GraphBuilder;

impl GraphBuilder {
    /// 根据幸存候选的元数据构建依赖图
    ///
    /// - 依赖具体模块：目标存在则连边；目标缺失且未显式标记为弱依赖则报错
    /// - 依赖能力接口：连向每个幸存的实现模块（不含自身）；
    ///   没有实现模块且显式标记为强依赖时报错
    /// - 被具体模块依赖：目标存在则由目标连向声明方，缺失则忽略
    /// - 被能力接口依赖：每个幸存的实现模块（不含自身）连向声明方
    ///
    /// # Errors
    ///
    /// 依赖断裂时返回 `CoreError::BrokenDependency`。
    pub fn build(
        set: &CandidateSet,
        metadata: &IndexMap<ModuleId, ModuleMetadata>,
        registry: &ModuleRegistry,
    ) -> Result<DependencyGraph> {
        let mut graph = DependencyGraph::new();
        for id in set.iter() {
            graph.add_module(id);
        }

        let survivors = |capability: &CapabilityId| {
            registry
                .implementors(capability)
                .iter()
                .filter(|m| set.contains(m))
                .collect::<Vec<_>>()
        };

        for id in set.iter() {
            let Some(meta) = metadata.get(id) else {
                continue;
            };

            for declared in &meta.requires {
                let requirement = &declared.declaration;
                match &requirement.target {
                    Target::Module(target) => {
                        if target == id {
                            continue;
                        }
                        if set.contains(target) {
                            graph.add_dependency(id, target);
                        } else if !requirement.strength.is_explicitly_weak() {
                            return Err(CoreError::BrokenDependency {
                                module: id.to_string(),
                                target: target.to_string(),
                            });
                        }
                    }
                    Target::Capability(capability) => {
                        let implementors: Vec<_> =
                            survivors(capability).into_iter().filter(|m| *m != id).collect();
                        if implementors.is_empty() {
                            if requirement.strength.is_explicitly_strong() {
                                return Err(CoreError::BrokenDependency {
                                    module: id.to_string(),
                                    target: capability.to_string(),
                                });
                            }
                            continue;
                        }
                        for implementor in implementors {
                            graph.add_dependency(id, implementor);
                        }
                    }
                }
            }

            for declared in &meta.required_by {
                match &declared.declaration.target {
                    Target::Module(target) => {
                        if target != id && set.contains(target) {
                            graph.add_dependency(target, id);
                        }
                    }
                    Target::Capability(capability) => {
                        for implementor in survivors(capability) {
                            if implementor != id {
                                graph.add_dependency(implementor, id);
                            }
                        }
                    }
                }
            }
        }

        tracing::debug!(
            modules = graph.module_count(),
            edges = graph.edge_count(),
            "依赖图构建完成"
        );
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::metadata::{CapabilityDescriptor, ModuleDescriptor, Requirement};

    fn id(s: &str) -> ModuleId {
        ModuleId::from(s)
    }

    fn ids(list: &[ModuleId]) -> Vec<&str> {
        list.iter().map(|m| m.as_str()).collect()
    }

    fn build(registry: &ModuleRegistry) -> Result<DependencyGraph> {
        GraphBuilder::build(&registry.candidates(), &registry.metadata(), registry)
    }

    #[test]
    fn test_add_dependency_duplicate() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency(&id("a"), &id("b"));
        graph.add_dependency(&id("a"), &id("b"));
        graph.add_dependency(&id("a"), &id("a"));

        assert_eq!(graph.get_dependencies(&id("a")).len(), 1);
        assert_eq!(ids(graph.get_dependents(&id("b"))), vec!["a"]);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_topological_sort_preserves_discovery_order() {
        // 1, 2, 3, 4 且 2 依赖 4
        let mut graph = DependencyGraph::new();
        for n in ["1", "2", "3", "4"] {
            graph.add_module(&id(n));
        }
        graph.add_dependency(&id("2"), &id("4"));

        let order = graph.topological_sort().unwrap();
        assert_eq!(ids(&order), vec!["1", "4", "2", "3"]);
        assert_eq!(ids(&graph.get_unload_order().unwrap()), vec!["3", "2", "4", "1"]);
    }

    #[test]
    fn test_topological_sort_complex() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency(&id("app"), &id("service"));
        graph.add_dependency(&id("app"), &id("config"));
        graph.add_dependency(&id("service"), &id("database"));
        graph.add_dependency(&id("database"), &id("config"));

        let order = graph.topological_sort().unwrap();
        assert_eq!(ids(&order), vec!["config", "database", "service", "app"]);
    }

    #[test]
    fn test_find_cycle() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency(&id("a"), &id("b"));
        graph.add_dependency(&id("b"), &id("c"));
        graph.add_dependency(&id("c"), &id("a"));

        let cycle = graph.find_cycle().unwrap();
        assert_eq!(cycle.first(), cycle.last());
        assert_eq!(ids(&cycle), vec!["a", "b", "c", "a"]);

        match graph.topological_sort().unwrap_err() {
            CoreError::CircularDependency { cycle, .. } => assert_eq!(cycle.len(), 4),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_find_cycle_no_cycle() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency(&id("a"), &id("b"));
        assert!(!graph.has_cycle());
    }

    #[test]
    fn test_builder_missing_strong_module() {
        let mut registry = ModuleRegistry::new(ModuleDescriptor::declared("anchor"));
        registry
            .register(ModuleDescriptor::declared("a").require(Requirement::module("ghost")))
            .unwrap();

        match build(&registry).unwrap_err() {
            CoreError::BrokenDependency { module, target } => {
                assert_eq!(module, "a");
                assert_eq!(target, "ghost");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_builder_missing_weak_module_skipped() {
        let mut registry = ModuleRegistry::new(ModuleDescriptor::declared("anchor"));
        registry
            .register(ModuleDescriptor::declared("a").require(Requirement::module("ghost").weak()))
            .unwrap();

        let graph = build(&registry).unwrap();
        assert!(graph.get_dependencies(&id("a")).is_empty());
    }

    #[test]
    fn test_builder_capability_without_implementors() {
        let mut registry = ModuleRegistry::new(ModuleDescriptor::declared("anchor"));
        registry
            .register(ModuleDescriptor::declared("a").require(Requirement::capability("cache")))
            .unwrap();
        assert!(build(&registry).is_ok());

        let mut registry = ModuleRegistry::new(ModuleDescriptor::declared("anchor"));
        registry
            .register(
                ModuleDescriptor::declared("a").require(Requirement::capability("cache").strong()),
            )
            .unwrap();
        assert!(matches!(
            build(&registry),
            Err(CoreError::BrokenDependency { .. })
        ));
    }

    #[test]
    fn test_builder_capability_excludes_self() {
        let mut registry = ModuleRegistry::new(ModuleDescriptor::declared("anchor"));
        registry
            .register(
                ModuleDescriptor::declared("a")
                    .implements("cache")
                    .require(Requirement::capability("cache")),
            )
            .unwrap()
            .register(ModuleDescriptor::declared("b").implements("cache"))
            .unwrap();

        let graph = build(&registry).unwrap();
        assert_eq!(ids(graph.get_dependencies(&id("a"))), vec!["b"]);
    }

    #[test]
    fn test_builder_required_by() {
        let mut registry = ModuleRegistry::new(ModuleDescriptor::declared("anchor"));
        registry
            .register(ModuleDescriptor::declared("late"))
            .unwrap()
            .register(
                ModuleDescriptor::declared("early")
                    .required_by(Target::module("late"))
                    .required_by(Target::module("ghost")),
            )
            .unwrap();

        let graph = build(&registry).unwrap();
        assert_eq!(ids(graph.get_dependencies(&id("late"))), vec!["early"]);

        let order = graph.topological_sort().unwrap();
        assert_eq!(ids(&order), vec!["anchor", "early", "late"]);
    }

    #[test]
    fn test_builder_required_by_capability() {
        let mut registry = ModuleRegistry::new(ModuleDescriptor::declared("anchor"));
        registry
            .register_capability(
                CapabilityDescriptor::new("plugin").required_by(Target::module("host")),
            )
            .unwrap();
        registry
            .register(ModuleDescriptor::declared("host"))
            .unwrap()
            .register(ModuleDescriptor::declared("p1").implements("plugin"))
            .unwrap()
            .register(
                ModuleDescriptor::declared("setup").required_by(Target::capability("plugin")),
            )
            .unwrap();

        let graph = build(&registry).unwrap();
        assert_eq!(ids(graph.get_dependencies(&id("host"))), vec!["p1"]);
        assert_eq!(ids(graph.get_dependencies(&id("p1"))), vec!["setup"]);

        let order = graph.topological_sort().unwrap();
        assert_eq!(ids(&order), vec!["anchor", "setup", "p1", "host"]);
    }
}
