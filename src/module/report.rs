//! 依赖诊断报告
//!
//! 列出每个候选模块的依赖声明、被依赖声明、实现的能力接口以及解析得到的边。
//! 文本格式：
//!
//! ```text
//! <模块>
//!   -> <目标> (weak | strong[, missing])   依赖声明
//!   -< <目标>                               被依赖声明
//!   : <能力接口>                             实现的能力接口及其声明
//!   = <模块>                                解析得到的依赖边
//! /
//! ```

use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;

use super::candidates::CandidateSet;
use super::dependency::DependencyGraph;
use super::metadata::{
    CapabilityId, DeclarationSource, ModuleId, ModuleMetadata, Requirement, Strength, Target,
};
use super::registry::ModuleRegistry;

/// 依赖声明在报告中的一行
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequirementLine {
    pub target: Target,
    pub weak: bool,
    pub missing: bool,
}

/// 能力接口及其继承的声明
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapabilityLine {
    pub capability: CapabilityId,
    pub requires: Vec<RequirementLine>,
    pub required_by: Vec<Target>,
}

/// 单个模块的报告条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportEntry {
    pub module: ModuleId,
    pub requires: Vec<RequirementLine>,
    pub required_by: Vec<Target>,
    pub capabilities: Vec<CapabilityLine>,
    /// 解析得到的依赖；依赖图未构建时为空
    pub resolved: Vec<ModuleId>,
}

/// 依赖诊断报告
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DependencyReport {
    pub entries: Vec<ReportEntry>,
}

impl DependencyReport {
    /// 为候选集合生成报告
    pub fn build(
        set: &CandidateSet,
        metadata: &IndexMap<ModuleId, ModuleMetadata>,
        registry: &ModuleRegistry,
        graph: Option<&DependencyGraph>,
    ) -> Self {
        let line = |module: &ModuleId, requirement: &Requirement| {
            let missing = match &requirement.target {
                Target::Module(target) => !set.contains(target),
                Target::Capability(capability) => !registry
                    .implementors(capability)
                    .iter()
                    .any(|m| m != module && set.contains(m)),
            };
            RequirementLine {
                target: requirement.target.clone(),
                weak: requirement.effective_strength() == Strength::Weak,
                missing,
            }
        };

        let entries = set
            .iter()
            .filter_map(|id| metadata.get(id))
            .map(|meta| {
                let own_requires = meta
                    .requires
                    .iter()
                    .filter(|d| d.source == DeclarationSource::Own)
                    .map(|d| line(&meta.id, &d.declaration))
                    .collect();
                let own_required_by = meta
                    .required_by
                    .iter()
                    .filter(|d| d.source == DeclarationSource::Own)
                    .map(|d| d.declaration.target.clone())
                    .collect();

                let capabilities = meta
                    .capabilities
                    .iter()
                    .map(|capability| {
                        let source = DeclarationSource::Capability(capability.clone());
                        CapabilityLine {
                            capability: capability.clone(),
                            requires: meta
                                .requires
                                .iter()
                                .filter(|d| d.source == source)
                                .map(|d| line(&meta.id, &d.declaration))
                                .collect(),
                            required_by: meta
                                .required_by
                                .iter()
                                .filter(|d| d.source == source)
                                .map(|d| d.declaration.target.clone())
                                .collect(),
                        }
                    })
                    .collect();

                ReportEntry {
                    module: meta.id.clone(),
                    requires: own_requires,
                    required_by: own_required_by,
                    capabilities,
                    resolved: graph
                        .map(|g| g.get_dependencies(&meta.id).to_vec())
                        .unwrap_or_default(),
                }
            })
            .collect();

        Self { entries }
    }

    pub fn entry(&self, module: &ModuleId) -> Option<&ReportEntry> {
        self.entries.iter().find(|e| &e.module == module)
    }
}

fn write_requirement(f: &mut fmt::Formatter<'_>, indent: &str, line: &RequirementLine) -> fmt::Result {
    write!(f, "{}-> {}", indent, line.target)?;
    match (line.weak, line.missing) {
        (true, false) => writeln!(f, " (weak)"),
        (true, true) => writeln!(f, " (weak, missing)"),
        (false, false) => writeln!(f, " (strong)"),
        (false, true) => writeln!(f, " (strong, missing)"),
    }
}

impl fmt::Display for DependencyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{}", entry.module)?;
            for line in &entry.requires {
                write_requirement(f, "  ", line)?;
            }
            for target in &entry.required_by {
                writeln!(f, "  -< {}", target)?;
            }
            for capability in &entry.capabilities {
                writeln!(f, "  : {}", capability.capability)?;
                for line in &capability.requires {
                    write_requirement(f, "    ", line)?;
                }
                for target in &capability.required_by {
                    writeln!(f, "    -< {}", target)?;
                }
            }
            for resolved in &entry.resolved {
                writeln!(f, "  = {}", resolved)?;
            }
            writeln!(f, "/")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::dependency::GraphBuilder;
    use crate::module::metadata::{CapabilityDescriptor, ModuleDescriptor};

    fn registry() -> ModuleRegistry {
        let mut registry = ModuleRegistry::new(ModuleDescriptor::declared("anchor"));
        registry
            .register_capability(
                CapabilityDescriptor::new("exporter").required_by(Target::module("hub")),
            )
            .unwrap();
        registry
            .register(ModuleDescriptor::declared("hub"))
            .unwrap()
            .register(
                ModuleDescriptor::declared("csv")
                    .implements("exporter")
                    .require(Requirement::module("hub").weak())
                    .require(Requirement::module("ghost").weak())
                    .require(Requirement::capability("cache").strong()),
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_report_text() {
        let registry = registry();
        let set = registry.candidates();
        let report = DependencyReport::build(&set, &registry.metadata(), &registry, None);

        let text = report.to_string();
        let expected = "anchor\n/\nhub\n/\ncsv\n  -> hub (weak)\n  -> ghost (weak, missing)\n  -> cache (strong, missing)\n  : exporter\n    -< hub\n/\n";
        assert_eq!(text, expected);
    }

    #[test]
    fn test_report_includes_resolved_edges() {
        let mut registry = ModuleRegistry::new(ModuleDescriptor::declared("anchor"));
        registry
            .register(ModuleDescriptor::declared("db"))
            .unwrap()
            .register(ModuleDescriptor::declared("app").require(Requirement::module("db")))
            .unwrap();

        let set = registry.candidates();
        let metadata = registry.metadata();
        let graph = GraphBuilder::build(&set, &metadata, &registry).unwrap();
        let report = DependencyReport::build(&set, &metadata, &registry, Some(&graph));

        let app = report.entry(&ModuleId::from("app")).unwrap();
        assert_eq!(app.resolved, vec![ModuleId::from("db")]);
        assert!(!app.requires[0].weak);
        assert!(report.to_string().contains("app\n  -> db (strong)\n  = db\n/"));
    }

    #[test]
    fn test_report_serializes() {
        let registry = registry();
        let report = DependencyReport::build(&registry.candidates(), &registry.metadata(), &registry, None);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["entries"][2]["module"], "csv");
        assert_eq!(json["entries"][2]["requires"][1]["missing"], true);
    }
}
