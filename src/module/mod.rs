//! 模块组合与启动编排
//!
//! 包含启动管线的全部组件：
//! - 模块描述符与元数据
//! - 注册表与候选集合
//! - 阶段过滤、启用/禁用解析
//! - 依赖图构建、拓扑排序与诊断报告
//! - 生命周期编排与启动管理器

pub mod candidates;
pub mod dependency;
pub mod enablement;
pub mod lifecycle;
pub mod manager;
pub mod metadata;
pub mod parser;
pub mod planner;
pub mod registry;
pub mod report;
pub mod runtime;
pub mod stage;

// 重导出常用类型
pub use candidates::CandidateSet;
pub use dependency::{DependencyGraph, GraphBuilder};
pub use enablement::{EnablementOutcome, EnablementResolver, GlobalOverrides, ToggleWeight};
pub use lifecycle::{LifecycleManager, TerminatePolicy};
pub use manager::{BootManager, BootState, BootSummary};
pub use metadata::{
    CapabilityDescriptor, CapabilityId, ModuleDescriptor, ModuleId, ModuleMetadata, ModuleOrigin,
    RequiredBy, Requirement, Stage, StageWindow, Strength, Target, Toggle,
};
pub use parser::{Manifest, ManifestFormat, ManifestParser};
pub use planner::{BootPlan, BootPlanner};
pub use registry::{CoreAnchor, ModuleRegistry, CORE_CAPABILITY, DEFAULT_ANCHOR_ID};
pub use report::DependencyReport;
pub use runtime::{Arguments, Initializer, LifecyclePhase, Module, ModuleConstructor, ModuleInstance};
pub use stage::StageFilter;
