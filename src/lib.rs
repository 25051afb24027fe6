//! # Chips Boot - 模块组合与启动编排引擎
//!
//! 从声明式的模块元数据出发，决定本次启动运行哪些模块、以什么顺序运行，
//! 并驱动它们经历 Compose → Initialize → Running → Terminate：
//!
//! - **注册表**: 候选模块与能力接口的描述符，核心锚定模块总是候选之一
//! - **阶段过滤**: 按启动阶段窗口筛选模块
//! - **启用/禁用解析**: 按权重解析本地、远程与全局覆盖声明
//! - **依赖图与排序**: 能力接口展开为存活的实现模块，深度优先稳定排序
//! - **生命周期编排**: 单一服务作用域的初始化，严格反序的终止
//!
//! ## 快速开始
//!
//! ```rust
//! use chips_boot::{BootManager, Composition, ModuleDescriptor, ModuleRegistry, Requirement, Stage};
//! use chips_boot::module::Module;
//!
//! #[derive(Default)]
//! struct Database;
//! impl Module for Database {}
//!
//! #[derive(Default)]
//! struct Web;
//! impl Module for Web {}
//!
//! let mut registry = ModuleRegistry::with_default_anchor();
//! registry
//!     .register(ModuleDescriptor::of::<Web>("web").require(Requirement::module("db")))?
//!     .register(ModuleDescriptor::of::<Database>("db"))?;
//!
//! let mut manager = BootManager::default();
//! manager.boot(&registry, Stage::Run, &mut Composition::new(Stage::Run))?;
//! assert_eq!(manager.sequence().last().map(|m| m.as_str()), Some("web"));
//! manager.terminate()?;
//! # Ok::<(), chips_boot::CoreError>(())
//! ```
//!
//! ## 模块结构
//!
//! - `module` - 启动管线与生命周期
//! - `services` - 组合上下文与服务解析
//! - `core` - 引擎配置
//! - `utils` - 错误类型、日志与标识符

#![warn(rustdoc::missing_crate_level_docs)]

pub mod core;
pub mod module;
pub mod services;
pub mod utils;

// 重导出常用类型，方便使用
pub use module::{
    BootManager, BootPlan, BootPlanner, BootState, CapabilityDescriptor, DependencyReport,
    GlobalOverrides, ManifestParser, Module, ModuleDescriptor, ModuleId, ModuleRegistry,
    Requirement, Stage, Target, TerminatePolicy,
};
pub use services::{Composition, Lifetime, Resolve, ResolveExt, ServiceContainer, ServiceResolver};

pub use utils::{error_code, generate_boot_id, CoreError, Result};
pub use utils::logger::{fields, LogGuard, Logger, LoggerConfig, LoggerConfigBuilder, RotationStrategy};

pub use core::config::{BootConfig, BootConfigBuilder, BootSettings, LogConfig};

/// 库版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
