//! 工具模块
//!
//! 包含错误类型、ID 工具和日志系统。

pub mod error;
pub mod id;
pub mod logger;

// 重导出常用类型
pub use error::{error_code, BoxedError, CoreError, Result};
pub use id::{generate_boot_id, is_valid_boot_id, is_valid_module_id};
pub use logger::{fields, LogGuard, Logger, LoggerConfig, LoggerConfigBuilder, RotationStrategy, TimedSection};
