//! 启动引擎错误类型定义
//!
//! 本模块定义了引擎中使用的所有错误类型。

use thiserror::Error;

use crate::module::runtime::LifecyclePhase;

/// 模块代码抛出的错误（装箱保存，保留错误链）
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// 启动引擎核心错误类型
#[derive(Error, Debug)]
pub enum CoreError {
    // ==================== 注册表错误 ====================

    /// 模块未找到
    #[error("模块未找到: '{0}'")]
    ModuleNotFound(String),

    /// 模块重复注册
    #[error("模块重复注册: '{0}'")]
    DuplicateModule(String),

    /// 能力接口重复注册
    #[error("能力接口重复注册: '{0}'")]
    DuplicateCapability(String),

    /// 无效的模块元数据
    #[error("无效的模块元数据: {0}")]
    InvalidMetadata(String),

    /// 无效的模块清单
    #[error("无效的模块清单: {0}")]
    InvalidManifest(String),

    // ==================== 组合配置错误 ====================

    /// 尝试禁用核心锚定模块
    #[error("不能禁用核心锚定模块: '{0}'")]
    AnchorDisabled(String),

    /// 依赖断裂
    #[error("模块依赖断裂: {module} -> {target}")]
    BrokenDependency {
        module: String,
        target: String,
    },

    /// 循环依赖
    #[error("检测到循环依赖: {}", .cycle.join(" -> "))]
    CircularDependency {
        /// 闭合的循环路径
        cycle: Vec<String>,
        /// 完整的依赖诊断报告
        report: String,
    },

    /// 模块没有可用的无参构造器
    #[error("模块缺少无参构造器: '{0}'")]
    MissingConstructor(String),

    // ==================== 生命周期错误 ====================

    /// 重复启动
    #[error("启动流程只能执行一次")]
    AlreadyBooted,

    /// 初始化参数无法解析
    #[error("无法为模块 '{module}' 解析参数类型 {parameter}")]
    UnresolvedParameter {
        module: String,
        parameter: String,
        #[source]
        source: Option<BoxedError>,
    },

    /// 模块代码执行失败
    #[error("模块 '{module}' 在 {phase} 阶段失败: {source}")]
    ModuleFailed {
        module: String,
        phase: LifecyclePhase,
        #[source]
        source: BoxedError,
    },

    /// 终止阶段有模块失败
    #[error("终止阶段有模块失败: {failures:?}")]
    TerminateFailed {
        failures: Vec<String>,
    },

    // ==================== 服务解析错误 ====================

    /// 服务未注册
    #[error("服务未注册: {0}")]
    ServiceNotRegistered(String),

    /// 作用域服务只能在作用域内解析
    #[error("作用域服务必须在作用域内解析: {0}")]
    ScopeRequired(String),

    /// 服务工厂执行失败
    #[error("服务解析失败: {service} - {reason}")]
    ServiceResolutionFailed {
        service: String,
        reason: String,
    },

    // ==================== 配置错误 ====================

    /// 配置加载失败
    #[error("配置加载失败: {0}")]
    ConfigLoadFailed(String),

    /// 配置值无效
    #[error("配置值无效: '{key}' - {reason}")]
    InvalidConfigValue {
        key: String,
        reason: String,
    },

    // ==================== IO 和序列化错误 ====================

    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 序列化/反序列化错误
    #[error("JSON 错误: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML 序列化/反序列化错误
    #[error("YAML 错误: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // ==================== 通用错误 ====================

    /// 初始化失败
    #[error("初始化失败: {0}")]
    InitFailed(String),
}

/// 引擎操作结果类型别名
pub type Result<T> = std::result::Result<T, CoreError>;

/// 错误码常量
pub mod error_code {
    // 注册表错误 (REGISTRY-xxx)
    pub const REGISTRY_MODULE_NOT_FOUND: &str = "REGISTRY-001";
    pub const REGISTRY_DUPLICATE: &str = "REGISTRY-002";
    pub const REGISTRY_INVALID_METADATA: &str = "REGISTRY-003";

    // 启动错误 (BOOT-xxx)
    pub const BOOT_ANCHOR_DISABLED: &str = "BOOT-001";
    pub const BOOT_BROKEN_DEPENDENCY: &str = "BOOT-002";
    pub const BOOT_CIRCULAR_DEPENDENCY: &str = "BOOT-003";
    pub const BOOT_MISSING_CONSTRUCTOR: &str = "BOOT-004";
    pub const BOOT_ALREADY_BOOTED: &str = "BOOT-005";
    pub const BOOT_MODULE_FAILED: &str = "BOOT-006";
    pub const BOOT_TERMINATE_FAILED: &str = "BOOT-007";

    // 服务错误 (SERVICE-xxx)
    pub const SERVICE_UNRESOLVED_PARAMETER: &str = "SERVICE-001";
    pub const SERVICE_NOT_REGISTERED: &str = "SERVICE-002";
    pub const SERVICE_SCOPE_REQUIRED: &str = "SERVICE-003";
    pub const SERVICE_FACTORY_FAILED: &str = "SERVICE-004";

    // 配置错误 (CONFIG-xxx)
    pub const CONFIG_LOAD_FAILED: &str = "CONFIG-001";
    pub const CONFIG_INVALID_VALUE: &str = "CONFIG-002";
    pub const CONFIG_PARSE_FAILED: &str = "CONFIG-003";

    // 通用错误
    pub const IO_ERROR: &str = "IO-001";
    pub const INIT_FAILED: &str = "INIT-001";
}

impl CoreError {
    /// 获取错误码
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::ModuleNotFound(_) => error_code::REGISTRY_MODULE_NOT_FOUND,
            CoreError::DuplicateModule(_) | CoreError::DuplicateCapability(_) => {
                error_code::REGISTRY_DUPLICATE
            }
            CoreError::InvalidMetadata(_) | CoreError::InvalidManifest(_) => {
                error_code::REGISTRY_INVALID_METADATA
            }
            CoreError::AnchorDisabled(_) => error_code::BOOT_ANCHOR_DISABLED,
            CoreError::BrokenDependency { .. } => error_code::BOOT_BROKEN_DEPENDENCY,
            CoreError::CircularDependency { .. } => error_code::BOOT_CIRCULAR_DEPENDENCY,
            CoreError::MissingConstructor(_) => error_code::BOOT_MISSING_CONSTRUCTOR,
            CoreError::AlreadyBooted => error_code::BOOT_ALREADY_BOOTED,
            CoreError::ModuleFailed { .. } => error_code::BOOT_MODULE_FAILED,
            CoreError::TerminateFailed { .. } => error_code::BOOT_TERMINATE_FAILED,
            CoreError::UnresolvedParameter { .. } => error_code::SERVICE_UNRESOLVED_PARAMETER,
            CoreError::ServiceNotRegistered(_) => error_code::SERVICE_NOT_REGISTERED,
            CoreError::ScopeRequired(_) => error_code::SERVICE_SCOPE_REQUIRED,
            CoreError::ServiceResolutionFailed { .. } => error_code::SERVICE_FACTORY_FAILED,
            CoreError::ConfigLoadFailed(_) => error_code::CONFIG_LOAD_FAILED,
            CoreError::InvalidConfigValue { .. } => error_code::CONFIG_INVALID_VALUE,
            CoreError::Json(_) | CoreError::Yaml(_) => error_code::CONFIG_PARSE_FAILED,
            CoreError::Io(_) => error_code::IO_ERROR,
            CoreError::InitFailed(_) => error_code::INIT_FAILED,
        }
    }

    /// 是否为组合配置错误
    ///
    /// 这类错误在任何模块执行 Compose 之前就会被检测到。
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            CoreError::AnchorDisabled(_)
                | CoreError::BrokenDependency { .. }
                | CoreError::CircularDependency { .. }
                | CoreError::MissingConstructor(_)
                | CoreError::DuplicateModule(_)
                | CoreError::DuplicateCapability(_)
                | CoreError::InvalidMetadata(_)
                | CoreError::InvalidManifest(_)
        )
    }

    /// 循环依赖错误附带的诊断报告
    pub fn report(&self) -> Option<&str> {
        match self {
            CoreError::CircularDependency { report, .. } => Some(report),
            _ => None,
        }
    }
}
