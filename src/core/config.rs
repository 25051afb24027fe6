//! 引擎配置
//!
//! 定义引擎的配置结构和加载逻辑。

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::module::enablement::GlobalOverrides;
use crate::module::lifecycle::TerminatePolicy;
use crate::module::metadata::{ModuleId, Stage};
use crate::utils::{is_valid_module_id, CoreError, Result};

/// 日志配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否输出到文件
    #[serde(default)]
    pub file_output: bool,

    /// 日志文件目录
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// 是否输出 JSON 格式
    #[serde(default)]
    pub json_format: bool,

    /// 日志轮转策略
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_output: false,
            log_dir: None,
            json_format: false,
            rotation: default_rotation(),
        }
    }
}

/// 启动设置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootSettings {
    /// 启动阶段
    #[serde(default)]
    pub stage: Stage,

    /// 单个模块耗时超过该值（毫秒）才记录
    #[serde(default = "default_log_threshold_ms")]
    pub log_threshold_ms: u64,

    /// 终止阶段的失败处理策略
    #[serde(default)]
    pub terminate_policy: TerminatePolicy,
}

fn default_log_threshold_ms() -> u64 {
    100
}

impl Default for BootSettings {
    fn default() -> Self {
        Self {
            stage: Stage::default(),
            log_threshold_ms: default_log_threshold_ms(),
            terminate_policy: TerminatePolicy::default(),
        }
    }
}

impl BootSettings {
    pub fn log_threshold(&self) -> Duration {
        Duration::from_millis(self.log_threshold_ms)
    }
}

/// 全局启用/禁用覆盖项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideEntry {
    pub module: ModuleId,
    pub enabled: bool,
}

/// 引擎配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BootConfig {
    /// 配置文件路径
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    /// 日志配置
    #[serde(default)]
    pub logging: LogConfig,

    /// 启动设置
    #[serde(default)]
    pub boot: BootSettings,

    /// 全局覆盖（按顺序处理，优先于模块声明）
    #[serde(default)]
    pub overrides: Vec<OverrideEntry>,

    /// 模块清单文件
    #[serde(default)]
    pub manifests: Vec<PathBuf>,

    /// 是否为开发模式
    #[serde(default)]
    pub dev_mode: bool,
}

impl BootConfig {
    /// 创建配置构建器
    pub fn builder() -> BootConfigBuilder {
        BootConfigBuilder::new()
    }

    /// 从文件加载配置
    ///
    /// `.json` 扩展名按 JSON 解析，其余按 YAML 解析。
    pub async fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| CoreError::ConfigLoadFailed(format!("{}: {}", path.display(), e)))?;

        let mut config: BootConfig = if path.extension().map(|e| e == "json").unwrap_or(false) {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };

        config.config_path = Some(path);
        config.validate()?;
        Ok(config)
    }

    /// 检查配置值
    pub fn validate(&self) -> Result<()> {
        const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
        if !LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(CoreError::InvalidConfigValue {
                key: "logging.level".to_string(),
                reason: format!("未知的日志级别: {}", self.logging.level),
            });
        }

        if self.logging.file_output && self.logging.log_dir.is_none() {
            return Err(CoreError::InvalidConfigValue {
                key: "logging.log_dir".to_string(),
                reason: "启用文件日志时必须指定目录".to_string(),
            });
        }

        if let Some(entry) = self
            .overrides
            .iter()
            .find(|entry| !is_valid_module_id(entry.module.as_str()))
        {
            return Err(CoreError::InvalidConfigValue {
                key: "overrides".to_string(),
                reason: format!("无效的模块 ID: {}", entry.module),
            });
        }

        Ok(())
    }

    /// 全局覆盖
    pub fn global_overrides(&self) -> GlobalOverrides {
        self.overrides
            .iter()
            .map(|entry| (entry.module.clone(), entry.enabled))
            .collect()
    }

    /// 模块清单路径
    ///
    /// 相对路径以配置文件所在目录为基准。
    pub fn manifest_paths(&self) -> Vec<PathBuf> {
        let base = self.config_path.as_deref().and_then(Path::parent);
        self.manifests
            .iter()
            .map(|path| match base {
                Some(dir) if path.is_relative() => dir.join(path),
                _ => path.clone(),
            })
            .collect()
    }

    /// 合并另一个配置（用于覆盖）
    pub fn merge(&mut self, other: BootConfig) {
        let manifests = other.manifest_paths();
        // 只覆盖非默认值的配置
        if other.logging.level != default_log_level() {
            self.logging.level = other.logging.level;
        }
        if other.logging.file_output {
            self.logging.file_output = true;
            self.logging.log_dir = other.logging.log_dir;
        }
        if other.logging.json_format {
            self.logging.json_format = true;
        }
        if other.boot.stage != Stage::default() {
            self.boot.stage = other.boot.stage;
        }
        if other.boot.log_threshold_ms != default_log_threshold_ms() {
            self.boot.log_threshold_ms = other.boot.log_threshold_ms;
        }
        if other.boot.terminate_policy != TerminatePolicy::default() {
            self.boot.terminate_policy = other.boot.terminate_policy;
        }
        // 覆盖项追加在后面，因此后加载的配置优先
        self.overrides.extend(other.overrides);
        self.manifests.extend(manifests);
        if other.dev_mode {
            self.dev_mode = true;
        }
    }
}

/// 配置构建器
#[derive(Debug, Default)]
pub struct BootConfigBuilder {
    config: BootConfig,
}

impl BootConfigBuilder {
    /// 创建新的构建器
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置配置文件路径
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.config_path = Some(path.into());
        self
    }

    /// 设置日志级别
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// 启用文件日志
    pub fn file_logging(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.config.logging.file_output = true;
        self.config.logging.log_dir = Some(log_dir.into());
        self
    }

    /// 启用 JSON 格式日志
    pub fn json_logging(mut self) -> Self {
        self.config.logging.json_format = true;
        self
    }

    /// 设置启动阶段
    pub fn stage(mut self, stage: Stage) -> Self {
        self.config.boot.stage = stage;
        self
    }

    /// 设置模块耗时记录阈值
    pub fn log_threshold_ms(mut self, ms: u64) -> Self {
        self.config.boot.log_threshold_ms = ms;
        self
    }

    pub fn terminate_policy(mut self, policy: TerminatePolicy) -> Self {
        self.config.boot.terminate_policy = policy;
        self
    }

    /// 全局启用模块
    pub fn enable(mut self, module: impl Into<ModuleId>) -> Self {
        self.config.overrides.push(OverrideEntry {
            module: module.into(),
            enabled: true,
        });
        self
    }

    /// 全局禁用模块
    pub fn disable(mut self, module: impl Into<ModuleId>) -> Self {
        self.config.overrides.push(OverrideEntry {
            module: module.into(),
            enabled: false,
        });
        self
    }

    /// 添加模块清单
    pub fn manifest(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.manifests.push(path.into());
        self
    }

    /// 启用开发模式
    pub fn dev_mode(mut self) -> Self {
        self.config.dev_mode = true;
        self
    }

    /// 构建配置
    pub fn build(self) -> BootConfig {
        self.config
    }
}
