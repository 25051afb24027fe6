//! 模块清单解析器
//!
//! 负责从 YAML/JSON 清单解析锚定模块、能力接口和模块声明，并生成注册表。
//!
//! ```yaml
//! capabilities:
//!   - id: app.storage
//!     required_by:
//!       - capability: app.web
//! modules:
//!   - id: app.db
//!     origin: core
//!     implements: [app.storage]
//!   - id: app.web
//!     implements: [app.web]
//!     requires:
//!       - module: app.cache
//!         weak: true
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::metadata::{
    CapabilityDescriptor, ModuleDescriptor, ModuleOrigin, Requirement, Stage, Strength, Target,
};
use super::registry::{ModuleRegistry, CORE_CAPABILITY};
use crate::utils::{is_valid_module_id, CoreError, Result};

/// 清单格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    Yaml,
    Json,
}

impl ManifestFormat {
    /// 按扩展名推断，`.json` 以外都视为 YAML
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => ManifestFormat::Json,
            _ => ManifestFormat::Yaml,
        }
    }
}

/// 依赖声明
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,
    /// 未给出时：具体模块为强依赖，能力接口为弱依赖
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weak: Option<bool>,
}

/// 被依赖声明
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredBySpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,
}

/// 阶段窗口
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSpec {
    #[serde(default)]
    pub min: Option<Stage>,
    #[serde(default)]
    pub max: Option<Stage>,
}

/// 模块声明
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSpec {
    pub id: String,
    #[serde(default)]
    pub origin: ModuleOrigin,
    #[serde(default)]
    pub implements: Vec<String>,
    #[serde(default)]
    pub stage: StageSpec,
    #[serde(default)]
    pub enable_self: bool,
    #[serde(default)]
    pub disable_self: bool,
    #[serde(default)]
    pub enables: Vec<String>,
    #[serde(default)]
    pub disables: Vec<String>,
    #[serde(default)]
    pub requires: Vec<RequirementSpec>,
    #[serde(default)]
    pub required_by: Vec<RequiredBySpec>,
}

/// 能力接口声明
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySpec {
    pub id: String,
    #[serde(default)]
    pub requires: Vec<RequirementSpec>,
    #[serde(default)]
    pub required_by: Vec<RequiredBySpec>,
}

/// 模块清单
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// 核心锚定模块；省略时使用内置锚定模块
    #[serde(default)]
    pub anchor: Option<ModuleSpec>,
    #[serde(default)]
    pub capabilities: Vec<CapabilitySpec>,
    #[serde(default)]
    pub modules: Vec<ModuleSpec>,
}

impl Manifest {
    /// 并入另一份清单
    ///
    /// 两份清单都声明了锚定模块时返回 `CoreError::InvalidManifest`。
    pub fn merge(&mut self, other: Manifest) -> Result<()> {
        if let Some(anchor) = other.anchor {
            if let Some(existing) = &self.anchor {
                return Err(CoreError::InvalidManifest(format!(
                    "锚定模块重复声明: '{}' 与 '{}'",
                    existing.id, anchor.id
                )));
            }
            self.anchor = Some(anchor);
        }
        self.capabilities.extend(other.capabilities);
        self.modules.extend(other.modules);
        Ok(())
    }

    /// 生成只含声明的注册表
    ///
    /// 模块构造器需要由宿主通过 `ModuleRegistry::bind_constructor` 绑定；
    /// 省略锚定模块时使用可直接构造的内置锚定模块。
    pub fn into_registry(self) -> Result<ModuleRegistry> {
        let mut registry = match self.anchor {
            Some(anchor) => ModuleRegistry::new(anchor.into_descriptor()?),
            None => ModuleRegistry::with_default_anchor(),
        };

        for capability in self.capabilities {
            registry.register_capability(capability.into_descriptor()?)?;
        }
        for module in self.modules {
            registry.register(module.into_descriptor()?)?;
        }

        tracing::debug!(modules = registry.len(), "清单注册表已生成");
        Ok(registry)
    }

    /// 全部模块 ID（含锚定模块）
    pub fn module_ids(&self) -> impl Iterator<Item = &str> {
        self.anchor
            .iter()
            .chain(self.modules.iter())
            .map(|m| m.id.as_str())
    }
}

impl RequirementSpec {
    fn to_requirement(&self) -> Result<Requirement> {
        let target = target_of(self.module.as_deref(), self.capability.as_deref())?;
        Ok(Requirement {
            target,
            strength: Strength::from_weak(self.weak),
        })
    }
}

impl RequiredBySpec {
    fn to_target(&self) -> Result<Target> {
        target_of(self.module.as_deref(), self.capability.as_deref())
    }
}

fn target_of(module: Option<&str>, capability: Option<&str>) -> Result<Target> {
    match (module, capability) {
        (Some(module), None) => Ok(Target::module(module)),
        (None, Some(capability)) => Ok(Target::capability(capability)),
        _ => Err(CoreError::InvalidManifest(
            "依赖声明必须且只能指定 module 或 capability 之一".to_string(),
        )),
    }
}

impl ModuleSpec {
    fn into_descriptor(self) -> Result<ModuleDescriptor> {
        let mut descriptor = ModuleDescriptor::declared(self.id).origin(self.origin);
        descriptor.stage.min = self.stage.min;
        descriptor.stage.max = self.stage.max;

        for capability in self.implements {
            descriptor = descriptor.implements(capability);
        }
        if self.enable_self {
            descriptor = descriptor.enable_self();
        }
        for id in self.enables {
            descriptor = descriptor.enable(id);
        }
        if self.disable_self {
            descriptor = descriptor.disable_self();
        }
        for id in self.disables {
            descriptor = descriptor.disable(id);
        }
        for requirement in &self.requires {
            descriptor = descriptor.require(requirement.to_requirement()?);
        }
        for required_by in &self.required_by {
            descriptor = descriptor.required_by(required_by.to_target()?);
        }
        Ok(descriptor)
    }
}

impl CapabilitySpec {
    fn into_descriptor(self) -> Result<CapabilityDescriptor> {
        let mut descriptor = CapabilityDescriptor::new(self.id);
        for requirement in &self.requires {
            descriptor = descriptor.require(requirement.to_requirement()?);
        }
        for required_by in &self.required_by {
            descriptor = descriptor.required_by(required_by.to_target()?);
        }
        Ok(descriptor)
    }
}

/// 模块清单解析器
#[derive(Debug, Clone, Default)]
pub struct ManifestParser;

impl ManifestParser {
    /// 从文件解析清单
    ///
    /// # Errors
    ///
    /// - 文件不存在或无法读取时返回 IO 错误
    /// - 内容格式错误时返回 YAML/JSON 错误
    /// - 验证失败时返回 `InvalidManifest` 错误
    pub async fn parse_file(path: &Path) -> Result<Manifest> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse_string(&content, ManifestFormat::from_path(path))
    }

    /// 从文件同步解析清单
    pub fn parse_file_sync(path: &Path) -> Result<Manifest> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_string(&content, ManifestFormat::from_path(path))
    }

    /// 按顺序解析多个清单文件并合并
    ///
    /// 验证在合并之后进行，能力接口可以在另一个文件中声明。
    pub async fn parse_files(paths: &[PathBuf]) -> Result<Manifest> {
        let mut merged = Manifest::default();
        for path in paths {
            let content = tokio::fs::read_to_string(path).await?;
            merged.merge(Self::deserialize(&content, ManifestFormat::from_path(path))?)?;
        }
        Self::validate(&merged)?;
        Ok(merged)
    }

    /// 从字符串解析清单
    pub fn parse_string(content: &str, format: ManifestFormat) -> Result<Manifest> {
        let manifest = Self::deserialize(content, format)?;
        Self::validate(&manifest)?;
        Ok(manifest)
    }

    fn deserialize(content: &str, format: ManifestFormat) -> Result<Manifest> {
        Ok(match format {
            ManifestFormat::Yaml => serde_yaml::from_str(content)?,
            ManifestFormat::Json => serde_json::from_str(content)?,
        })
    }

    /// 验证清单
    ///
    /// 一次收集全部问题：
    /// - 模块与能力接口 ID 格式
    /// - 阶段窗口 min ≤ max
    /// - `implements` 引用的能力接口必须已声明
    /// - 依赖声明的目标必须唯一
    pub fn validate(manifest: &Manifest) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        let declared: HashSet<&str> = manifest
            .capabilities
            .iter()
            .map(|c| c.id.as_str())
            .chain(std::iter::once(CORE_CAPABILITY))
            .collect();

        let mut seen = HashSet::new();
        for id in manifest.module_ids() {
            if !seen.insert(id) {
                errors.push(format!("模块 ID '{}' 重复", id));
            }
        }

        for capability in &manifest.capabilities {
            if !is_valid_module_id(&capability.id) {
                errors.push(format!("能力接口 ID '{}' 格式无效", capability.id));
            }
            Self::check_targets(&capability.id, &capability.requires, &capability.required_by, &mut errors);
        }

        for module in manifest.anchor.iter().chain(manifest.modules.iter()) {
            if !is_valid_module_id(&module.id) {
                errors.push(format!("模块 ID '{}' 格式无效", module.id));
            }

            if let (Some(min), Some(max)) = (module.stage.min, module.stage.max) {
                if min > max {
                    errors.push(format!("模块 '{}' 的阶段窗口无效: {} > {}", module.id, min, max));
                }
            }

            for capability in &module.implements {
                if !declared.contains(capability.as_str()) {
                    errors.push(format!(
                        "模块 '{}' 实现了未声明的能力接口 '{}'",
                        module.id, capability
                    ));
                }
            }

            for id in module.enables.iter().chain(module.disables.iter()) {
                if !is_valid_module_id(id) {
                    errors.push(format!("模块 '{}' 的启用/禁用目标 '{}' 格式无效", module.id, id));
                }
            }

            Self::check_targets(&module.id, &module.requires, &module.required_by, &mut errors);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(CoreError::InvalidManifest(errors.join("; ")))
        }
    }

    fn check_targets(
        owner: &str,
        requires: &[RequirementSpec],
        required_by: &[RequiredBySpec],
        errors: &mut Vec<String>,
    ) {
        let targets = requires
            .iter()
            .map(|r| (r.module.as_deref(), r.capability.as_deref()))
            .chain(required_by.iter().map(|r| (r.module.as_deref(), r.capability.as_deref())));

        for target in targets {
            match target {
                (Some(id), None) | (None, Some(id)) => {
                    if !is_valid_module_id(id) {
                        errors.push(format!("'{}' 的依赖目标 '{}' 格式无效", owner, id));
                    }
                }
                _ => errors.push(format!(
                    "'{}' 的依赖声明必须且只能指定 module 或 capability 之一",
                    owner
                )),
            }
        }
    }
}
