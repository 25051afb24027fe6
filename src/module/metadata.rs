//! 模块元数据定义
//!
//! 定义模块描述符及其声明式元数据：适用的启动阶段窗口、启用/禁用声明、
//! 依赖（require）与被依赖（required-by）声明。
//!
//! 描述符在每次启动尝试时构建一次，构建完成后不再修改。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::runtime::{Module, ModuleConstructor};
use crate::utils::CoreError;

/// 启动阶段
///
/// 有序枚举，决定哪些模块有资格参与本次启动。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// 未知阶段
    Unknown,
    /// 正在确定阶段
    Boot,
    /// 安装
    Install,
    /// 升级
    Upgrade,
    /// 完全运行
    Run,
}

impl Default for Stage {
    fn default() -> Self {
        Stage::Run
    }
}

impl Stage {
    /// 阶段名称
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Unknown => "unknown",
            Stage::Boot => "boot",
            Stage::Install => "install",
            Stage::Upgrade => "upgrade",
            Stage::Run => "run",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "unknown" => Ok(Stage::Unknown),
            "boot" => Ok(Stage::Boot),
            "install" => Ok(Stage::Install),
            "upgrade" => Ok(Stage::Upgrade),
            "run" => Ok(Stage::Run),
            other => Err(CoreError::InvalidConfigValue {
                key: "stage".to_string(),
                reason: format!("未知的启动阶段: {}", other),
            }),
        }
    }
}

/// 模块来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleOrigin {
    /// 普通内置模块
    #[default]
    Plain,
    /// 核心模块，隐式依赖核心锚定模块
    Core,
    /// 用户编写的模块，默认只在 Run 阶段运行
    User,
}

/// 模块标识
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(String);

impl ModuleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModuleId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ModuleId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// 能力接口标识
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityId(String);

impl CapabilityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CapabilityId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CapabilityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// 依赖声明的目标：具体模块或能力接口
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Module(ModuleId),
    Capability(CapabilityId),
}

impl Target {
    pub fn module(id: impl Into<ModuleId>) -> Self {
        Target::Module(id.into())
    }

    pub fn capability(id: impl Into<CapabilityId>) -> Self {
        Target::Capability(id.into())
    }

    pub fn is_capability(&self) -> bool {
        matches!(self, Target::Capability(_))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Module(id) => write!(f, "{}", id),
            Target::Capability(id) => write!(f, "{}", id),
        }
    }
}

/// 依赖强度
///
/// 具体模块依赖在未指定时按强依赖处理，能力接口依赖在未指定时按弱依赖处理。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strength {
    #[default]
    Unspecified,
    Weak,
    Strong,
}

impl Strength {
    pub fn from_weak(weak: Option<bool>) -> Self {
        match weak {
            None => Strength::Unspecified,
            Some(true) => Strength::Weak,
            Some(false) => Strength::Strong,
        }
    }

    pub fn is_explicitly_weak(&self) -> bool {
        *self == Strength::Weak
    }

    pub fn is_explicitly_strong(&self) -> bool {
        *self == Strength::Strong
    }
}

/// 依赖声明：声明方必须在目标之后运行
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub target: Target,
    #[serde(default)]
    pub strength: Strength,
}

impl Requirement {
    pub fn module(id: impl Into<ModuleId>) -> Self {
        Self {
            target: Target::module(id),
            strength: Strength::Unspecified,
        }
    }

    pub fn capability(id: impl Into<CapabilityId>) -> Self {
        Self {
            target: Target::capability(id),
            strength: Strength::Unspecified,
        }
    }

    /// 实际生效的依赖强度
    ///
    /// 未指定时，具体模块目标为强依赖，能力接口目标为弱依赖。
    pub fn effective_strength(&self) -> Strength {
        match (self.strength, &self.target) {
            (Strength::Unspecified, Target::Module(_)) => Strength::Strong,
            (Strength::Unspecified, Target::Capability(_)) => Strength::Weak,
            (explicit, _) => explicit,
        }
    }

    /// 设置为弱依赖
    pub fn weak(mut self) -> Self {
        self.strength = Strength::Weak;
        self
    }

    /// 设置为强依赖
    pub fn strong(mut self) -> Self {
        self.strength = Strength::Strong;
        self
    }
}

/// 被依赖声明：声明方必须在目标之前运行
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredBy {
    pub target: Target,
}

/// 启用/禁用声明
///
/// `target` 为空表示声明模块作用于自身。
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Toggle {
    #[serde(default)]
    pub target: Option<ModuleId>,
}

impl Toggle {
    pub fn this() -> Self {
        Self { target: None }
    }

    pub fn other(id: impl Into<ModuleId>) -> Self {
        Self {
            target: Some(id.into()),
        }
    }

    /// 解析声明目标，未给出目标时为声明模块自身
    pub fn resolve<'a>(&'a self, declaring: &'a ModuleId) -> &'a ModuleId {
        self.target.as_ref().unwrap_or(declaring)
    }
}

/// 启动阶段窗口
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StageWindow {
    #[serde(default)]
    pub min: Option<Stage>,
    #[serde(default)]
    pub max: Option<Stage>,
}

impl StageWindow {
    /// 有效的最小阶段
    ///
    /// 未显式声明时，用户模块为 `Run`，其他模块不受限制。
    pub fn effective_min(&self, origin: ModuleOrigin) -> Stage {
        match (self.min, origin) {
            (Some(min), _) => min,
            (None, ModuleOrigin::User) => Stage::Run,
            (None, _) => Stage::Unknown,
        }
    }

    /// 有效的最大阶段
    pub fn effective_max(&self) -> Stage {
        self.max.unwrap_or(Stage::Run)
    }

    /// 检查阶段是否落在窗口内
    pub fn contains(&self, stage: Stage, origin: ModuleOrigin) -> bool {
        self.effective_min(origin) <= stage && stage <= self.effective_max()
    }
}

/// 模块描述符
///
/// 每个候选模块一个，通过构建器一次性声明。
#[derive(Clone)]
pub struct ModuleDescriptor {
    pub id: ModuleId,
    pub capabilities: Vec<CapabilityId>,
    pub origin: ModuleOrigin,
    pub stage: StageWindow,
    pub enables: Vec<Toggle>,
    pub disables: Vec<Toggle>,
    pub requires: Vec<Requirement>,
    pub required_by: Vec<RequiredBy>,
    pub constructor: Option<ModuleConstructor>,
}

impl fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("id", &self.id)
            .field("capabilities", &self.capabilities)
            .field("origin", &self.origin)
            .field("stage", &self.stage)
            .field("enables", &self.enables)
            .field("disables", &self.disables)
            .field("requires", &self.requires)
            .field("required_by", &self.required_by)
            .field("constructible", &self.constructor.is_some())
            .finish()
    }
}

fn construct<T: Module + Default + 'static>() -> Box<dyn Module> {
    Box::new(T::default())
}

impl ModuleDescriptor {
    /// 为可无参构造的模块类型创建描述符
    pub fn of<T: Module + Default + 'static>(id: impl Into<ModuleId>) -> Self {
        let mut descriptor = Self::declared(id);
        descriptor.constructor = Some(construct::<T>);
        descriptor
    }

    /// 创建只有声明、没有构造器的描述符
    ///
    /// 通常来自模块清单，构造器稍后通过注册表绑定。
    pub fn declared(id: impl Into<ModuleId>) -> Self {
        Self {
            id: id.into(),
            capabilities: Vec::new(),
            origin: ModuleOrigin::Plain,
            stage: StageWindow::default(),
            enables: Vec::new(),
            disables: Vec::new(),
            requires: Vec::new(),
            required_by: Vec::new(),
            constructor: None,
        }
    }

    /// 标记为核心模块
    pub fn core(mut self) -> Self {
        self.origin = ModuleOrigin::Core;
        self
    }

    /// 标记为用户模块
    pub fn user(mut self) -> Self {
        self.origin = ModuleOrigin::User;
        self
    }

    pub fn origin(mut self, origin: ModuleOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// 声明实现的能力接口
    pub fn implements(mut self, capability: impl Into<CapabilityId>) -> Self {
        let capability = capability.into();
        if !self.capabilities.contains(&capability) {
            self.capabilities.push(capability);
        }
        self
    }

    pub fn min_stage(mut self, stage: Stage) -> Self {
        self.stage.min = Some(stage);
        self
    }

    pub fn max_stage(mut self, stage: Stage) -> Self {
        self.stage.max = Some(stage);
        self
    }

    /// 启用自身
    pub fn enable_self(mut self) -> Self {
        self.enables.push(Toggle::this());
        self
    }

    /// 远程启用另一个模块
    pub fn enable(mut self, id: impl Into<ModuleId>) -> Self {
        self.enables.push(Toggle::other(id));
        self
    }

    /// 默认禁用自身
    pub fn disable_self(mut self) -> Self {
        self.disables.push(Toggle::this());
        self
    }

    /// 远程禁用另一个模块
    pub fn disable(mut self, id: impl Into<ModuleId>) -> Self {
        self.disables.push(Toggle::other(id));
        self
    }

    pub fn require(mut self, requirement: Requirement) -> Self {
        self.requires.push(requirement);
        self
    }

    pub fn required_by(mut self, target: Target) -> Self {
        self.required_by.push(RequiredBy { target });
        self
    }

    pub fn with_constructor(mut self, constructor: ModuleConstructor) -> Self {
        self.constructor = Some(constructor);
        self
    }

    /// 检查描述符自身是否一致
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = vec![];

        if self.id.as_str().is_empty() {
            errors.push("模块 ID 不能为空".to_string());
        }

        if self.stage.effective_min(self.origin) > self.stage.effective_max() {
            errors.push(format!(
                "模块 {} 的阶段窗口无效: min {} > max {}",
                self.id,
                self.stage.effective_min(self.origin),
                self.stage.effective_max()
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// 能力接口描述符
///
/// 接口上的声明会折叠到每一个实现它的模块上。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityDescriptor {
    pub id: CapabilityId,
    pub requires: Vec<Requirement>,
    pub required_by: Vec<RequiredBy>,
}

impl CapabilityDescriptor {
    pub fn new(id: impl Into<CapabilityId>) -> Self {
        Self {
            id: id.into(),
            requires: Vec::new(),
            required_by: Vec::new(),
        }
    }

    pub fn require(mut self, requirement: Requirement) -> Self {
        self.requires.push(requirement);
        self
    }

    pub fn required_by(mut self, target: Target) -> Self {
        self.required_by.push(RequiredBy { target });
        self
    }
}

/// 声明来源
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclarationSource {
    /// 模块自身声明
    Own,
    /// 继承自实现的能力接口
    Capability(CapabilityId),
}

/// 带来源的声明
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declared<T> {
    pub declaration: T,
    pub source: DeclarationSource,
}

/// 折叠后的模块元数据
///
/// 由注册表生成：模块自身声明加上其实现的能力接口上的声明。
/// 接口声明排在前面，自身声明排在后面。
#[derive(Debug, Clone)]
pub struct ModuleMetadata {
    pub id: ModuleId,
    pub capabilities: Vec<CapabilityId>,
    pub origin: ModuleOrigin,
    pub stage: StageWindow,
    pub enables: Vec<Toggle>,
    pub disables: Vec<Toggle>,
    pub requires: Vec<Declared<Requirement>>,
    pub required_by: Vec<Declared<RequiredBy>>,
}

impl ModuleMetadata {
    /// 是否在给定阶段有资格运行
    pub fn is_eligible(&self, stage: Stage) -> bool {
        self.stage.contains(stage, self.origin)
    }

    /// 是否实现了指定能力接口
    pub fn implements(&self, capability: &CapabilityId) -> bool {
        self.capabilities.contains(capability)
    }
}
