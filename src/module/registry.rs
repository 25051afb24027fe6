//! 模块注册表
//!
//! 保存本次启动尝试的全部候选模块描述符和能力接口描述符，
//! 并在同一次注册过程中维护"能力接口 -> 实现模块"的成员关系。

use std::collections::HashMap;

use indexmap::IndexMap;

use super::candidates::CandidateSet;
use super::metadata::{
    CapabilityDescriptor, CapabilityId, Declared, DeclarationSource, ModuleDescriptor, ModuleId,
    ModuleMetadata, ModuleOrigin, Requirement,
};
use super::runtime::{Module, ModuleConstructor};
use crate::utils::{CoreError, Result};

/// 内置的核心能力接口
///
/// 每个核心模块都实现它，而它强依赖核心锚定模块。
pub const CORE_CAPABILITY: &str = "chips.core";

/// 默认核心锚定模块 ID
pub const DEFAULT_ANCHOR_ID: &str = "chips.anchor";

/// 默认核心锚定模块
#[derive(Debug, Default)]
pub struct CoreAnchor;

impl Module for CoreAnchor {}

/// 模块注册表
///
/// 核心锚定模块在构造时注册，因此总是候选模块之一。
#[derive(Debug, Clone)]
pub struct ModuleRegistry {
    /// 核心锚定模块
    anchor: ModuleId,
    /// 模块描述符，保持发现顺序
    modules: IndexMap<ModuleId, ModuleDescriptor>,
    /// 能力接口描述符
    capabilities: IndexMap<CapabilityId, CapabilityDescriptor>,
    /// 能力接口 -> 实现模块（发现顺序）
    membership: HashMap<CapabilityId, Vec<ModuleId>>,
}

impl ModuleRegistry {
    /// 以给定的锚定模块创建注册表
    ///
    /// # Arguments
    ///
    /// * `anchor` - 核心锚定模块描述符；它不会被阶段过滤移除，也不能被禁用
    pub fn new(anchor: ModuleDescriptor) -> Self {
        let anchor_id = anchor.id.clone();
        let core = CapabilityDescriptor::new(CORE_CAPABILITY)
            .require(Requirement::module(anchor_id.clone()).strong());

        let mut registry = Self {
            anchor: anchor_id.clone(),
            modules: IndexMap::new(),
            capabilities: IndexMap::new(),
            membership: HashMap::new(),
        };
        registry.capabilities.insert(core.id.clone(), core);
        registry.insert(anchor);

        tracing::debug!(anchor = %anchor_id, "模块注册表已创建");
        registry
    }

    /// 使用内置的 `CoreAnchor` 创建注册表
    pub fn with_default_anchor() -> Self {
        Self::new(ModuleDescriptor::of::<CoreAnchor>(DEFAULT_ANCHOR_ID))
    }

    /// 核心锚定模块 ID
    pub fn anchor(&self) -> &ModuleId {
        &self.anchor
    }

    /// 注册模块
    ///
    /// # Errors
    ///
    /// - 描述符自身不一致时返回 `CoreError::InvalidMetadata`
    /// - ID 已注册（包括锚定模块 ID）时返回 `CoreError::DuplicateModule`
    pub fn register(&mut self, descriptor: ModuleDescriptor) -> Result<&mut Self> {
        if let Err(errors) = descriptor.validate() {
            return Err(CoreError::InvalidMetadata(errors.join("; ")));
        }

        if self.modules.contains_key(&descriptor.id) {
            return Err(CoreError::DuplicateModule(descriptor.id.to_string()));
        }

        tracing::trace!(module_id = %descriptor.id, origin = ?descriptor.origin, "注册模块");
        self.insert(descriptor);
        Ok(self)
    }

    fn insert(&mut self, mut descriptor: ModuleDescriptor) {
        if descriptor.origin == ModuleOrigin::Core && descriptor.id != self.anchor {
            let core = CapabilityId::new(CORE_CAPABILITY);
            if !descriptor.capabilities.contains(&core) {
                descriptor.capabilities.push(core);
            }
        }

        for capability in &descriptor.capabilities {
            self.membership
                .entry(capability.clone())
                .or_default()
                .push(descriptor.id.clone());
        }

        self.modules.insert(descriptor.id.clone(), descriptor);
    }

    /// 注册能力接口
    pub fn register_capability(&mut self, descriptor: CapabilityDescriptor) -> Result<&mut Self> {
        if self.capabilities.contains_key(&descriptor.id) {
            return Err(CoreError::DuplicateCapability(descriptor.id.to_string()));
        }

        tracing::trace!(capability = %descriptor.id, "注册能力接口");
        self.capabilities.insert(descriptor.id.clone(), descriptor);
        Ok(self)
    }

    /// 为只有声明的模块绑定构造器
    pub fn bind_constructor(&mut self, id: &ModuleId, constructor: ModuleConstructor) -> Result<()> {
        let descriptor = self
            .modules
            .get_mut(id)
            .ok_or_else(|| CoreError::ModuleNotFound(id.to_string()))?;
        descriptor.constructor = Some(constructor);
        Ok(())
    }

    /// 实现指定能力接口的模块（发现顺序）
    pub fn implementors(&self, capability: &CapabilityId) -> &[ModuleId] {
        self.membership
            .get(capability)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn descriptor(&self, id: &ModuleId) -> Option<&ModuleDescriptor> {
        self.modules.get(id)
    }

    pub fn capability(&self, id: &CapabilityId) -> Option<&CapabilityDescriptor> {
        self.capabilities.get(id)
    }

    pub fn constructor(&self, id: &ModuleId) -> Option<ModuleConstructor> {
        self.modules.get(id).and_then(|d| d.constructor)
    }

    pub fn contains(&self, id: &ModuleId) -> bool {
        self.modules.contains_key(id)
    }

    /// 模块 ID（发现顺序）
    pub fn ids(&self) -> impl Iterator<Item = &ModuleId> {
        self.modules.keys()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// 折叠后的元数据（发现顺序）
    pub fn metadata(&self) -> IndexMap<ModuleId, ModuleMetadata> {
        self.modules
            .values()
            .map(|descriptor| (descriptor.id.clone(), self.fold(descriptor)))
            .collect()
    }

    pub fn metadata_of(&self, id: &ModuleId) -> Option<ModuleMetadata> {
        self.modules.get(id).map(|descriptor| self.fold(descriptor))
    }

    /// 初始候选集合
    pub fn candidates(&self) -> CandidateSet {
        CandidateSet::new(self.anchor.clone(), self.modules.keys().cloned())
    }

    fn fold(&self, descriptor: &ModuleDescriptor) -> ModuleMetadata {
        let mut requires = Vec::new();
        let mut required_by = Vec::new();

        // 先接口声明，后自身声明
        for capability in &descriptor.capabilities {
            let Some(declared) = self.capabilities.get(capability) else {
                continue;
            };
            let source = DeclarationSource::Capability(capability.clone());
            requires.extend(declared.requires.iter().cloned().map(|declaration| Declared {
                declaration,
                source: source.clone(),
            }));
            required_by.extend(declared.required_by.iter().cloned().map(|declaration| Declared {
                declaration,
                source: source.clone(),
            }));
        }

        requires.extend(descriptor.requires.iter().cloned().map(|declaration| Declared {
            declaration,
            source: DeclarationSource::Own,
        }));
        required_by.extend(descriptor.required_by.iter().cloned().map(|declaration| Declared {
            declaration,
            source: DeclarationSource::Own,
        }));

        ModuleMetadata {
            id: descriptor.id.clone(),
            capabilities: descriptor.capabilities.clone(),
            origin: descriptor.origin,
            stage: descriptor.stage,
            enables: descriptor.enables.clone(),
            disables: descriptor.disables.clone(),
            requires,
            required_by,
        }
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::with_default_anchor()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::metadata::{Target, Stage};

    #[derive(Default)]
    struct Noop;

    impl Module for Noop {}

    #[test]
    fn test_anchor_always_registered() {
        let registry = ModuleRegistry::with_default_anchor();

        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&ModuleId::from(DEFAULT_ANCHOR_ID)));
        assert!(registry.capability(&CapabilityId::from(CORE_CAPABILITY)).is_some());
        assert_eq!(registry.candidates().len(), 1);
    }

    #[test]
    fn test_register_duplicate() {
        let mut registry = ModuleRegistry::with_default_anchor();
        registry.register(ModuleDescriptor::of::<Noop>("a")).unwrap();

        let err = registry.register(ModuleDescriptor::of::<Noop>("a")).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateModule(_)));

        let err = registry
            .register(ModuleDescriptor::of::<Noop>(DEFAULT_ANCHOR_ID))
            .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateModule(_)));

        let err = registry
            .register_capability(CapabilityDescriptor::new(CORE_CAPABILITY))
            .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateCapability(_)));
    }

    #[test]
    fn test_register_invalid_window() {
        let mut registry = ModuleRegistry::with_default_anchor();
        let err = registry
            .register(
                ModuleDescriptor::of::<Noop>("late")
                    .min_stage(Stage::Run)
                    .max_stage(Stage::Boot),
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidMetadata(_)));
    }

    #[test]
    fn test_membership_in_discovery_order() {
        let mut registry = ModuleRegistry::with_default_anchor();
        registry
            .register(ModuleDescriptor::of::<Noop>("b").implements("storage"))
            .unwrap()
            .register(ModuleDescriptor::of::<Noop>("a").implements("storage"))
            .unwrap()
            .register(ModuleDescriptor::of::<Noop>("c"))
            .unwrap();

        let storage = CapabilityId::from("storage");
        let ids: Vec<_> = registry.implementors(&storage).iter().map(|m| m.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert!(registry.implementors(&CapabilityId::from("none")).is_empty());
    }

    #[test]
    fn test_core_modules_depend_on_anchor() {
        let mut registry = ModuleRegistry::with_default_anchor();
        registry.register(ModuleDescriptor::of::<Noop>("kernel").core()).unwrap();

        let metadata = registry.metadata_of(&ModuleId::from("kernel")).unwrap();
        assert!(metadata.implements(&CapabilityId::from(CORE_CAPABILITY)));
        assert_eq!(
            metadata.requires[0].declaration.target,
            Target::module(DEFAULT_ANCHOR_ID)
        );
        assert_eq!(
            metadata.requires[0].source,
            DeclarationSource::Capability(CapabilityId::from(CORE_CAPABILITY))
        );
    }

    #[test]
    fn test_capability_declarations_folded_first() {
        let mut registry = ModuleRegistry::with_default_anchor();
        registry
            .register_capability(
                CapabilityDescriptor::new("exporter").require(Requirement::module("storage")),
            )
            .unwrap();
        registry
            .register(
                ModuleDescriptor::of::<Noop>("csv")
                    .implements("exporter")
                    .require(Requirement::module("format")),
            )
            .unwrap();

        let metadata = registry.metadata();
        let csv = &metadata[&ModuleId::from("csv")];
        let targets: Vec<_> = csv.requires.iter().map(|r| r.declaration.target.to_string()).collect();
        assert_eq!(targets, vec!["storage", "format"]);
        assert_eq!(csv.requires[1].source, DeclarationSource::Own);
    }

    #[test]
    fn test_bind_constructor() {
        let mut registry = ModuleRegistry::with_default_anchor();
        registry.register(ModuleDescriptor::declared("late_bound")).unwrap();

        let id = ModuleId::from("late_bound");
        assert!(registry.constructor(&id).is_none());

        fn build() -> Box<dyn Module> {
            Box::new(Noop)
        }
        registry.bind_constructor(&id, build).unwrap();
        assert!(registry.constructor(&id).is_some());

        let err = registry.bind_constructor(&ModuleId::from("ghost"), build).unwrap_err();
        assert!(matches!(err, CoreError::ModuleNotFound(_)));
    }
}
