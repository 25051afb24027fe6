//! 启动管理器
//!
//! 整合启动计划与生命周期编排，提供一次性的启动入口。

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, info_span, instrument, warn};

use super::enablement::GlobalOverrides;
use super::lifecycle::{LifecycleManager, TerminatePolicy};
use super::metadata::{ModuleId, Stage};
use super::planner::{BootPlan, BootPlanner};
use super::registry::ModuleRegistry;
use super::runtime::ModuleInstance;
use crate::core::config::{BootConfig, BootSettings};
use crate::services::{Composition, ServiceResolver};
use crate::utils::{generate_boot_id, CoreError, Result};

/// 启动状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BootState {
    NotBooted,
    Composing,
    Initializing,
    Running,
    Terminated,
    /// 启动中止，不可再次启动
    Failed,
}

impl BootState {
    /// 是否已经尝试过启动
    pub fn has_booted(&self) -> bool {
        !matches!(self, BootState::NotBooted)
    }
}

/// 启动摘要
#[derive(Debug, Clone, Serialize)]
pub struct BootSummary {
    pub boot_id: String,
    pub stage: Stage,
    pub sequence: Vec<ModuleId>,
    pub booted_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

/// 启动管理器
///
/// 每个管理器只能启动一次：
/// `NotBooted → Composing → Initializing → Running → Terminated`，
/// 任一阶段失败进入 `Failed`。
pub struct BootManager {
    settings: BootSettings,
    overrides: GlobalOverrides,
    lifecycle: LifecycleManager,
    state: BootState,
    plan: Option<BootPlan>,
    instances: Vec<ModuleInstance>,
    resolver: Option<Box<dyn ServiceResolver>>,
    summary: Option<BootSummary>,
}

impl BootManager {
    pub fn new(settings: BootSettings) -> Self {
        let lifecycle = LifecycleManager::new(settings.log_threshold());
        Self {
            settings,
            overrides: GlobalOverrides::new(),
            lifecycle,
            state: BootState::NotBooted,
            plan: None,
            instances: Vec::new(),
            resolver: None,
            summary: None,
        }
    }

    /// 从引擎配置创建（包括全局覆盖）
    pub fn from_config(config: &BootConfig) -> Self {
        Self::new(config.boot.clone()).with_overrides(config.global_overrides())
    }

    /// 设置全局启用/禁用覆盖
    pub fn with_overrides(mut self, overrides: GlobalOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn settings(&self) -> &BootSettings {
        &self.settings
    }

    pub fn state(&self) -> BootState {
        self.state
    }

    /// 启动顺序；未启动或启动失败时为空
    pub fn sequence(&self) -> &[ModuleId] {
        self.plan.as_ref().map(|p| p.sequence.as_slice()).unwrap_or(&[])
    }

    pub fn plan(&self) -> Option<&BootPlan> {
        self.plan.as_ref()
    }

    /// 启动成功后的摘要
    pub fn summary(&self) -> Option<&BootSummary> {
        self.summary.as_ref()
    }

    /// Initialize 阶段使用的服务解析协作者，运行期间保持可用
    pub fn resolver(&self) -> Option<&dyn ServiceResolver> {
        self.resolver.as_deref()
    }

    /// 按组合上下文生成的默认容器启动
    pub fn boot(&mut self, registry: &ModuleRegistry, stage: Stage, composition: &mut Composition) -> Result<()> {
        self.boot_with(registry, stage, composition, Composition::create_factory)
    }

    /// 启动
    ///
    /// `make_resolver` 在 Compose 阶段之后调用，得到 Initialize 阶段的解析协作者。
    ///
    /// # Errors
    ///
    /// - 已经启动过：`CoreError::AlreadyBooted`
    /// - 组合配置错误：在任何模块代码执行前返回
    /// - 模块失败：`CoreError::ModuleFailed` / `CoreError::UnresolvedParameter`
    pub fn boot_with<R, F>(
        &mut self,
        registry: &ModuleRegistry,
        stage: Stage,
        composition: &mut Composition,
        make_resolver: F,
    ) -> Result<()>
    where
        R: ServiceResolver + 'static,
        F: FnOnce(&Composition) -> R,
    {
        if self.state.has_booted() {
            warn!(state = ?self.state, "重复启动被拒绝");
            return Err(CoreError::AlreadyBooted);
        }

        let boot_id = generate_boot_id();
        let span = info_span!("boot", boot_id = %boot_id, %stage);
        let _guard = span.enter();

        let started = Instant::now();
        let booted_at = Utc::now();
        info!(modules = registry.len(), "开始启动");

        match self.run(registry, stage, composition, make_resolver) {
            Ok(()) => {
                self.state = BootState::Running;
                let elapsed_ms = started.elapsed().as_millis() as u64;
                let sequence = self.sequence().to_vec();
                info!(modules = sequence.len(), elapsed_ms, "启动完成");
                self.summary = Some(BootSummary {
                    boot_id,
                    stage,
                    sequence,
                    booted_at,
                    elapsed_ms,
                });
                Ok(())
            }
            Err(e) => {
                error!(error = %e, error_code = e.error_code(), state = ?self.state, "启动失败");
                self.state = BootState::Failed;
                self.lifecycle.dispose(&mut self.instances);
                self.resolver = None;
                self.plan = None;
                Err(e)
            }
        }
    }

    fn run<R, F>(
        &mut self,
        registry: &ModuleRegistry,
        stage: Stage,
        composition: &mut Composition,
        make_resolver: F,
    ) -> Result<()>
    where
        R: ServiceResolver + 'static,
        F: FnOnce(&Composition) -> R,
    {
        let plan = BootPlanner::plan(registry, stage, &self.overrides)?;
        self.instances = self.lifecycle.instantiate(&plan, registry)?;
        self.plan = Some(plan);

        self.state = BootState::Composing;
        composition.set_stage(stage);
        self.lifecycle.compose(&mut self.instances, composition)?;

        self.state = BootState::Initializing;
        let resolver = self.resolver.insert(Box::new(make_resolver(composition)));
        self.lifecycle.initialize(&mut self.instances, &**resolver)?;
        Ok(())
    }

    /// 按启动顺序的反序终止全部模块
    ///
    /// 未启动、启动失败或已终止时只记录警告。
    #[instrument(skip(self), fields(state = ?self.state))]
    pub fn terminate(&mut self) -> Result<()> {
        if self.state != BootState::Running {
            warn!("引擎未处于运行状态，忽略终止请求");
            return Ok(());
        }

        let result = self
            .lifecycle
            .terminate(&mut self.instances, self.settings.terminate_policy);
        self.state = BootState::Terminated;

        // 先按反序释放模块实例，再释放解析协作者
        self.lifecycle.dispose(&mut self.instances);
        self.resolver = None;
        result
    }

    /// 以指定的策略终止
    pub fn terminate_with(&mut self, policy: TerminatePolicy) -> Result<()> {
        self.settings.terminate_policy = policy;
        self.terminate()
    }
}

impl Default for BootManager {
    fn default() -> Self {
        Self::new(BootSettings::default())
    }
}

impl Drop for BootManager {
    fn drop(&mut self) {
        self.lifecycle.dispose(&mut self.instances);
        self.resolver = None;
    }
}

impl std::fmt::Debug for BootManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootManager")
            .field("state", &self.state)
            .field("sequence", &self.sequence())
            .field("instances", &self.instances.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::sync::Arc;

    use crate::module::metadata::{ModuleDescriptor, Requirement};
    use crate::module::runtime::{Arguments, Initializer, Module};
    use crate::services::ResolveExt;

    thread_local! {
        static EVENTS: RefCell<Vec<String>> = RefCell::new(Vec::new());
    }

    fn record(event: impl Into<String>) {
        EVENTS.with(|e| e.borrow_mut().push(event.into()));
    }

    fn take_events() -> Vec<String> {
        EVENTS.with(|e| std::mem::take(&mut *e.borrow_mut()))
    }

    struct Greeting(String);

    #[derive(Default)]
    struct Provider;

    impl Module for Provider {
        fn compose(&mut self, composition: &mut Composition) -> anyhow::Result<()> {
            record(format!("provider.compose@{}", composition.stage()));
            composition.register_instance(Arc::new(Greeting("hello".into())));
            Ok(())
        }

        fn terminate(&mut self) -> anyhow::Result<()> {
            record("provider.terminate");
            Ok(())
        }
    }

    #[derive(Default)]
    struct Consumer;

    impl Module for Consumer {
        fn initializers(&self) -> Vec<Initializer> {
            vec![Initializer::new("greet").param::<Greeting>()]
        }

        fn initialize(&mut self, _initializer: &Initializer, arguments: &Arguments) -> anyhow::Result<()> {
            record(format!("consumer.{}", arguments.get::<Greeting>()?.0));
            Ok(())
        }

        fn terminate(&mut self) -> anyhow::Result<()> {
            record("consumer.terminate");
            Ok(())
        }
    }

    #[derive(Default)]
    struct Broken;

    impl Module for Broken {
        fn compose(&mut self, _composition: &mut Composition) -> anyhow::Result<()> {
            anyhow::bail!("配置缺失")
        }
    }

    fn registry() -> ModuleRegistry {
        let mut registry = ModuleRegistry::with_default_anchor();
        registry
            .register(ModuleDescriptor::of::<Consumer>("consumer").require(Requirement::module("provider")))
            .unwrap()
            .register(ModuleDescriptor::of::<Provider>("provider"))
            .unwrap();
        registry
    }

    #[test]
    fn test_boot_and_terminate() {
        take_events();
        let registry = registry();
        let mut manager = BootManager::default();
        let mut composition = Composition::new(Stage::Unknown);

        manager.boot(&registry, Stage::Install, &mut composition).unwrap();
        assert_eq!(manager.state(), BootState::Running);
        assert_eq!(composition.stage(), Stage::Install);

        let summary = manager.summary().unwrap();
        assert_eq!(summary.stage, Stage::Install);
        assert_eq!(summary.sequence.len(), 3);

        let greeting = manager.resolver().unwrap().resolve::<Greeting>().unwrap();
        assert_eq!(greeting.0, "hello");

        manager.terminate().unwrap();
        assert_eq!(manager.state(), BootState::Terminated);
        assert!(manager.resolver().is_none());

        assert_eq!(
            take_events(),
            vec![
                "provider.compose@install",
                "consumer.hello",
                "consumer.terminate",
                "provider.terminate",
            ]
        );
    }

    #[test]
    fn test_boot_only_once() {
        let registry = registry();
        let mut manager = BootManager::default();
        let mut composition = Composition::new(Stage::Run);

        manager.boot(&registry, Stage::Run, &mut composition).unwrap();
        let err = manager.boot(&registry, Stage::Run, &mut composition).unwrap_err();
        assert!(matches!(err, CoreError::AlreadyBooted));
    }

    #[test]
    fn test_terminate_before_boot_is_noop() {
        let mut manager = BootManager::default();
        assert!(manager.terminate().is_ok());
        assert_eq!(manager.state(), BootState::NotBooted);
    }

    #[test]
    fn test_failed_boot() {
        take_events();
        let mut registry = registry();
        registry.register(ModuleDescriptor::of::<Broken>("broken")).unwrap();
        let mut manager = BootManager::default();

        let err = manager
            .boot(&registry, Stage::Run, &mut Composition::new(Stage::Run))
            .unwrap_err();
        assert!(matches!(err, CoreError::ModuleFailed { ref module, .. } if module == "broken"));
        assert_eq!(manager.state(), BootState::Failed);
        assert!(manager.summary().is_none());

        // 失败后终止为空操作，且不会调用任何模块的终止
        manager.terminate().unwrap();
        assert_eq!(take_events(), vec!["provider.compose@run"]);
    }

    #[test]
    fn test_overrides_from_config() {
        let config = BootConfig::builder().disable("provider").build();
        let mut registry = ModuleRegistry::with_default_anchor();
        registry.register(ModuleDescriptor::of::<Provider>("provider")).unwrap();

        let mut manager = BootManager::from_config(&config);
        manager
            .boot(&registry, Stage::Run, &mut Composition::new(Stage::Run))
            .unwrap();
        assert_eq!(manager.sequence(), &[ModuleId::from("chips.anchor")]);
    }

    #[test]
    fn test_boot_with_custom_resolver() {
        let registry = registry();
        let mut manager = BootManager::default();
        let mut composition = Composition::new(Stage::Run);
        manager
            .boot_with(&registry, Stage::Run, &mut composition, |c: &Composition| {
                c.create_factory()
            })
            .unwrap();
        assert_eq!(manager.state(), BootState::Running);
    }
}
