//! 生命周期编排
//!
//! 按启动顺序驱动模块经历 Compose → Initialize，按反序驱动 Terminate。

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::metadata::ModuleId;
use super::planner::BootPlan;
use super::registry::ModuleRegistry;
use super::runtime::{Arguments, LifecyclePhase, ModuleInstance};
use crate::services::{Composition, ServiceResolver};
use crate::utils::logger::TimedSection;
use crate::utils::{CoreError, Result};

/// 终止阶段的失败处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminatePolicy {
    /// 继续终止其余模块，最后汇总失败
    #[default]
    Continue,
    /// 遇到第一个失败立即停止
    Abort,
}

/// 生命周期管理器
///
/// 负责按顺序调用模块的各个生命周期阶段，并记录耗时。
#[derive(Debug, Clone)]
pub struct LifecycleManager {
    /// 单个模块耗时超过该值才记录
    threshold: Duration,
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

impl LifecycleManager {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// 按启动顺序无参构造全部模块
    ///
    /// # Errors
    ///
    /// 任一模块没有构造器时返回 `CoreError::MissingConstructor`，此时不会构造任何模块。
    pub fn instantiate(&self, plan: &BootPlan, registry: &ModuleRegistry) -> Result<Vec<ModuleInstance>> {
        let constructors = plan
            .sequence
            .iter()
            .map(|id| {
                registry
                    .constructor(id)
                    .map(|ctor| (id, ctor))
                    .ok_or_else(|| CoreError::MissingConstructor(id.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        let section = TimedSection::phase("instantiate");
        let instances = constructors
            .into_iter()
            .map(|(id, ctor)| ModuleInstance::new(id.clone(), ctor()))
            .collect::<Vec<_>>();
        section.finish();

        debug!(count = instances.len(), "模块实例已创建");
        Ok(instances)
    }

    /// Compose 阶段
    ///
    /// 第一个失败的模块会中止整个阶段。
    pub fn compose(&self, instances: &mut [ModuleInstance], composition: &mut Composition) -> Result<()> {
        let phase = TimedSection::phase("compose");

        for instance in instances.iter_mut() {
            let section = TimedSection::module("compose", instance.id().as_str(), self.threshold);
            let id = instance.id().clone();
            instance
                .module_mut()
                .compose(composition)
                .map_err(|e| Self::module_failed(&id, LifecyclePhase::Compose, e))?;
            section.finish();
        }

        phase.finish();
        Ok(())
    }

    /// Initialize 阶段
    ///
    /// 整个阶段只开启一个服务作用域。每个模块的每个初始化入口都会被调用，
    /// 入口的参数逐个从作用域中解析。成功时作用域被标记完成；
    /// 无论成功与否，作用域都在返回前释放。
    pub fn initialize(&self, instances: &mut [ModuleInstance], resolver: &dyn ServiceResolver) -> Result<()> {
        let phase = TimedSection::phase("initialize");
        let mut scope = resolver.begin_scope();

        for instance in instances.iter_mut() {
            let section = TimedSection::module("initialize", instance.id().as_str(), self.threshold);
            let id = instance.id().clone();

            let initializers = instance.module().initializers();
            for initializer in initializers {
                let mut values = Vec::with_capacity(initializer.parameters().len());
                for key in initializer.parameters() {
                    let value = match scope.try_resolve(*key) {
                        Ok(Some(value)) => value,
                        Ok(None) => {
                            return Err(CoreError::UnresolvedParameter {
                                module: id.to_string(),
                                parameter: key.type_name().to_string(),
                                source: None,
                            })
                        }
                        Err(e) => {
                            return Err(CoreError::UnresolvedParameter {
                                module: id.to_string(),
                                parameter: key.type_name().to_string(),
                                source: Some(Box::new(e)),
                            })
                        }
                    };
                    values.push(value);
                }

                debug!(module_id = %id, initializer = initializer.name(), "调用初始化入口");
                instance
                    .module_mut()
                    .initialize(&initializer, &Arguments::new(values))
                    .map_err(|e| Self::module_failed(&id, LifecyclePhase::Initialize, e))?;
            }

            section.finish();
        }

        scope.complete();
        phase.finish();
        Ok(())
    }

    /// Terminate 阶段（严格反序）
    ///
    /// # Errors
    ///
    /// - `TerminatePolicy::Abort`: 返回第一个失败模块的 `CoreError::ModuleFailed`
    /// - `TerminatePolicy::Continue`: 尝试终止全部模块，有失败时返回 `CoreError::TerminateFailed`
    pub fn terminate(&self, instances: &mut [ModuleInstance], policy: TerminatePolicy) -> Result<()> {
        let phase = TimedSection::phase("terminate");
        let mut failures = Vec::new();

        for instance in instances.iter_mut().rev() {
            let section = TimedSection::module("terminate", instance.id().as_str(), self.threshold);
            let id = instance.id().clone();

            if let Err(e) = instance.module_mut().terminate() {
                let err = Self::module_failed(&id, LifecyclePhase::Terminate, e);
                match policy {
                    TerminatePolicy::Abort => return Err(err),
                    TerminatePolicy::Continue => {
                        warn!(module_id = %id, error = %err, "模块终止失败，继续终止其余模块");
                        failures.push(err.to_string());
                    }
                }
            }

            section.finish();
        }

        phase.finish();

        if failures.is_empty() {
            info!(count = instances.len(), "全部模块已终止");
            Ok(())
        } else {
            Err(CoreError::TerminateFailed { failures })
        }
    }

    /// 按启动顺序的反序释放模块实例
    pub fn dispose(&self, instances: &mut Vec<ModuleInstance>) {
        let count = instances.len();
        while let Some(instance) = instances.pop() {
            drop(instance);
        }
        if count > 0 {
            debug!(count, "模块实例已释放");
        }
    }

    fn module_failed(id: &ModuleId, phase: LifecyclePhase, e: anyhow::Error) -> CoreError {
        error!(module_id = %id, %phase, error = %format!("{:#}", e), "模块执行失败");
        CoreError::ModuleFailed {
            module: id.to_string(),
            phase,
            source: e.into(),
        }
    }
}
