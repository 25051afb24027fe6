//! 模块运行时契约
//!
//! 定义参与启动的模块需要实现的接口，以及模块实例与初始化参数。

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::metadata::ModuleId;
use crate::services::{Composition, ServiceInstance, ServiceKey};
use crate::utils::{CoreError, Result};

/// 生命周期阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecyclePhase {
    Compose,
    Initialize,
    Terminate,
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecyclePhase::Compose => "compose",
            LifecyclePhase::Initialize => "initialize",
            LifecyclePhase::Terminate => "terminate",
        };
        f.write_str(name)
    }
}

/// 模块无参构造器
pub type ModuleConstructor = fn() -> Box<dyn Module>;

/// 模块接口
///
/// 所有方法都有空的默认实现，模块只需覆盖关心的阶段。
pub trait Module {
    /// Compose 阶段：向组合上下文注册服务
    fn compose(&mut self, _composition: &mut Composition) -> anyhow::Result<()> {
        Ok(())
    }

    /// 声明初始化入口
    ///
    /// 每个入口的参数在 Initialize 阶段从服务作用域中解析，按声明顺序全部调用。
    fn initializers(&self) -> Vec<Initializer> {
        Vec::new()
    }

    /// Initialize 阶段：执行一个初始化入口
    fn initialize(&mut self, _initializer: &Initializer, _arguments: &Arguments) -> anyhow::Result<()> {
        Ok(())
    }

    /// Terminate 阶段
    fn terminate(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// 初始化入口声明
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Initializer {
    name: &'static str,
    parameters: Vec<ServiceKey>,
}

impl Initializer {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            parameters: Vec::new(),
        }
    }

    /// 追加一个参数类型
    pub fn param<T: ?Sized + 'static>(mut self) -> Self {
        self.parameters.push(ServiceKey::of::<T>());
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn parameters(&self) -> &[ServiceKey] {
        &self.parameters
    }
}

/// 已解析的初始化参数
#[derive(Debug, Clone, Default)]
pub struct Arguments {
    values: Vec<ServiceInstance>,
}

impl Arguments {
    pub(crate) fn new(values: Vec<ServiceInstance>) -> Self {
        Self { values }
    }

    /// 取得类型为 `T` 的第一个参数
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        let key = ServiceKey::of::<T>();
        self.values
            .iter()
            .filter(|value| value.key() == key)
            .find_map(|value| value.downcast::<T>())
            .ok_or_else(|| CoreError::ServiceNotRegistered(key.type_name().to_string()))
    }

    /// 按位置取得参数
    pub fn nth<T: ?Sized + Send + Sync + 'static>(&self, index: usize) -> Option<Arc<T>> {
        self.values.get(index).and_then(|value| value.downcast::<T>())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// 模块实例
///
/// 丢弃实例即释放模块。
pub struct ModuleInstance {
    id: ModuleId,
    module: Box<dyn Module>,
}

impl ModuleInstance {
    pub fn new(id: ModuleId, module: Box<dyn Module>) -> Self {
        Self { id, module }
    }

    pub fn id(&self) -> &ModuleId {
        &self.id
    }

    pub fn module(&self) -> &dyn Module {
        self.module.as_ref()
    }

    pub fn module_mut(&mut self) -> &mut dyn Module {
        self.module.as_mut()
    }
}

impl fmt::Debug for ModuleInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleInstance").field("id", &self.id).finish()
    }
}

impl Drop for ModuleInstance {
    fn drop(&mut self) {
        trace!(module_id = %self.id, "模块实例已释放");
    }
}
