//! 服务组合与解析
//!
//! - `Composition`: Compose 阶段暴露给模块的组合上下文，用于注册服务与集合
//! - `ServiceContainer`: 默认的服务解析协作者，由组合上下文生成
//! - `Resolve` / `ServiceResolver` / `ServiceScope`: 生命周期编排所依赖的解析接口

pub mod composition;
pub mod container;

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::utils::{CoreError, Result};

pub use composition::{Collection, CollectionBuilder, Composition};
pub use container::{ContainerScope, ServiceContainer};

/// 服务键：按类型标识服务
#[derive(Clone, Copy)]
pub struct ServiceKey {
    id: TypeId,
    name: &'static str,
}

impl ServiceKey {
    /// 取得类型 `T` 的服务键
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// 类型名称，用于日志与错误消息
    pub fn type_name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for ServiceKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ServiceKey {}

impl Hash for ServiceKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// 类型擦除的服务实例
#[derive(Clone)]
pub struct ServiceInstance {
    key: ServiceKey,
    value: Arc<dyn Any + Send + Sync>,
}

impl ServiceInstance {
    pub fn new<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Self {
        Self {
            key: ServiceKey::of::<T>(),
            value: Arc::new(value),
        }
    }

    pub fn key(&self) -> ServiceKey {
        self.key
    }

    /// 还原为具体类型
    pub fn downcast<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.value.downcast_ref::<Arc<T>>().cloned()
    }
}

impl fmt::Debug for ServiceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceInstance")
            .field("key", &self.key)
            .finish()
    }
}

/// 服务生命周期
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifetime {
    /// 每次解析都创建新实例
    Transient,
    /// 每个作用域一个实例，作用域结束时释放
    Scoped,
    /// 全局唯一实例
    Singleton,
}

/// 服务查找
pub trait Resolve {
    /// 按键解析服务；未注册时返回 `Ok(None)`
    fn try_resolve(&self, key: ServiceKey) -> Result<Option<ServiceInstance>>;
}

/// 带类型的查找辅助方法
pub trait ResolveExt: Resolve {
    fn resolve_optional<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Option<Arc<T>>> {
        Ok(self
            .try_resolve(ServiceKey::of::<T>())?
            .and_then(|instance| instance.downcast::<T>()))
    }

    fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.resolve_optional::<T>()?
            .ok_or_else(|| CoreError::ServiceNotRegistered(std::any::type_name::<T>().to_string()))
    }
}

impl<R: Resolve + ?Sized> ResolveExt for R {}

/// 作用域
///
/// 丢弃作用域会释放其中创建的全部作用域实例，无论是否已完成。
pub trait ServiceScope: Resolve {
    /// 标记作用域正常完成
    fn complete(&mut self);

    fn is_completed(&self) -> bool;
}

/// 服务解析协作者
pub trait ServiceResolver: Resolve {
    /// 开启一个作用域
    fn begin_scope(&self) -> Box<dyn ServiceScope + '_>;
}
