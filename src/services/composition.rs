//! 组合上下文
//!
//! Compose 阶段每个模块都会拿到同一个 `Composition`，在其中注册服务、
//! 追加集合成员。全部模块组合完成后由 `create_factory` 生成解析容器。

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use super::container::ServiceContainer;
use super::{Lifetime, Resolve, ServiceInstance, ServiceKey};
use crate::module::metadata::Stage;

/// 服务工厂
pub(crate) type Factory = Rc<dyn Fn(&dyn Resolve) -> anyhow::Result<ServiceInstance>>;

/// 单条服务注册
#[derive(Clone)]
pub(crate) struct Registration {
    pub(crate) lifetime: Lifetime,
    pub(crate) factory: Factory,
}

/// 解析得到的有序集合
pub struct Collection<T: ?Sized> {
    items: Vec<Arc<T>>,
}

impl<T: ?Sized> Collection<T> {
    pub fn iter(&self) -> impl Iterator<Item = &Arc<T>> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[Arc<T>] {
        &self.items
    }
}

/// 集合构建器
///
/// 所有模块共享同一个构建器，克隆得到的是同一份成员列表的句柄。
pub struct CollectionBuilder<T: ?Sized> {
    items: Rc<RefCell<Vec<Arc<T>>>>,
}

impl<T: ?Sized> Clone for CollectionBuilder<T> {
    fn clone(&self) -> Self {
        Self {
            items: Rc::clone(&self.items),
        }
    }
}

impl<T: ?Sized> CollectionBuilder<T> {
    fn new() -> Self {
        Self {
            items: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// 追加成员
    pub fn append(&self, item: Arc<T>) -> &Self {
        self.items.borrow_mut().push(item);
        self
    }

    /// 移除满足条件的成员，返回移除数量
    pub fn remove<F>(&self, predicate: F) -> usize
    where
        F: Fn(&Arc<T>) -> bool,
    {
        let mut items = self.items.borrow_mut();
        let before = items.len();
        items.retain(|item| !predicate(item));
        before - items.len()
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }
}

trait ErasedCollection {
    fn as_any(&self) -> &dyn Any;

    fn freeze(&self) -> ServiceInstance;
}

impl<T: ?Sized + Send + Sync + 'static> ErasedCollection for CollectionBuilder<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn freeze(&self) -> ServiceInstance {
        ServiceInstance::new(Arc::new(Collection {
            items: self.items.borrow().clone(),
        }))
    }
}

/// 组合上下文
pub struct Composition {
    stage: Stage,
    registrations: IndexMap<ServiceKey, Vec<Registration>>,
    collections: IndexMap<ServiceKey, Box<dyn ErasedCollection>>,
}

impl fmt::Debug for Composition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Composition")
            .field("stage", &self.stage)
            .field("services", &self.registrations.keys().collect::<Vec<_>>())
            .field("collections", &self.collections.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Composition {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            registrations: IndexMap::new(),
            collections: IndexMap::new(),
        }
    }

    /// 当前启动阶段
    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub(crate) fn set_stage(&mut self, stage: Stage) {
        self.stage = stage;
    }

    /// 注册服务工厂
    ///
    /// 同一类型可多次注册，解析时使用最后一次注册。
    pub fn register<T, F>(&mut self, lifetime: Lifetime, factory: F) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&dyn Resolve) -> anyhow::Result<Arc<T>> + 'static,
    {
        let key = ServiceKey::of::<T>();
        debug!(service = %key, ?lifetime, "注册服务");

        let factory: Factory = Rc::new(move |resolver: &dyn Resolve| {
            factory(resolver).map(ServiceInstance::new)
        });
        self.registrations
            .entry(key)
            .or_default()
            .push(Registration { lifetime, factory });
        self
    }

    /// 注册已构造的单例实例
    pub fn register_instance<T>(&mut self, value: Arc<T>) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.register::<T, _>(Lifetime::Singleton, move |_| Ok(Arc::clone(&value)))
    }

    /// 注册服务并替换此前的全部注册
    pub fn register_unique<T, F>(&mut self, lifetime: Lifetime, factory: F) -> &mut Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&dyn Resolve) -> anyhow::Result<Arc<T>> + 'static,
    {
        self.registrations.shift_remove(&ServiceKey::of::<T>());
        self.register(lifetime, factory)
    }

    /// 取得类型 `T` 的集合构建器，首次访问时创建
    ///
    /// 解析时以 `Collection<T>` 类型提供。
    pub fn collection<T>(&mut self) -> CollectionBuilder<T>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let key = ServiceKey::of::<Collection<T>>();
        if let Some(builder) = self
            .collections
            .get(&key)
            .and_then(|existing| existing.as_any().downcast_ref::<CollectionBuilder<T>>())
        {
            return builder.clone();
        }

        let builder = CollectionBuilder::<T>::new();
        self.collections.insert(key, Box::new(builder.clone()));
        builder
    }

    /// 是否已注册类型 `T`
    pub fn is_registered<T: ?Sized + 'static>(&self) -> bool {
        let key = ServiceKey::of::<T>();
        self.registrations.get(&key).is_some_and(|r| !r.is_empty())
            || self.collections.contains_key(&key)
    }

    /// 类型 `T` 的注册次数
    pub fn registration_count<T: ?Sized + 'static>(&self) -> usize {
        self.registrations
            .get(&ServiceKey::of::<T>())
            .map_or(0, Vec::len)
    }

    /// 生成服务解析容器
    ///
    /// 每个类型取最后一次注册；集合冻结为单例。
    pub fn create_factory(&self) -> ServiceContainer {
        let mut registrations: IndexMap<ServiceKey, Registration> = self
            .registrations
            .iter()
            .filter_map(|(key, list)| list.last().map(|r| (*key, r.clone())))
            .collect();

        for (key, collection) in &self.collections {
            let instance = collection.freeze();
            let factory: Factory =
                Rc::new(move |_: &dyn Resolve| Ok::<_, anyhow::Error>(instance.clone()));
            registrations.insert(
                *key,
                Registration {
                    lifetime: Lifetime::Singleton,
                    factory,
                },
            );
        }

        debug!(services = registrations.len(), "生成服务容器");
        ServiceContainer::new(registrations)
    }
}
