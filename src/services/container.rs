//! 默认服务容器
//!
//! 根容器缓存单例；作用域缓存作用域实例，作用域被丢弃时一并释放。

use std::cell::RefCell;
use std::collections::HashMap;

use indexmap::IndexMap;
use tracing::{debug, trace};

use super::composition::Registration;
use super::{Lifetime, Resolve, ServiceInstance, ServiceKey, ServiceResolver, ServiceScope};
use crate::utils::{CoreError, Result};

/// 服务容器
pub struct ServiceContainer {
    registrations: IndexMap<ServiceKey, Registration>,
    singletons: RefCell<HashMap<ServiceKey, ServiceInstance>>,
}

impl ServiceContainer {
    pub(crate) fn new(registrations: IndexMap<ServiceKey, Registration>) -> Self {
        Self {
            registrations,
            singletons: RefCell::new(HashMap::new()),
        }
    }

    /// 已注册的服务数量
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    pub fn contains(&self, key: ServiceKey) -> bool {
        self.registrations.contains_key(&key)
    }

    fn run_factory(
        &self,
        key: ServiceKey,
        registration: &Registration,
        resolver: &dyn Resolve,
    ) -> Result<ServiceInstance> {
        (registration.factory)(resolver).map_err(|e| CoreError::ServiceResolutionFailed {
            service: key.type_name().to_string(),
            reason: format!("{:#}", e),
        })
    }

    fn resolve_singleton(&self, key: ServiceKey, registration: &Registration) -> Result<ServiceInstance> {
        if let Some(instance) = self.singletons.borrow().get(&key) {
            return Ok(instance.clone());
        }

        let instance = self.run_factory(key, registration, self)?;
        self.singletons.borrow_mut().insert(key, instance.clone());
        trace!(service = %key, "单例已创建");
        Ok(instance)
    }
}

impl Resolve for ServiceContainer {
    fn try_resolve(&self, key: ServiceKey) -> Result<Option<ServiceInstance>> {
        let Some(registration) = self.registrations.get(&key) else {
            return Ok(None);
        };

        match registration.lifetime {
            Lifetime::Transient => self.run_factory(key, registration, self).map(Some),
            Lifetime::Singleton => self.resolve_singleton(key, registration).map(Some),
            Lifetime::Scoped => Err(CoreError::ScopeRequired(key.type_name().to_string())),
        }
    }
}

impl ServiceResolver for ServiceContainer {
    fn begin_scope(&self) -> Box<dyn ServiceScope + '_> {
        debug!("开启服务作用域");
        Box::new(ContainerScope {
            root: self,
            scoped: RefCell::new(HashMap::new()),
            completed: false,
        })
    }
}

/// 服务容器的作用域
pub struct ContainerScope<'a> {
    root: &'a ServiceContainer,
    scoped: RefCell<HashMap<ServiceKey, ServiceInstance>>,
    completed: bool,
}

impl Resolve for ContainerScope<'_> {
    fn try_resolve(&self, key: ServiceKey) -> Result<Option<ServiceInstance>> {
        let Some(registration) = self.root.registrations.get(&key) else {
            return Ok(None);
        };

        match registration.lifetime {
            Lifetime::Transient => self.root.run_factory(key, registration, self).map(Some),
            Lifetime::Singleton => self.root.resolve_singleton(key, registration).map(Some),
            Lifetime::Scoped => {
                if let Some(instance) = self.scoped.borrow().get(&key) {
                    return Ok(Some(instance.clone()));
                }

                let instance = self.root.run_factory(key, registration, self)?;
                self.scoped.borrow_mut().insert(key, instance.clone());
                Ok(Some(instance))
            }
        }
    }
}

impl ServiceScope for ContainerScope<'_> {
    fn complete(&mut self) {
        self.completed = true;
    }

    fn is_completed(&self) -> bool {
        self.completed
    }
}

impl Drop for ContainerScope<'_> {
    fn drop(&mut self) {
        let released = self.scoped.get_mut().len();
        self.scoped.get_mut().clear();
        debug!(released, completed = self.completed, "服务作用域已释放");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::metadata::Stage;
    use crate::services::{Composition, ResolveExt};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    struct Connection {
        id: usize,
    }

    fn counting_composition(counter: Arc<AtomicUsize>, lifetime: Lifetime) -> Composition {
        let mut composition = Composition::new(Stage::Run);
        composition.register::<Connection, _>(lifetime, move |_| {
            let id = counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Connection { id }))
        });
        composition
    }

    #[test]
    fn test_singleton_cached() {
        let counter = Arc::new(AtomicUsize::new(0));
        let container = counting_composition(counter.clone(), Lifetime::Singleton).create_factory();

        let a = container.resolve::<Connection>().unwrap();
        let b = container.resolve::<Connection>().unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_transient_created_each_time() {
        let counter = Arc::new(AtomicUsize::new(0));
        let container = counting_composition(counter.clone(), Lifetime::Transient).create_factory();

        container.resolve::<Connection>().unwrap();
        container.resolve::<Connection>().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_scoped_requires_scope() {
        let counter = Arc::new(AtomicUsize::new(0));
        let container = counting_composition(counter, Lifetime::Scoped).create_factory();

        let err = container.resolve::<Connection>().unwrap_err();
        assert!(matches!(err, CoreError::ScopeRequired(_)));
    }

    #[test]
    fn test_scoped_instance_released_with_scope() {
        let counter = Arc::new(AtomicUsize::new(0));
        let container = counting_composition(counter.clone(), Lifetime::Scoped).create_factory();

        let held = {
            let mut scope = container.begin_scope();
            let first = scope.resolve::<Connection>().unwrap();
            let second = scope.resolve::<Connection>().unwrap();
            assert_eq!(first.id, second.id);
            assert_eq!(Arc::strong_count(&first), 3);
            scope.complete();
            assert!(scope.is_completed());
            first
        };

        // 作用域丢弃后只剩外部持有的引用
        assert_eq!(Arc::strong_count(&held), 1);

        let scope = container.begin_scope();
        let fresh = scope.resolve::<Connection>().unwrap();
        assert_ne!(fresh.id, held.id);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_factory_failure_reported() {
        let mut composition = Composition::new(Stage::Run);
        composition.register::<Connection, _>(Lifetime::Transient, |_| {
            Err(anyhow::anyhow!("连接被拒绝"))
        });

        let err = composition.create_factory().resolve::<Connection>().unwrap_err();
        match err {
            CoreError::ServiceResolutionFailed { reason, .. } => assert!(reason.contains("连接被拒绝")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_factory_resolves_dependencies() {
        let mut composition = Composition::new(Stage::Run);
        composition.register_instance(Arc::new("db://local".to_string()));
        composition.register::<Connection, _>(Lifetime::Transient, |resolver| {
            let url = resolver.resolve::<String>()?;
            Ok(Arc::new(Connection { id: url.len() }))
        });

        let container = composition.create_factory();
        assert_eq!(container.resolve::<Connection>().unwrap().id, 10);
        assert!(container.resolve_optional::<u64>().unwrap().is_none());
    }
}
