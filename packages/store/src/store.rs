//! The store handle: module registry plus named getter, mutation and
//! action dispatch.
//!
//! Names are qualified by namespace. The root module is unprefixed, so
//! `posts.fetch` routes to the root module and `blog/posts.fetch` routes to
//! the module registered under `blog`.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures::future::{self, BoxFuture, FutureExt};
use serde_json::Value;
use tracing::{debug, trace};

use crate::{Error, ModuleState};

/// A named read over module state.
pub type Getter<E> = Arc<dyn Fn(&ModuleState, Value) -> Result<Value, E> + Send + Sync>;

/// A named synchronous state transition.
pub type Mutation<E> = Arc<dyn Fn(&mut ModuleState, Value) -> Result<(), E> + Send + Sync>;

/// A named asynchronous operation. Receives a context scoped to the
/// module's namespace and positional arguments.
pub type Action<E> =
    Arc<dyn Fn(Context<E>, Vec<Value>) -> BoxFuture<'static, Result<Value, E>> + Send + Sync>;

/// Everything a module contributes to the store.
pub struct Module<E> {
    pub state: ModuleState,
    pub getters: BTreeMap<String, Getter<E>>,
    pub mutations: BTreeMap<String, Mutation<E>>,
    pub actions: BTreeMap<String, Action<E>>,
}

impl<E> Module<E> {
    pub fn new(state: ModuleState) -> Self {
        Self {
            state,
            getters: BTreeMap::new(),
            mutations: BTreeMap::new(),
            actions: BTreeMap::new(),
        }
    }

    pub fn add_getter<F>(&mut self, name: impl Into<String>, getter: F)
    where
        F: Fn(&ModuleState, Value) -> Result<Value, E> + Send + Sync + 'static,
    {
        self.getters.insert(name.into(), Arc::new(getter));
    }

    pub fn add_mutation<F>(&mut self, name: impl Into<String>, mutation: F)
    where
        F: Fn(&mut ModuleState, Value) -> Result<(), E> + Send + Sync + 'static,
    {
        self.mutations.insert(name.into(), Arc::new(mutation));
    }

    pub fn add_action(&mut self, name: impl Into<String>, action: Action<E>) {
        self.actions.insert(name.into(), action);
    }
}

/// Split a qualified name into `(namespace, local name)`.
fn split_name(name: &str) -> (&str, &str) {
    name.rsplit_once('/').unwrap_or(("", name))
}

fn qualify(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", namespace, name)
    }
}

struct Inner<E> {
    modules: RwLock<BTreeMap<String, Module<E>>>,
}

/// Shared handle to the state container.
///
/// Cloning is cheap; every clone addresses the same modules. All state
/// writes go through registered mutations.
pub struct Store<E> {
    inner: Arc<Inner<E>>,
}

impl<E> Clone for Store<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> Default for Store<E>
where
    E: From<Error> + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Store<E>
where
    E: From<Error> + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                modules: RwLock::new(BTreeMap::new()),
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Module<E>>> {
        self.inner
            .modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Module<E>>> {
        self.inner
            .modules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a module. `None` registers the unprefixed root module.
    pub fn register_module(&self, namespace: Option<&str>, module: Module<E>) -> Result<(), E> {
        let namespace = namespace.unwrap_or_default().to_string();
        let mut modules = self.write();
        if modules.contains_key(&namespace) {
            return Err(Error::DuplicateModule { namespace }.into());
        }
        debug!(
            namespace = %namespace,
            getters = module.getters.len(),
            mutations = module.mutations.len(),
            actions = module.actions.len(),
            "registering module"
        );
        modules.insert(namespace, module);
        Ok(())
    }

    pub fn has_module(&self, namespace: Option<&str>) -> bool {
        self.read().contains_key(namespace.unwrap_or_default())
    }

    /// Evaluate a named getter against current state.
    pub fn get(&self, name: &str, input: Value) -> Result<Value, E> {
        let (namespace, local) = split_name(name);
        let modules = self.read();
        let module = modules.get(namespace).ok_or_else(|| Error::UnknownModule {
            namespace: namespace.to_string(),
        })?;
        let getter = module.getters.get(local).ok_or_else(|| Error::UnknownGetter {
            name: name.to_string(),
        })?;
        trace!(getter = name, "get");
        getter(&module.state, input)
    }

    /// Apply a named mutation.
    pub fn commit(&self, name: &str, payload: Value) -> Result<(), E> {
        let (namespace, local) = split_name(name);
        let mut modules = self.write();
        let module = modules
            .get_mut(namespace)
            .ok_or_else(|| Error::UnknownModule {
                namespace: namespace.to_string(),
            })?;
        let mutation = module
            .mutations
            .get(local)
            .cloned()
            .ok_or_else(|| Error::UnknownMutation {
                name: name.to_string(),
            })?;
        debug!(mutation = name, "commit");
        mutation(&mut module.state, payload)
    }

    /// Run a named action. The returned future resolves with the action's
    /// result; unknown names resolve to an error without running anything.
    pub fn dispatch(&self, name: &str, args: Vec<Value>) -> BoxFuture<'static, Result<Value, E>> {
        let (namespace, local) = split_name(name);
        let action = {
            let modules = self.read();
            match modules.get(namespace) {
                None => Err(Error::UnknownModule {
                    namespace: namespace.to_string(),
                }),
                Some(module) => module.actions.get(local).cloned().ok_or_else(|| {
                    Error::UnknownAction {
                        name: name.to_string(),
                    }
                }),
            }
        };
        match action {
            Ok(action) => {
                debug!(action = name, args = args.len(), "dispatch");
                let context = Context {
                    store: self.clone(),
                    namespace: namespace.to_string(),
                };
                action(context, args)
            }
            Err(e) => future::ready(Err(e.into())).boxed(),
        }
    }

    /// Read module state directly, e.g. for inspection in tests.
    pub fn with_state<R>(
        &self,
        namespace: Option<&str>,
        f: impl FnOnce(&ModuleState) -> R,
    ) -> Result<R, E> {
        let namespace = namespace.unwrap_or_default();
        let modules = self.read();
        let module = modules.get(namespace).ok_or_else(|| Error::UnknownModule {
            namespace: namespace.to_string(),
        })?;
        Ok(f(&module.state))
    }
}

/// Handle passed to actions, resolving names inside the action's namespace.
pub struct Context<E> {
    store: Store<E>,
    namespace: String,
}

impl<E> Clone for Context<E> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            namespace: self.namespace.clone(),
        }
    }
}

impl<E> Context<E>
where
    E: From<Error> + Send + 'static,
{
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn store(&self) -> &Store<E> {
        &self.store
    }

    pub fn get(&self, name: &str, input: Value) -> Result<Value, E> {
        self.store.get(&qualify(&self.namespace, name), input)
    }

    pub fn commit(&self, name: &str, payload: Value) -> Result<(), E> {
        self.store.commit(&qualify(&self.namespace, name), payload)
    }

    pub fn dispatch(&self, name: &str, args: Vec<Value>) -> BoxFuture<'static, Result<Value, E>> {
        self.store.dispatch(&qualify(&self.namespace, name), args)
    }
}
