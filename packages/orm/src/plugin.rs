//! Registration: turn model definitions into store modules.
//!
//! Root models register unprefixed; each named module prefixes every
//! generated name with `<namespace>/`. Per model `posts` the module gets:
//!
//! - getters `posts`, `posts.one`, `posts.all`, `posts.sample`,
//!   `posts.template`, `posts.defaults`
//! - mutations `posts.sync`, `posts.remove`, `posts.reset`, `posts.clear`
//! - actions `posts.fetch`, `posts.get`, `posts.create`, `posts.update`,
//!   `posts.delete`, plus `posts.<relation>.<method>` and
//!   `posts.<action>.<method>`

use std::collections::BTreeMap;
use std::sync::Arc;

use reflect_store::{Module, ModuleState, Table};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::{ModelClass, ModelConfig, ModelDefinition, Options};
use crate::constructs::{actions, getters, mutations, Context};
use crate::error::Error;
use crate::model::{Model, Schema, Store};
use crate::relations;

type Group = (Option<String>, Vec<(String, ModelDefinition)>);

/// Builder for a set of model groups sharing global options.
pub struct Reflect {
    options: Options,
    groups: Vec<Group>,
}

impl Reflect {
    pub fn new(options: Options) -> Self {
        Self {
            options,
            groups: vec![(None, Vec::new())],
        }
    }

    /// Build from JSON definitions. `modules` maps namespaces to model
    /// tables; `models`, or else every other top-level key, holds the root
    /// models.
    pub fn from_json(options: Options, value: Value) -> Result<Self, Error> {
        let Value::Object(mut top) = value else {
            return Err(Error::InvalidConfig {
                model: String::new(),
                message: "model definitions must be an object".to_string(),
            });
        };
        let modules = top.remove("modules");
        let root = match top.remove("models") {
            Some(Value::Object(models)) => models,
            Some(other) => {
                return Err(Error::InvalidConfig {
                    model: String::new(),
                    message: format!("`models` must be an object, got {}", other),
                })
            }
            None => top,
        };

        let mut reflect = Self::new(options);
        for (name, definition) in root {
            reflect = reflect.model(name, ModelDefinition::from_json(definition)?);
        }
        if let Some(Value::Object(modules)) = modules {
            for (namespace, models) in modules {
                let Value::Object(models) = models else {
                    return Err(Error::InvalidConfig {
                        model: namespace,
                        message: "module models must be an object".to_string(),
                    });
                };
                let models = models
                    .into_iter()
                    .map(|(name, definition)| Ok((name, ModelDefinition::from_json(definition)?)))
                    .collect::<Result<Vec<_>, Error>>()?;
                reflect = reflect.module(namespace, models);
            }
        }
        Ok(reflect)
    }

    /// Add a root model.
    pub fn model(mut self, name: impl Into<String>, definition: ModelDefinition) -> Self {
        self.groups[0].1.push((name.into(), definition));
        self
    }

    /// Add a root model declared as a type.
    pub fn class<T: ModelClass>(self, name: impl Into<String>) -> Self {
        self.model(name, T::definition())
    }

    /// Add a namespaced group of models.
    pub fn module<I, K>(mut self, namespace: impl Into<String>, models: I) -> Self
    where
        I: IntoIterator<Item = (K, ModelDefinition)>,
        K: Into<String>,
    {
        let models = models
            .into_iter()
            .map(|(name, definition)| (name.into(), definition))
            .collect();
        self.groups.push((Some(namespace.into()), models));
        self
    }

    /// Register every group against `store`.
    pub fn install(self, store: &Store) -> Result<Registry, Error> {
        let mut schemas = BTreeMap::new();
        for (namespace, definitions) in self.groups {
            if namespace.is_none() && definitions.is_empty() {
                continue;
            }
            let schema = install_group(store, &self.options, namespace, definitions)?;
            schemas.insert(schema.namespace.clone().unwrap_or_default(), Arc::new(schema));
        }
        Ok(Registry {
            store: store.clone(),
            schemas,
        })
    }
}

fn install_group(
    store: &Store,
    options: &Options,
    namespace: Option<String>,
    definitions: Vec<(String, ModelDefinition)>,
) -> Result<Schema, Error> {
    let mut models = BTreeMap::new();
    for (name, definition) in definitions {
        if models.contains_key(&name) {
            return Err(Error::InvalidConfig {
                model: name,
                message: "model registered twice".to_string(),
            });
        }
        let config = ModelConfig::resolve(&name, namespace.as_deref(), definition, options)?;
        models.insert(name, Arc::new(config));
    }

    for config in models.values() {
        for (key, spec) in config.contract.iter() {
            if let Some(target) = &spec.model {
                if !models.contains_key(target) {
                    return Err(Error::InvalidConfig {
                        model: config.name.clone(),
                        message: format!("field `{}` references unknown model `{}`", key, target),
                    });
                }
            }
        }
    }

    let mut state = ModuleState::new();
    for (name, config) in &models {
        let table = if config.singleton {
            Table::singleton(config.initial.clone())
        } else {
            Table::collection()
        };
        state.insert_table(name.clone(), table);
    }

    let mut module = Module::new(state);
    for config in models.values() {
        register_model(&mut module, &models, config)?;
    }

    store.register_module(namespace.as_deref(), module)?;
    info!(
        namespace = namespace.as_deref().unwrap_or(""),
        models = models.len(),
        "registered models"
    );
    Ok(Schema { namespace, models })
}

fn register_model(
    module: &mut Module<Error>,
    schema: &BTreeMap<String, Arc<ModelConfig>>,
    config: &Arc<ModelConfig>,
) -> Result<(), Error> {
    debug!(model = %config.name, singleton = config.singleton, "registering model");

    let get = getters::factory(config);
    for name in [config.name.clone(), config.local("one"), config.local("all")] {
        let (config, base) = (Arc::clone(config), get.base);
        module.add_getter(name, move |state, input| base(state, &config, input));
    }
    let (c, sample) = (Arc::clone(config), get.sample);
    module.add_getter(config.local("sample"), move |state, n| sample(state, &c, n));
    let c = Arc::clone(config);
    module.add_getter(config.local("template"), move |_, _| {
        Ok(getters::template_value(&c))
    });
    let c = Arc::clone(config);
    module.add_getter(config.local("defaults"), move |_, _| {
        Ok(Value::Object(getters::defaults(&c)))
    });

    let mutate = mutations::factory(config);
    for (member, mutation) in [
        ("sync", mutate.sync),
        ("remove", mutate.remove),
        ("reset", mutate.reset),
        ("clear", mutate.clear),
    ] {
        let c = Arc::clone(config);
        module.add_mutation(config.local(member), move |state, payload| {
            mutation(state, &c, payload)
        });
    }

    // Relation and custom actions registered after CRUD replace it on a clash.
    let act = actions::factory(config);
    for (member, op) in [
        ("fetch", act.fetch),
        ("get", act.get),
        ("create", act.create),
        ("update", act.update),
        ("delete", act.delete),
    ] {
        let c = Arc::clone(config);
        module.add_action(
            config.local(member),
            Arc::new(move |ctx: Context, args: Vec<Value>| {
                let input = args.into_iter().next().unwrap_or(Value::Null);
                op(ctx, Arc::clone(&c), input)
            }),
        );
    }

    for (name, action) in relations::custom_actions(config) {
        module.add_action(name, action);
    }
    for (name, action) in relations::relation_actions(schema, config)? {
        module.add_action(name, action);
    }
    Ok(())
}

/// Handles to every registered model.
#[derive(Clone)]
pub struct Registry {
    store: Store,
    schemas: BTreeMap<String, Arc<Schema>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("schemas", &self.schemas.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Registry {
    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn schema(&self, namespace: Option<&str>) -> Option<&Schema> {
        self.schemas
            .get(namespace.unwrap_or_default())
            .map(Arc::as_ref)
    }

    /// A root model.
    pub fn model(&self, name: &str) -> Result<Model, Error> {
        self.lookup("", name)
    }

    /// A model of a named module.
    pub fn namespaced(&self, namespace: &str, name: &str) -> Result<Model, Error> {
        self.lookup(namespace, name)
    }

    fn lookup(&self, namespace: &str, name: &str) -> Result<Model, Error> {
        let unknown = || Error::UnknownModel {
            name: if namespace.is_empty() {
                name.to_string()
            } else {
                format!("{}/{}", namespace, name)
            },
        };
        let schema = self.schemas.get(namespace).ok_or_else(unknown)?;
        let config = schema.models.get(name).cloned().ok_or_else(unknown)?;
        Ok(Model::new(self.store.clone(), Arc::clone(schema), config))
    }
}
