//! Handles to registered models.
//!
//! A [`Model`] is the class-level surface: build instances, query the local
//! cache, and run the generated operations by name.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use reflect_store::{Record, RecordId};
use serde_json::Value;

use crate::config::ModelConfig;
use crate::entity::Entity;
use crate::error::Error;
use crate::query::Query;

pub type Store = reflect_store::Store<Error>;

/// The models registered in one namespace.
pub struct Schema {
    pub(crate) namespace: Option<String>,
    pub(crate) models: BTreeMap<String, Arc<ModelConfig>>,
}

impl Schema {
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }
}

#[derive(Clone)]
pub struct Model {
    store: Store,
    schema: Arc<Schema>,
    config: Arc<ModelConfig>,
}

impl Model {
    pub(crate) fn new(store: Store, schema: Arc<Schema>, config: Arc<ModelConfig>) -> Self {
        Self {
            store,
            schema,
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub(crate) fn config_arc(&self) -> Arc<ModelConfig> {
        Arc::clone(&self.config)
    }

    pub fn is_singleton(&self) -> bool {
        self.config.singleton
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Another model of the same namespace.
    pub fn related(&self, name: &str) -> Result<Model, Error> {
        let config = self
            .schema
            .models
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownModel {
                name: name.to_string(),
            })?;
        Ok(Model::new(self.store.clone(), Arc::clone(&self.schema), config))
    }

    /// Read a getter of this model; `None` is the base getter.
    pub fn getter(&self, member: Option<&str>, input: Value) -> Result<Value, Error> {
        self.store.get(&self.config.qualified(member), input)
    }

    pub fn commit(&self, member: &str, payload: Value) -> Result<(), Error> {
        self.store.commit(&self.config.qualified(Some(member)), payload)
    }

    pub fn dispatch(&self, member: &str, args: Vec<Value>) -> BoxFuture<'static, Result<Value, Error>> {
        self.store.dispatch(&self.config.qualified(Some(member)), args)
    }

    /// The cached record for `id`, if any.
    pub fn lookup(&self, id: &RecordId) -> Result<Option<Record>, Error> {
        match self.getter(Some("one"), id.to_value())? {
            Value::Object(record) => Ok(Some(record)),
            _ => Ok(None),
        }
    }

    /// A new, unsaved instance seeded from `data`.
    pub fn build(&self, data: Record) -> Result<Entity, Error> {
        Entity::new(self.clone(), data)
    }

    /// The instance of a singleton model, seeded from its cached record.
    pub fn instance(&self) -> Result<Entity, Error> {
        if !self.is_singleton() {
            return Err(Error::InvalidConfig {
                model: self.name().to_string(),
                message: "instance() is only available on singleton models".to_string(),
            });
        }
        let record = match self.getter(None, Value::Null)? {
            Value::Object(record) => record,
            _ => Record::new(),
        };
        Entity::new(self.clone(), record)
    }

    /// A query over every cached record.
    pub fn query(&self) -> Result<Query, Error> {
        if self.is_singleton() {
            return Err(Error::SingletonQuery {
                model: self.name().to_string(),
            });
        }
        let records = match self.getter(Some("all"), Value::Null)? {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(record) => Some(record),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };
        Ok(Query::new(self.clone(), records))
    }

    pub fn find(&self, id: impl Into<RecordId>) -> Result<Option<Entity>, Error> {
        match self.lookup(&id.into())? {
            Some(record) => Ok(Some(self.build(record)?)),
            None => Ok(None),
        }
    }

    pub fn find_many<I>(&self, ids: I) -> Result<Vec<Option<Entity>>, Error>
    where
        I: IntoIterator,
        I::Item: Into<RecordId>,
    {
        ids.into_iter().map(|id| self.find(id)).collect()
    }

    /// Fetch from the API into the cache, returning the fetched instances.
    pub async fn fetch(&self) -> Result<Vec<Entity>, Error> {
        let data = self.dispatch("fetch", Vec::new()).await?;
        if self.is_singleton() {
            return Ok(vec![self.instance()?]);
        }
        self.entities(data)
    }

    /// Fetch one record from the API. Singletons ignore the id.
    pub async fn get(&self, id: impl Into<RecordId>) -> Result<Option<Entity>, Error> {
        let id = id.into();
        if self.is_singleton() {
            self.dispatch("get", Vec::new()).await?;
            return Ok(Some(self.instance()?));
        }
        let data = self.dispatch("get", vec![id.to_value()]).await?;
        self.entity(data)
    }

    /// Drop every cached record without touching the API.
    pub fn clear(&self) -> Result<(), Error> {
        self.commit("clear", Value::Null)
    }

    /// Every contract key with its default, null where there is none.
    pub fn template(&self) -> Result<Record, Error> {
        match self.getter(Some("template"), Value::Null)? {
            Value::Object(record) => Ok(record),
            _ => Ok(Record::new()),
        }
    }

    pub fn defaults(&self) -> Result<Record, Error> {
        match self.getter(Some("defaults"), Value::Null)? {
            Value::Object(record) => Ok(record),
            _ => Ok(Record::new()),
        }
    }

    /// `n` distinct random cached instances.
    pub fn sample(&self, n: usize) -> Result<Vec<Entity>, Error> {
        let data = self.getter(Some("sample"), Value::from(n as u64))?;
        self.entities(data)
    }

    /// Wrap a getter or action result: arrays become many instances,
    /// objects one.
    pub(crate) fn entities(&self, data: Value) -> Result<Vec<Entity>, Error> {
        match data {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(record) => Some(self.build(record)),
                    _ => None,
                })
                .collect(),
            Value::Object(record) => Ok(vec![self.build(record)?]),
            _ => Ok(Vec::new()),
        }
    }

    pub(crate) fn entity(&self, data: Value) -> Result<Option<Entity>, Error> {
        match data {
            Value::Object(record) => Ok(Some(self.build(record)?)),
            _ => Ok(None),
        }
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.config.name)
            .field("namespace", &self.config.namespace)
            .finish()
    }
}
