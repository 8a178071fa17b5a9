//! Model instances.
//!
//! An [`Entity`] keeps a local working copy of its fields. Assignments only
//! touch that copy; [`Entity::commit`] sends it to the API and
//! [`Entity::sync`] pulls the cached record back into it. The cached record
//! itself is reachable read-only through [`Entity::mirror`].

use std::collections::BTreeMap;
use std::fmt;

use reflect_store::{Record, RecordId};
use serde_json::{json, Value};
use tracing::debug;

use crate::config::ActionSpec;
use crate::contract::ContractError;
use crate::error::Error;
use crate::model::Model;

/// A local field value: plain JSON or a nested instance of another model.
#[derive(Clone, Debug)]
pub enum FieldValue {
    Value(Value),
    Entity(Box<Entity>),
}

impl FieldValue {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            FieldValue::Value(value) => Some(value),
            FieldValue::Entity(_) => None,
        }
    }

    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            FieldValue::Entity(entity) => Some(entity),
            FieldValue::Value(_) => None,
        }
    }

    /// The id this value refers to: a nested instance's id, a placeholder's
    /// `id`, or a bare id.
    pub fn id(&self) -> Option<RecordId> {
        match self {
            FieldValue::Entity(entity) => entity.id().cloned(),
            FieldValue::Value(Value::Object(record)) => RecordId::of(record),
            FieldValue::Value(value) => RecordId::from_value(value),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Value(value) => value.clone(),
            FieldValue::Entity(entity) => Value::Object(entity.to_json()),
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        FieldValue::Value(value)
    }
}

impl From<Entity> for FieldValue {
    fn from(entity: Entity) -> Self {
        FieldValue::Entity(Box::new(entity))
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Value(Value::from(value))
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Value(Value::from(value))
    }
}

/// What a name resolves to on an instance, in lookup order.
pub enum Member<'a> {
    Field(&'a FieldValue),
    Relation(RelationAccessor),
    Action(ActionAccessor<'a>),
    /// Not a field, relation or action; use the instance's methods.
    Unknown,
}

#[derive(Clone)]
pub struct Entity {
    model: Model,
    id: Option<RecordId>,
    local: BTreeMap<String, FieldValue>,
}

impl Entity {
    /// Seed from contract defaults, then overlay `data` with wire-name
    /// remapping and nested model coercion.
    pub(crate) fn new(model: Model, data: Record) -> Result<Self, Error> {
        Self::seed(model, data, true)
    }

    /// A nested instance. Its own model-typed fields keep the values they
    /// were given, so cyclic references in the cache end here.
    fn reference(model: Model, data: Record) -> Result<Self, Error> {
        Self::seed(model, data, false)
    }

    fn seed(model: Model, data: Record, coerce: bool) -> Result<Self, Error> {
        let local = model
            .config()
            .contract
            .defaults()
            .into_iter()
            .map(|(key, value)| (key, FieldValue::Value(value)))
            .collect();
        let mut entity = Self {
            model,
            id: None,
            local,
        };
        for (key, value) in data {
            if key == "id" {
                entity.id = RecordId::from_value(&value);
            } else {
                entity.assign_with(&key, FieldValue::Value(value), coerce)?;
            }
        }
        Ok(entity)
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn id(&self) -> Option<&RecordId> {
        self.id.as_ref()
    }

    /// Set the id. Allowed while unset or to the same value.
    pub fn set_id(&mut self, id: Option<RecordId>) -> Result<&mut Self, Error> {
        if let (Some(current), Some(requested)) = (&self.id, &id) {
            if current != requested {
                return Err(Error::IdChange {
                    model: self.model.name().to_string(),
                    current: current.clone(),
                    requested: requested.clone(),
                });
            }
        }
        self.id = id;
        Ok(self)
    }

    /// The local value of a field.
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.local.get(key)
    }

    /// The local value of a field as JSON; `id` included.
    pub fn value(&self, key: &str) -> Option<Value> {
        if key == "id" {
            return self.id.as_ref().map(RecordId::to_value);
        }
        self.local.get(key).map(FieldValue::to_json)
    }

    /// Assign a field in the local copy. Assigning `id` goes through
    /// [`Entity::set_id`].
    pub fn set(&mut self, key: &str, value: impl Into<FieldValue>) -> Result<&mut Self, Error> {
        let value = value.into();
        if key == "id" {
            let id = value.id();
            return self.set_id(id);
        }
        self.assign(key, value)?;
        Ok(self)
    }

    /// Remove a field from the local copy.
    pub fn unset(&mut self, key: &str) -> Option<FieldValue> {
        self.local.remove(key)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.local.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Resolve a name: local field, then relation, then action.
    pub fn member(&mut self, name: &str) -> Member<'_> {
        if self.local.contains_key(name) {
            return Member::Field(&self.local[name]);
        }
        if self.model.config().relations.contains_key(name) {
            return match self.relation(name) {
                Ok(relation) => Member::Relation(relation),
                Err(_) => Member::Unknown,
            };
        }
        let spec = self.model.config().actions.get(name).cloned();
        match spec {
            Some(spec) => Member::Action(ActionAccessor {
                entity: self,
                name: name.to_string(),
                spec,
            }),
            None => Member::Unknown,
        }
    }

    pub fn relation(&self, name: &str) -> Result<RelationAccessor, Error> {
        let relation = self
            .model
            .config()
            .relations
            .get(name)
            .ok_or_else(|| Error::UnknownRelation {
                model: self.model.name().to_string(),
                relation: name.to_string(),
            })?;
        Ok(RelationAccessor {
            owner: self.model.clone(),
            target: self.model.related(&relation.model)?,
            name: name.to_string(),
            id: self.id.clone(),
        })
    }

    pub fn action(&mut self, name: &str) -> Result<ActionAccessor<'_>, Error> {
        let spec = self
            .model
            .config()
            .actions
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownAction {
                model: self.model.name().to_string(),
                action: name.to_string(),
            })?;
        Ok(ActionAccessor {
            entity: self,
            name: name.to_string(),
            spec,
        })
    }

    /// Read-only view of the cached record for this instance.
    pub fn mirror(&self) -> Mirror {
        Mirror {
            model: self.model.clone(),
            id: self.id.clone(),
        }
    }

    /// Local copy as JSON, nested instances expanded.
    pub fn to_json(&self) -> Record {
        let mut record: Record = self
            .local
            .iter()
            .map(|(key, value)| (key.clone(), value.to_json()))
            .collect();
        if let Some(id) = &self.id {
            record.insert("id".to_string(), id.to_value());
        }
        record
    }

    /// Create (no id yet) or update through the API, then merge the
    /// response into the local copy.
    pub async fn commit(&mut self) -> Result<&mut Self, Error> {
        let payload = self.to_json();
        let operation = if self.model.is_singleton() || self.id.is_some() {
            "update"
        } else {
            "create"
        };
        debug!(model = %self.model.name(), operation, "commit");
        let data = self
            .model
            .dispatch(operation, vec![Value::Object(payload)])
            .await?;
        if let Value::Object(record) = data {
            self.update(record)?;
        }
        Ok(self)
    }

    /// Delete through the API; the cache entry goes too.
    pub async fn delete(&mut self) -> Result<(), Error> {
        if self.model.is_singleton() {
            self.model.dispatch("delete", Vec::new()).await?;
            return Ok(());
        }
        let id = self
            .id
            .clone()
            .ok_or_else(|| Error::missing_id(self.model.name(), "delete"))?;
        self.model.dispatch("delete", vec![id.to_value()]).await?;
        self.id = None;
        Ok(())
    }

    /// Drop the cache entry only.
    pub fn remove(&mut self) -> Result<&mut Self, Error> {
        if self.model.is_singleton() {
            self.model.commit("remove", Value::Null)?;
        } else if let Some(id) = &self.id {
            self.model.commit("remove", id.to_value())?;
        }
        Ok(self)
    }

    /// Merge `data` into the local copy, assigning only changed fields.
    pub fn update(&mut self, data: Record) -> Result<&mut Self, Error> {
        for (key, value) in data {
            if key == "id" {
                self.set_id(RecordId::from_value(&value))?;
                continue;
            }
            let unchanged = matches!(self.local.get(&key), Some(FieldValue::Value(current)) if *current == value);
            if !unchanged {
                self.assign(&key, FieldValue::Value(value))?;
            }
        }
        Ok(self)
    }

    /// Pull the cached record into every field of the local copy. Fields
    /// the cache lacks are dropped.
    pub fn sync(&mut self) -> Result<&mut Self, Error> {
        let Some(record) = self.mirror().record()? else {
            return Ok(self);
        };
        let keys: Vec<String> = self.local.keys().cloned().collect();
        for key in keys {
            match record.get(&key) {
                Some(value) => self.assign(&key, FieldValue::Value(value.clone()))?,
                None if self.rewired(&key, &record) => {}
                None => {
                    self.local.remove(&key);
                }
            }
        }
        Ok(self)
    }

    /// Whether `key` is filled in from its wire name in `record`.
    fn rewired(&self, key: &str, record: &Record) -> bool {
        self.model
            .config()
            .remap
            .iter()
            .any(|(wire, canonical)| canonical == key && record.contains_key(wire))
    }

    fn assign(&mut self, key: &str, value: FieldValue) -> Result<(), Error> {
        self.assign_with(key, value, true)
    }

    fn assign_with(&mut self, key: &str, value: FieldValue, coerce: bool) -> Result<(), Error> {
        let config = self.model.config_arc();
        let key = match config.remap.get(key) {
            Some(canonical) => {
                self.local.insert(key.to_string(), value.clone());
                canonical.as_str()
            }
            None => key,
        };
        let value = match config.contract.get(key).and_then(|spec| spec.model.as_deref()) {
            Some(target) if coerce => self.coerce(key, target, value)?,
            _ => value,
        };
        self.local.insert(key.to_string(), value);
        Ok(())
    }

    /// Resolve a value of a model-typed field into a nested instance or a
    /// `{id}` placeholder.
    fn coerce(&self, key: &str, target: &str, value: FieldValue) -> Result<FieldValue, Error> {
        let record = match value {
            FieldValue::Value(Value::Object(record)) => record,
            FieldValue::Value(value @ (Value::Number(_) | Value::String(_))) => {
                return self.resolve(target, value);
            }
            other => return Ok(other),
        };
        let id = match record.get("id") {
            Some(id) if !id.is_null() => id.clone(),
            _ => {
                return Err(Error::contract(
                    self.model.name(),
                    ContractError::NestedId {
                        key: key.to_string(),
                    },
                ))
            }
        };
        if record.len() == 1 {
            self.resolve(target, id)
        } else {
            let target = self.model.related(target)?;
            Ok(FieldValue::Entity(Box::new(Entity::reference(target, record)?)))
        }
    }

    /// A cached instance for `id`, or a placeholder.
    fn resolve(&self, target: &str, id: Value) -> Result<FieldValue, Error> {
        let target = self.model.related(target)?;
        let cached = match RecordId::from_value(&id) {
            Some(id) => target.lookup(&id)?,
            None => None,
        };
        match cached {
            Some(record) => Ok(FieldValue::Entity(Box::new(Entity::reference(target, record)?))),
            None => Ok(FieldValue::Value(json!({ "id": id }))),
        }
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("model", &self.model.name())
            .field("id", &self.id)
            .field("fields", &self.to_json())
            .finish()
    }
}

/// Read-only view of an instance's cached record, read at access time.
pub struct Mirror {
    model: Model,
    id: Option<RecordId>,
}

impl Mirror {
    pub fn record(&self) -> Result<Option<Record>, Error> {
        if self.model.is_singleton() {
            return match self.model.getter(None, Value::Null)? {
                Value::Object(record) => Ok(Some(record)),
                _ => Ok(None),
            };
        }
        match &self.id {
            Some(id) => self.model.lookup(id),
            None => Ok(None),
        }
    }

    pub fn get(&self, field: &str) -> Result<Option<Value>, Error> {
        Ok(self.record()?.and_then(|mut record| record.remove(field)))
    }

    /// Always fails: the cache is written only by mutations.
    pub fn set(&self, field: &str, _value: Value) -> Result<(), Error> {
        Err(Error::ReadOnlyMirror {
            model: self.model.name().to_string(),
            field: field.to_string(),
        })
    }
}

/// Operations on one relation of one instance. Results are instances of
/// the relation's target model.
pub struct RelationAccessor {
    owner: Model,
    target: Model,
    name: String,
    id: Option<RecordId>,
}

impl RelationAccessor {
    pub fn target(&self) -> &Model {
        &self.target
    }

    async fn dispatch(&self, method: &str, data: Option<Value>) -> Result<Value, Error> {
        let id = self
            .id
            .clone()
            .ok_or_else(|| Error::missing_id(self.owner.name(), "relation"))?;
        let mut args = vec![id.to_value()];
        args.extend(data);
        self.owner
            .dispatch(&format!("{}.{}", self.name, method), args)
            .await
    }

    pub async fn fetch(&self) -> Result<Vec<Entity>, Error> {
        let data = self.dispatch("fetch", None).await?;
        self.target.entities(data)
    }

    pub async fn get(&self) -> Result<Vec<Entity>, Error> {
        let data = self.dispatch("get", None).await?;
        self.target.entities(data)
    }

    pub async fn create(&self, data: Record) -> Result<Option<Entity>, Error> {
        let data = self.dispatch("create", Some(Value::Object(data))).await?;
        self.target.entity(data)
    }

    pub async fn update(&self, data: Record) -> Result<Option<Entity>, Error> {
        let data = self.dispatch("update", Some(Value::Object(data))).await?;
        self.target.entity(data)
    }

    pub async fn delete(&self, id: impl Into<RecordId>) -> Result<(), Error> {
        self.dispatch("delete", Some(id.into().to_value())).await?;
        Ok(())
    }
}

/// A custom action bound to one instance.
pub struct ActionAccessor<'a> {
    entity: &'a mut Entity,
    name: String,
    spec: ActionSpec,
}

impl ActionAccessor<'_> {
    pub fn methods(&self) -> Vec<String> {
        self.spec.method_names()
    }

    /// Call the action's only method. Fails, naming the methods, when
    /// there is more than one.
    pub async fn call(self, body: Option<Value>) -> Result<Value, Error> {
        let only = match self.spec.methods.as_slice() {
            [only] => Some(only.name.clone()),
            _ => None,
        };
        match only {
            Some(method) => self.invoke(&method, body).await,
            None => Err(Error::AmbiguousAction {
                model: self.entity.model.name().to_string(),
                action: self.name.clone(),
                methods: self.spec.method_names(),
            }),
        }
    }

    /// Call one method of the action. With `refresh`, the instance is
    /// synced from the re-fetched record afterwards.
    pub async fn invoke(self, method: &str, body: Option<Value>) -> Result<Value, Error> {
        let model = self.entity.model.clone();
        if self.spec.method(method).is_none() {
            return Err(Error::UnknownMethod {
                model: model.name().to_string(),
                action: self.name,
                method: method.to_string(),
            });
        }
        let id = self
            .entity
            .id
            .clone()
            .ok_or_else(|| Error::missing_id(model.name(), "nested action"))?;
        let data = model
            .dispatch(
                &format!("{}.{}", self.name, method),
                vec![id.to_value(), body.unwrap_or(Value::Null)],
            )
            .await?;
        if self.spec.refresh {
            self.entity.sync()?;
        }
        Ok(data)
    }
}
