//! Getters, mutations and actions generated for each model.
//!
//! Each submodule exposes a `factory` that picks the singleton or
//! collection variant of every construct once, at registration.

pub mod actions;
pub mod getters;
pub mod mutations;

use reflect_store::{ModuleState, Record, RecordId, Table};
use serde_json::Value;

use crate::config::ModelConfig;
use crate::error::Error;

pub type Context = reflect_store::Context<Error>;

/// Inputs that may be a single value or an array of them.
pub(crate) fn each(input: Value) -> Vec<Value> {
    match input {
        Value::Array(items) => items,
        other => vec![other],
    }
}

/// The id an input names: a bare id, or an object's `id` key.
pub(crate) fn id_of(config: &ModelConfig, input: &Value, operation: &'static str) -> Result<RecordId, Error> {
    match input {
        Value::Object(record) => {
            RecordId::of(record).ok_or_else(|| Error::missing_id(&config.name, operation))
        }
        Value::Null => Err(Error::missing_id(&config.name, operation)),
        other => {
            RecordId::from_value(other).ok_or_else(|| Error::invalid_input(&config.name, other.clone()))
        }
    }
}

pub(crate) fn into_record(config: &ModelConfig, input: Value) -> Result<Record, Error> {
    match input {
        Value::Object(record) => Ok(record),
        other => Err(Error::invalid_input(&config.name, other)),
    }
}

pub(crate) fn collection<'a>(
    state: &'a ModuleState,
    config: &ModelConfig,
) -> Result<&'a std::collections::BTreeMap<RecordId, Record>, Error> {
    match state.table(&config.name)? {
        Table::Collection(records) => Ok(records),
        Table::Singleton(_) => Err(Error::InvalidConfig {
            model: config.name.clone(),
            message: "expected a collection table".to_string(),
        }),
    }
}

pub(crate) fn collection_mut<'a>(
    state: &'a mut ModuleState,
    config: &ModelConfig,
) -> Result<&'a mut std::collections::BTreeMap<RecordId, Record>, Error> {
    match state.table_mut(&config.name)? {
        Table::Collection(records) => Ok(records),
        Table::Singleton(_) => Err(Error::InvalidConfig {
            model: config.name.clone(),
            message: "expected a collection table".to_string(),
        }),
    }
}
