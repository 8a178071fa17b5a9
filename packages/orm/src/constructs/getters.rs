//! Read-only views over a model's table.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use reflect_store::{ModuleState, RecordId};
use serde_json::Value;

use super::collection;
use crate::config::ModelConfig;
use crate::error::Error;

pub type GetterFn = fn(&ModuleState, &ModelConfig, Value) -> Result<Value, Error>;

pub struct Getters {
    pub base: GetterFn,
    pub sample: GetterFn,
}

pub fn factory(config: &ModelConfig) -> Getters {
    if config.singleton {
        Getters {
            base: singleton,
            sample: singleton,
        }
    } else {
        Getters {
            base: by_id,
            sample,
        }
    }
}

/// Collection lookup.
///
/// - null: every record, in id order
/// - id: that record, or null
/// - array of ids: one entry per id, null where absent
/// - object: not implemented
pub fn by_id(state: &ModuleState, config: &ModelConfig, input: Value) -> Result<Value, Error> {
    let records = collection(state, config)?;
    let lookup = |id: &Value| -> Value {
        RecordId::from_value(id)
            .and_then(|id| records.get(&id))
            .map(|record| Value::Object(record.clone()))
            .unwrap_or(Value::Null)
    };
    match &input {
        Value::Null => Ok(Value::Array(
            records.values().cloned().map(Value::Object).collect(),
        )),
        Value::Number(_) | Value::String(_) => Ok(lookup(&input)),
        Value::Array(ids) => Ok(Value::Array(ids.iter().map(lookup).collect())),
        Value::Object(_) => Err(Error::NotImplemented {
            feature: "object-shaped getter input",
        }),
        Value::Bool(_) => Err(Error::invalid_input(&config.name, input.clone())),
    }
}

/// `n` random records without repetition; a single record (or null) when
/// `n` is 1 or omitted.
pub fn sample(state: &ModuleState, config: &ModelConfig, input: Value) -> Result<Value, Error> {
    let n = match &input {
        Value::Null => 1,
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| Error::invalid_input(&config.name, input.clone()))? as usize,
        _ => return Err(Error::invalid_input(&config.name, input.clone())),
    };
    let records: Vec<&reflect_store::Record> = collection(state, config)?.values().collect();
    let mut rng = rand::thread_rng();
    let picked: Vec<Value> = records
        .choose_multiple(&mut rng, n)
        .map(|record| Value::Object((*record).clone()))
        .collect();
    if n == 1 {
        Ok(picked.into_iter().next().unwrap_or(Value::Null))
    } else {
        Ok(Value::Array(picked))
    }
}

/// The singleton record, whatever the input.
pub fn singleton(state: &ModuleState, config: &ModelConfig, _input: Value) -> Result<Value, Error> {
    let table = state.table(&config.name)?;
    Ok(table
        .records()
        .first()
        .map(|record| Value::Object((*record).clone()))
        .unwrap_or(Value::Null))
}

/// Every contract key mapped to its default, `None` where there is none.
pub fn template(config: &ModelConfig) -> BTreeMap<String, Option<Value>> {
    config
        .contract
        .iter()
        .map(|(key, spec)| (key.to_string(), spec.default.as_ref().map(|d| d.resolve())))
        .collect()
}

/// Only the keys that have a default.
pub fn defaults(config: &ModelConfig) -> reflect_store::Record {
    config.contract.defaults()
}

pub(crate) fn template_value(config: &ModelConfig) -> Value {
    Value::Object(
        template(config)
            .into_iter()
            .map(|(key, value)| (key, value.unwrap_or(Value::Null)))
            .collect(),
    )
}
