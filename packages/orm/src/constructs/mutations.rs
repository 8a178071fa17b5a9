//! State transitions for a model's table.
//!
//! `sync` and `reset` impute contract defaults, so a record in the store
//! always carries every defaulted key.

use reflect_store::{ModuleState, Record, RecordId, Table};
use serde_json::Value;

use super::{collection_mut, each, id_of, into_record};
use crate::config::ModelConfig;
use crate::error::Error;

pub type MutationFn = fn(&mut ModuleState, &ModelConfig, Value) -> Result<(), Error>;

pub struct Mutations {
    pub sync: MutationFn,
    pub remove: MutationFn,
    pub reset: MutationFn,
    pub clear: MutationFn,
}

pub fn factory(config: &ModelConfig) -> Mutations {
    if config.singleton {
        Mutations {
            sync: sync_singleton,
            remove: reset_singleton,
            reset: reset_singleton,
            clear: reset_singleton,
        }
    } else {
        Mutations {
            sync: sync_records,
            remove: remove_records,
            reset: reset_records,
            clear: clear_records,
        }
    }
}

/// Merge one record or an array of records into the table.
///
/// Each merged record is `defaults`, then the stored record, then the
/// incoming one. Every incoming record needs an id.
pub fn sync_records(state: &mut ModuleState, config: &ModelConfig, data: Value) -> Result<(), Error> {
    let incoming = each(data)
        .into_iter()
        .map(|item| {
            let record = into_record(config, item)?;
            let id = RecordId::of(&record).ok_or_else(|| Error::missing_id(&config.name, "sync"))?;
            Ok((id, record))
        })
        .collect::<Result<Vec<_>, Error>>()?;

    let defaults = config.contract.defaults();
    let records = collection_mut(state, config)?;
    for (id, record) in incoming {
        let mut merged = defaults.clone();
        if let Some(existing) = records.remove(&id) {
            merged.extend(existing);
        }
        merged.extend(record);
        records.insert(id, merged);
    }
    Ok(())
}

/// Drop records by id, by record, or by an array of either.
pub fn remove_records(state: &mut ModuleState, config: &ModelConfig, data: Value) -> Result<(), Error> {
    let ids = each(data)
        .iter()
        .map(|item| id_of(config, item, "remove"))
        .collect::<Result<Vec<_>, Error>>()?;
    let records = collection_mut(state, config)?;
    for id in ids {
        records.remove(&id);
    }
    Ok(())
}

/// Replace records with their id plus contract defaults.
pub fn reset_records(state: &mut ModuleState, config: &ModelConfig, data: Value) -> Result<(), Error> {
    let ids = each(data)
        .iter()
        .map(|item| id_of(config, item, "reset"))
        .collect::<Result<Vec<_>, Error>>()?;
    let defaults = config.contract.defaults();
    let records = collection_mut(state, config)?;
    for id in ids {
        let mut record = Record::new();
        record.insert("id".to_string(), id.to_value());
        record.extend(defaults.clone());
        records.insert(id, record);
    }
    Ok(())
}

pub fn clear_records(state: &mut ModuleState, config: &ModelConfig, _data: Value) -> Result<(), Error> {
    collection_mut(state, config)?.clear();
    Ok(())
}

/// Merge `data` into the single record. A null payload only imputes
/// defaults.
pub fn sync_singleton(state: &mut ModuleState, config: &ModelConfig, data: Value) -> Result<(), Error> {
    let incoming = match data {
        Value::Null => Record::new(),
        other => into_record(config, other)?,
    };
    let table = state.table_mut(&config.name)?;
    let mut merged = config.contract.defaults();
    if let Table::Singleton(Some(existing)) = table {
        merged.extend(existing.clone());
    }
    merged.extend(incoming);
    *table = Table::Singleton(Some(merged));
    Ok(())
}

/// Singleton remove, reset and clear: back to contract defaults.
pub fn reset_singleton(state: &mut ModuleState, config: &ModelConfig, _data: Value) -> Result<(), Error> {
    *state.table_mut(&config.name)? = Table::Singleton(Some(config.contract.defaults()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModelDefinition, Options};
    use crate::constructs::getters;
    use crate::contract::FieldSpec;
    use pretty_assertions::assert_eq;
    use reflect_http::mock::MockTransport;
    use serde_json::json;

    fn config(singleton: bool) -> ModelConfig {
        let mut def = ModelDefinition::new()
            .field("title", FieldSpec::new().with_default(json!("Untitled")))
            .field("body", FieldSpec::new());
        if singleton {
            def = def.singleton();
        }
        let options = Options::new().with_transport(MockTransport::new());
        ModelConfig::resolve("posts", None, def, &options).unwrap()
    }

    fn state(singleton: bool) -> ModuleState {
        let mut state = ModuleState::new();
        let table = if singleton {
            Table::singleton(None)
        } else {
            Table::collection()
        };
        state.insert_table("posts", table);
        state
    }

    #[test]
    fn sync_merges_and_imputes_defaults() {
        let config = config(false);
        let mut state = state(false);
        sync_records(&mut state, &config, json!({"id": 1, "body": "a"})).unwrap();
        sync_records(&mut state, &config, json!([{"id": 1, "title": "T"}, {"id": 2}])).unwrap();

        assert_eq!(
            getters::by_id(&state, &config, Value::Null).unwrap(),
            json!([
                {"id": 1, "title": "T", "body": "a"},
                {"id": 2, "title": "Untitled"},
            ])
        );
    }

    #[test]
    fn sync_without_id_fails() {
        let config = config(false);
        let mut state = state(false);
        let err = sync_records(&mut state, &config, json!({"title": "x"})).unwrap_err();
        assert!(matches!(err, Error::MissingId { operation: "sync", .. }));
    }

    #[test]
    fn remove_accepts_ids_records_and_arrays() {
        let config = config(false);
        let mut state = state(false);
        sync_records(&mut state, &config, json!([{"id": 1}, {"id": 2}, {"id": 3}, {"id": 4}])).unwrap();

        remove_records(&mut state, &config, json!(1)).unwrap();
        remove_records(&mut state, &config, json!({"id": 2})).unwrap();
        remove_records(&mut state, &config, json!([3, 99])).unwrap();

        let ids: Vec<Value> = getters::by_id(&state, &config, Value::Null)
            .unwrap()
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["id"].clone())
            .collect();
        assert_eq!(ids, vec![json!(4)]);
    }

    #[test]
    fn reset_replaces_with_defaults() {
        let config = config(false);
        let mut state = state(false);
        sync_records(&mut state, &config, json!({"id": 1, "title": "T", "body": "b"})).unwrap();
        reset_records(&mut state, &config, json!(1)).unwrap();
        assert_eq!(
            getters::by_id(&state, &config, json!(1)).unwrap(),
            json!({"id": 1, "title": "Untitled"})
        );
    }

    #[test]
    fn clear_empties_the_table() {
        let config = config(false);
        let mut state = state(false);
        sync_records(&mut state, &config, json!([{"id": 1}, {"id": 2}])).unwrap();
        clear_records(&mut state, &config, Value::Null).unwrap();
        assert_eq!(getters::by_id(&state, &config, Value::Null).unwrap(), json!([]));
    }

    #[test]
    fn singleton_sync_and_reset() {
        let config = config(true);
        let mut state = state(true);
        sync_singleton(&mut state, &config, json!({"body": "b"})).unwrap();
        assert_eq!(
            getters::singleton(&state, &config, Value::Null).unwrap(),
            json!({"title": "Untitled", "body": "b"})
        );

        sync_singleton(&mut state, &config, json!({"title": "T"})).unwrap();
        assert_eq!(
            getters::singleton(&state, &config, Value::Null).unwrap(),
            json!({"title": "T", "body": "b"})
        );

        reset_singleton(&mut state, &config, Value::Null).unwrap();
        assert_eq!(
            getters::singleton(&state, &config, Value::Null).unwrap(),
            json!({"title": "Untitled"})
        );
    }
}
