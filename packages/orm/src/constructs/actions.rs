//! The five generated network operations.
//!
//! Every operation resolves its endpoint before touching the network, so a
//! missing endpoint fails without a request. Responses go through
//! [`pull_format`] and are committed with the model's `sync` mutation; the
//! result is read back through the model's getter.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use reflect_http::Method;
use reflect_store::{Record, RecordId};
use serde_json::Value;
use tracing::debug;

use super::{id_of, into_record, Context};
use crate::config::{ModelConfig, Operation};
use crate::contract::{pull_format, push_format};
use crate::error::Error;

pub type ActionFn =
    fn(Context, Arc<ModelConfig>, Value) -> BoxFuture<'static, Result<Value, Error>>;

pub struct Actions {
    pub fetch: ActionFn,
    pub get: ActionFn,
    pub create: ActionFn,
    pub update: ActionFn,
    pub delete: ActionFn,
}

pub fn factory(config: &ModelConfig) -> Actions {
    if config.singleton {
        Actions {
            fetch: fetch_singleton,
            get: fetch_singleton,
            create: create_record,
            update: update_singleton,
            delete: delete_singleton,
        }
    } else {
        Actions {
            fetch: fetch_collection,
            get: get_record,
            create: create_record,
            update: update_record,
            delete: delete_record,
        }
    }
}

fn pull(config: &ModelConfig, data: Value) -> Result<Record, Error> {
    Ok(pull_format(&config.contract, &into_record(config, data)?))
}

fn push(config: &ModelConfig, data: &Record) -> Result<Value, Error> {
    push_format(&config.contract, data)
        .map(Value::Object)
        .map_err(|source| Error::contract(&config.name, source))
}

/// Commit one response record and return the id it was stored under.
fn store(ctx: &Context, config: &ModelConfig, data: Value) -> Result<Value, Error> {
    let record = pull(config, data)?;
    let id = record.get("id").cloned().unwrap_or(Value::Null);
    ctx.commit(&config.local("sync"), Value::Object(record))?;
    Ok(id)
}

/// GET the collection; arrays are synced in one commit.
pub fn fetch_collection(
    ctx: Context,
    config: Arc<ModelConfig>,
    _input: Value,
) -> BoxFuture<'static, Result<Value, Error>> {
    async move {
        let endpoint = config.endpoint(Operation::Fetch)?;
        debug!(model = %config.name, "fetch");
        let data = endpoint.call(&config.options, Method::GET, None, None).await?;
        match data {
            Value::Array(items) => {
                let records = items
                    .into_iter()
                    .map(|item| pull(&config, item))
                    .collect::<Result<Vec<_>, Error>>()?;
                let ids: Vec<Value> = records
                    .iter()
                    .map(|record| record.get("id").cloned().unwrap_or(Value::Null))
                    .collect();
                ctx.commit(
                    &config.local("sync"),
                    Value::Array(records.into_iter().map(Value::Object).collect()),
                )?;
                ctx.get(&config.name, Value::Array(ids))
            }
            other => {
                let id = store(&ctx, &config, other)?;
                ctx.get(&config.name, id)
            }
        }
    }
    .boxed()
}

pub fn fetch_singleton(
    ctx: Context,
    config: Arc<ModelConfig>,
    _input: Value,
) -> BoxFuture<'static, Result<Value, Error>> {
    async move {
        let endpoint = config.endpoint(Operation::Fetch)?;
        debug!(model = %config.name, "fetch");
        let data = endpoint.call(&config.options, Method::GET, None, None).await?;
        store(&ctx, &config, data)?;
        ctx.get(&config.name, Value::Null)
    }
    .boxed()
}

/// GET one record by id.
pub fn get_record(
    ctx: Context,
    config: Arc<ModelConfig>,
    input: Value,
) -> BoxFuture<'static, Result<Value, Error>> {
    async move {
        let id = id_of(&config, &input, "get")?;
        let endpoint = config.endpoint(Operation::Get)?;
        debug!(model = %config.name, id = %id, "get");
        let data = endpoint
            .call(&config.options, Method::GET, Some(&id), None)
            .await?;
        store(&ctx, &config, data)?;
        ctx.get(&config.name, id.to_value())
    }
    .boxed()
}

/// POST a new record. The payload goes through the contract first.
pub fn create_record(
    ctx: Context,
    config: Arc<ModelConfig>,
    input: Value,
) -> BoxFuture<'static, Result<Value, Error>> {
    async move {
        let endpoint = config.endpoint(Operation::Create)?;
        let record = into_record(&config, input)?;
        let payload = push(&config, &record)?;
        debug!(model = %config.name, "create");
        let data = endpoint
            .call(&config.options, Method::POST, None, Some(payload))
            .await?;
        let id = store(&ctx, &config, data)?;
        ctx.get(&config.name, id)
    }
    .boxed()
}

/// PUT an existing record. The input must carry its id.
pub fn update_record(
    ctx: Context,
    config: Arc<ModelConfig>,
    input: Value,
) -> BoxFuture<'static, Result<Value, Error>> {
    async move {
        let record = into_record(&config, input)?;
        let id = RecordId::of(&record).ok_or_else(|| Error::missing_id(&config.name, "update"))?;
        let endpoint = config.endpoint(Operation::Update)?;
        let payload = push(&config, &record)?;
        debug!(model = %config.name, id = %id, "update");
        let data = endpoint
            .call(&config.options, Method::PUT, Some(&id), Some(payload))
            .await?;
        let stored = store(&ctx, &config, data)?;
        let id = if stored.is_null() { id.to_value() } else { stored };
        ctx.get(&config.name, id)
    }
    .boxed()
}

pub fn update_singleton(
    ctx: Context,
    config: Arc<ModelConfig>,
    input: Value,
) -> BoxFuture<'static, Result<Value, Error>> {
    async move {
        let endpoint = config.endpoint(Operation::Update)?;
        let record = into_record(&config, input)?;
        let payload = push(&config, &record)?;
        debug!(model = %config.name, "update");
        let data = endpoint
            .call(&config.options, Method::PUT, None, Some(payload))
            .await?;
        store(&ctx, &config, data)?;
        ctx.get(&config.name, Value::Null)
    }
    .boxed()
}

/// DELETE one record, then drop it from the store.
pub fn delete_record(
    ctx: Context,
    config: Arc<ModelConfig>,
    input: Value,
) -> BoxFuture<'static, Result<Value, Error>> {
    async move {
        let id = id_of(&config, &input, "delete")?;
        let endpoint = config.endpoint(Operation::Delete)?;
        debug!(model = %config.name, id = %id, "delete");
        endpoint
            .call(&config.options, Method::DELETE, Some(&id), None)
            .await?;
        ctx.commit(&config.local("remove"), id.to_value())?;
        Ok(Value::Null)
    }
    .boxed()
}

/// DELETE the singleton, then reset it to defaults.
pub fn delete_singleton(
    ctx: Context,
    config: Arc<ModelConfig>,
    _input: Value,
) -> BoxFuture<'static, Result<Value, Error>> {
    async move {
        let endpoint = config.endpoint(Operation::Delete)?;
        debug!(model = %config.name, "delete");
        endpoint
            .call(&config.options, Method::DELETE, None, None)
            .await?;
        ctx.commit(&config.local("reset"), Value::Null)?;
        Ok(Value::Null)
    }
    .boxed()
}
