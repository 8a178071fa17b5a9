//! Actions for related models and custom nested endpoints.
//!
//! Relation actions reuse the target model's collection operations, with
//! every endpoint replaced by the relation URL for one owner id. They are
//! registered as `<model>.<relation>.<method>` and take `[owner_id, data]`.
//!
//! Custom actions are registered as `<model>.<action>.<method>` and take
//! `[id, body]`. An action with exactly one method is also registered as
//! `<model>.<action>`.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::{self, FutureExt};
use reflect_store::{Action, RecordId};
use serde_json::Value;
use tracing::debug;

use crate::config::{ActionMethod, ModelConfig};
use crate::constructs::actions::{self, ActionFn};
use crate::constructs::Context;
use crate::error::Error;

/// Methods every relation gets, and the collection operation behind each.
const RELATION_METHODS: [(&str, ActionFn); 5] = [
    ("fetch", actions::fetch_collection),
    ("get", actions::fetch_collection),
    ("create", actions::create_record),
    ("update", actions::update_record),
    ("delete", actions::delete_record),
];

/// The id an owner argument names: a bare id or an object with an `id`.
fn owner_id(value: Option<&Value>) -> Option<RecordId> {
    match value? {
        Value::Object(record) => RecordId::of(record),
        other => RecordId::from_value(other),
    }
}

pub fn relation_actions(
    schema: &BTreeMap<String, Arc<ModelConfig>>,
    config: &ModelConfig,
) -> Result<BTreeMap<String, Action<Error>>, Error> {
    let mut methods = BTreeMap::new();
    for (name, relation) in &config.relations {
        let target = schema
            .get(&relation.model)
            .cloned()
            .ok_or_else(|| Error::InvalidConfig {
                model: config.name.clone(),
                message: format!(
                    "no model registered for relation `{}` (target `{}`)",
                    name, relation.model
                ),
            })?;
        for (method, op) in RELATION_METHODS {
            methods.insert(
                format!("{}.{}.{}", config.name, name, method),
                scoped(&config.name, Arc::clone(&target), &relation.url, op),
            );
        }
    }
    Ok(methods)
}

fn scoped(owner: &str, target: Arc<ModelConfig>, url: &str, op: ActionFn) -> Action<Error> {
    let owner = owner.to_string();
    let url = url.to_string();
    Arc::new(move |ctx: Context, args: Vec<Value>| {
        let Some(id) = owner_id(args.first()) else {
            return future::ready(Err(Error::missing_id(&owner, "relation"))).boxed();
        };
        let data = args.get(1).cloned().unwrap_or(Value::Null);
        debug!(owner = %owner, id = %id, target = %target.name, "relation");
        let config = Arc::new(target.scoped_to(url.replace(":id", &id.to_string())));
        op(ctx, config, data)
    })
}

pub fn custom_actions(config: &Arc<ModelConfig>) -> BTreeMap<String, Action<Error>> {
    let mut methods = BTreeMap::new();
    for (name, spec) in &config.actions {
        for method in &spec.methods {
            let action = nested(Arc::clone(config), method.clone(), spec.refresh);
            if spec.methods.len() == 1 {
                methods.insert(format!("{}.{}", config.name, name), Arc::clone(&action));
            }
            methods.insert(format!("{}.{}.{}", config.name, name, method.name), action);
        }
    }
    methods
}

fn nested(config: Arc<ModelConfig>, method: ActionMethod, refresh: bool) -> Action<Error> {
    let refetch = actions::factory(&config).get;
    Arc::new(move |ctx: Context, args: Vec<Value>| {
        let config = Arc::clone(&config);
        let method = method.clone();
        async move {
            let id = owner_id(args.first())
                .ok_or_else(|| Error::missing_id(&config.name, "nested action"))?;
            let body = args.get(1).filter(|body| !body.is_null()).cloned();
            debug!(model = %config.name, method = %method.name, id = %id, "nested action");
            let data = method
                .endpoint
                .call(&config.options, method.verb, Some(&id), body)
                .await?;
            if refresh {
                refetch(ctx, Arc::clone(&config), id.to_value()).await?;
            }
            Ok(data)
        }
        .boxed()
    })
}
