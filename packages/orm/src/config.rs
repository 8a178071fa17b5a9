//! Model definitions and their normalized, registration-time form.
//!
//! A [`ModelDefinition`] is what callers write, either in code or as JSON.
//! Registration turns each one into a [`ModelConfig`]: contract shorthands
//! expanded, queries merged into actions, relation shorthands expanded,
//! method aliases mapped to verbs and per-operation endpoints resolved.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use reflect_http::{HttpRequest, Method, Transport};
use reflect_store::{Record, RecordId};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

use crate::contract::{Contract, FieldSpec};
use crate::error::Error;

/// What a handler endpoint is called with.
#[derive(Debug, Clone)]
pub struct EndpointCall {
    pub method: Method,
    pub id: Option<RecordId>,
    pub body: Option<Value>,
}

pub type Handler =
    Arc<dyn Fn(EndpointCall) -> BoxFuture<'static, Result<Value, Error>> + Send + Sync>;

/// Where an operation goes: a URL template or a caller-supplied handler.
///
/// URL templates may contain `:id`, replaced with the target id.
#[derive(Clone)]
pub enum Endpoint {
    Url(String),
    Handler(Handler),
}

impl Endpoint {
    pub fn url(url: impl Into<String>) -> Self {
        Endpoint::Url(url.into())
    }

    pub fn handler<F, Fut>(f: F) -> Self
    where
        F: Fn(EndpointCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, Error>> + Send + 'static,
    {
        Endpoint::Handler(Arc::new(move |call| f(call).boxed()))
    }

    /// Issue `method` against this endpoint.
    pub(crate) async fn call(
        &self,
        options: &RequestOptions,
        method: Method,
        id: Option<&RecordId>,
        body: Option<Value>,
    ) -> Result<Value, Error> {
        match self {
            Endpoint::Url(url) => {
                let url = match id {
                    Some(id) => url.replace(":id", &id.to_string()),
                    None => url.clone(),
                };
                options.send(method, url, body).await
            }
            Endpoint::Handler(handler) => {
                handler(EndpointCall {
                    method,
                    id: id.cloned(),
                    body,
                })
                .await
            }
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Url(url) => write!(f, "Url({:?})", url),
            Endpoint::Handler(_) => f.write_str("Handler"),
        }
    }
}

impl From<&str> for Endpoint {
    fn from(url: &str) -> Self {
        Endpoint::Url(url.to_string())
    }
}

impl From<String> for Endpoint {
    fn from(url: String) -> Self {
        Endpoint::Url(url)
    }
}

impl<'de> Deserialize<'de> for Endpoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Endpoint::Url)
    }
}

/// Endpoint table as written. `collection` and `model` are fallbacks for
/// the more specific keys.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Api {
    pub fetch: Option<Endpoint>,
    pub collection: Option<Endpoint>,
    pub get: Option<Endpoint>,
    pub model: Option<Endpoint>,
    pub create: Option<Endpoint>,
    pub update: Option<Endpoint>,
    pub delete: Option<Endpoint>,
}

impl Api {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fetch(mut self, endpoint: impl Into<Endpoint>) -> Self {
        self.fetch = Some(endpoint.into());
        self
    }

    pub fn collection(mut self, endpoint: impl Into<Endpoint>) -> Self {
        self.collection = Some(endpoint.into());
        self
    }

    pub fn get(mut self, endpoint: impl Into<Endpoint>) -> Self {
        self.get = Some(endpoint.into());
        self
    }

    pub fn model(mut self, endpoint: impl Into<Endpoint>) -> Self {
        self.model = Some(endpoint.into());
        self
    }

    pub fn create(mut self, endpoint: impl Into<Endpoint>) -> Self {
        self.create = Some(endpoint.into());
        self
    }

    pub fn update(mut self, endpoint: impl Into<Endpoint>) -> Self {
        self.update = Some(endpoint.into());
        self
    }

    pub fn delete(mut self, endpoint: impl Into<Endpoint>) -> Self {
        self.delete = Some(endpoint.into());
        self
    }
}

/// The five generated operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Fetch,
    Get,
    Create,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Fetch => "fetch",
            Operation::Get => "get",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

/// One endpoint per operation, fallbacks applied.
#[derive(Clone, Debug, Default)]
pub struct ResolvedApi {
    pub fetch: Option<Endpoint>,
    pub get: Option<Endpoint>,
    pub create: Option<Endpoint>,
    pub update: Option<Endpoint>,
    pub delete: Option<Endpoint>,
}

impl ResolvedApi {
    pub fn resolve(api: &Api, singleton: bool) -> Self {
        let first = |candidates: &[&Option<Endpoint>]| -> Option<Endpoint> {
            candidates.iter().find_map(|e| (*e).clone())
        };
        if singleton {
            let fetch = first(&[&api.fetch, &api.get, &api.model]);
            Self {
                get: fetch.clone(),
                fetch,
                create: first(&[&api.create, &api.collection]),
                update: first(&[&api.update, &api.model]),
                delete: first(&[&api.delete, &api.model]),
            }
        } else {
            Self {
                fetch: first(&[&api.fetch, &api.collection]),
                get: first(&[&api.get, &api.model]),
                create: first(&[&api.create, &api.collection]),
                update: first(&[&api.update, &api.model]),
                delete: first(&[&api.delete, &api.model]),
            }
        }
    }

    /// Every operation on the same endpoint.
    pub fn uniform(endpoint: Endpoint) -> Self {
        Self {
            fetch: Some(endpoint.clone()),
            get: Some(endpoint.clone()),
            create: Some(endpoint.clone()),
            update: Some(endpoint.clone()),
            delete: Some(endpoint),
        }
    }

    pub fn endpoint(&self, operation: Operation) -> Option<&Endpoint> {
        match operation {
            Operation::Fetch => self.fetch.as_ref(),
            Operation::Get => self.get.as_ref(),
            Operation::Create => self.create.as_ref(),
            Operation::Update => self.update.as_ref(),
            Operation::Delete => self.delete.as_ref(),
        }
    }
}

/// A relation as written: a bare URL (target model named like the
/// relation) or an explicit target.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum RelationDef {
    Url(String),
    Full { model: String, url: String },
}

impl RelationDef {
    pub fn to(model: impl Into<String>, url: impl Into<String>) -> Self {
        RelationDef::Full {
            model: model.into(),
            url: url.into(),
        }
    }
}

impl From<&str> for RelationDef {
    fn from(url: &str) -> Self {
        RelationDef::Url(url.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relation {
    pub model: String,
    pub url: String,
}

/// A custom action as written: one endpoint (sent as POST) or a table of
/// method alias to endpoint.
#[derive(Clone, Debug, Deserialize)]
#[serde(try_from = "RawAction")]
pub enum ActionDef {
    Endpoint(Endpoint),
    Methods {
        methods: Vec<(String, Endpoint)>,
        refresh: bool,
    },
}

impl ActionDef {
    pub fn new() -> Self {
        ActionDef::Methods {
            methods: Vec::new(),
            refresh: false,
        }
    }

    pub fn url(url: impl Into<String>) -> Self {
        ActionDef::Endpoint(Endpoint::Url(url.into()))
    }

    pub fn method(self, name: impl Into<String>, endpoint: impl Into<Endpoint>) -> Self {
        let (mut methods, refresh) = self.into_methods("post");
        let name = name.into();
        let endpoint = endpoint.into();
        match methods.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = endpoint,
            None => methods.push((name, endpoint)),
        }
        ActionDef::Methods { methods, refresh }
    }

    /// Re-fetch the owning record after the action completes.
    pub fn refresh(self) -> Self {
        let (methods, _) = self.into_methods("post");
        ActionDef::Methods {
            methods,
            refresh: true,
        }
    }

    fn into_methods(self, bare: &str) -> (Vec<(String, Endpoint)>, bool) {
        match self {
            ActionDef::Endpoint(endpoint) => (vec![(bare.to_string(), endpoint)], false),
            ActionDef::Methods { methods, refresh } => (methods, refresh),
        }
    }

    fn into_methods_for(self, bare: &[&str]) -> (Vec<(String, Endpoint)>, bool) {
        match self {
            ActionDef::Endpoint(endpoint) => (
                bare.iter()
                    .map(|name| (name.to_string(), endpoint.clone()))
                    .collect(),
                false,
            ),
            ActionDef::Methods { methods, refresh } => (methods, refresh),
        }
    }
}

impl Default for ActionDef {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for ActionDef {
    fn from(url: &str) -> Self {
        ActionDef::url(url)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAction {
    Url(String),
    Map(serde_json::Map<String, Value>),
}

impl TryFrom<RawAction> for ActionDef {
    type Error = String;

    fn try_from(raw: RawAction) -> Result<Self, Self::Error> {
        match raw {
            RawAction::Url(url) => Ok(ActionDef::url(url)),
            RawAction::Map(map) => {
                let mut methods = Vec::new();
                let mut refresh = false;
                for (key, value) in map {
                    match (key.as_str(), value) {
                        ("refresh", Value::Bool(flag)) => refresh = flag,
                        (_, Value::String(url)) => methods.push((key, Endpoint::Url(url))),
                        (_, other) => {
                            return Err(format!("action method `{}` must be a URL, got {}", key, other))
                        }
                    }
                }
                Ok(ActionDef::Methods { methods, refresh })
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct ActionMethod {
    pub name: String,
    pub verb: Method,
    pub endpoint: Endpoint,
}

/// A custom action after normalization.
#[derive(Clone, Debug)]
pub struct ActionSpec {
    pub methods: Vec<ActionMethod>,
    pub refresh: bool,
}

impl ActionSpec {
    pub fn method(&self, name: &str) -> Option<&ActionMethod> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn method_names(&self) -> Vec<String> {
        self.methods.iter().map(|m| m.name.clone()).collect()
    }
}

/// Merge query definitions into the action table.
///
/// A query named like an existing single-endpoint action turns that action
/// into `create`/`update`/`delete` methods and adds `get`/`fetch`; a query
/// on its own becomes a `fetch` method.
fn merge_queries(
    mut actions: BTreeMap<String, ActionDef>,
    queries: BTreeMap<String, ActionDef>,
) -> BTreeMap<String, (Vec<(String, Endpoint)>, bool)> {
    let mut merged = BTreeMap::new();
    for (name, query) in queries {
        let entry = match actions.remove(&name) {
            Some(action) => {
                let (mut methods, refresh) =
                    action.into_methods_for(&["create", "update", "delete"]);
                let (extra, extra_refresh) = query.into_methods_for(&["get", "fetch"]);
                for (method, endpoint) in extra {
                    match methods.iter_mut().find(|(n, _)| *n == method) {
                        Some((_, existing)) => *existing = endpoint,
                        None => methods.push((method, endpoint)),
                    }
                }
                (methods, refresh || extra_refresh)
            }
            None => query.into_methods_for(&["fetch"]),
        };
        merged.insert(name, entry);
    }
    for (name, action) in actions {
        merged.insert(name, action.into_methods("post"));
    }
    merged
}

fn default_methods() -> BTreeMap<String, Method> {
    [
        ("create", Method::POST),
        ("update", Method::PUT),
        ("fetch", Method::GET),
        ("get", Method::GET),
        ("delete", Method::DELETE),
        ("patch", Method::PATCH),
    ]
    .into_iter()
    .map(|(alias, verb)| (alias.to_string(), verb))
    .collect()
}

/// Request options. Global options apply to every model; a model's own
/// options override them key by key.
#[derive(Clone, Default)]
pub struct Options {
    pub transport: Option<Arc<dyn Transport>>,
    /// Method alias to HTTP verb, on top of the built-in aliases.
    pub methods: BTreeMap<String, Method>,
    pub headers: BTreeMap<String, String>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transport<T: Transport + 'static>(mut self, transport: T) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn with_shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_method(mut self, alias: impl Into<String>, verb: Method) -> Self {
        self.methods.insert(alias.into().to_ascii_lowercase(), verb);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    fn resolve(&self, model: &str, overrides: &Options) -> Result<RequestOptions, Error> {
        let transport = overrides
            .transport
            .clone()
            .or_else(|| self.transport.clone())
            .ok_or_else(|| Error::InvalidConfig {
                model: model.to_string(),
                message: "no transport configured".to_string(),
            })?;
        let mut methods = default_methods();
        methods.extend(self.methods.clone());
        methods.extend(overrides.methods.clone());
        let mut headers = self.headers.clone();
        headers.extend(overrides.headers.clone());
        Ok(RequestOptions {
            transport,
            methods,
            headers,
        })
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("transport", &self.transport.is_some())
            .field("methods", &self.methods)
            .field("headers", &self.headers)
            .finish()
    }
}

/// Options after merging, as used by requests.
#[derive(Clone)]
pub struct RequestOptions {
    transport: Arc<dyn Transport>,
    methods: BTreeMap<String, Method>,
    headers: BTreeMap<String, String>,
}

impl RequestOptions {
    /// Map a method alias to its verb. Verb names map to themselves.
    pub fn verb(&self, alias: &str) -> Option<Method> {
        self.methods
            .get(&alias.to_ascii_lowercase())
            .copied()
            .or_else(|| Method::from_name(alias))
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub async fn send(
        &self,
        method: Method,
        url: String,
        body: Option<Value>,
    ) -> Result<Value, Error> {
        let mut request = HttpRequest::new(method, url).with_headers(self.headers.clone());
        if let Some(body) = body {
            request = request.with_json_body(body);
        }
        debug!(method = %method, url = %request.url, "request");
        Ok(self.transport.request(request).await?)
    }
}

/// A model as written.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ModelDefinition {
    pub singleton: bool,
    /// Initial record of a singleton.
    #[serde(rename = "default")]
    pub initial: Option<Record>,
    pub api: Api,
    #[serde(alias = "props")]
    pub contract: Contract,
    pub relations: BTreeMap<String, RelationDef>,
    pub actions: BTreeMap<String, ActionDef>,
    pub queries: BTreeMap<String, ActionDef>,
    #[serde(skip)]
    pub options: Options,
}

impl ModelDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the serializable subset of a definition.
    pub fn from_json(value: Value) -> Result<Self, Error> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn singleton(mut self) -> Self {
        self.singleton = true;
        self
    }

    pub fn initial(mut self, record: Record) -> Self {
        self.initial = Some(record);
        self
    }

    pub fn api(mut self, api: Api) -> Self {
        self.api = api;
        self
    }

    pub fn contract(mut self, contract: Contract) -> Self {
        self.contract = contract;
        self
    }

    pub fn field(mut self, key: impl Into<String>, spec: FieldSpec) -> Self {
        self.contract.insert(key, spec);
        self
    }

    /// Rework an already declared field, e.g. to attach closures to a field
    /// parsed from JSON. Unknown keys start from an empty spec.
    pub fn update_field(
        mut self,
        key: &str,
        f: impl FnOnce(FieldSpec) -> FieldSpec,
    ) -> Self {
        let spec = self.contract.get(key).cloned().unwrap_or_default();
        self.contract.insert(key, f(spec));
        self
    }

    pub fn relation(mut self, name: impl Into<String>, relation: impl Into<RelationDef>) -> Self {
        self.relations.insert(name.into(), relation.into());
        self
    }

    pub fn action(mut self, name: impl Into<String>, action: impl Into<ActionDef>) -> Self {
        self.actions.insert(name.into(), action.into());
        self
    }

    pub fn query(mut self, name: impl Into<String>, query: impl Into<ActionDef>) -> Self {
        self.queries.insert(name.into(), query.into());
        self
    }

    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }
}

/// A model declared as a type.
pub trait ModelClass {
    fn api() -> Api;

    fn props() -> Contract {
        Contract::new()
    }

    fn relations() -> BTreeMap<String, RelationDef> {
        BTreeMap::new()
    }

    fn actions() -> BTreeMap<String, ActionDef> {
        BTreeMap::new()
    }

    fn queries() -> BTreeMap<String, ActionDef> {
        BTreeMap::new()
    }

    fn options() -> Options {
        Options::default()
    }

    fn singleton() -> bool {
        false
    }

    fn initial() -> Option<Record> {
        None
    }

    fn definition() -> ModelDefinition
    where
        Self: Sized,
    {
        ModelDefinition {
            singleton: Self::singleton(),
            initial: Self::initial(),
            api: Self::api(),
            contract: Self::props(),
            relations: Self::relations(),
            actions: Self::actions(),
            queries: Self::queries(),
            options: Self::options(),
        }
    }
}

/// Everything registration knows about one model.
#[derive(Clone)]
pub struct ModelConfig {
    pub name: String,
    pub namespace: Option<String>,
    pub singleton: bool,
    pub initial: Option<Record>,
    pub api: ResolvedApi,
    pub contract: Contract,
    /// Wire name to canonical key.
    pub remap: BTreeMap<String, String>,
    pub relations: BTreeMap<String, Relation>,
    pub actions: BTreeMap<String, ActionSpec>,
    pub options: RequestOptions,
}

impl ModelConfig {
    pub fn resolve(
        name: &str,
        namespace: Option<&str>,
        definition: ModelDefinition,
        global: &Options,
    ) -> Result<Self, Error> {
        let options = global.resolve(name, &definition.options)?;

        let mut actions = BTreeMap::new();
        for (action, (methods, refresh)) in merge_queries(definition.actions, definition.queries) {
            let methods = methods
                .into_iter()
                .map(|(method, endpoint)| {
                    let verb = options.verb(&method).ok_or_else(|| Error::InvalidConfig {
                        model: name.to_string(),
                        message: format!("unknown method `{}` on action `{}`", method, action),
                    })?;
                    Ok(ActionMethod {
                        name: method,
                        verb,
                        endpoint,
                    })
                })
                .collect::<Result<Vec<_>, Error>>()?;
            actions.insert(action, ActionSpec { methods, refresh });
        }

        let relations = definition
            .relations
            .into_iter()
            .map(|(relation, def)| {
                let resolved = match def {
                    RelationDef::Url(url) => Relation {
                        model: relation.clone(),
                        url,
                    },
                    RelationDef::Full { model, url } => Relation { model, url },
                };
                (relation, resolved)
            })
            .collect();

        Ok(Self {
            name: name.to_string(),
            namespace: namespace.map(str::to_string),
            singleton: definition.singleton,
            initial: definition.initial,
            api: ResolvedApi::resolve(&definition.api, definition.singleton),
            remap: definition.contract.remap().into_iter().collect(),
            contract: definition.contract,
            relations,
            actions,
            options,
        })
    }

    pub fn endpoint(&self, operation: Operation) -> Result<&Endpoint, Error> {
        self.api
            .endpoint(operation)
            .ok_or_else(|| Error::MissingEndpoint {
                model: self.name.clone(),
                option: operation.as_str(),
            })
    }

    /// Store name of a model member, e.g. `blog/posts.fetch`. `None` names
    /// the base getter.
    pub fn qualified(&self, member: Option<&str>) -> String {
        let prefix = match &self.namespace {
            Some(namespace) => format!("{}/", namespace),
            None => String::new(),
        };
        match member {
            Some(member) => format!("{}{}.{}", prefix, self.name, member),
            None => format!("{}{}", prefix, self.name),
        }
    }

    /// Name of a member inside the model's own module.
    pub fn local(&self, member: &str) -> String {
        format!("{}.{}", self.name, member)
    }

    /// This model with every operation sent to `url`, used for relations.
    pub(crate) fn scoped_to(&self, url: String) -> Self {
        let mut scoped = self.clone();
        scoped.api = ResolvedApi::uniform(Endpoint::Url(url));
        scoped
    }
}

impl fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelConfig")
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .field("singleton", &self.singleton)
            .field("api", &self.api)
            .field("contract", &self.contract.keys().collect::<Vec<_>>())
            .field("relations", &self.relations)
            .field("actions", &self.actions)
            .finish()
    }
}
