//! Field contracts and the two transforms built from them.
//!
//! A [`Contract`] maps canonical field names to [`FieldSpec`]s in
//! declaration order. [`push_format`] turns a local record into the payload
//! sent to the API; [`pull_format`] turns an API record into the canonical
//! local shape.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use regex::Regex;
use reflect_store::Record;
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

pub type Transform = Arc<dyn Fn(Value) -> Value + Send + Sync>;
pub type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;
pub type CastFn = Arc<dyn Fn(Value) -> Result<Value, String> + Send + Sync>;

pub const DEFAULT_VALIDATION_MESSAGE: &str =
    "Value `${value}` for key `${key}` did not pass validation.";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContractError {
    #[error("Key `{key}` is required for create and update actions.")]
    Required { key: String },

    #[error("{message}")]
    Validation { key: String, message: String },

    #[error("Could not collapse input for `{key}` using key `{collapse}` from data `{value}`")]
    Collapse {
        key: String,
        collapse: String,
        value: Value,
    },

    #[error("Could not cast `{key}`: {message}")]
    Cast { key: String, message: String },

    #[error("Nested inputs for property `{key}` must have `id` property.")]
    NestedId { key: String },
}

/// A field default: a fixed value or a thunk evaluated on every use.
#[derive(Clone)]
pub enum DefaultValue {
    Value(Value),
    Thunk(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl DefaultValue {
    pub fn resolve(&self) -> Value {
        match self {
            DefaultValue::Value(value) => value.clone(),
            DefaultValue::Thunk(thunk) => thunk(),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Value(value) => write!(f, "Value({})", value),
            DefaultValue::Thunk(_) => f.write_str("Thunk"),
        }
    }
}

/// Outbound type conversion.
#[derive(Clone)]
pub enum Cast {
    String,
    Integer,
    Float,
    Boolean,
    Custom(CastFn),
}

impl Cast {
    pub fn custom(f: impl Fn(Value) -> Result<Value, String> + Send + Sync + 'static) -> Self {
        Cast::Custom(Arc::new(f))
    }

    pub fn apply(&self, value: Value) -> Result<Value, String> {
        match self {
            Cast::String => Ok(Value::String(display_value(&value))),
            Cast::Integer => match &value {
                Value::Number(n) => n
                    .as_i64()
                    .map(Value::from)
                    .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| Value::from(f.trunc() as i64)))
                    .ok_or_else(|| format!("`{}` is not an integer", value)),
                Value::String(s) => {
                    let s = s.trim();
                    s.parse::<i64>()
                        .map(Value::from)
                        .or_else(|_| s.parse::<f64>().map(|f| Value::from(f.trunc() as i64)))
                        .map_err(|_| format!("`{}` is not an integer", s))
                }
                Value::Bool(b) => Ok(Value::from(i64::from(*b))),
                other => Err(format!("`{}` is not an integer", other)),
            },
            Cast::Float => match &value {
                Value::Number(n) => n
                    .as_f64()
                    .map(Value::from)
                    .ok_or_else(|| format!("`{}` is not a number", value)),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::from)
                    .map_err(|_| format!("`{}` is not a number", s)),
                Value::Bool(b) => Ok(Value::from(if *b { 1.0 } else { 0.0 })),
                other => Err(format!("`{}` is not a number", other)),
            },
            Cast::Boolean => Ok(Value::Bool(truthy(&value))),
            Cast::Custom(f) => f(value),
        }
    }
}

impl fmt::Debug for Cast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cast::String => f.write_str("String"),
            Cast::Integer => f.write_str("Integer"),
            Cast::Float => f.write_str("Float"),
            Cast::Boolean => f.write_str("Boolean"),
            Cast::Custom(_) => f.write_str("Custom"),
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Strings render bare, everything else as JSON text.
pub(crate) fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Clone)]
enum Check {
    Predicate(Predicate),
    Pattern(Regex),
}

/// A validity test plus the message template used when it fails.
///
/// Templates may reference `${value}` and `${key}`.
#[derive(Clone)]
pub struct Validation {
    check: Check,
    message: Option<String>,
}

impl Validation {
    pub fn predicate(f: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        Self {
            check: Check::Predicate(Arc::new(f)),
            message: None,
        }
    }

    pub fn pattern(pattern: Regex) -> Self {
        Self {
            check: Check::Pattern(pattern),
            message: None,
        }
    }

    pub fn with_message(mut self, template: impl Into<String>) -> Self {
        self.message = Some(template.into());
        self
    }

    pub fn passes(&self, value: &Value) -> bool {
        match &self.check {
            Check::Predicate(f) => f(value),
            Check::Pattern(re) => re.is_match(&display_value(value)),
        }
    }

    pub fn message(&self, key: &str, value: &Value) -> String {
        let template = self
            .message
            .as_deref()
            .unwrap_or(DEFAULT_VALIDATION_MESSAGE);
        template
            .replace("${value}", &display_value(value))
            .replace("${key}", key)
    }
}

impl fmt::Debug for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let check = match &self.check {
            Check::Predicate(_) => "predicate".to_string(),
            Check::Pattern(re) => format!("/{}/", re.as_str()),
        };
        f.debug_struct("Validation")
            .field("check", &check)
            .field("message", &self.message)
            .finish()
    }
}

/// Name a field carries on the wire.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum WireName {
    /// Same as the canonical key.
    #[default]
    Same,
    Rename(String),
    /// Never sent.
    LocalOnly,
}

/// Per-field rules.
#[derive(Clone, Default)]
pub struct FieldSpec {
    pub default: Option<DefaultValue>,
    pub required: bool,
    pub cast: Option<Cast>,
    pub validate: Option<Validation>,
    pub mutate: Option<Transform>,
    pub parse: Option<Transform>,
    pub from: Option<String>,
    pub to: WireName,
    pub collapse: Option<String>,
    pub model: Option<String>,
}

impl FieldSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(DefaultValue::Value(value));
        self
    }

    pub fn with_default_fn(mut self, f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.default = Some(DefaultValue::Thunk(Arc::new(f)));
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn cast(mut self, cast: Cast) -> Self {
        self.cast = Some(cast);
        self
    }

    pub fn validate(mut self, validation: Validation) -> Self {
        self.validate = Some(validation);
        self
    }

    pub fn mutate(mut self, f: impl Fn(Value) -> Value + Send + Sync + 'static) -> Self {
        self.mutate = Some(Arc::new(f));
        self
    }

    pub fn parse(mut self, f: impl Fn(Value) -> Value + Send + Sync + 'static) -> Self {
        self.parse = Some(Arc::new(f));
        self
    }

    /// Read this field from another key of the incoming record.
    pub fn from_key(mut self, key: impl Into<String>) -> Self {
        self.from = Some(key.into());
        self
    }

    /// Send this field under another key.
    pub fn to_key(mut self, key: impl Into<String>) -> Self {
        self.to = WireName::Rename(key.into());
        self
    }

    /// Never send this field.
    pub fn local_only(mut self) -> Self {
        self.to = WireName::LocalOnly;
        self
    }

    /// Reduce object values to their `key` member before sending.
    pub fn collapse(mut self, key: impl Into<String>) -> Self {
        self.collapse = Some(key.into());
        self
    }

    /// Values of this field are instances of another registered model.
    pub fn model(mut self, name: impl Into<String>) -> Self {
        self.model = Some(name.into());
        self
    }
}

impl fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSpec")
            .field("default", &self.default)
            .field("required", &self.required)
            .field("cast", &self.cast)
            .field("validate", &self.validate)
            .field("mutate", &self.mutate.is_some())
            .field("parse", &self.parse.is_some())
            .field("from", &self.from)
            .field("to", &self.to)
            .field("collapse", &self.collapse)
            .field("model", &self.model)
            .finish()
    }
}

/// Ordered mapping of canonical field names to their rules.
#[derive(Clone, Debug, Default)]
pub struct Contract {
    fields: Vec<(String, FieldSpec)>,
}

impl Contract {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field, builder style.
    pub fn field(mut self, key: impl Into<String>, spec: FieldSpec) -> Self {
        self.insert(key, spec);
        self
    }

    /// Add or replace a field. Replacing keeps the original position.
    pub fn insert(&mut self, key: impl Into<String>, spec: FieldSpec) {
        let key = key.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = spec,
            None => self.fields.push((key, spec)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&FieldSpec> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, spec)| spec)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.fields.iter().map(|(k, spec)| (k.as_str(), spec))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Wire name to canonical key, for every renamed field.
    pub fn remap(&self) -> Vec<(String, String)> {
        self.iter()
            .filter_map(|(key, spec)| match &spec.to {
                WireName::Rename(to) => Some((to.clone(), key.to_string())),
                _ => None,
            })
            .collect()
    }

    /// Every key with a default, resolved.
    pub fn defaults(&self) -> Record {
        self.iter()
            .filter_map(|(key, spec)| {
                spec.default
                    .as_ref()
                    .map(|default| (key.to_string(), default.resolve()))
            })
            .collect()
    }
}

/// Turn a local record into the payload for create and update.
///
/// Fields run in declaration order: required check, then (only for keys
/// present in `data`) collapse, cast, validate, mutate and rename. Keys not
/// in the contract pass through untouched.
pub fn push_format(contract: &Contract, data: &Record) -> Result<Record, ContractError> {
    let mut result = data.clone();

    for (key, spec) in contract.iter() {
        if spec.required {
            let present = |k: &str| result.get(k).map_or(false, |v| !v.is_null());
            let renamed = match &spec.to {
                WireName::Rename(to) => present(to),
                _ => false,
            };
            if !present(key) && !renamed {
                return Err(ContractError::Required {
                    key: key.to_string(),
                });
            }
        }

        let Some(mut value) = result.get(key).cloned() else {
            continue;
        };

        if let Some(collapse) = &spec.collapse {
            if let Value::Object(map) = &value {
                let collapsed = map.get(collapse).cloned();
                value = collapsed.ok_or_else(|| ContractError::Collapse {
                    key: key.to_string(),
                    collapse: collapse.clone(),
                    value: value.clone(),
                })?;
            }
        }

        if let Some(cast) = &spec.cast {
            if !value.is_null() {
                value = cast.apply(value).map_err(|message| ContractError::Cast {
                    key: key.to_string(),
                    message,
                })?;
            }
        }

        if let Some(validation) = &spec.validate {
            if !validation.passes(&value) {
                return Err(ContractError::Validation {
                    key: key.to_string(),
                    message: validation.message(key, &value),
                });
            }
        }

        if let Some(mutate) = &spec.mutate {
            if !value.is_null() {
                value = mutate(value);
            }
        }

        match &spec.to {
            WireName::Same => {
                result.insert(key.to_string(), value);
            }
            WireName::Rename(to) => {
                result.remove(key);
                result.insert(to.clone(), value);
            }
            WireName::LocalOnly => {
                result.remove(key);
            }
        }
    }

    Ok(result)
}

/// Turn an API record into the canonical local shape.
///
/// Every field starts at its default. A field present in `data` under its
/// source key (`from`, or the key itself) replaces the default, after
/// `parse`. Keys in `data` that no field reads pass through.
pub fn pull_format(contract: &Contract, data: &Record) -> Record {
    let mut result = contract.defaults();
    let mut consumed: HashSet<&str> = HashSet::new();

    for (key, spec) in contract.iter() {
        let source = spec.from.as_deref().unwrap_or(key);
        consumed.insert(source);
        consumed.insert(key);

        match data.get(source) {
            Some(value) if !value.is_null() => {
                let value = match &spec.parse {
                    Some(parse) => parse(value.clone()),
                    None => value.clone(),
                };
                result.insert(key.to_string(), value);
            }
            _ => {}
        }
    }

    for (key, value) in data {
        if !consumed.contains(key.as_str()) {
            result.insert(key.clone(), value.clone());
        }
    }

    result
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum CastName {
    String,
    Integer,
    Float,
    Boolean,
}

#[derive(Deserialize)]
struct PatternDecl {
    pattern: String,
    message: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NameOrFlag {
    Name(String),
    Flag(bool),
}

fn some_value<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

/// Serializable subset of [`FieldSpec`]. Closures are attached in code.
#[derive(Deserialize, Default)]
#[serde(default)]
struct FieldDecl {
    #[serde(deserialize_with = "some_value")]
    default: Option<Value>,
    required: bool,
    #[serde(rename = "type")]
    cast: Option<CastName>,
    #[serde(alias = "validation")]
    validate: Option<PatternDecl>,
    from: Option<String>,
    to: Option<NameOrFlag>,
    collapse: Option<NameOrFlag>,
    model: Option<String>,
}

impl FieldDecl {
    fn into_spec(self) -> Result<FieldSpec, String> {
        let validate = match self.validate {
            Some(decl) => {
                let pattern = Regex::new(&decl.pattern).map_err(|e| e.to_string())?;
                let validation = Validation::pattern(pattern);
                Some(match decl.message {
                    Some(message) => validation.with_message(message),
                    None => validation,
                })
            }
            None => None,
        };
        let to = match self.to {
            None | Some(NameOrFlag::Flag(true)) => WireName::Same,
            Some(NameOrFlag::Flag(false)) => WireName::LocalOnly,
            Some(NameOrFlag::Name(name)) => WireName::Rename(name),
        };
        let collapse = match self.collapse {
            None | Some(NameOrFlag::Flag(false)) => None,
            Some(NameOrFlag::Flag(true)) => Some("id".to_string()),
            Some(NameOrFlag::Name(name)) => Some(name),
        };
        Ok(FieldSpec {
            default: self.default.map(DefaultValue::Value),
            required: self.required,
            cast: self.cast.map(|name| match name {
                CastName::String => Cast::String,
                CastName::Integer => Cast::Integer,
                CastName::Float => Cast::Float,
                CastName::Boolean => Cast::Boolean,
            }),
            validate,
            mutate: None,
            parse: None,
            from: self.from,
            to,
            collapse,
            model: self.model,
        })
    }
}

/// Contracts deserialize from an object in document order. A non-object
/// field value is shorthand for `{"default": value}`.
impl<'de> Deserialize<'de> for Contract {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ContractVisitor;

        impl<'de> Visitor<'de> for ContractVisitor {
            type Value = Contract;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of field names to field specs")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Contract, A::Error> {
                let mut contract = Contract::new();
                while let Some((key, value)) = map.next_entry::<String, Value>()? {
                    let spec = match value {
                        Value::Object(_) => serde_json::from_value::<FieldDecl>(value)
                            .map_err(de::Error::custom)?
                            .into_spec()
                            .map_err(de::Error::custom)?,
                        other => FieldSpec::new().with_default(other),
                    };
                    contract.insert(key, spec);
                }
                Ok(contract)
            }
        }

        deserializer.deserialize_map(ContractVisitor)
    }
}
