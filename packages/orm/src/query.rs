//! Chainable queries over cached records.
//!
//! Narrowing steps (`filter`, `has`, `offset`, `limit`, `order`,
//! `shuffle`) work on plain records; terminal steps materialize instances
//! or compute aggregates.

use std::cmp::Ordering;
use std::sync::Arc;

use rand::seq::SliceRandom;
use regex::Regex;
use reflect_store::Record;
use serde_json::Value;

use crate::contract::display_value;
use crate::entity::Entity;
use crate::error::Error;
use crate::model::Model;

/// How one key of a [`Shape`] is matched.
#[derive(Clone, Debug)]
pub enum Matcher {
    Equals(Value),
    Pattern(Regex),
}

impl Matcher {
    fn test(&self, value: &Value) -> bool {
        match self {
            Matcher::Equals(expected) => value == expected,
            Matcher::Pattern(pattern) => pattern.is_match(&display_value(value)),
        }
    }
}

impl From<Value> for Matcher {
    fn from(value: Value) -> Self {
        Matcher::Equals(value)
    }
}

impl From<Regex> for Matcher {
    fn from(pattern: Regex) -> Self {
        Matcher::Pattern(pattern)
    }
}

/// A record matches when every key is present and matches.
#[derive(Clone, Debug, Default)]
pub struct Shape {
    keys: Vec<(String, Matcher)>,
}

impl Shape {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn equals(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.keys.push((key.into(), Matcher::Equals(value.into())));
        self
    }

    pub fn matches(mut self, key: impl Into<String>, pattern: Regex) -> Self {
        self.keys.push((key.into(), Matcher::Pattern(pattern)));
        self
    }

    fn test(&self, record: &Record) -> bool {
        self.keys.iter().all(|(key, matcher)| {
            record
                .get(key)
                .map_or(false, |value| matcher.test(value))
        })
    }
}

impl From<Record> for Shape {
    fn from(record: Record) -> Self {
        Self {
            keys: record
                .into_iter()
                .map(|(key, value)| (key, Matcher::Equals(value)))
                .collect(),
        }
    }
}

pub type Comparator = Arc<dyn Fn(&Record, &Record) -> Ordering + Send + Sync>;

/// Rank of a JSON type when comparing values of different types.
fn rank(value: &Value) -> u8 {
    match value {
        Value::Bool(_) => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Array(_) => 3,
        Value::Object(_) => 4,
        Value::Null => 5,
    }
}

/// Ascending order; missing and null values sort last.
fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => match (a, b) {
            (Value::Number(x), Value::Number(y)) => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
            (Value::String(x), Value::String(y)) => x.cmp(y),
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            _ => rank(a).cmp(&rank(b)),
        },
    }
}

fn numbers<'a>(records: &'a [Record], field: &'a str) -> impl Iterator<Item = f64> + 'a {
    records
        .iter()
        .filter_map(move |record| record.get(field).and_then(Value::as_f64))
}

pub struct Query {
    model: Model,
    current: Vec<Record>,
}

impl Query {
    pub(crate) fn new(model: Model, records: Vec<Record>) -> Self {
        Self {
            model,
            current: records,
        }
    }

    /// Records currently selected.
    pub fn records(&self) -> &[Record] {
        &self.current
    }

    /// Keep records matching `shape`. Repeated filters intersect.
    pub fn filter(mut self, shape: impl Into<Shape>) -> Self {
        let shape = shape.into();
        self.current.retain(|record| shape.test(record));
        self
    }

    /// Keep records for which `predicate` holds.
    pub fn filter_by(mut self, predicate: impl Fn(&Record) -> bool) -> Self {
        self.current.retain(|record| predicate(record));
        self
    }

    /// Keep records that have every key.
    pub fn has<I>(mut self, keys: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let keys: Vec<I::Item> = keys.into_iter().collect();
        self.current
            .retain(|record| keys.iter().all(|key| record.contains_key(key.as_ref())));
        self
    }

    pub fn offset(mut self, n: usize) -> Self {
        self.current.drain(..n.min(self.current.len()));
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.current.truncate(n);
        self
    }

    /// Stable ascending sort by `keys`; the first differing key decides.
    pub fn order<I>(mut self, keys: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let keys: Vec<I::Item> = keys.into_iter().collect();
        self.current.sort_by(|a, b| {
            keys.iter()
                .map(|key| compare(a.get(key.as_ref()), b.get(key.as_ref())))
                .find(|ordering| *ordering != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
        self
    }

    /// Stable sort with a caller comparator.
    pub fn order_by(mut self, comparator: impl Fn(&Record, &Record) -> Ordering) -> Self {
        self.current.sort_by(|a, b| comparator(a, b));
        self
    }

    pub fn shuffle(mut self) -> Self {
        self.current.shuffle(&mut rand::thread_rng());
        self
    }

    pub fn all(&self) -> Result<Vec<Entity>, Error> {
        self.current
            .iter()
            .map(|record| self.model.build(record.clone()))
            .collect()
    }

    pub fn first(&self) -> Result<Option<Entity>, Error> {
        self.materialize(self.current.first())
    }

    pub fn one(&self) -> Result<Option<Entity>, Error> {
        self.first()
    }

    pub fn last(&self) -> Result<Option<Entity>, Error> {
        self.materialize(self.current.last())
    }

    /// `n` distinct records in random order.
    pub fn sample(&self, n: usize) -> Result<Vec<Entity>, Error> {
        self.current
            .choose_multiple(&mut rand::thread_rng(), n)
            .map(|record| self.model.build(record.clone()))
            .collect()
    }

    pub fn random(&self) -> Result<Option<Entity>, Error> {
        self.materialize(self.current.choose(&mut rand::thread_rng()))
    }

    pub fn count(&self) -> usize {
        self.current.len()
    }

    /// Sum of the numeric values of `field`; other values are skipped.
    pub fn sum(&self, field: &str) -> f64 {
        numbers(&self.current, field).sum()
    }

    pub fn min(&self, field: &str) -> Option<f64> {
        numbers(&self.current, field).reduce(f64::min)
    }

    pub fn max(&self, field: &str) -> Option<f64> {
        numbers(&self.current, field).reduce(f64::max)
    }

    fn materialize(&self, record: Option<&Record>) -> Result<Option<Entity>, Error> {
        record
            .map(|record| self.model.build(record.clone()))
            .transpose()
    }
}
