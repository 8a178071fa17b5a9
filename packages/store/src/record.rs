//! Records, record ids, and the keyed tables that hold them.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Error;

/// A plain merged record, as held in a table.
pub type Record = serde_json::Map<String, Value>;

/// Key of a record inside a collection table.
///
/// Integer ids sort before string ids. Strings holding an integer in its
/// canonical form are normalized to `Int`, so `"5"` and `5` address the
/// same record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Str(String),
}

impl RecordId {
    /// Read an id out of a JSON value. Only integers and strings qualify.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(RecordId::Int),
            Value::String(s) => Some(RecordId::from(s.as_str())),
            _ => None,
        }
    }

    /// Read the `id` key of a record.
    pub fn of(record: &Record) -> Option<Self> {
        record.get("id").and_then(Self::from_value)
    }

    pub fn to_value(&self) -> Value {
        match self {
            RecordId::Int(n) => Value::from(*n),
            RecordId::Str(s) => Value::String(s.clone()),
        }
    }
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        RecordId::Int(id)
    }
}

impl From<&str> for RecordId {
    /// Only the canonical decimal form of an integer normalizes, so `"007"`
    /// and `"+7"` stay distinct from `7`.
    fn from(id: &str) -> Self {
        match id.parse::<i64>() {
            Ok(n) if n.to_string() == id => RecordId::Int(n),
            _ => RecordId::Str(id.to_string()),
        }
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        RecordId::from(id.as_str())
    }
}

impl From<RecordId> for Value {
    fn from(id: RecordId) -> Self {
        id.to_value()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(n) => write!(f, "{}", n),
            RecordId::Str(s) => write!(f, "{}", s),
        }
    }
}

/// Storage for one model: a single record, or records keyed by id.
#[derive(Clone, Debug, PartialEq)]
pub enum Table {
    Singleton(Option<Record>),
    Collection(BTreeMap<RecordId, Record>),
}

impl Table {
    pub fn collection() -> Self {
        Table::Collection(BTreeMap::new())
    }

    pub fn singleton(initial: Option<Record>) -> Self {
        Table::Singleton(initial)
    }

    pub fn is_singleton(&self) -> bool {
        matches!(self, Table::Singleton(_))
    }

    /// Look up a record by id. Singletons ignore the id.
    pub fn get(&self, id: &RecordId) -> Option<&Record> {
        match self {
            Table::Singleton(record) => record.as_ref(),
            Table::Collection(records) => records.get(id),
        }
    }

    /// All stored records, in id order.
    pub fn records(&self) -> Vec<&Record> {
        match self {
            Table::Singleton(record) => record.iter().collect(),
            Table::Collection(records) => records.values().collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Table::Singleton(record) => usize::from(record.is_some()),
            Table::Collection(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// State of one registered module: a table per model name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModuleState {
    tables: BTreeMap<String, Table>,
}

impl ModuleState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_table(&mut self, name: impl Into<String>, table: Table) {
        self.tables.insert(name.into(), table);
    }

    pub fn table(&self, name: &str) -> Result<&Table, Error> {
        self.tables.get(name).ok_or_else(|| Error::MissingTable {
            table: name.to_string(),
        })
    }

    pub fn table_mut(&mut self, name: &str) -> Result<&mut Table, Error> {
        self.tables.get_mut(name).ok_or_else(|| Error::MissingTable {
            table: name.to_string(),
        })
    }

    pub fn tables(&self) -> impl Iterator<Item = (&String, &Table)> {
        self.tables.iter()
    }
}
