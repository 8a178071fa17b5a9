//! # reflect-store
//!
//! The state container that the ORM layer registers its models against.
//!
//! - [`Table`]: one model's records, either a singleton or keyed by [`RecordId`]
//! - [`ModuleState`]: the tables of one namespace
//! - [`Store`]: shared handle offering named getters, mutations and actions
//! - [`Context`]: what an action sees, scoped to its namespace
//!
//! The store is generic over the error type of its registered handlers, which
//! only needs to convert from this crate's [`Error`].
//!
//! ```rust
//! use reflect_store::{Error, Module, ModuleState, Store, Table};
//! use serde_json::{json, Value};
//!
//! let mut state = ModuleState::new();
//! state.insert_table("profile", Table::singleton(None));
//! let mut module: Module<Error> = Module::new(state);
//! module.add_getter("profile.count", |state, _| {
//!     Ok(json!(state.table("profile")?.len()))
//! });
//!
//! let store: Store<Error> = Store::new();
//! store.register_module(None, module).unwrap();
//! assert_eq!(store.get("profile.count", Value::Null).unwrap(), json!(0));
//! ```

mod error;
mod record;
mod store;

pub use error::Error;
pub use record::{ModuleState, Record, RecordId, Table};
pub use store::{Action, Context, Getter, Module, Mutation, Store};

pub use futures::future::BoxFuture;
