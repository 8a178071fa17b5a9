//! # reflect-orm
//!
//! Schema-driven models over a REST API, cached in a [`reflect_store::Store`].
//!
//! - [`contract`]: per-field rules and the push/pull transforms
//! - [`constructs`]: getters, mutations and actions generated per model
//! - [`relations`]: actions for related models and custom endpoints
//! - [`Reflect`]: registers definitions and returns a [`Registry`]
//! - [`Model`], [`Entity`], [`Query`]: the object facade
//!
//! ```ignore
//! use reflect_orm::{Api, Contract, FieldSpec, ModelDefinition, Options, Reflect, Store};
//! use reflect_http::ReqwestTransport;
//! use serde_json::json;
//!
//! let transport = ReqwestTransport::with_default_timeout()?.with_base_url("https://api.example.com")?;
//! let store = Store::new();
//! let registry = Reflect::new(Options::new().with_transport(transport))
//!     .model(
//!         "posts",
//!         ModelDefinition::new()
//!             .api(Api::new().collection("/posts").model("/posts/:id"))
//!             .field("title", FieldSpec::new().with_default(json!("My Post Title")).required()),
//!     )
//!     .install(&store)?;
//!
//! let posts = registry.model("posts")?;
//! posts.fetch().await?;
//! let latest = posts.query()?.order(["title"]).last()?;
//! ```

pub mod config;
pub mod constructs;
pub mod contract;
pub mod entity;
pub mod error;
pub mod model;
pub mod plugin;
pub mod query;
pub mod relations;

pub use config::{
    ActionDef, Api, Endpoint, EndpointCall, ModelClass, ModelConfig, ModelDefinition, Options,
    RelationDef,
};
pub use contract::{pull_format, push_format, Cast, Contract, ContractError, FieldSpec, Validation};
pub use entity::{ActionAccessor, Entity, FieldValue, Member, Mirror, RelationAccessor};
pub use error::{Error, ErrorKind};
pub use model::{Model, Schema, Store};
pub use plugin::{Reflect, Registry};
pub use query::{Matcher, Query, Shape};

pub use reflect_http::Method;
pub use reflect_store::{Record, RecordId};
