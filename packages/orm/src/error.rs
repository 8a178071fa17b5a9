use reflect_store::RecordId;
use serde_json::Value;
use thiserror::Error;

use crate::contract::ContractError;

/// The four kinds of failure callers can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A model, relation, action or endpoint is missing or malformed.
    Configuration,
    /// Outbound data broke the model's contract.
    Contract,
    /// An operation needed an id it did not have, or tried to alter one.
    Identity,
    /// The request capability failed; the cause is passed through.
    Transport,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Model '{model}' has no configuration for '{option}' option.")]
    MissingEndpoint { model: String, option: &'static str },

    #[error("No model registered as `{name}`")]
    UnknownModel { name: String },

    #[error("Model `{model}` has no relation `{relation}`")]
    UnknownRelation { model: String, relation: String },

    #[error("Model `{model}` has no action `{action}`")]
    UnknownAction { model: String, action: String },

    #[error("Action `{model}.{action}` has no `{method}` method")]
    UnknownMethod {
        model: String,
        action: String,
        method: String,
    },

    #[error("Invalid configuration for model `{model}`: {message}")]
    InvalidConfig { model: String, message: String },

    #[error("Invalid input for model `{model}`: {input}")]
    InvalidInput { model: String, input: Value },

    #[error("{feature} is not implemented")]
    NotImplemented { feature: &'static str },

    #[error("`query()` is not available for singleton model `{model}`")]
    SingletonQuery { model: String },

    #[error("Invalid model definition: {0}")]
    Definition(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] reflect_store::Error),

    #[error("{source}")]
    Contract {
        model: String,
        #[source]
        source: ContractError,
    },

    #[error("{operation} for model `{model}` must include an `id`")]
    MissingId {
        model: String,
        operation: &'static str,
    },

    #[error("Cannot change `id` of a `{model}` instance from `{current}` to `{requested}`; query for a new instance instead")]
    IdChange {
        model: String,
        current: RecordId,
        requested: RecordId,
    },

    #[error("Cannot set `{field}` of `{model}` directly on the store")]
    ReadOnlyMirror { model: String, field: String },

    #[error("Multiple nested actions available for `{model}.{action}` ({}); call one of them explicitly", .methods.join(", "))]
    AmbiguousAction {
        model: String,
        action: String,
        methods: Vec<String>,
    },

    #[error(transparent)]
    Transport(#[from] reflect_http::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MissingEndpoint { .. }
            | Error::UnknownModel { .. }
            | Error::UnknownRelation { .. }
            | Error::UnknownAction { .. }
            | Error::UnknownMethod { .. }
            | Error::InvalidConfig { .. }
            | Error::InvalidInput { .. }
            | Error::NotImplemented { .. }
            | Error::SingletonQuery { .. }
            | Error::Definition(_)
            | Error::Store(_) => ErrorKind::Configuration,
            Error::Contract { .. } => ErrorKind::Contract,
            Error::MissingId { .. }
            | Error::IdChange { .. }
            | Error::ReadOnlyMirror { .. }
            | Error::AmbiguousAction { .. } => ErrorKind::Identity,
            Error::Transport(_) => ErrorKind::Transport,
        }
    }

    pub(crate) fn contract(model: &str, source: ContractError) -> Self {
        Error::Contract {
            model: model.to_string(),
            source,
        }
    }

    pub(crate) fn missing_id(model: &str, operation: &'static str) -> Self {
        Error::MissingId {
            model: model.to_string(),
            operation,
        }
    }

    pub(crate) fn invalid_input(model: &str, input: Value) -> Self {
        Error::InvalidInput {
            model: model.to_string(),
            input,
        }
    }
}
