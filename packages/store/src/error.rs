//! Error types for the store substrate.

/// Errors raised by the substrate itself.
///
/// These describe lookups that could not be routed: an unknown name, a
/// module registered twice, or a table missing from module state. Errors
/// produced by registered getters, mutations and actions use the caller's
/// own error type, which must convert from this one.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("No getter registered as `{name}`")]
    UnknownGetter { name: String },

    #[error("No mutation registered as `{name}`")]
    UnknownMutation { name: String },

    #[error("No action registered as `{name}`")]
    UnknownAction { name: String },

    #[error("No module registered for namespace `{namespace}`")]
    UnknownModule { namespace: String },

    #[error("A module is already registered for namespace `{namespace}`")]
    DuplicateModule { namespace: String },

    #[error("No table `{table}` in module state")]
    MissingTable { table: String },
}
