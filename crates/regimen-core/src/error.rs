//! Runtime error taxonomy.
//!
//! Every variant is recovered where it occurs: the interpreter logs it and
//! skips the action, the selector reports it to the user, and so on. None
//! of them stop the engine.

/// Errors raised while interpreting actions or applying lifecycle rules.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// A named definition does not exist in the script.
    #[error("{kind} not found: {name}")]
    DefinitionNotFound {
        /// Definition kind (status, job, procedure, ...).
        kind: &'static str,
        /// The missing name.
        name: String,
    },

    /// A definition exists but its eligibility does not hold.
    #[error("{kind} {name} is not available: {reason}")]
    Ineligible {
        /// Definition kind.
        kind: &'static str,
        /// Definition name.
        name: String,
        /// Which constraint failed.
        reason: String,
    },

    /// No combination of eligible punishments covers the severity.
    #[error("no punishment can cover severity {severity}")]
    UnsatisfiableSeverity {
        /// The requested severity.
        severity: u32,
    },

    /// An action payload could not be parsed.
    #[error("malformed {kind} payload {value:?}: {reason}")]
    MalformedPayload {
        /// Action kind, as written in the script.
        kind: String,
        /// The raw payload.
        value: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A procedure (or instruction include) would call itself.
    #[error("recursive call to {name}")]
    RecursiveCall {
        /// The name already on the call stack.
        name: String,
    },

    /// A write targeted a predefined `zz` variable.
    #[error("variable {name} is read-only")]
    ReadOnlyVariable {
        /// The variable name.
        name: String,
    },

    /// No assignment instance with this name is active.
    #[error("no active assignment named {instance}")]
    NoSuchAssignment {
        /// The instance name.
        instance: String,
    },
}

impl EngineError {
    /// Shorthand for [`EngineError::DefinitionNotFound`].
    pub fn not_found(kind: &'static str, name: &str) -> Self {
        Self::DefinitionNotFound {
            kind,
            name: name.to_owned(),
        }
    }

    /// Shorthand for [`EngineError::Ineligible`].
    pub fn ineligible(kind: &'static str, name: &str, reason: impl Into<String>) -> Self {
        Self::Ineligible {
            kind,
            name: name.to_owned(),
            reason: reason.into(),
        }
    }
}
