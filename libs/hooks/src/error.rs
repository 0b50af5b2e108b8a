//! Error types for hook descriptors.

use thiserror::Error;

use crate::HookKind;

/// Errors that can occur when parsing or validating hooks.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HookError {
    /// The hook kind is unknown.
    #[error("unknown hook kind {0:?}")]
    UnknownKind(String),

    /// A relation hook is missing its relation id.
    #[error("{0} hook requires a relation id")]
    MissingRelation(HookKind),

    /// A relation membership hook is missing its remote unit.
    #[error("{0} hook requires a remote unit")]
    MissingRemoteUnit(HookKind),

    /// A storage hook is missing its storage id.
    #[error("{0} hook requires a storage id")]
    MissingStorage(HookKind),

    /// The hook carries a field its kind does not use.
    #[error("{kind} hook must not carry a {field}")]
    UnexpectedField { kind: HookKind, field: &'static str },
}
