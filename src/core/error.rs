use std::fmt;

/// Kind of named entity referenced by [`Error::NotFound`] and
/// [`Error::DuplicateName`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Store,
    Stream,
    Session,
    Partition,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Store => "store",
            EntityKind::Stream => "stream",
            EntityKind::Session => "session",
            EntityKind::Partition => "partition",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt data: {0}")]
    Corrupt(&'static str),
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
    #[error("unsupported version: {0}")]
    UnsupportedVersion(u32),
    #[error("{kind} not found: {name}")]
    NotFound { kind: EntityKind, name: String },
    #[error("duplicate {kind} name: {name}")]
    DuplicateName { kind: EntityKind, name: String },
    #[error("store already exists: {0}")]
    StoreExists(String),
    #[error("store format mismatch: expected {expected}, found {found}")]
    FormatMismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("codec error: {0}")]
    Codec(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error("transform failed: {0:#}")]
    TransformFailure(anyhow::Error),
}

impl Error {
    pub fn not_found(kind: EntityKind, name: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn duplicate(kind: EntityKind, name: impl Into<String>) -> Self {
        Error::DuplicateName {
            kind,
            name: name.into(),
        }
    }

    /// Wraps an error raised by user code (a transform or a subscription
    /// callback). A cancellation raised from inside user code stays a
    /// cancellation.
    pub fn from_user(err: anyhow::Error) -> Self {
        match err.downcast::<Error>() {
            Ok(inner) => match inner {
                Error::Cancelled => Error::Cancelled,
                Error::TransformFailure(source) => Error::TransformFailure(source),
                other => Error::TransformFailure(anyhow::Error::new(other)),
            },
            Err(err) => Error::TransformFailure(err),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Codec(value.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(value: bincode::Error) -> Self {
        Error::Codec(value.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_cancellation_is_preserved() {
        let err = Error::from_user(anyhow::Error::new(Error::Cancelled));
        assert!(err.is_cancelled());
    }

    #[test]
    fn user_errors_become_transform_failures() {
        let err = Error::from_user(anyhow::anyhow!("bad sample"));
        match err {
            Error::TransformFailure(inner) => assert_eq!(inner.to_string(), "bad sample"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn display_names_entity_kind() {
        let err = Error::duplicate(EntityKind::Session, "s1");
        assert_eq!(err.to_string(), "duplicate session name: s1");
    }
}
