mod authorizer;
pub mod identity;
mod model;
pub mod policy;
mod regulator;

pub use authorizer::Authorizer;
pub use regulator::Regulator;
pub use regulator::StorageDriver;

pub use model::Ability;
pub use model::Action;
pub use model::Role;

/// An authorization error that can originate from the storage driver
#[derive(Debug, thiserror::Error)]
pub enum Error<StorageError: std::error::Error> {
    #[error("unknown user {identity}")]
    UnknownUser { identity: String },
    #[error("unknown user id {0}")]
    UnknownUserId(i64),
    #[error(transparent)]
    Storage(StorageError),
}

/// A representation of an authorization decision over some resource
#[derive(derive_more::Debug, derive_more::Display)]
pub enum Authorization<T> {
    /// The initiator of the authorization is allowed to access the resource
    Granted(T),
    /// The initiator of the authorization is a team admin and bypassed the ownership checks
    Bypassed,
    /// The initiator of the authorization is denied access to the resource
    Denied { reason: &'static str },
}

#[derive(Debug, thiserror::Error)]
#[error("Unauthorized (reason: {reason})")]
pub struct Unauthorized {
    pub reason: &'static str,
}

impl Authorization<()> {
    pub fn allowed(self) -> Result<(), Unauthorized> {
        match self {
            Authorization::Granted(()) | Authorization::Bypassed => Ok(()),
            Authorization::Denied { reason } => Err(Unauthorized { reason }),
        }
    }
}

impl<T> Authorization<T> {
    pub fn denied(&self) -> bool {
        matches!(self, Self::Denied { .. })
    }
}

impl<T: std::fmt::Debug> Authorization<T> {
    #[track_caller]
    pub fn expect_allowed(self, reason: &'static str) -> T {
        match self {
            Authorization::Granted(value) => value,
            other => panic!("expected Authorization::Granted, got {other:?}: {reason}"),
        }
    }

    #[track_caller]
    pub fn expect_denied(self, reason: &'static str) -> &'static str {
        match self {
            Authorization::Denied { reason } => reason,
            other => panic!("expected Authorization::Denied, got {other:?}: {reason}"),
        }
    }
}
